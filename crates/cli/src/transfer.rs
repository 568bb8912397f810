use std::path::{Path, PathBuf};

use fieldops_client::{FieldOpsClient, UploadOptions, UploadPolicy, UploadTarget};
use fieldops_interchange::ResourceKind;
use serde_json::{json, Value};

use crate::output::{print_json, records_json};
use crate::{OutputFormat, UploadKind};

pub(crate) fn upload_target(
    kind: UploadKind,
    task: Option<i64>,
    image_type: String,
    notes: Option<String>,
) -> Result<UploadTarget, String> {
    match kind {
        UploadKind::Cctv => Ok(UploadTarget::CctvImage { image_type }),
        UploadKind::Task => {
            let task_id = task.ok_or("task uploads need --task <id>")?;
            Ok(UploadTarget::TaskAttachment { task_id, notes })
        }
        UploadKind::Profile => Ok(UploadTarget::ProfilePhoto),
    }
}

pub(crate) async fn cmd_upload(
    client: &FieldOpsClient,
    file: &Path,
    target: UploadTarget,
    policy: Option<UploadPolicy>,
    output: OutputFormat,
) -> Result<(), String> {
    let mut options = UploadOptions::default();
    if let Some(policy) = policy {
        options = options.with_policy(policy);
    }
    let handle = client.spawn_upload(file.to_path_buf(), target, options);

    let mut progress = handle.watch_progress();
    let show = output == OutputFormat::Text;
    let printer = tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            let value = *progress.borrow_and_update();
            if show {
                eprint!("\rUploading {:>3}%", value);
            }
        }
    });

    let result = tokio::select! {
        result = handle.wait() => result.map_err(|e| e.to_string()),
        _ = tokio::signal::ctrl_c() => Err("upload cancelled".to_string()),
    };
    printer.abort();
    if show {
        eprintln!();
    }

    let reference = result?;
    match output {
        OutputFormat::Json => print_json(&json!({ "reference": reference })),
        OutputFormat::Text => println!("{}", reference),
    }
    Ok(())
}

pub(crate) async fn cmd_export(
    client: &FieldOpsClient,
    kind: ResourceKind,
    out: Option<PathBuf>,
    template: bool,
    output: OutputFormat,
) -> Result<(), String> {
    let file = if template {
        client.import_template(kind).await
    } else {
        client.export(kind).await
    }
    .map_err(|e| e.to_string())?;

    let path = out.unwrap_or_else(|| PathBuf::from(&file.file_name));
    tokio::fs::write(&path, &file.bytes)
        .await
        .map_err(|e| format!("could not write '{}': {}", path.display(), e))?;

    match output {
        OutputFormat::Json => print_json(&json!({
            "path": path.display().to_string(),
            "bytes": file.bytes.len(),
        })),
        OutputFormat::Text => println!("Wrote {} bytes to {}", file.bytes.len(), path.display()),
    }
    Ok(())
}

pub(crate) async fn cmd_import(
    client: &FieldOpsClient,
    kind: ResourceKind,
    file: &Path,
    output: OutputFormat,
) -> Result<(), String> {
    let summary = client.import(kind, file).await.map_err(|e| e.to_string())?;
    match output {
        OutputFormat::Json => print_json(&serde_json::to_value(&summary).unwrap_or(Value::Null)),
        OutputFormat::Text => {
            println!(
                "{} rows: {} imported, {} updated, {} failed",
                summary.total, summary.imported, summary.updated, summary.errors
            );
            for detail in &summary.error_details {
                println!("  {}", detail);
            }
        }
    }
    Ok(())
}

pub(crate) async fn cmd_bulk_cctv(
    client: &FieldOpsClient,
    file: &Path,
    output: OutputFormat,
) -> Result<(), String> {
    let text = tokio::fs::read_to_string(file)
        .await
        .map_err(|e| format!("could not read '{}': {}", file.display(), e))?;
    let rows: Vec<Value> = serde_json::from_str(&text)
        .map_err(|e| format!("'{}' is not a JSON array: {}", file.display(), e))?;
    let created = client
        .bulk_create_cctv(&rows)
        .await
        .map_err(|e| e.to_string())?;
    match output {
        OutputFormat::Json => print_json(&json!({
            "count": created.count,
            "records": records_json(&created.records),
        })),
        OutputFormat::Text => println!("Uploaded {} CCTV records.", created.count),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_upload_requires_task_id() {
        assert!(upload_target(UploadKind::Task, None, "camera".into(), None).is_err());
        assert_eq!(
            upload_target(UploadKind::Task, Some(4), "camera".into(), None).unwrap(),
            UploadTarget::TaskAttachment {
                task_id: 4,
                notes: None
            }
        );
        assert_eq!(
            upload_target(UploadKind::Cctv, None, "rack".into(), None).unwrap(),
            UploadTarget::CctvImage {
                image_type: "rack".into()
            }
        );
    }
}
