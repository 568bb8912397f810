use std::io::{BufRead, Write};

use fieldops_client::{filter, CollectionStatus, Confirmation, DeleteOutcome, FieldOpsClient, Filters};
use fieldops_interchange::{ResourceKind, Scope};
use serde_json::{json, Value};

use crate::output::{print_json, print_record, records_json, table};
use crate::OutputFormat;

pub(crate) struct ListQuery {
    pub(crate) scope: Scope,
    pub(crate) search: Option<String>,
    pub(crate) filters: Vec<String>,
    pub(crate) page: usize,
    pub(crate) page_size: usize,
}

impl ListQuery {
    fn filters(&self) -> Result<Filters, String> {
        let mut filters = Filters::parse_pairs(self.filters.iter().map(String::as_str))?;
        if let Some(search) = &self.search {
            filters.set("search", search);
        }
        Ok(filters)
    }
}

pub(crate) async fn cmd_list(
    client: &FieldOpsClient,
    kind: ResourceKind,
    query: ListQuery,
    output: OutputFormat,
) -> Result<(), String> {
    if query.page == 0 {
        return Err("--page starts at 1".to_string());
    }
    let snapshot = client.list(kind, query.scope, query.filters()?).await;
    match &snapshot.status {
        CollectionStatus::Failed { message } => return Err(message.clone()),
        CollectionStatus::SessionExpired => {
            eprintln!("session expired; set FIELDOPS_SESSION_COOKIE to sign in again");
        }
        CollectionStatus::Loading | CollectionStatus::Ready => {}
    }

    let pages = filter::page_count(snapshot.records.len(), query.page_size);
    let rows = filter::page(&snapshot.records, query.page_size, query.page - 1);

    match output {
        OutputFormat::Json => print_json(&json!({
            "resource": kind.name(),
            "scope": query.scope.to_string(),
            "total": snapshot.records.len(),
            "page": query.page,
            "pages": pages,
            "records": records_json(rows),
        })),
        OutputFormat::Text => {
            if snapshot.records.is_empty() {
                println!("No {} found.", kind.name().replace('_', " "));
                return Ok(());
            }
            print!("{}", table(kind, rows));
            if pages > 1 {
                println!(
                    "page {} of {} ({} rows)",
                    query.page,
                    pages,
                    snapshot.records.len()
                );
            }
        }
    }
    Ok(())
}

pub(crate) async fn cmd_show(
    client: &FieldOpsClient,
    kind: ResourceKind,
    id: i64,
    output: OutputFormat,
) -> Result<(), String> {
    let record = client.get(kind, id).await.map_err(|e| e.to_string())?;
    print_record(&record, output);
    Ok(())
}

/// Parse `--data`: inline JSON, or `@path` to read it from a file.
fn parse_data(data: &str) -> Result<Value, String> {
    let text = match data.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .map_err(|e| format!("could not read '{}': {}", path, e))?,
        None => data.to_string(),
    };
    serde_json::from_str(&text).map_err(|e| format!("invalid JSON in --data: {}", e))
}

pub(crate) async fn cmd_create(
    client: &FieldOpsClient,
    kind: ResourceKind,
    data: &str,
    output: OutputFormat,
) -> Result<(), String> {
    let payload = parse_data(data)?;
    let record = client
        .create(kind, &payload)
        .await
        .map_err(|e| e.to_string())?;
    print_record(&record, output);
    Ok(())
}

pub(crate) async fn cmd_update(
    client: &FieldOpsClient,
    kind: ResourceKind,
    id: i64,
    data: &str,
    output: OutputFormat,
) -> Result<(), String> {
    let patch = parse_data(data)?;
    let record = client
        .update(kind, id, &patch)
        .await
        .map_err(|e| e.to_string())?;
    print_record(&record, output);
    Ok(())
}

fn confirm(kind: ResourceKind, id: i64) -> Confirmation {
    eprint!(
        "Delete {} {}? Type 'yes' to confirm: ",
        kind.spec().label,
        id
    );
    let _ = std::io::stderr().flush();
    let mut answer = String::new();
    match std::io::stdin().lock().read_line(&mut answer) {
        Ok(_) if answer.trim() == "yes" => Confirmation::Confirmed,
        _ => Confirmation::Declined,
    }
}

pub(crate) async fn cmd_delete(
    client: &FieldOpsClient,
    kind: ResourceKind,
    id: i64,
    yes: bool,
    output: OutputFormat,
) -> Result<(), String> {
    let confirmation = if yes {
        Confirmation::Confirmed
    } else {
        confirm(kind, id)
    };
    let outcome = client
        .delete(kind, id, confirmation)
        .await
        .map_err(|e| e.to_string())?;
    let deleted = outcome == DeleteOutcome::Deleted;
    match output {
        OutputFormat::Json => print_json(&json!({ "id": id, "deleted": deleted })),
        OutputFormat::Text if deleted => println!("Deleted {} {}.", kind.spec().label, id),
        OutputFormat::Text => println!("Cancelled."),
    }
    Ok(())
}

pub(crate) async fn cmd_next_serial(
    client: &FieldOpsClient,
    kind: ResourceKind,
    scope: Scope,
    output: OutputFormat,
) -> Result<(), String> {
    let next = client.suggest_next_serial(kind, scope).await;
    match output {
        OutputFormat::Json => print_json(&json!({ "next": next })),
        OutputFormat::Text => println!("{}", next),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_can_be_inline_or_from_file() {
        assert_eq!(parse_data(r#"{"a":1}"#).unwrap(), json!({"a": 1}));
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("body.json");
        std::fs::write(&path, r#"{"title":"x"}"#).unwrap();
        let arg = format!("@{}", path.display());
        assert_eq!(parse_data(&arg).unwrap(), json!({"title": "x"}));
        assert!(parse_data("{not json").is_err());
    }

    #[test]
    fn search_joins_filters() {
        let query = ListQuery {
            scope: Scope::All,
            search: Some("acme".into()),
            filters: vec!["status=pending".into()],
            page: 1,
            page_size: 0,
        };
        let filters = query.filters().unwrap();
        assert_eq!(filters.get("status"), Some("pending"));
        assert_eq!(filters.search(), Some("acme"));
    }
}
