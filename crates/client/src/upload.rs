//! Base64 uploads with synthesized progress.
//!
//! An upload reads the whole file, encodes it as a `data:` URL inside a
//! JSON body and posts it to one of the upload endpoints. Progress is a
//! single integer in `0..=100` that never decreases:
//!
//! * reading the file moves it from 0 to the configured read ceiling
//!   (40 by default) in proportion to bytes read;
//! * sending the body moves it from the ceiling towards 99 in proportion
//!   to bytes handed to the transport;
//! * 100 is reported only once the server has answered with a reference.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use base64::Engine;
use fieldops_transport::{ApiRequest, CancelToken, SendOptions};
use serde_json::{json, Value};
use tokio::io::AsyncReadExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::client::FieldOpsClient;
use crate::error::UploadError;
use crate::invalidation::InvalidationPlan;
use crate::notify::Notification;

/// Receives every new progress value.
pub type ProgressCallback = Arc<dyn Fn(u8) + Send + Sync>;

// ── Policy ──────────────────────────────────────────────────────────

/// Size and type limits checked before anything is read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadPolicy {
    pub max_bytes: Option<u64>,
    pub images_only: bool,
}

impl UploadPolicy {
    /// Images up to `megabytes` MB.
    pub fn images(megabytes: u64) -> Self {
        UploadPolicy {
            max_bytes: Some(megabytes * 1024 * 1024),
            images_only: true,
        }
    }

    pub fn check(&self, size: u64, mime: &str) -> Result<(), UploadError> {
        if self.images_only && !mime.starts_with("image/") {
            return Err(UploadError::Policy(format!(
                "only image files are allowed, got {}",
                mime
            )));
        }
        if let Some(max) = self.max_bytes {
            if size > max {
                return Err(UploadError::Policy(format!(
                    "file is {} bytes, the limit is {} bytes",
                    size, max
                )));
            }
        }
        Ok(())
    }
}

/// Content type for a file name, guessed from its extension.
pub fn mime_for(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

// ── Targets ─────────────────────────────────────────────────────────

/// Where an upload goes and how its body and answer are shaped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadTarget {
    /// A CCTV inventory image; answers `imageUrl`.
    CctvImage { image_type: String },
    /// An attachment on a ticket; answers `files[0]`.
    TaskAttachment { task_id: i64, notes: Option<String> },
    /// The signed-in user's photo; answers `profileImageUrl`.
    ProfilePhoto,
}

impl UploadTarget {
    pub fn path(&self) -> String {
        match self {
            UploadTarget::CctvImage { .. } => "/api/customer-portal/cctv-upload-image".to_string(),
            UploadTarget::TaskAttachment { task_id, .. } => format!("/api/tasks/{}/upload", task_id),
            UploadTarget::ProfilePhoto => "/api/profile/photo".to_string(),
        }
    }

    pub fn reference_field(&self) -> &'static str {
        match self {
            UploadTarget::CctvImage { .. } => "imageUrl",
            UploadTarget::TaskAttachment { .. } => "files[0]",
            UploadTarget::ProfilePhoto => "profileImageUrl",
        }
    }

    fn body(&self, file_name: &str, mime: &str, data_url: String) -> Value {
        match self {
            UploadTarget::CctvImage { image_type } => json!({
                "imageData": data_url,
                "imageType": image_type,
                "fileName": file_name,
            }),
            UploadTarget::TaskAttachment { notes, .. } => json!({
                "files": [{ "name": file_name, "type": mime, "data": data_url }],
                "notes": notes.clone().unwrap_or_default(),
            }),
            UploadTarget::ProfilePhoto => json!({ "photoData": data_url }),
        }
    }

    /// The stored file's reference from a 2xx body. Blank counts as absent.
    fn reference(&self, body: &Value) -> Option<String> {
        let value = match self {
            UploadTarget::CctvImage { .. } => body.get("imageUrl"),
            UploadTarget::ProfilePhoto => body.get("profileImageUrl"),
            UploadTarget::TaskAttachment { .. } => {
                let first = body.get("files").and_then(|f| f.get(0));
                match first {
                    Some(Value::Object(file)) => file.get("url").or_else(|| file.get("path")),
                    other => other,
                }
            }
        };
        value
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }
}

// ── Progress ────────────────────────────────────────────────────────

/// Clamped, monotonic progress in `0..=100`.
pub(crate) struct ProgressTracker {
    current: Mutex<u8>,
    read_ceiling: u8,
    callback: Option<ProgressCallback>,
}

impl ProgressTracker {
    pub(crate) fn new(read_ceiling: u8, callback: Option<ProgressCallback>) -> Self {
        let tracker = ProgressTracker {
            current: Mutex::new(0),
            read_ceiling: read_ceiling.clamp(1, 99),
            callback,
        };
        if let Some(cb) = &tracker.callback {
            cb(0);
        }
        tracker
    }

    fn report(&self, value: u8) {
        let value = value.min(100);
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        if value <= *current {
            return;
        }
        *current = value;
        if let Some(cb) = &self.callback {
            cb(value);
        }
    }

    fn fraction(done: u64, total: u64, span: u8) -> u8 {
        if total == 0 {
            return span;
        }
        let done = done.min(total);
        (u128::from(span) * u128::from(done) / u128::from(total)) as u8
    }

    pub(crate) fn read(&self, read: u64, total: u64) {
        self.report(Self::fraction(read, total, self.read_ceiling));
    }

    pub(crate) fn sent(&self, sent: u64, total: u64) {
        let span = 99 - self.read_ceiling;
        self.report((self.read_ceiling + Self::fraction(sent, total, span)).min(99));
    }

    pub(crate) fn finish(&self) {
        self.report(100);
    }

    #[cfg(test)]
    pub(crate) fn value(&self) -> u8 {
        *self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ── Upload ──────────────────────────────────────────────────────────

/// Per-upload options.
#[derive(Clone, Default)]
pub struct UploadOptions {
    pub policy: Option<UploadPolicy>,
    pub progress: Option<ProgressCallback>,
    pub cancel: Option<CancelToken>,
}

impl std::fmt::Debug for UploadOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadOptions")
            .field("policy", &self.policy)
            .field("progress", &self.progress.is_some())
            .field("cancel", &self.cancel)
            .finish()
    }
}

impl UploadOptions {
    pub fn with_policy(mut self, policy: UploadPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// Cancels the transfer when the upload future is dropped.
struct CancelOnDrop(CancelToken);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

impl FieldOpsClient {
    /// Upload the file at `path`. Returns the server's reference to it.
    pub async fn upload_file(
        &self,
        path: &Path,
        target: UploadTarget,
        options: UploadOptions,
    ) -> Result<String, UploadError> {
        let result = self.try_upload_file(path, &target, options).await;
        self.report_upload(&target, result)
    }

    /// Upload bytes already in memory under `file_name`.
    pub async fn upload_bytes(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
        target: UploadTarget,
        options: UploadOptions,
    ) -> Result<String, UploadError> {
        let result = self
            .try_upload_bytes(file_name, &bytes, &target, options)
            .await;
        self.report_upload(&target, result)
    }

    /// Start uploading `path` in the background.
    pub fn spawn_upload(
        &self,
        path: PathBuf,
        target: UploadTarget,
        options: UploadOptions,
    ) -> UploadHandle {
        let cancel = options.cancel.clone().unwrap_or_default();
        let (tx, rx) = watch::channel(0u8);
        let forward = options.progress.clone();
        let progress: ProgressCallback = Arc::new(move |value| {
            tx.send_replace(value);
            if let Some(cb) = &forward {
                cb(value);
            }
        });
        let options = options.with_progress(progress).with_cancel(cancel.clone());
        let client = self.clone();
        let join = tokio::spawn(async move { client.upload_file(&path, target, options).await });
        UploadHandle {
            cancel,
            progress: rx,
            join: Some(join),
        }
    }

    fn tracker(&self, options: &UploadOptions) -> ProgressTracker {
        ProgressTracker::new(self.config().upload.read_ceiling, options.progress.clone())
    }

    async fn try_upload_bytes(
        &self,
        file_name: &str,
        bytes: &[u8],
        target: &UploadTarget,
        options: UploadOptions,
    ) -> Result<String, UploadError> {
        let mime = mime_for(Path::new(file_name));
        if let Some(policy) = &options.policy {
            policy.check(bytes.len() as u64, &mime)?;
        }
        let tracker = Arc::new(self.tracker(&options));
        tracker.read(1, 1);
        let cancel = options.cancel.clone().unwrap_or_default();
        self.send_upload(file_name, &mime, bytes, target, tracker, cancel)
            .await
    }

    async fn try_upload_file(
        &self,
        path: &Path,
        target: &UploadTarget,
        options: UploadOptions,
    ) -> Result<String, UploadError> {
        let read_error = |e: std::io::Error| UploadError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        };
        let mime = mime_for(path);
        let mut file = tokio::fs::File::open(path).await.map_err(read_error)?;
        let total = file.metadata().await.map_err(read_error)?.len();
        if let Some(policy) = &options.policy {
            policy.check(total, &mime)?;
        }

        let cancel = options.cancel.clone().unwrap_or_default();
        let tracker = Arc::new(self.tracker(&options));
        let chunk_size = self.config().upload.chunk_size.max(1);
        let mut bytes = Vec::with_capacity(total as usize);
        let mut chunk = vec![0u8; chunk_size];
        loop {
            if cancel.is_cancelled() {
                return Err(UploadError::Cancelled);
            }
            let n = file.read(&mut chunk).await.map_err(read_error)?;
            if n == 0 {
                break;
            }
            bytes.extend_from_slice(&chunk[..n]);
            tracker.read(bytes.len() as u64, total.max(bytes.len() as u64));
        }
        tracker.read(1, 1);

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload");
        self.send_upload(file_name, &mime, &bytes, target, tracker, cancel)
            .await
    }

    async fn send_upload(
        &self,
        file_name: &str,
        mime: &str,
        bytes: &[u8],
        target: &UploadTarget,
        tracker: Arc<ProgressTracker>,
        cancel: CancelToken,
    ) -> Result<String, UploadError> {
        let payload = base64::engine::general_purpose::STANDARD.encode(bytes);
        let data_url = format!("data:{};base64,{}", mime, payload);
        let request = ApiRequest::post(target.path(), target.body(file_name, mime, data_url));

        let on_sent = tracker.clone();
        let options = SendOptions::default()
            .with_progress(Arc::new(move |sent, total| on_sent.sent(sent, total)))
            .with_cancel(cancel.clone());
        let _guard = CancelOnDrop(cancel);

        debug!(target = %target.path(), bytes = bytes.len(), "uploading");
        let response = self.transport().send_with(request, options).await?;
        if !response.is_success() {
            return Err(UploadError::Rejected {
                status: response.status,
                message: response
                    .error_message()
                    .unwrap_or_else(|| format!("server returned {}", response.status)),
            });
        }
        let body = response.body_json()?;
        let reference = target
            .reference(&body)
            .ok_or_else(|| UploadError::MissingReference {
                field: target.reference_field().to_string(),
            })?;

        if let UploadTarget::TaskAttachment { task_id, .. } = target {
            self.apply(InvalidationPlan::task_history(*task_id)).await;
        }
        tracker.finish();
        Ok(reference)
    }

    fn report_upload(
        &self,
        target: &UploadTarget,
        result: Result<String, UploadError>,
    ) -> Result<String, UploadError> {
        match &result {
            Ok(reference) => {
                info!(target = %target.path(), reference = %reference, "upload complete");
                self.notify(Notification::success("Upload complete", reference.clone()));
            }
            Err(UploadError::Cancelled) => {
                debug!(target = %target.path(), "upload cancelled");
            }
            Err(e) => {
                warn!(target = %target.path(), error = %e, "upload failed");
                self.notify(Notification::error("Upload failed", e.to_string()));
            }
        }
        result
    }
}

/// A background upload. Dropping the handle cancels the transfer.
pub struct UploadHandle {
    cancel: CancelToken,
    progress: watch::Receiver<u8>,
    join: Option<JoinHandle<Result<String, UploadError>>>,
}

impl UploadHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Latest progress value.
    pub fn progress(&self) -> u8 {
        *self.progress.borrow()
    }

    /// A receiver that wakes on every progress change.
    pub fn watch_progress(&self) -> watch::Receiver<u8> {
        self.progress.clone()
    }

    /// Wait for the upload to finish. Dropping this future before it
    /// completes cancels the transfer.
    pub async fn wait(mut self) -> Result<String, UploadError> {
        let Some(join) = self.join.as_mut() else {
            return Err(UploadError::Cancelled);
        };
        let outcome = join.await;
        self.join = None;
        match outcome {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(UploadError::Cancelled),
            Err(e) => Err(UploadError::Transport(
                fieldops_transport::TransportError::Io(format!("upload task failed: {}", e)),
            )),
        }
    }
}

impl Drop for UploadHandle {
    fn drop(&mut self) {
        if self.join.is_some() {
            self.cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> (ProgressCallback, Arc<Mutex<Vec<u8>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let cb: ProgressCallback = Arc::new(move |v| sink.lock().unwrap().push(v));
        (cb, seen)
    }

    #[test]
    fn tracker_is_monotonic_and_clamped() {
        let (cb, seen) = recorder();
        let tracker = ProgressTracker::new(40, Some(cb));
        tracker.read(50, 100);
        tracker.read(10, 100);
        tracker.read(100, 100);
        tracker.sent(0, 10);
        tracker.sent(10, 10);
        tracker.sent(5, 10);
        tracker.finish();
        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen, vec![0, 20, 40, 99, 100]);
        assert_eq!(tracker.value(), 100);
    }

    #[test]
    fn send_phase_stops_short_of_100() {
        let tracker = ProgressTracker::new(40, None);
        tracker.sent(u64::MAX, 1);
        assert_eq!(tracker.value(), 99);
    }

    #[test]
    fn policy_checks_type_and_size() {
        let policy = UploadPolicy::images(1);
        assert!(policy.check(10, "image/png").is_ok());
        assert!(matches!(
            policy.check(10, "application/pdf"),
            Err(UploadError::Policy(_))
        ));
        assert!(matches!(
            policy.check(2 * 1024 * 1024, "image/png"),
            Err(UploadError::Policy(_))
        ));
        assert!(UploadPolicy::default().check(u64::MAX, "text/csv").is_ok());
    }

    #[test]
    fn mime_by_extension() {
        assert_eq!(mime_for(Path::new("cam.JPG")), "image/jpeg");
        assert_eq!(mime_for(Path::new("report.pdf")), "application/pdf");
        assert_eq!(mime_for(Path::new("noext")), "application/octet-stream");
        assert_eq!(mime_for(Path::new("site.webp")), "image/webp");
    }

    #[test]
    fn references_per_target() {
        let cctv = UploadTarget::CctvImage {
            image_type: "camera".into(),
        };
        assert_eq!(
            cctv.reference(&json!({"imageUrl": "/uploads/a.png"})).as_deref(),
            Some("/uploads/a.png")
        );
        assert_eq!(cctv.reference(&json!({"imageUrl": ""})), None);

        let task = UploadTarget::TaskAttachment {
            task_id: 3,
            notes: None,
        };
        assert_eq!(
            task.reference(&json!({"files": ["/uploads/tasks/3/a.pdf"]})).as_deref(),
            Some("/uploads/tasks/3/a.pdf")
        );
        assert_eq!(
            task.reference(&json!({"files": [{"url": "/u/b.pdf"}]})).as_deref(),
            Some("/u/b.pdf")
        );
        assert_eq!(task.reference(&json!({"files": []})), None);
        assert_eq!(task.path(), "/api/tasks/3/upload");
    }
}
