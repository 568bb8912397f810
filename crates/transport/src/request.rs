//! Request and response values exchanged with an [`crate::ApiTransport`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::TransportError;

/// HTTP method of an API request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }

    pub fn parse(s: &str) -> Option<Method> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Some(Method::Get),
            "POST" => Some(Method::Post),
            "PUT" => Some(Method::Put),
            "PATCH" => Some(Method::Patch),
            "DELETE" => Some(Method::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One part of a `multipart/form-data` body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartPart {
    pub name: String,
    pub file_name: Option<String>,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// A `multipart/form-data` body.
///
/// ureq does not bundle multipart support, so the body is encoded by hand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartForm {
    boundary: String,
    parts: Vec<MultipartPart>,
}

impl Default for MultipartForm {
    fn default() -> Self {
        Self::new()
    }
}

impl MultipartForm {
    pub fn new() -> Self {
        MultipartForm {
            boundary: "fieldops-boundary-7d41c9e2".to_string(),
            parts: Vec::new(),
        }
    }

    pub fn file(
        mut self,
        name: &str,
        file_name: &str,
        content_type: &str,
        data: Vec<u8>,
    ) -> Self {
        self.parts.push(MultipartPart {
            name: name.to_string(),
            file_name: Some(file_name.to_string()),
            content_type: content_type.to_string(),
            data,
        });
        self
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.parts.push(MultipartPart {
            name: name.to_string(),
            file_name: None,
            content_type: "text/plain".to_string(),
            data: value.as_bytes().to_vec(),
        });
        self
    }

    pub fn parts(&self) -> &[MultipartPart] {
        &self.parts
    }

    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    pub fn encode(&self) -> Vec<u8> {
        let boundary = &self.boundary;
        let mut body: Vec<u8> = Vec::new();
        for part in &self.parts {
            let disposition = match &part.file_name {
                Some(file_name) => format!(
                    "form-data; name=\"{}\"; filename=\"{}\"",
                    part.name, file_name
                ),
                None => format!("form-data; name=\"{}\"", part.name),
            };
            body.extend_from_slice(
                format!(
                    "--{boundary}\r\nContent-Disposition: {disposition}\r\nContent-Type: {}\r\n\r\n",
                    part.content_type
                )
                .as_bytes(),
            );
            body.extend_from_slice(&part.data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
        body
    }
}

/// Body of an API request.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(serde_json::Value),
    Multipart(MultipartForm),
    /// Pre-encoded bytes with their content type.
    Raw { content_type: String, data: Vec<u8> },
}

impl RequestBody {
    /// Encode into `(content type, bytes)`. `Empty` yields `None`.
    pub fn encode(&self) -> Result<Option<(String, Vec<u8>)>, TransportError> {
        match self {
            RequestBody::Empty => Ok(None),
            RequestBody::Json(value) => {
                let data = serde_json::to_vec(value)
                    .map_err(|e| TransportError::Io(format!("could not encode JSON body: {}", e)))?;
                Ok(Some(("application/json".to_string(), data)))
            }
            RequestBody::Multipart(form) => Ok(Some((form.content_type(), form.encode()))),
            RequestBody::Raw { content_type, data } => {
                Ok(Some((content_type.clone(), data.clone())))
            }
        }
    }
}

/// A request against the API, relative to the transport's base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: RequestBody,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        ApiRequest {
            method,
            path: path.into(),
            query: Vec::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(Method::Post, path).with_body(RequestBody::Json(body))
    }

    pub fn put(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(Method::Put, path).with_body(RequestBody::Json(body))
    }

    pub fn patch(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(Method::Patch, path).with_body(RequestBody::Json(body))
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    pub fn with_body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Path plus percent-encoded query string, for logging and matching.
    pub fn target(&self) -> String {
        if self.query.is_empty() {
            return self.path.clone();
        }
        let qs: Vec<String> = self
            .query
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoded(k), urlencoded(v)))
            .collect();
        format!("{}?{}", self.path, qs.join("&"))
    }
}

/// Percent-encode a query component.
pub fn urlencoded(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            'A'..='Z' | 'a'..='z' | '0'..='9' | '-' | '_' | '.' | '~' => out.push(ch),
            ' ' => out.push_str("%20"),
            _ => {
                for byte in ch.to_string().as_bytes() {
                    out.push_str(&format!("%{:02X}", byte));
                }
            }
        }
    }
    out
}

/// Decode a percent-encoded query component (`+` decodes to a space).
pub fn urldecoded(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
                match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    Some(b) => {
                        out.push(b);
                        i += 2;
                    }
                    None => out.push(b'%'),
                }
            }
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// A response with any status code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    /// Header names are lowercased.
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn new(status: u16, body: Vec<u8>) -> Self {
        ApiResponse {
            status,
            headers: BTreeMap::new(),
            body,
        }
    }

    pub fn json(status: u16, value: &serde_json::Value) -> Self {
        let mut response = ApiResponse::new(status, value.to_string().into_bytes());
        response
            .headers
            .insert("content-type".to_string(), "application/json".to_string());
        response
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Parse the body as JSON. An empty body parses as `null`.
    pub fn body_json(&self) -> Result<serde_json::Value, TransportError> {
        if self.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(serde_json::Value::Null);
        }
        serde_json::from_slice(&self.body).map_err(|e| TransportError::InvalidResponse {
            message: format!("failed to parse response as JSON: {}", e),
        })
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// The server's error message: `message`, else `error`, from a JSON body.
    pub fn error_message(&self) -> Option<String> {
        let value: serde_json::Value = serde_json::from_slice(&self.body).ok()?;
        ["message", "error"].iter().find_map(|key| {
            value
                .get(*key)
                .and_then(|v| v.as_str())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        })
    }
}

/// Callback receiving `(bytes_sent, bytes_total)` while a body is sent.
pub type ProgressFn = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Shared cancellation flag for a transfer.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-request options for [`crate::ApiTransport::send_with`].
#[derive(Clone, Default)]
pub struct SendOptions {
    pub progress: Option<ProgressFn>,
    pub cancel: Option<CancelToken>,
}

impl fmt::Debug for SendOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendOptions")
            .field("progress", &self.progress.is_some())
            .field("cancel", &self.cancel)
            .finish()
    }
}

impl SendOptions {
    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn target_encodes_query() {
        let req = ApiRequest::get("/api/tasks")
            .with_query("search", "printer issue")
            .with_query("status", "pending");
        assert_eq!(req.target(), "/api/tasks?search=printer%20issue&status=pending");
    }

    #[test]
    fn urldecoded_reverses_urlencoded() {
        assert_eq!(urldecoded("printer%20issue"), "printer issue");
        assert_eq!(urldecoded("a+b"), "a b");
        assert_eq!(urldecoded(&urlencoded("José & co")), "José & co");
        assert_eq!(urldecoded("100%"), "100%");
    }

    #[test]
    fn multipart_encoding_layout() {
        let form = MultipartForm::new().file("file", "c.csv", "text/csv", b"name\nAcme\n".to_vec());
        let body = String::from_utf8(form.encode()).unwrap();
        assert!(body.starts_with("--fieldops-boundary-7d41c9e2\r\n"));
        assert!(body.contains("name=\"file\"; filename=\"c.csv\""));
        assert!(body.contains("Content-Type: text/csv\r\n\r\nname\nAcme\n\r\n"));
        assert!(body.ends_with("--fieldops-boundary-7d41c9e2--\r\n"));
    }

    #[test]
    fn error_message_prefers_message_then_error() {
        let r = ApiResponse::json(400, &json!({"message": "Title is required"}));
        assert_eq!(r.error_message().as_deref(), Some("Title is required"));
        let r = ApiResponse::json(500, &json!({"error": "boom"}));
        assert_eq!(r.error_message().as_deref(), Some("boom"));
        let r = ApiResponse::new(502, b"<html>bad gateway</html>".to_vec());
        assert_eq!(r.error_message(), None);
    }

    #[test]
    fn empty_body_is_null_json() {
        let r = ApiResponse::new(204, Vec::new());
        assert_eq!(r.body_json().unwrap(), serde_json::Value::Null);
    }

    #[test]
    fn cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
