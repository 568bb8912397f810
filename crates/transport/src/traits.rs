use async_trait::async_trait;

use crate::error::TransportError;
use crate::request::{ApiRequest, ApiResponse, SendOptions};

/// The transport seam between the resource client and the API.
///
/// An implementation sends one request and returns the response with
/// whatever status the server chose. Status classification (401, 404,
/// validation messages) belongs to the caller; a `TransportError` means no
/// usable response arrived at all.
///
/// ## Progress and cancellation
///
/// [`send_with`](ApiTransport::send_with) reports body bytes handed to the
/// network through `SendOptions::progress` and stops the transfer once
/// `SendOptions::cancel` is set, failing with
/// [`TransportError::Cancelled`]. Dropping the returned future must also
/// stop the transfer.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` so one transport can be
/// shared behind an `Arc` by every resource client and poller.
#[async_trait]
pub trait ApiTransport: Send + Sync + 'static {
    /// Send a request without progress reporting.
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        self.send_with(request, SendOptions::default()).await
    }

    /// Send a request with progress reporting and cancellation.
    async fn send_with(
        &self,
        request: ApiRequest,
        options: SendOptions,
    ) -> Result<ApiResponse, TransportError>;

    /// Short identifier for log fields ("http", "memory").
    fn transport_id(&self) -> &str;
}
