//! Companion service collaborator
//!
//! The runtime talks to the service only through [`CompanionApi`], so tests
//! can script streams and clear responses without a network.

mod error;
mod http;

pub use error::{ApiError, ApiErrorKind};
pub use http::HttpCompanionApi;

use crate::protocol::{ActiveConversation, ClearResponse, SendRequest};
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::Arc;
use std::time::Instant;

/// Raw response body of a send exchange, fragment by fragment
pub type ByteStream = BoxStream<'static, Result<Vec<u8>, ApiError>>;

/// Endpoints of the companion chat service
#[async_trait]
pub trait CompanionApi: Send + Sync {
    /// Start a send exchange and return the event stream body
    async fn open_stream(&self, request: &SendRequest) -> Result<ByteStream, ApiError>;

    /// Ask the service to drop the current conversation
    async fn clear_conversation(&self) -> Result<ClearResponse, ApiError>;

    /// Look up the conversation the user left ongoing, if any
    async fn active_conversation(&self) -> Result<ActiveConversation, ApiError>;
}

#[async_trait]
impl<T: CompanionApi + ?Sized> CompanionApi for Arc<T> {
    async fn open_stream(&self, request: &SendRequest) -> Result<ByteStream, ApiError> {
        (**self).open_stream(request).await
    }

    async fn clear_conversation(&self) -> Result<ClearResponse, ApiError> {
        (**self).clear_conversation().await
    }

    async fn active_conversation(&self) -> Result<ActiveConversation, ApiError> {
        (**self).active_conversation().await
    }
}

/// Logging wrapper for a companion API
pub struct LoggingApi<A> {
    inner: A,
}

impl<A: CompanionApi> LoggingApi<A> {
    pub fn new(inner: A) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<A: CompanionApi> CompanionApi for LoggingApi<A> {
    async fn open_stream(&self, request: &SendRequest) -> Result<ByteStream, ApiError> {
        let start = Instant::now();
        let result = self.inner.open_stream(request).await;
        match &result {
            Ok(_) => tracing::info!(
                conversation_id = ?request.conversation_id,
                chars = request.message.chars().count(),
                duration_ms = %start.elapsed().as_millis(),
                "Send stream opened"
            ),
            Err(e) => tracing::warn!(
                conversation_id = ?request.conversation_id,
                duration_ms = %start.elapsed().as_millis(),
                error = %e.message,
                retryable = e.kind.is_retryable(),
                "Send stream failed to open"
            ),
        }
        result
    }

    async fn clear_conversation(&self) -> Result<ClearResponse, ApiError> {
        let start = Instant::now();
        let result = self.inner.clear_conversation().await;
        match &result {
            Ok(response) => tracing::info!(
                success = response.success,
                farewell = response.farewell().is_some(),
                duration_ms = %start.elapsed().as_millis(),
                "Clear request completed"
            ),
            Err(e) => tracing::warn!(
                duration_ms = %start.elapsed().as_millis(),
                error = %e.message,
                "Clear request failed"
            ),
        }
        result
    }

    async fn active_conversation(&self) -> Result<ActiveConversation, ApiError> {
        let result = self.inner.active_conversation().await;
        match &result {
            Ok(active) => tracing::debug!(
                conversation_id = ?active.conversation_id,
                round_count = active.round_count,
                "Active conversation looked up"
            ),
            Err(e) => tracing::warn!(error = %e.message, "Active conversation lookup failed"),
        }
        result
    }
}
