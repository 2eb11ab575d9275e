//! `reqwest` implementation of the companion endpoints

use super::{ApiError, ByteStream, CompanionApi};
use crate::config::ClientConfig;
use crate::protocol::{ActiveConversation, ClearResponse, SendRequest};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::ACCEPT;
use reqwest::{Client, Response};

const SEND_PATH: &str = "/api/chat/send";
const CLEAR_PATH: &str = "/api/chat/clear";
const ACTIVE_PATH: &str = "/api/chat/active";

/// HTTP client for the companion service
pub struct HttpCompanionApi {
    client: Client,
    base_url: String,
    access_token: String,
}

impl HttpCompanionApi {
    pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
        // No total timeout: a send stream stays open for as long as the reply takes.
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| ApiError::network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            access_token: config.access_token.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn check_status(response: Response) -> Result<Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::from_status(status.as_u16(), &body))
    }
}

#[async_trait]
impl CompanionApi for HttpCompanionApi {
    async fn open_stream(&self, request: &SendRequest) -> Result<ByteStream, ApiError> {
        let response = self
            .client
            .post(self.endpoint(SEND_PATH))
            .bearer_auth(&self.access_token)
            .header(ACCEPT, "text/event-stream")
            .json(request)
            .send()
            .await?;
        let response = Self::check_status(response).await?;

        Ok(response
            .bytes_stream()
            .map(|fragment| fragment.map(|bytes| bytes.to_vec()).map_err(ApiError::from))
            .boxed())
    }

    async fn clear_conversation(&self) -> Result<ClearResponse, ApiError> {
        let response = self
            .client
            .delete(self.endpoint(CLEAR_PATH))
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        let response = Self::check_status(response).await?;
        Ok(response.json::<ClearResponse>().await?)
    }

    async fn active_conversation(&self) -> Result<ActiveConversation, ApiError> {
        let response = self
            .client
            .get(self.endpoint(ACTIVE_PATH))
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        let response = Self::check_status(response).await?;
        Ok(response.json::<ActiveConversation>().await?)
    }
}
