// Chat history endpoint: GET /api/chat/history?page=&size=
// Returns one page of archived messages plus the authoritative page metadata.

use log::{debug, error};
use serde::Deserialize;

use super::{classify_reqwest_error, ApiError};

/// One page of chat history as the server serializes it.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryResponse {
    pub content: Vec<RawMessage>,
    pub page: PageInfo,
}

/// A single archived record, before it becomes a timeline message.
#[derive(Debug, Clone, Deserialize)]
pub struct RawMessage {
    /// Server-assigned identity. Older deployments omit it.
    #[serde(default)]
    pub id: Option<String>,
    /// "USER" or "ASSISTANT".
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    #[serde(rename = "createdAt")]
    pub created_at: String,
}

/// Spring-style page metadata. `total_pages` is the only authoritative
/// exhaustion signal; never infer end-of-data from a short page.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PageInfo {
    pub size: u32,
    pub number: u32,
    #[serde(rename = "totalElements")]
    pub total_elements: u64,
    #[serde(rename = "totalPages")]
    pub total_pages: u32,
}

impl super::RestBackend {
    pub(crate) async fn fetch_history_page(
        &self,
        page: u32,
        page_size: u32,
    ) -> Result<HistoryResponse, ApiError> {
        let token = self.bearer_token().await?;
        let url = self.endpoint("/api/chat/history");

        debug!("Requesting history page {} (size {})", page, page_size);

        let response = self
            .http
            .get(&url)
            .header("Authorization", token)
            .query(&[("page", page), ("size", page_size)])
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            error!("History request for page {} failed with HTTP {}", page, status);
            return Err(ApiError::Status(status.as_u16()));
        }

        let body: HistoryResponse = response
            .json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))?;

        debug!(
            "History page {} decoded: {} records, {}/{} pages",
            page,
            body.content.len(),
            body.page.number,
            body.page.total_pages
        );

        Ok(body)
    }
}
