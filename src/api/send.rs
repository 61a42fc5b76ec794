// Chat send endpoint: POST /api/chat
// The request carries the raw user text; the reply body is the
// assistant's answer as plain text.

use log::{debug, error};
use serde::Serialize;

use super::{classify_reqwest_error, ApiError};

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    message: &'a str,
}

impl super::RestBackend {
    pub(crate) async fn post_chat_message(&self, text: &str) -> Result<String, ApiError> {
        let token = self.bearer_token().await?;
        let url = self.endpoint("/api/chat");

        debug!("Sending chat message ({} chars)", text.len());

        let response = self
            .http
            .post(&url)
            .header("Authorization", token)
            .json(&SendRequest { message: text })
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            error!("Chat send failed with HTTP {}", status);
            return Err(ApiError::Status(status.as_u16()));
        }

        let reply = response
            .text()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))?;

        debug!("Chat send succeeded, reply is {} chars", reply.len());
        Ok(reply)
    }
}
