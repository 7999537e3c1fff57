use serde::Deserialize;

use crate::state::{Attachment, Call, Message};

/// Failure taxonomy for the REST surface.
///
/// `Network` is transient and user-retryable; `Validation` is blocked before
/// send; `Conflict` covers held locks and duplicate toggles; `Auth` means the
/// session expired (host redirects to sign-in); `NotFound` maps to a tombstone
/// or explicit not-found state.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("session expired")]
    Auth,
    #[error("not found")]
    NotFound,
}

impl ApiError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiError::Network(_))
    }
}

fn classify_status(status: reqwest::StatusCode, body: String) -> ApiError {
    match status.as_u16() {
        400 | 413 | 422 => ApiError::Validation(body),
        401 | 403 => ApiError::Auth,
        404 => ApiError::NotFound,
        409 | 423 => ApiError::Conflict(body),
        _ => ApiError::Network(format!("status {status}: {body}")),
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct ConversationSnapshot {
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub calls: Vec<Call>,
    #[serde(default)]
    pub cleared_at: Option<i64>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct LockStatus {
    pub locked: bool,
    #[serde(default)]
    pub access_granted: bool,
}

#[derive(Clone, Debug, Deserialize)]
pub struct UnlockResponse {
    pub access_granted: bool,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ClearResponse {
    pub cleared_at: i64,
}

/// Server-side payment lock record for one appointment. Absent owner means
/// the lock is free; the lock self-expires, there is no explicit release.
#[derive(Clone, Debug, Deserialize)]
pub struct PaymentLockStatus {
    #[serde(default)]
    pub owner_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<i64>,
}

#[derive(Clone, Debug)]
pub struct NewMessage {
    pub body: String,
    pub attachments: Vec<Attachment>,
    pub reply_to: Option<String>,
    pub timestamp: i64,
}

/// Thin client over the booking backend's REST surface. Every call is issued
/// from a spawned task on the core runtime; results come back to the actor as
/// internal events, never by blocking the loop.
#[derive(Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
}

impl RestClient {
    pub fn new(base_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn check(resp: Result<reqwest::Response, reqwest::Error>) -> Result<reqwest::Response, ApiError> {
        let resp = resp.map_err(|e| ApiError::Network(e.to_string()))?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(classify_status(status, body))
    }

    async fn json<T: serde::de::DeserializeOwned>(
        resp: Result<reqwest::Response, reqwest::Error>,
    ) -> Result<T, ApiError> {
        Self::check(resp)
            .await?
            .json::<T>()
            .await
            .map_err(|e| ApiError::Network(format!("bad response body: {e}")))
    }

    async fn ok(resp: Result<reqwest::Response, reqwest::Error>) -> Result<(), ApiError> {
        Self::check(resp).await.map(|_| ())
    }

    pub async fn fetch_conversation(&self, id: &str) -> Result<ConversationSnapshot, ApiError> {
        let url = self.url(&format!("/conversations/{id}"));
        Self::json(self.http.get(&url).send().await).await
    }

    pub async fn create_message(
        &self,
        conversation_id: &str,
        new: &NewMessage,
    ) -> Result<Message, ApiError> {
        let url = self.url(&format!("/conversations/{conversation_id}/messages"));
        let body = serde_json::json!({
            "body": new.body,
            "attachments": new.attachments,
            "reply_to": new.reply_to,
            "timestamp": new.timestamp,
        });
        Self::json(self.http.post(&url).json(&body).send().await).await
    }

    pub async fn edit_message(
        &self,
        conversation_id: &str,
        message_id: &str,
        body: &str,
    ) -> Result<Message, ApiError> {
        let url = self.url(&format!(
            "/conversations/{conversation_id}/messages/{message_id}"
        ));
        let payload = serde_json::json!({ "body": body });
        Self::json(self.http.patch(&url).json(&payload).send().await)
            .await
    }

    /// Delete-for-everyone over an explicit id list. Atomic on the wire; the
    /// server answers with the updated canonical message list.
    pub async fn delete_for_everyone(
        &self,
        conversation_id: &str,
        message_ids: &[String],
    ) -> Result<Vec<Message>, ApiError> {
        let url = self.url(&format!("/conversations/{conversation_id}/messages/delete"));
        let payload = serde_json::json!({ "message_ids": message_ids });
        Self::json(self.http.post(&url).json(&payload).send().await)
            .await
    }

    pub async fn delete_for_me(
        &self,
        conversation_id: &str,
        message_id: &str,
    ) -> Result<(), ApiError> {
        let url = self.url(&format!(
            "/conversations/{conversation_id}/messages/{message_id}/remove"
        ));
        Self::ok(self.http.post(&url).send().await).await
    }

    pub async fn mark_read(
        &self,
        conversation_id: &str,
        message_ids: &[String],
    ) -> Result<(), ApiError> {
        let url = self.url(&format!("/conversations/{conversation_id}/read"));
        let payload = serde_json::json!({ "message_ids": message_ids });
        Self::ok(self.http.post(&url).json(&payload).send().await).await
    }

    pub async fn set_starred(
        &self,
        conversation_id: &str,
        message_id: &str,
        starred: bool,
    ) -> Result<(), ApiError> {
        let url = self.url(&format!(
            "/conversations/{conversation_id}/messages/{message_id}/star"
        ));
        let payload = serde_json::json!({ "starred": starred });
        Self::ok(self.http.post(&url).json(&payload).send().await).await
    }

    pub async fn toggle_reaction(
        &self,
        conversation_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<Message, ApiError> {
        let url = self.url(&format!(
            "/conversations/{conversation_id}/messages/{message_id}/react"
        ));
        let payload = serde_json::json!({ "emoji": emoji });
        Self::json(self.http.post(&url).json(&payload).send().await)
            .await
    }

    pub async fn pin_message(
        &self,
        conversation_id: &str,
        message_id: &str,
        duration_hours: u32,
    ) -> Result<Message, ApiError> {
        let url = self.url(&format!(
            "/conversations/{conversation_id}/messages/{message_id}/pin"
        ));
        let payload = serde_json::json!({ "duration_hours": duration_hours });
        Self::json(self.http.post(&url).json(&payload).send().await)
            .await
    }

    pub async fn unpin_message(
        &self,
        conversation_id: &str,
        message_id: &str,
    ) -> Result<Message, ApiError> {
        let url = self.url(&format!(
            "/conversations/{conversation_id}/messages/{message_id}/unpin"
        ));
        Self::json(self.http.post(&url).send().await).await
    }

    pub async fn clear_conversation(&self, conversation_id: &str) -> Result<ClearResponse, ApiError> {
        let url = self.url(&format!("/conversations/{conversation_id}/clear"));
        Self::json(self.http.post(&url).send().await).await
    }

    pub async fn fetch_lock_status(&self, conversation_id: &str) -> Result<LockStatus, ApiError> {
        let url = self.url(&format!("/conversations/{conversation_id}/lock"));
        Self::json(self.http.get(&url).send().await).await
    }

    /// `password_digest` is the sha256 hex of the entered password; the plain
    /// text never leaves the process.
    pub async fn unlock_conversation(
        &self,
        conversation_id: &str,
        password_digest: &str,
    ) -> Result<UnlockResponse, ApiError> {
        let url = self.url(&format!("/conversations/{conversation_id}/unlock"));
        let payload = serde_json::json!({ "password": password_digest });
        Self::json(self.http.post(&url).json(&payload).send().await)
            .await
    }

    /// Best-effort server-side reset of the session access grant on close.
    pub async fn reset_access(&self, conversation_id: &str) -> Result<(), ApiError> {
        let url = self.url(&format!("/conversations/{conversation_id}/lock/reset"));
        Self::ok(self.http.post(&url).send().await).await
    }

    /// Destructive forgot-password path: clears the lock and wipes history.
    pub async fn forgot_lock_password(&self, conversation_id: &str) -> Result<(), ApiError> {
        let url = self.url(&format!("/conversations/{conversation_id}/lock/forgot"));
        Self::ok(self.http.post(&url).send().await).await
    }

    pub async fn payment_lock_status(
        &self,
        appointment_id: &str,
    ) -> Result<PaymentLockStatus, ApiError> {
        let url = self.url(&format!("/appointments/{appointment_id}/payment-lock"));
        Self::json(self.http.get(&url).send().await).await
    }

    /// Idempotent initialize: re-initializing with the same owner extends the
    /// TTL; initializing over a live foreign owner answers 409.
    pub async fn payment_lock_initialize(
        &self,
        appointment_id: &str,
        owner_token: &str,
        ttl_ms: i64,
    ) -> Result<PaymentLockStatus, ApiError> {
        let url = self.url(&format!(
            "/appointments/{appointment_id}/payment-lock/initialize"
        ));
        let payload = serde_json::json!({ "owner_token": owner_token, "ttl_ms": ttl_ms });
        Self::json(self.http.post(&url).json(&payload).send().await)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_onto_the_taxonomy() {
        use reqwest::StatusCode;
        assert_eq!(
            classify_status(StatusCode::UNPROCESSABLE_ENTITY, "empty body".into()),
            ApiError::Validation("empty body".into())
        );
        assert_eq!(classify_status(StatusCode::UNAUTHORIZED, String::new()), ApiError::Auth);
        assert_eq!(classify_status(StatusCode::NOT_FOUND, String::new()), ApiError::NotFound);
        assert_eq!(
            classify_status(StatusCode::CONFLICT, "lock held".into()),
            ApiError::Conflict("lock held".into())
        );
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, String::new()),
            ApiError::Network(_)
        ));
    }

    #[test]
    fn only_network_errors_are_retryable() {
        assert!(ApiError::Network("timeout".into()).is_retryable());
        assert!(!ApiError::Conflict("held".into()).is_retryable());
        assert!(!ApiError::Auth.is_retryable());
    }

    #[test]
    fn base_url_trailing_slash_is_normalized() {
        let client = RestClient::new("https://api.example.test/".into());
        assert_eq!(
            client.url("/conversations/c1"),
            "https://api.example.test/conversations/c1"
        );
    }
}
