//! Outbound email. Send failures are non-fatal for most flows; callers that
//! care (password reset) handle them explicitly.

use async_trait::async_trait;

use crate::config::EmailConfig;
use crate::error::AppError;

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, text: &str) -> Result<(), AppError>;
}

/// Posts messages to an HTTP mail API (Mailgun-style JSON endpoint).
pub struct HttpMailer {
    client: reqwest::Client,
    endpoint: String,
    api_token: Option<String>,
    from: String,
}

impl HttpMailer {
    pub fn new(config: &EmailConfig, endpoint: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            api_token: config.api_token.clone(),
            from: format!("{} <{}>", config.from_name, config.from_email),
        }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, to: &str, subject: &str, text: &str) -> Result<(), AppError> {
        let mut request = self.client.post(&self.endpoint).json(&serde_json::json!({
            "from": self.from,
            "to": to,
            "subject": subject,
            "text": text,
        }));
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("mail request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Internal(format!(
                "mail API returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Logs instead of sending. Used when email is unconfigured and in tests.
pub struct NoopMailer;

#[async_trait]
impl Mailer for NoopMailer {
    async fn send(&self, to: &str, subject: &str, _text: &str) -> Result<(), AppError> {
        tracing::info!("email disabled; would send {:?} to {}", subject, to);
        Ok(())
    }
}

/// Pick the mailer implied by the config.
pub fn build_mailer(config: &EmailConfig) -> std::sync::Arc<dyn Mailer> {
    match &config.endpoint {
        Some(endpoint) => std::sync::Arc::new(HttpMailer::new(config, endpoint.clone())),
        None => std::sync::Arc::new(NoopMailer),
    }
}
