use reqwest::{multipart, Client, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error, info, instrument};

use crate::config::{Credentials, RelayConfig};
use crate::error::RelayError;
use crate::multipart::Attachment;
use crate::types::{GraphErrorEnvelope, MediaUploadResponse, OutboundMessage, MESSAGING_PRODUCT};

/// Outcome of one Graph API call: the decoded success payload, or the
/// provider's structured error.
#[derive(Debug)]
pub enum GraphOutcome<T> {
    Success(T),
    Failure {
        status: StatusCode,
        envelope: GraphErrorEnvelope,
    },
}

impl<T> GraphOutcome<T> {
    /// Convert into a relay result, using `fallback` when the provider gave
    /// no error message.
    pub fn into_result(self, fallback: &str) -> Result<T, RelayError> {
        match self {
            Self::Success(value) => Ok(value),
            Self::Failure { status, envelope } => Err(RelayError::Provider {
                status: status.as_u16(),
                message: envelope
                    .error
                    .and_then(|e| e.message)
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| fallback.to_string()),
            }),
        }
    }
}

/// Client for the WhatsApp Cloud API.
#[derive(Debug, Clone)]
pub struct WhatsAppClient {
    client: Client,
    base_url: String,
    api_version: String,
}

impl WhatsAppClient {
    pub fn new(config: &RelayConfig) -> Result<Self, RelayError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self::with_client(config, client))
    }

    pub fn with_client(config: &RelayConfig, client: Client) -> Self {
        Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            api_version: config.api_version.clone(),
        }
    }

    fn endpoint(&self, credentials: &Credentials, resource: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.base_url, self.api_version, credentials.phone_number_id, resource
        )
    }

    /// Upload a file and return the provider's media id.
    #[instrument(skip(self, credentials, attachment), fields(filename = %attachment.filename, size = attachment.data.len()))]
    pub async fn upload_media(
        &self,
        credentials: &Credentials,
        attachment: &Attachment,
    ) -> Result<String, RelayError> {
        let url = self.endpoint(credentials, "media");
        info!("Uploading media ({})", attachment.content_type);

        let file_name = if attachment.filename.is_empty() {
            "upload".to_string()
        } else {
            attachment.filename.clone()
        };
        let part = multipart::Part::bytes(attachment.data.to_vec())
            .file_name(file_name)
            .mime_str(&attachment.content_type)
            .map_err(|e| {
                RelayError::validation(format!(
                    "Invalid file content type {:?}: {e}",
                    attachment.content_type
                ))
            })?;
        let form = multipart::Form::new()
            .part("file", part)
            .text("type", attachment.content_type.clone())
            .text("messaging_product", MESSAGING_PRODUCT);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&credentials.access_token)
            .multipart(form)
            .send()
            .await?;

        let uploaded = interpret::<MediaUploadResponse>(response)
            .await?
            .into_result("Failed to upload media")
            .inspect_err(|e| error!("Media upload failed: {}", e))?;

        info!("Media uploaded with id {}", uploaded.id);
        Ok(uploaded.id)
    }

    /// Send a message and return the provider's JSON reply.
    #[instrument(skip(self, credentials, message), fields(to = %message.to))]
    pub async fn send_message(
        &self,
        credentials: &Credentials,
        message: &OutboundMessage,
    ) -> Result<Value, RelayError> {
        let url = self.endpoint(credentials, "messages");
        debug!("Message payload: {}", serde_json::to_string(message)?);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&credentials.access_token)
            .json(message)
            .send()
            .await?;

        let data = interpret::<Value>(response)
            .await?
            .into_result("Failed to send message")
            .inspect_err(|e| error!("Message send failed: {}", e))?;

        info!("Message accepted by provider");
        Ok(data)
    }
}

/// Read a Graph API response into a [`GraphOutcome`].
///
/// An error body that is not JSON still yields a `Failure` with an empty
/// envelope; a success body that does not decode is unexpected.
async fn interpret<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<GraphOutcome<T>, RelayError> {
    let status = response.status();
    let body = response.bytes().await?;
    debug!("Provider replied {} ({} bytes)", status, body.len());

    if status.is_success() {
        let value = serde_json::from_slice::<T>(&body).map_err(|e| {
            RelayError::Unexpected(format!("Invalid response from provider: {e}"))
        })?;
        Ok(GraphOutcome::Success(value))
    } else {
        let envelope = serde_json::from_slice::<GraphErrorEnvelope>(&body).unwrap_or_default();
        Ok(GraphOutcome::Failure { status, envelope })
    }
}

#[cfg(test)]
mod tests {
    use crate::types::GraphError;

    use super::*;

    fn failure(message: Option<&str>) -> GraphOutcome<Value> {
        GraphOutcome::Failure {
            status: StatusCode::BAD_REQUEST,
            envelope: GraphErrorEnvelope {
                error: Some(GraphError {
                    message: message.map(str::to_string),
                    ..GraphError::default()
                }),
            },
        }
    }

    #[test]
    fn endpoint_is_versioned_per_phone_number() {
        let config = RelayConfig::default().with_api_base_url("http://localhost:9000/");
        let client = WhatsAppClient::new(&config).unwrap();
        let creds = Credentials::new("token", "1055");
        assert_eq!(
            client.endpoint(&creds, "messages"),
            "http://localhost:9000/v17.0/1055/messages"
        );
    }

    #[test]
    fn failure_uses_provider_message() {
        let err = failure(Some("Invalid parameter"))
            .into_result("Failed to send message")
            .unwrap_err();
        assert!(matches!(
            err,
            RelayError::Provider { status: 400, ref message } if message == "Invalid parameter"
        ));
    }

    #[test]
    fn failure_without_message_uses_fallback() {
        let err = failure(None).into_result("Failed to send message").unwrap_err();
        assert_eq!(err.to_string(), "Failed to send message");

        let bare: GraphOutcome<Value> = GraphOutcome::Failure {
            status: StatusCode::BAD_GATEWAY,
            envelope: GraphErrorEnvelope::default(),
        };
        assert_eq!(
            bare.into_result("Failed to upload media").unwrap_err().to_string(),
            "Failed to upload media"
        );
    }

    #[test]
    fn success_passes_payload_through() {
        let ok = GraphOutcome::Success(serde_json::json!({ "messages": [] }));
        assert_eq!(ok.into_result("unused").unwrap()["messages"], serde_json::json!([]));
    }
}
