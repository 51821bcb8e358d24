use bytes::Bytes;
use http::{header, Method, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, error, info, info_span, warn, Instrument};
use vercel_runtime::{Body, Error, Request, Response};

use crate::config::{RelayConfig, SendMode};
use crate::error::RelayError;
use crate::multipart::{boundary_from_content_type, FormData};
use crate::types::{
    Component, ComponentKind, OutboundMessage, Parameter, Template, MEDIA_TEMPLATE_BODY_SLOTS,
};
use crate::whatsapp::WhatsAppClient;

pub const TRACE_ID_HEADER: &str = "X-Trace-Id";

/// Inbound routes served by the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// `/api/sendmessage`: JSON body, text or template depending on config.
    SendMessage,
    /// `/api/send-message`: multipart body with an optional file.
    SendAttachment,
}

impl Route {
    pub fn path(self) -> &'static str {
        match self {
            Self::SendMessage => "/api/sendmessage",
            Self::SendAttachment => "/api/send-message",
        }
    }

    pub fn from_path(path: &str) -> Option<Self> {
        match path.trim_end_matches('/') {
            "/api/sendmessage" => Some(Self::SendMessage),
            "/api/send-message" => Some(Self::SendAttachment),
            _ => None,
        }
    }
}

/// Phone and message as submitted by the form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageInput {
    pub phone: Option<String>,
    pub message: Option<String>,
}

impl MessageInput {
    pub fn new(phone: Option<&str>, message: Option<&str>) -> Self {
        let clean = |v: Option<&str>| {
            v.map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        Self {
            phone: clean(phone),
            message: clean(message),
        }
    }

    /// Parse a JSON or urlencoded request body.
    pub fn parse(content_type: Option<&str>, body: &[u8]) -> Result<Self, RelayError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }

        let is_form = content_type
            .is_some_and(|ct| ct.contains("application/x-www-form-urlencoded"));
        if is_form {
            let text = std::str::from_utf8(body)
                .map_err(|_| RelayError::validation("Invalid request body"))?;
            let pairs = parse_urlencoded(text);
            let get = |key: &str| {
                pairs
                    .iter()
                    .rev()
                    .find(|(k, _)| k == key)
                    .map(|(_, v)| v.as_str())
            };
            return Ok(Self::new(get("phone"), get("message")));
        }

        let value: Value = serde_json::from_slice(body).map_err(|e| {
            warn!("Failed to parse JSON body: {}", e);
            RelayError::validation("Invalid request body")
        })?;
        let field = |key: &str| match value.get(key) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        let (phone, message) = (field("phone"), field("message"));
        Ok(Self::new(phone.as_deref(), message.as_deref()))
    }
}

fn parse_urlencoded(text: &str) -> Vec<(String, String)> {
    text.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let decode = |s: &str| {
                let spaced = s.replace('+', " ");
                urlencoding::decode(&spaced)
                    .map(|d| d.into_owned())
                    .unwrap_or(spaced)
            };
            (decode(key), decode(value))
        })
        .collect()
}

/// Shared state for every request: injected configuration plus the
/// provider client.
#[derive(Debug, Clone)]
pub struct Relay {
    config: RelayConfig,
    client: WhatsAppClient,
}

impl Relay {
    pub fn new(config: RelayConfig) -> Result<Self, RelayError> {
        let client = WhatsAppClient::new(&config)?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Serve one HTTP request on `route`.
    ///
    /// Relay failures become JSON error responses; only a failure to build
    /// the response itself is returned as `Err`.
    pub async fn handle(&self, route: Route, req: Request) -> Result<Response<Body>, Error> {
        let trace_id = uuid::Uuid::new_v4().to_string();
        let span = info_span!("relay", route = route.path(), trace_id = %trace_id);

        async move {
            info!("Processing {} request for path: {}", req.method(), req.uri().path());

            if req.method() == Method::OPTIONS {
                return build_response(StatusCode::NO_CONTENT, None, &trace_id);
            }
            if req.method() != Method::POST {
                warn!("Rejecting method {}", req.method());
                return build_response(
                    StatusCode::METHOD_NOT_ALLOWED,
                    Some(json!({ "error": "Method not allowed" })),
                    &trace_id,
                );
            }

            let result = match route {
                Route::SendMessage => self.handle_send_message(req).await,
                Route::SendAttachment => self.handle_send_attachment(req).await,
            };

            match result {
                Ok(data) => {
                    info!("Request completed successfully");
                    build_response(
                        StatusCode::OK,
                        Some(json!({ "success": true, "data": data })),
                        &trace_id,
                    )
                }
                Err(e) => {
                    let status = e.status();
                    if status.is_server_error() {
                        error!("Request failed: {}", e);
                    } else {
                        warn!("Request rejected: {}", e);
                    }
                    build_response(status, Some(e.to_json()), &trace_id)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn handle_send_message(&self, req: Request) -> Result<Value, RelayError> {
        let content_type = header_value(&req, header::CONTENT_TYPE);
        let body = read_body(req);
        let input = MessageInput::parse(content_type.as_deref(), &body)?;
        debug!("Parsed request data: {:?}", input);

        match self.config.send_mode {
            SendMode::Template => self.send_template(&input).await,
            SendMode::Text => self.send_text(&input).await,
        }
    }

    async fn handle_send_attachment(&self, req: Request) -> Result<Value, RelayError> {
        let content_type = header_value(&req, header::CONTENT_TYPE).unwrap_or_default();
        let boundary = boundary_from_content_type(&content_type)?;
        let body = read_body(req);
        let form = FormData::decode(&body, &boundary);
        self.send_with_attachment(&form).await
    }

    /// Send `message` as free text to `phone`.
    pub async fn send_text(&self, input: &MessageInput) -> Result<Value, RelayError> {
        let (Some(phone), Some(message)) = (&input.phone, &input.message) else {
            return Err(RelayError::validation("Phone and message are required"));
        };
        let credentials = self.config.credentials()?;

        info!("Sending text message to: {}", phone);
        let outbound = OutboundMessage::text(phone, message);
        self.client.send_message(credentials, &outbound).await
    }

    /// Send the greeting template to `phone`; any message text is ignored.
    pub async fn send_template(&self, input: &MessageInput) -> Result<Value, RelayError> {
        let Some(phone) = &input.phone else {
            return Err(RelayError::validation("Phone is required"));
        };
        let credentials = self.config.credentials()?;

        info!(
            "Sending template {} to: {}",
            self.config.greeting_template, phone
        );
        let template = Template::new(
            &self.config.greeting_template,
            &self.config.template_language,
        );
        let outbound = OutboundMessage::template(phone, template);
        self.client.send_message(credentials, &outbound).await
    }

    /// Upload the form's file, if any, then send the media template.
    ///
    /// A failed upload ends the request before the message is sent.
    pub async fn send_with_attachment(&self, form: &FormData) -> Result<Value, RelayError> {
        let (Some(phone), Some(message)) = (form.field("phone"), form.field("message")) else {
            return Err(RelayError::validation("Phone and message are required"));
        };
        let credentials = self.config.credentials()?;

        let mut template = Template::new(&self.config.media_template, &self.config.template_language);

        if let Some(attachment) = &form.attachment {
            let media_id = self.client.upload_media(credentials, attachment).await?;
            template = template.with_component(Component {
                kind: ComponentKind::Header,
                parameters: vec![Parameter::media(media_id, &attachment.content_type)],
            });
        } else {
            debug!("No attachment in form, sending template without header");
        }

        let text = Parameter::Text {
            text: message.to_string(),
        };
        template = template.with_component(Component {
            kind: ComponentKind::Body,
            parameters: vec![text; MEDIA_TEMPLATE_BODY_SLOTS],
        });

        info!("Sending template {} to: {}", self.config.media_template, phone);
        let outbound = OutboundMessage::template(phone, template);
        self.client.send_message(credentials, &outbound).await
    }
}

fn header_value(req: &Request, name: header::HeaderName) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn read_body(req: Request) -> Bytes {
    match req.into_body() {
        Body::Binary(bytes) => {
            debug!("Received binary body with {} bytes", bytes.len());
            Bytes::from(bytes)
        }
        Body::Text(text) => {
            debug!("Received text body with {} characters", text.len());
            Bytes::from(text)
        }
        Body::Empty => {
            debug!("Received empty body");
            Bytes::new()
        }
    }
}

fn build_response(
    status: StatusCode,
    payload: Option<Value>,
    trace_id: &str,
) -> Result<Response<Body>, Error> {
    let mut builder = Response::builder()
        .status(status)
        .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")
        .header(header::ACCESS_CONTROL_ALLOW_METHODS, "POST, OPTIONS")
        .header(header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type, Authorization")
        .header(TRACE_ID_HEADER, trace_id);

    let body = match payload {
        Some(value) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::Text(serde_json::to_string(&value)?)
        }
        None => Body::Empty,
    };

    Ok(builder.body(body)?)
}
