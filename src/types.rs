use serde::{Deserialize, Serialize};

pub const MESSAGING_PRODUCT: &str = "whatsapp";

/// Number of body placeholders the media template declares. Each one is
/// filled with the submitted message text.
pub const MEDIA_TEMPLATE_BODY_SLOTS: usize = 5;

/// Body of `POST /{phone-number-id}/messages`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OutboundMessage {
    pub messaging_product: &'static str,
    pub recipient_type: &'static str,
    pub to: String,
    #[serde(flatten)]
    pub content: MessageContent,
}

impl OutboundMessage {
    pub fn new(to: impl Into<String>, content: MessageContent) -> Self {
        Self {
            messaging_product: MESSAGING_PRODUCT,
            recipient_type: "individual",
            to: to.into(),
            content,
        }
    }

    pub fn text(to: impl Into<String>, body: impl Into<String>) -> Self {
        Self::new(
            to,
            MessageContent::Text {
                text: TextBody {
                    body: body.into(),
                    preview_url: false,
                },
            },
        )
    }

    pub fn template(to: impl Into<String>, template: Template) -> Self {
        Self::new(to, MessageContent::Template { template })
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessageContent {
    Text { text: TextBody },
    Template { template: Template },
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TextBody {
    pub body: String,
    pub preview_url: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Template {
    pub name: String,
    pub language: Language,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<Component>,
}

impl Template {
    pub fn new(name: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            language: Language {
                code: language.into(),
            },
            components: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_component(mut self, component: Component) -> Self {
        self.components.push(component);
        self
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Language {
    pub code: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Component {
    #[serde(rename = "type")]
    pub kind: ComponentKind,
    pub parameters: Vec<Parameter>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ComponentKind {
    Header,
    Body,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Parameter {
    Text { text: String },
    Image { image: MediaRef },
    Video { video: MediaRef },
    Document { document: MediaRef },
}

impl Parameter {
    /// Header parameter referencing an uploaded media object, typed after
    /// the file's MIME type.
    pub fn media(id: impl Into<String>, mime_type: &str) -> Self {
        let media = MediaRef { id: id.into() };
        match mime_type.split('/').next().unwrap_or_default() {
            "image" => Self::Image { image: media },
            "video" => Self::Video { video: media },
            _ => Self::Document { document: media },
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MediaRef {
    pub id: String,
}

/// Successful reply to a media upload.
#[derive(Debug, Clone, Deserialize)]
pub struct MediaUploadResponse {
    pub id: String,
}

/// Error envelope returned by the Graph API on failure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GraphErrorEnvelope {
    #[serde(default)]
    pub error: Option<GraphError>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GraphError {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub fbtrace_id: Option<String>,
}
