use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::settings::SettingsStore;

/// Content handed to the shell by another application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SharePayload {
    Image { uri: String },
    Text { content: String },
    MultipleImages { uris: Vec<String> },
}

impl SharePayload {
    /// Key of the prefilled message configured for this kind of content.
    /// Multiple images share the single-image message.
    pub fn prefill_key(&self) -> &'static str {
        match self {
            SharePayload::Image { .. } | SharePayload::MultipleImages { .. } => "image",
            SharePayload::Text { .. } => "text",
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SharePayload::Image { .. } => "image",
            SharePayload::Text { .. } => "text",
            SharePayload::MultipleImages { .. } => "multiple_images",
        }
    }
}

/// The message delivered to the page's `handleSharedContent`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShareMessage {
    #[serde(flatten)]
    pub payload: SharePayload,
    pub model: String,
    #[serde(rename = "prefilledMessage")]
    pub prefilled_message: String,
}

impl ShareMessage {
    /// Attaches the model and prefilled message configured at delivery time.
    pub fn resolve(payload: SharePayload, settings: &dyn SettingsStore) -> Self {
        let prefilled_message = settings.prefilled_message(payload.prefill_key());
        Self {
            model: settings.selected_model(),
            prefilled_message,
            payload,
        }
    }

    pub fn to_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShareAction {
    Send,
    SendMultiple,
}

/// A raw share intent as reported by the platform layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingShare {
    pub action: ShareAction,
    pub mime_type: Option<String>,
    pub text: Option<String>,
    #[serde(default)]
    pub uris: Vec<String>,
}

impl IncomingShare {
    /// Maps the intent onto one payload, or `None` for shapes the shell does not accept.
    pub fn into_payload(self) -> Option<SharePayload> {
        let mime = self.mime_type.as_deref().unwrap_or_default();
        let payload = match self.action {
            ShareAction::Send if mime.starts_with("image/") => self
                .uris
                .into_iter()
                .next()
                .map(|uri| SharePayload::Image { uri }),
            ShareAction::Send if mime == "text/plain" => {
                self.text.map(|content| SharePayload::Text { content })
            }
            ShareAction::Send => None,
            ShareAction::SendMultiple if self.uris.is_empty() => None,
            ShareAction::SendMultiple => Some(SharePayload::MultipleImages { uris: self.uris }),
        };

        match &payload {
            Some(p) => debug!("Received {} share", p.kind()),
            None => warn!("Ignoring unsupported share ({:?}, {:?})", self.action, mime),
        }
        payload
    }
}
