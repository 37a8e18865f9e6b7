use serde::{Deserialize, Serialize};

/// Which share intent delivered the content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SharedAction {
    /// `ACTION_SEND`: one text or one image.
    Send,
    /// `ACTION_SEND_MULTIPLE`: several images.
    SendMultiple,
}

/// A share intent captured by the activity before the shell picked it up.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedIntent {
    pub action: SharedAction,
    pub mime_type: Option<String>,
    /// `EXTRA_TEXT`, present for text shares.
    pub text: Option<String>,
    /// `EXTRA_STREAM` content URIs, in the order the sender listed them.
    #[serde(default)]
    pub uris: Vec<String>,
    /// Milliseconds since epoch when the intent arrived.
    pub received_at: i64,
}

/// Response from the getPendingShare command.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingShareResponse {
    /// Intents in arrival order
    #[serde(default)]
    pub shares: Vec<SharedIntent>,
    pub has_pending: bool,
}
