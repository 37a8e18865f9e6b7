use serde::Deserialize;

use crate::error::Result;
use crate::share::ShareMessage;

/// Host to page messages. Their only observable effect is on page-side globals.
#[derive(Debug, Clone, PartialEq)]
pub enum PageCommand {
    /// Installs the page shim: `handleMicrophoneAccess`, the `getUserMedia`
    /// hook and error forwarding.
    InstallBridge,
    MicrophoneGranted,
    MicrophoneDenied { error: String },
    SharedContent(ShareMessage),
}

/// Page to host messages, sent through the exposed bridge object.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PageEvent {
    RequestMicrophonePermission,
    Log { message: String },
}

impl PageEvent {
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}
