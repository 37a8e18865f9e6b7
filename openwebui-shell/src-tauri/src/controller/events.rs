use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::bridge::{PageCommand, PageEvent};
use crate::downloads::{DownloadRequest, DownloadTicket};
use crate::gesture::TouchEvent;
use crate::media::{Capability, RequestId};
use crate::share::SharePayload;

/// Resources a page can ask for through the web permission API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebResource {
    AudioCapture,
    VideoCapture,
    Other(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileChooserRequest {
    pub request_id: RequestId,
    pub capture: bool,
}

/// Inputs of the bridge controller. Everything the host observes arrives here.
#[derive(Debug, Clone, PartialEq)]
pub enum ShellEvent {
    /// Cold start: load the configured server and ask for the microphone.
    Start,
    /// A view intent or deep link.
    OpenUrl { url: String },

    // Page lifecycle
    PageLoadStarted { url: String },
    PageLoadFinished { url: String },
    PageLoadFailed { url: String, description: String },
    LoadTimeout { generation: u64 },

    // Bridge
    Page(PageEvent),
    ShareReceived(SharePayload),

    // Media
    PermissionResult { request_id: RequestId, granted: bool },
    FileChooserRequested { capture: bool, multiple: bool },
    /// `None` or an empty list means the user picked nothing.
    FileChooserCompleted {
        request_id: RequestId,
        files: Option<Vec<String>>,
    },
    WebPermissionRequested {
        request_id: RequestId,
        resources: Vec<WebResource>,
    },

    // Gesture and settings
    Touch(TouchEvent),
    GestureTick { generation: u64 },
    SettingsSubmitted { url: String },
    BackPressed { can_go_back: bool },

    // Downloads
    DownloadRequested(DownloadRequest),
    DownloadFinished {
        download_id: Uuid,
        file_name: String,
        success: bool,
    },

    /// The screen hosting the surface is gone. Late results are dropped.
    ScreenDestroyed,
    Shutdown,
}

/// Outputs of the bridge controller, executed by the host.
#[derive(Debug, Clone, PartialEq)]
pub enum HostCommand {
    LoadUrl(String),
    OpenExternal(String),
    Page(PageCommand),
    SetLoading(bool),

    RequestPermission {
        request_id: RequestId,
        capability: Capability,
    },
    LaunchCamera { request_id: RequestId },
    OpenFilePicker { request_id: RequestId, multiple: bool },
    /// Resolves the page's pending file chooser; `None` is the null result.
    CompleteFileChooser {
        request_id: RequestId,
        files: Option<Vec<String>>,
    },
    GrantWebPermission {
        request_id: RequestId,
        resources: Vec<WebResource>,
    },
    DenyWebPermission { request_id: RequestId },

    ShowGestureProgress(u8),
    HideGestureProgress,
    ShowSettings { current_url: Option<String> },
    SettingsRejected { reason: String },

    GoBack,
    Exit,
    EnqueueDownload(DownloadTicket),
}
