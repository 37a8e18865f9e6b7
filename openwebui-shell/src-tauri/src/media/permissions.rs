//! Camera and microphone permission arbitration.
//!
//! The OS permission prompt is single-slot: one prompt is in flight at a
//! time and requests for other capabilities wait their turn. A capability
//! never has more than one outstanding request.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub type RequestId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Camera,
    Microphone,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Camera => f.write_str("camera"),
            Capability::Microphone => f.write_str("microphone"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PermissionState {
    #[default]
    Unknown,
    Denied,
    Granted,
}

/// Permission states as reported by the OS when the screen starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PermissionSnapshot {
    pub camera: PermissionState,
    pub microphone: PermissionState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestOrigin {
    /// A capture-enabled file chooser opened by the page.
    FileChooser,
    /// The page asked for microphone access through the bridge.
    PageRequest,
    /// Proactive request at cold start; the page is not told about the outcome.
    Startup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingCapabilityRequest {
    pub request_id: RequestId,
    pub capability: Capability,
    pub origin: RequestOrigin,
}

/// What the caller must do after a bridge transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaAction {
    /// Show the OS permission prompt; the answer comes back with this id.
    Prompt {
        request_id: RequestId,
        capability: Capability,
    },
    LaunchCamera,
    /// The capture request ends without a file.
    CompleteFileChooserEmpty,
    NotifyMicrophone { granted: bool },
}

#[derive(Debug, Default)]
pub struct MediaBridge {
    camera: PermissionState,
    microphone: PermissionState,
    in_flight: Option<PendingCapabilityRequest>,
    queued: VecDeque<PendingCapabilityRequest>,
}

impl MediaBridge {
    pub fn new(snapshot: PermissionSnapshot) -> Self {
        Self {
            camera: snapshot.camera,
            microphone: snapshot.microphone,
            ..Self::default()
        }
    }

    pub fn state(&self, capability: Capability) -> PermissionState {
        match capability {
            Capability::Camera => self.camera,
            Capability::Microphone => self.microphone,
        }
    }

    pub fn is_pending(&self, capability: Capability) -> bool {
        self.pending_ref(capability).is_some()
    }

    pub fn in_flight(&self) -> Option<&PendingCapabilityRequest> {
        self.in_flight.as_ref()
    }

    /// A capture-enabled file chooser needs the camera.
    pub fn request_camera(&mut self) -> Vec<MediaAction> {
        if self.camera == PermissionState::Granted {
            return vec![MediaAction::LaunchCamera];
        }
        if self.is_pending(Capability::Camera) {
            debug!("Camera request already pending, merging");
            return Vec::new();
        }
        self.enqueue(Capability::Camera, RequestOrigin::FileChooser)
    }

    pub fn request_microphone(&mut self, origin: RequestOrigin) -> Vec<MediaAction> {
        if self.microphone == PermissionState::Granted {
            debug!("Microphone permission already granted");
            return match origin {
                RequestOrigin::Startup => Vec::new(),
                _ => vec![MediaAction::NotifyMicrophone { granted: true }],
            };
        }

        if let Some(pending) = self.pending_mut(Capability::Microphone) {
            // A page request arriving behind the startup prompt still wants the callback.
            if origin == RequestOrigin::PageRequest {
                pending.origin = RequestOrigin::PageRequest;
            }
            debug!("Microphone request already pending, merging");
            return Vec::new();
        }

        self.enqueue(Capability::Microphone, origin)
    }

    /// Applies the OS answer for the in-flight prompt and starts the next queued one.
    pub fn on_permission_result(&mut self, request_id: RequestId, granted: bool) -> Vec<MediaAction> {
        let request = match self.in_flight {
            Some(request) if request.request_id == request_id => request,
            _ => {
                warn!("Ignoring permission result for unknown request {}", request_id);
                return Vec::new();
            }
        };
        self.in_flight = None;

        let state = if granted {
            PermissionState::Granted
        } else {
            PermissionState::Denied
        };
        match request.capability {
            Capability::Camera => self.camera = state,
            Capability::Microphone => self.microphone = state,
        }
        info!("{} permission {:?}", request.capability, state);

        let mut actions = match (request.capability, request.origin) {
            (Capability::Camera, RequestOrigin::FileChooser) if granted => {
                vec![MediaAction::LaunchCamera]
            }
            (Capability::Camera, RequestOrigin::FileChooser) => {
                vec![MediaAction::CompleteFileChooserEmpty]
            }
            (Capability::Microphone, RequestOrigin::PageRequest) => {
                vec![MediaAction::NotifyMicrophone { granted }]
            }
            _ => Vec::new(),
        };

        if let Some(next) = self.queued.pop_front() {
            actions.push(self.start(next));
        }
        actions
    }

    fn enqueue(&mut self, capability: Capability, origin: RequestOrigin) -> Vec<MediaAction> {
        let request = PendingCapabilityRequest {
            request_id: Uuid::new_v4(),
            capability,
            origin,
        };

        if self.in_flight.is_some() {
            debug!("Permission prompt busy, queueing {} request", capability);
            self.queued.push_back(request);
            return Vec::new();
        }
        vec![self.start(request)]
    }

    fn start(&mut self, request: PendingCapabilityRequest) -> MediaAction {
        debug!("Requesting {} permission ({})", request.capability, request.request_id);
        self.in_flight = Some(request);
        MediaAction::Prompt {
            request_id: request.request_id,
            capability: request.capability,
        }
    }

    fn pending_ref(&self, capability: Capability) -> Option<&PendingCapabilityRequest> {
        self.in_flight
            .iter()
            .chain(self.queued.iter())
            .find(|r| r.capability == capability)
    }

    fn pending_mut(&mut self, capability: Capability) -> Option<&mut PendingCapabilityRequest> {
        self.in_flight
            .iter_mut()
            .chain(self.queued.iter_mut())
            .find(|r| r.capability == capability)
    }
}
