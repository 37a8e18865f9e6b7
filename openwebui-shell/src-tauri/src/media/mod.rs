mod permissions;

pub use permissions::{
    Capability, MediaAction, MediaBridge, PendingCapabilityRequest, PermissionSnapshot,
    PermissionState, RequestId, RequestOrigin,
};
