mod unlock;

pub use unlock::{
    GestureConfig, GesturePhase, GestureSignal, PointerId, SettingsUnlock, TouchEvent,
    PROGRESS_INTERVAL,
};
