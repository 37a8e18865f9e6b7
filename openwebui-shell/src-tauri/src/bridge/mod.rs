mod protocol;
mod script;

pub use protocol::{PageCommand, PageEvent};
pub use script::{PageTransport, ScriptTransport, BRIDGE_OBJECT};
