mod ingest;
mod payload;

pub use ingest::{IngestionBridge, PendingShare};
pub use payload::{IncomingShare, ShareAction, ShareMessage, SharePayload};
