mod supervisor;

pub use supervisor::{LoadState, LoadSupervisor, PageReadiness, BLANK_PAGE};
