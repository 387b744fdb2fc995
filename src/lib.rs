pub mod acquisition;
pub mod config;
pub mod error;
pub mod export;
pub mod history;
pub mod local;
pub mod processing;
pub mod session;
pub mod utils;

pub use config::Config;
pub use error::{DeviceError, ExportError, SessionError};
pub use session::{SessionController, SessionMetadata, SessionState, Snapshot, SubjectMetadata};
