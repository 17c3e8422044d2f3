pub mod checkpoint;
pub mod config;
pub mod error;
pub mod event;
pub mod lifecycle;
pub mod metrics;
pub mod publisher;
pub mod source;

pub mod kafka;

pub use config::Config;
pub use error::{Error, Result, SendError};
pub use event::{ChangeEvent, Position, RowIdentity};
pub use publisher::{Diagnostic, Publisher};
