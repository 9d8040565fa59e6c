//! Domain types shared by the storage layer and the IPC handlers.

pub mod decimal;
pub mod reply;
pub mod types;

pub use reply::{FailureKind, IpcReply};
