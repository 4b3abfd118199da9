// ─── Sync Engine ───
// Upload and restore passes between the local save tree and the cloud root.

pub mod engine;
pub mod remote;
pub mod report;

pub use engine::SyncEngine;
pub use remote::{RemoteLayout, DEFAULT_CLOUD_ROOT};
pub use report::{SyncFailure, SyncReport};
