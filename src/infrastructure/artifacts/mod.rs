//! Module artifacts - on-disk layout and the formats the host can open

pub mod linked;
pub mod native;
pub mod store;

pub use linked::{LinkedFormat, LINKED_EXTENSION};
pub use native::NativeFormat;
pub use store::ArtifactStore;
