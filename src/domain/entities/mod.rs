//! Domain entities - Core business objects with no external dependencies

pub mod message;
pub mod descriptor;

pub use message::{Message, Content};
pub use descriptor::{ModuleDescriptor, normalize_id};
