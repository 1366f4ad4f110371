//! Domain layer - Core business objects
//! 
//! This layer contains:
//! - Entities: Core business objects (Message, ModuleDescriptor)
//! - Traits: Abstractions for infrastructure (Bot)

pub mod entities;
pub mod traits;
