//! Application layer - Use cases and business logic
//! 
//! This layer contains:
//! - Modules: Module lifecycle (loading, isolation, handles, the manager)
//! - Services: Module administration
//! - Errors: Domain-specific errors
//! - Messaging: Message parsing, dispatching and the module event bus

pub mod errors;
pub mod messaging;
pub mod modules;
pub mod services;
