//! Infrastructure layer - External concerns
//! 
//! This layer contains:
//! - Config: Configuration loading
//! - Storage: Persisted module list
//! - Artifacts: On-disk artifact layout and the native/linked formats
//! - Adapters: Platform integrations (console)

pub mod adapters;
pub mod artifacts;
pub mod config;
pub mod storage;
