//! carik-host - a chat-bot host with hot-swappable, versioned modules

pub mod application;
pub mod domain;
pub mod infrastructure;
