//! Message handling - Parsing, routing and delivery to modules

pub mod bus;
pub mod dispatcher;
pub mod parser;

pub use bus::EventBus;
pub use dispatcher::MessageDispatcher;
pub use parser::MessageParser;
