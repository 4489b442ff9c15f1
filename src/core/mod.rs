pub mod config;
pub mod error;
pub mod job;
pub mod lifecycle;
pub mod relay;
pub mod store;
pub mod terminal;
