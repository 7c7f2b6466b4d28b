#![forbid(unsafe_code)]

pub mod app;
pub mod chain;
pub mod core;
pub mod indexer;
pub mod manager;
pub mod queue;
pub mod store;
pub mod transport;

pub use app::run;
