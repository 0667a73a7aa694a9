pub mod config;
pub mod engine;
pub mod feed;
pub mod relay;
pub mod scheduler;
pub mod store;
pub mod stream;
pub mod terminal;
