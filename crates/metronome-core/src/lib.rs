pub mod args;
pub mod channel;
pub mod config;
pub mod intent;
pub mod message;
