pub mod client;
pub mod console;
pub mod control;
pub mod jobs;
pub mod server;
