pub mod cli;
pub mod hub_client;
pub mod render;
pub mod session;
