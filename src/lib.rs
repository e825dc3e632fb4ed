pub mod camera;
pub mod config;
pub mod health;
pub mod messages;
pub mod motor;
pub mod runtime;
pub mod server;
