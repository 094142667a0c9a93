pub mod config;
pub mod dispatcher;
pub mod errors;
pub mod events;
pub mod github;
pub mod inspect;
pub mod logging;
pub mod nginx;
pub mod notify;
pub mod progress;
pub mod runner;
pub mod server;
pub mod staging;
