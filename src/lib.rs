pub mod auth;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod interrupt;
pub mod linkedin_client;
pub mod post;

pub use error::{exit_status, AppError, AppResult};
