//! bugvault - attachment storage for an issue tracker
//!
//! Stores files attached to bugs and project documents on disk, on an FTP
//! server or inline in the database, and decides who may view, download
//! or delete them.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod services;
pub mod state;

pub use config::config;
pub use error::{Error, Result};
pub use state::AppState;
