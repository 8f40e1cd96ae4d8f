// Public API for the service binary, the export tool and integration tests

pub mod api;
pub mod catalog;
pub mod collector;
pub mod config;
pub mod error;
pub mod hashing;
pub mod state;
pub mod store;
pub mod types;
