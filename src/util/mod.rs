//! Shared utilities

pub mod config;
pub mod hash;
pub mod scratch;

pub use config::Config;
pub use scratch::ScratchDir;
