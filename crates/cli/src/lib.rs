//! Public library modules for the CLI crate
pub mod browse;
pub mod output;
pub mod upload;
pub mod watch;
