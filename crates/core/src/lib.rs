//! Core library: hopper layout, scanning, browsing, import and result feed.

pub mod browser;
pub mod config;
pub mod feed;
pub mod folders;
pub mod mime;
pub mod models;
pub mod pipeline;
pub mod preview;
pub mod reporting;
pub mod scanner;
pub mod session;
pub mod wizard;
