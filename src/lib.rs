//! cbtkit library
//!
//! Offline caching proxy and read-aloud narration for a CBT practice-exam app.
//! The binary wires these together; integration tests use them directly.

pub mod app;
pub mod cache;
pub mod cli;
pub mod config;
pub mod http;
pub mod logging;
pub mod narrator;
pub mod proxy;
pub mod ui;
