//! Core Jarvis library (session identity, event protocol, stream controller, HTTP client).

pub mod client;
pub mod config;
pub mod controller;
pub mod logging;
pub mod protocol;
pub mod session;
pub mod transport;
pub mod visibility;
