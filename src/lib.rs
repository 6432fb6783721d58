//! src/lib.rs
//!
//! Cross-window panel drag coordination. A shared `broker` relays protocol
//! messages between windows; each window runs a `DragController` that hands
//! a drag over to whichever window the pointer enters and continues drags
//! handed to it.

pub mod app;
pub mod broker;
pub mod config;
pub mod controller;
pub mod domain;
pub mod error;
pub mod geometry;
pub mod session;
pub mod transport;
pub mod window;

pub use app::App;
pub use config::Config;
