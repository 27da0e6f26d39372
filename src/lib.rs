//! folan library
//!
//! Framed file transfer over a single TCP connection, with a reconnecting
//! driver on each side.

pub mod archive;
pub mod cli;
pub mod config;
pub mod driver;
pub mod error;
pub mod framer;
pub mod fs_enum;
pub mod interrupt;
pub mod limit;
pub mod logger;
pub mod net;
pub mod paths;
pub mod progress;
pub mod protocol;
pub mod session;

pub use error::{Error, Result};
