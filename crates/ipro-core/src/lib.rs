//! Core library for the ipro attendance client.

pub mod attendance;
pub mod auth;
pub mod config;
pub mod error;
pub mod geofence;
pub mod http;
pub mod identity;
pub mod location;
pub mod logging;
pub mod storage;

pub use error::{Error, Result};
