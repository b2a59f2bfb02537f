//! Testing utilities and mock implementations
//!
//! This module provides a mock transport for exercising the connection
//! wrapper and the main loop without an MQTT broker.

pub mod mocks;

pub use mocks::*;
