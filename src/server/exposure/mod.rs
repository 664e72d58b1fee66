//! API exposure
//!
//! An exposure consumes a `ServerHost` and produces a router for its
//! protocol. HAL over HTTP is the only one.

pub mod rest;

pub use rest::RestExposure;
