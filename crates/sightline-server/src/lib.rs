//! # sightline-server
//!
//! HTTP server library for the sightline BLE discovery tracker.
//!
//! This library provides the API handlers and state management for sightline.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod api;
pub mod logging;
pub mod state;
