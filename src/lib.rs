//! Durability monitor: uploads a reference object once, re-downloads and
//! compares it on a fixed interval, and serves the results as a status page.

pub mod app_state;
pub mod backend;
pub mod config;
pub mod error;
pub mod logging;
pub mod monitor;
pub mod service;
pub mod status;
pub mod web;
