//! HTTP surface and AI chat relay over `costing_core`.

pub mod config;
pub mod http;
pub mod relay;
