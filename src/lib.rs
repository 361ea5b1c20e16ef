// Ollama Gateway - memory-aware inference gateway
// Library exports

pub mod config;
pub mod controller;
pub mod inference;
pub mod metrics;
pub mod models;
pub mod monitoring;
pub mod server;
