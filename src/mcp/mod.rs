//! MCP transport

pub mod server;

pub use server::FoodAnalyserService;
