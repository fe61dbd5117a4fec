//! Food Analyser Library
//!
//! Estimates the mass and nutrient content of a photographed food item:
//! the item is identified, reconstructed into a mesh, measured, and its
//! per-100 g nutrients are scaled to the estimated mass.

pub mod api;
pub mod build_info;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod http;
pub mod mcp;
pub mod models;
pub mod nutrition;
pub mod pipeline;
pub mod tools;
