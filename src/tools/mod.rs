//! Tools module
//!
//! Service-level tools shared by the MCP and HTTP surfaces.

pub mod status;
