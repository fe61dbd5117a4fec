//! Food Analyser MCP Server Implementation
//!
//! Exposes the surface operations as MCP tools over stdio.

use std::path::PathBuf;

use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{
    CallToolResult, Content, Implementation, ProtocolVersion, ServerCapabilities, ServerInfo,
};
use rmcp::{schemars, tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler};
use serde::{Deserialize, Serialize};

use crate::api::{ApiFailure, AppState};

/// Food Analyser MCP Service
#[derive(Clone)]
pub struct FoodAnalyserService {
    state: AppState,
    tool_router: ToolRouter<FoodAnalyserService>,
}

impl FoodAnalyserService {
    pub fn new(state: AppState) -> Self {
        Self {
            state,
            tool_router: Self::tool_router(),
        }
    }
}

// ============================================================================
// Parameter Structs
// ============================================================================

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct UploadImageParams {
    /// Absolute path of the photo on the server's file system
    pub file_path: String,
    /// Session to add the photo to; omit to start a new session
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SessionParams {
    pub session_id: String,
}

/// Serialize a tool outcome; failures are reported as JSON bodies, not tool errors
fn to_result<T: Serialize>(outcome: Result<T, ApiFailure>) -> Result<CallToolResult, McpError> {
    let json = match outcome {
        Ok(body) => serde_json::to_string_pretty(&body),
        Err(failure) => serde_json::to_string_pretty(&failure),
    }
    .map_err(|e| McpError::internal_error(format!("Serialization error: {}", e), None))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

#[tool_router]
impl FoodAnalyserService {
    // --- Status ---

    #[tool(description = "Check that the food analyser is alive; returns build info, uptime, memory usage and the staging directory")]
    async fn alive(&self) -> Result<CallToolResult, McpError> {
        to_result(Ok(self.state.alive()))
    }

    #[tool(description = "Get step-by-step instructions for analysing food. Call this before the first upload or when unsure how the tools fit together.")]
    fn analysis_instructions(&self) -> Result<CallToolResult, McpError> {
        use crate::tools::status::ANALYSIS_INSTRUCTIONS;
        Ok(CallToolResult::success(vec![Content::text(ANALYSIS_INSTRUCTIONS)]))
    }

    // --- Analysis ---

    #[tool(description = "Upload one photo of the food item. Omit session_id on the first photo to start a session, then pass the returned session_id with every further photo.")]
    async fn upload_image(&self, Parameters(p): Parameters<UploadImageParams>) -> Result<CallToolResult, McpError> {
        let path = PathBuf::from(&p.file_path);
        to_result(self.state.upload_file(p.session_id.as_deref(), &path).await)
    }

    #[tool(description = "Identify the food in a session's photos, reconstruct and measure it, and return its weight and nutrients. Reconstruction can take several minutes.")]
    async fn analyse_object(&self, Parameters(p): Parameters<SessionParams>) -> Result<CallToolResult, McpError> {
        to_result(self.state.analyse(&p.session_id).await)
    }

    #[tool(description = "Locate the 3D model generated for a session; returns the path of the OBJ file and its size")]
    async fn get_3d_model(&self, Parameters(p): Parameters<SessionParams>) -> Result<CallToolResult, McpError> {
        to_result(self.state.model_location(&p.session_id).await)
    }
}

#[tool_handler]
impl ServerHandler for FoodAnalyserService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "food-analyser".into(),
                version: crate::build_info::VERSION.into(),
                title: Some("Food Analyser".into()),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Food Analyser - weight and nutrients of a food item from photos. \
                 IMPORTANT: Call analysis_instructions first. \
                 Workflow: upload_image (repeat with the returned session_id), analyse_object, get_3d_model. \
                 Status: alive."
                    .into(),
            ),
        }
    }
}
