use std::sync::Arc;

use axum::response::Json;
use serde_json::{json, Value};

use crate::state::AppState;

/// Health check handler.
/// Returns JSON with status and config summary.
pub fn health_handler(state: &Arc<AppState>) -> Json<Value> {
    let config = &state.config;
    Json(json!({
        "status": "thinkify-rs is running",
        "config": {
            "models_count": config.upstream.models.len(),
            "auth_enabled": state.auth_enabled(),
            "log_level": config.features.log_level,
        }
    }))
}
