use rocket::serde::json::Json;
use rocket::{State, get};

use crate::config::{Config, SERVER_PROTOCOL_VERSION};

/// Unauthenticated liveness/version probe. Carries no room data.
#[get("/")]
pub fn index(config: &State<Config>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "lineheat",
        "protocolVersion": SERVER_PROTOCOL_VERSION,
        "retentionDays": config.retention_days,
    }))
}

#[rocket::catch(404)]
pub fn not_found() -> Json<serde_json::Value> {
    Json(serde_json::json!({"error": "Not found"}))
}
