use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};
use std::time::Duration;

use crate::state::AppState;

const DB_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let db_ok = if let Some(pool) = &state.db_pool {
        // Bounded so the probe answers even when the first connection hangs.
        match tokio::time::timeout(DB_PROBE_TIMEOUT, sqlx::query("SELECT 1").fetch_one(pool)).await
        {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Health check DB query failed");
                false
            }
            Err(_) => {
                tracing::error!("Health check DB query timed out (3s)");
                false
            }
        }
    } else {
        true
    };

    Json(health_body(db_ok))
}

fn health_body(db_ok: bool) -> Value {
    json!({
        "status": if db_ok { "ok" } else { "degraded" },
        "now": Utc::now().to_rfc3339(),
        "db": db_ok
    })
}

#[cfg(test)]
mod tests {
    use super::health_body;

    #[test]
    fn degraded_when_db_probe_fails() {
        assert_eq!(health_body(true)["status"], "ok");
        assert_eq!(health_body(false)["status"], "degraded");
        assert_eq!(health_body(false)["db"], false);
    }
}
