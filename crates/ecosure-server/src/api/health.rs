use axum::Json;
use ecosure_contracts::Health;

pub async fn health() -> Json<Health> {
    Json(Health { ok: true })
}
