use actix_web::{web, HttpResponse};
use serde_json::json;
use sqlx::PgPool;

use crate::core::datasource::DatasourceRole;

/// Reports which datasource was selected at startup and whether it answers right now. Does not
/// re-run selection.
#[tracing::instrument(level = "info", skip(pool))]
pub async fn health_check(pool: web::Data<PgPool>, role: web::Data<DatasourceRole>) -> HttpResponse {
    let role = *role.get_ref();
    match sqlx::query("SELECT 1").execute(pool.get_ref()).await {
        Ok(_) => HttpResponse::Ok().json(json!({ "status": "up", "datasource": role })),
        Err(error) => {
            tracing::warn!(?error, %role, "selected datasource did not answer health check.");
            HttpResponse::ServiceUnavailable().json(json!({ "status": "down", "datasource": role }))
        }
    }
}
