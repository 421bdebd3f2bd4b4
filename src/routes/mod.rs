pub mod datasets;

use actix_web::{web, HttpResponse};
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::AppState;

async fn root() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "message": "InsightIQ backend is running!" }))
}

async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": true }))
}

async fn health_check_db(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    state.datasets.ping().await?;
    Ok(HttpResponse::Ok().json(json!({ "status": true })))
}

// POST /ask_question - Replaced by the dataset-scoped route
async fn legacy_ask_question() -> AppResult<HttpResponse> {
    Err(AppError::Gone(
        "This endpoint is deprecated. Use /data/datasets/{dataset_id}/ask_question instead."
            .to_string(),
    ))
}

pub fn create_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(root))
        .route("/health", web::get().to(health_check))
        .route("/health/db", web::get().to(health_check_db))
        .route("/ask_question", web::post().to(legacy_ask_question))
        .service(web::scope("/data").configure(datasets::create_routes));
}
