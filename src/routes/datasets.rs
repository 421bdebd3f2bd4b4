use actix_web::{web, HttpResponse};
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::middleware::{AuthMiddleware, AuthUser};
use crate::models::{AskForm, PreviewQuery};
use crate::services::dataset;
use crate::AppState;

// POST /datasets/{id}/deepqa_prepare - Build the Deep Q&A index
async fn deepqa_prepare(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<i64>,
) -> AppResult<HttpResponse> {
    let dataset_id = path.into_inner();
    let prepared = state.deepqa.prepare(dataset_id, auth_user.id()).await?;
    Ok(HttpResponse::Ok().json(prepared))
}

// POST /datasets/{id}/ask_question - Answer a question from the prepared index
async fn ask_question(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<i64>,
    form: web::Json<AskForm>,
) -> AppResult<HttpResponse> {
    form.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let dataset_id = path.into_inner();
    let answer = state
        .deepqa
        .ask(dataset_id, auth_user.id(), &form.question)
        .await?;
    Ok(HttpResponse::Ok().json(answer))
}

// DELETE /datasets/{id}/deepqa - Drop the prepared index
async fn evict_deepqa(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<i64>,
) -> AppResult<HttpResponse> {
    state.deepqa.evict(path.into_inner(), auth_user.id()).await?;
    Ok(HttpResponse::NoContent().finish())
}

// GET /datasets/{id}/preview?rows=N
async fn preview_dataset(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<i64>,
    query: web::Query<PreviewQuery>,
) -> AppResult<HttpResponse> {
    query
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let preview = dataset::preview(
        state.datasets.as_ref(),
        path.into_inner(),
        auth_user.id(),
        query.rows,
    )
    .await?;
    Ok(HttpResponse::Ok().json(preview))
}

// GET /datasets/{id}/summary
async fn dataset_summary(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<i64>,
) -> AppResult<HttpResponse> {
    let summary =
        dataset::summary(state.datasets.as_ref(), path.into_inner(), auth_user.id()).await?;
    Ok(HttpResponse::Ok().json(summary))
}

pub fn create_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/datasets/{id}/deepqa_prepare")
            .wrap(AuthMiddleware)
            .route(web::post().to(deepqa_prepare)),
    )
    .service(
        web::resource("/datasets/{id}/ask_question")
            .wrap(AuthMiddleware)
            .route(web::post().to(ask_question)),
    )
    .service(
        web::resource("/datasets/{id}/deepqa")
            .wrap(AuthMiddleware)
            .route(web::delete().to(evict_deepqa)),
    )
    .service(
        web::resource("/datasets/{id}/preview")
            .wrap(AuthMiddleware)
            .route(web::get().to(preview_dataset)),
    )
    .service(
        web::resource("/datasets/{id}/summary")
            .wrap(AuthMiddleware)
            .route(web::get().to(dataset_summary)),
    );
}
