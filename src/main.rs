mod config;
mod db;
mod error;
mod middleware;
mod models;
mod retrieval;
mod routes;
mod services;
mod utils;

use actix_cors::Cors;
use actix_web::{
    http::header,
    middleware::{Compress, Logger, NormalizePath},
    web, App, HttpServer,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::config::Config;
use crate::db::Database;
use crate::retrieval::{CompletionProvider, EmbeddingFactory, IndexStore, OpenAICompletions};
use crate::routes::create_routes;
use crate::services::{DatasetStore, DeepQaService, DeepQaSettings, SqlDatasetStore};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub datasets: Arc<dyn DatasetStore>,
    pub deepqa: Arc<DeepQaService>,
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let log_level = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "info".to_string())
        .parse()
        .unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting InsightIQ backend");

    let config = Config::from_env()?;
    info!("Configuration loaded from environment");

    let db = Database::new(&config.database_url, config.database_max_connections).await?;
    info!("Database connected");

    let datasets: Arc<dyn DatasetStore> = Arc::new(SqlDatasetStore::new(db));

    let embedder = EmbeddingFactory::from_config(&config).await?;
    info!(
        "Embedding provider ready: {} ({}D)",
        embedder.model_name(),
        embedder.dimension()
    );

    let completer = Arc::new(OpenAICompletions::new(
        config.openai_api_key.clone(),
        config.openai_api_base_url.clone(),
        Some(config.deepqa_completion_model.clone()),
    )?);
    info!("Completion model: {}", completer.model_name());

    let indexes = Arc::new(IndexStore::new(config.retention()));
    indexes.start_cleanup_task(Duration::from_secs(config.qa_index_cleanup_interval_secs));

    let deepqa = DeepQaService::new(
        datasets.clone(),
        embedder,
        completer,
        indexes,
        DeepQaSettings::from_config(&config),
    );

    let state = web::Data::new(AppState {
        config: Arc::new(config.clone()),
        datasets,
        deepqa: Arc::new(deepqa),
    });

    let addr = SocketAddr::from((config.host.parse::<std::net::IpAddr>()?, config.port));
    let cors_allow_origin = config.cors_allow_origin.clone();

    info!("Server running at http://{}", addr);

    HttpServer::new(move || {
        // Credentials rule out allow_any_origin(), so "*" echoes the caller's origin
        let cors = if cors_allow_origin == "*" {
            Cors::default()
                .allowed_origin_fn(|_origin, _req_head| true)
                .allow_any_method()
                .allow_any_header()
                .supports_credentials()
                .max_age(3600)
        } else {
            let mut cors = Cors::default();
            for origin in cors_allow_origin.split(',').map(|s| s.trim()) {
                cors = cors.allowed_origin(origin);
            }
            cors.allowed_methods(vec!["GET", "POST", "DELETE", "OPTIONS"])
                .allowed_headers(vec![
                    header::CONTENT_TYPE,
                    header::AUTHORIZATION,
                    header::ACCEPT,
                    header::COOKIE,
                ])
                .supports_credentials()
                .max_age(3600)
        };

        App::new()
            .app_data(state.clone())
            .wrap(cors)
            .wrap(Compress::default())
            .wrap(Logger::default())
            .wrap(NormalizePath::trim())
            .configure(create_routes)
    })
    .bind(addr)?
    .run()
    .await?;

    Ok(())
}
