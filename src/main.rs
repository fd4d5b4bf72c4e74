use std::sync::Arc;

use actix_web::middleware::NormalizePath;
use actix_web::web::{Data, JsonConfig, QueryConfig};
use actix_web::{App, HttpServer, Responder, get};
use anyhow::Context;
use dotenvy::dotenv;

mod api;
mod auth;
mod clock;
mod config;
mod db;
mod docs;
mod error;
mod model;
mod models;
mod payroll;
mod routes;
mod serial;
mod store;
mod utils;

use clock::SystemClock;
use config::Config;
use db::init_db;
use payroll::PayrollService;
use payroll::settlement::SettlementReconciler;
use serial::{SerialFilter, SerialNumberGenerator};
use store::mysql::MySqlStore;
use utils::settled_cache::SettledCache;

use crate::docs::ApiDoc;
use tracing::{error, info};
use tracing_appender::rolling;
use utoipa::OpenApi; // ← needed for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

#[get("/")]
async fn index() -> impl Responder {
    "Payroll ledger is running"
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = Config::from_env()?;

    // Rolling daily log
    let file_appender = rolling::daily(&config.log_dir, "payroll.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(config.log_filter()?)
        .with_ansi(false)
        .with_target(false) // removes module path
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .pretty()
        .init();

    info!("Server starting...");

    let pool = init_db(&config.database_url).await?;

    let serials = SerialNumberGenerator::new(
        SerialFilter::new(config.serial_filter_capacity),
        config.serial_max_attempts,
        config.serial_max_batch_attempts,
    );
    let reconciler =
        SettlementReconciler::new(SettledCache::new(config.settled_cache_capacity));
    let service = Data::new(PayrollService::new(
        MySqlStore::new(pool),
        serials,
        reconciler,
        Arc::new(SystemClock),
        config.payroll_batch_limit,
    ));

    let warmup = service.clone();
    let warmup_chunk = config.serial_warmup_chunk;
    actix_web::rt::spawn(async move {
        if let Err(e) = warmup
            .serial_filter()
            .warmup(warmup.store(), warmup_chunk)
            .await
        {
            error!(error = ?e, "Failed to warm up serial filter");
        }
    });

    let server_addr = config.server_addr.clone();
    let config_data = Data::new(config);

    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}") // ← important: wildcard {_:.*} to match JS/CSS files
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(service.clone())
            .app_data(config_data.clone())
            .app_data(JsonConfig::default().error_handler(api::json_error))
            .app_data(QueryConfig::default().error_handler(api::query_error))
            .service(index)
            // Protected routes with authentication and rate limiting
            .configure(|cfg| routes::configure(cfg, &config_data))
    })
    .bind(&server_addr)
    .with_context(|| format!("Failed to bind {server_addr}"))?
    .run()
    .await?;

    Ok(())
}
