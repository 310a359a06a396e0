use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use croprec_core::catalog::CompositionCatalog;
use croprec_core::pipeline::PredictionPipeline;
use sqlx::postgres::PgPoolOptions;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod audit;
mod auth;
mod config;
mod engine;
mod error;
mod extract;
mod middleware;
mod routes;
mod state;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Crop Recommendation API",
        version = "0.1.0",
        description = "Session-gated crop recommendations from soil nutrients, climate and terrain."
    ),
    paths(
        routes::health::health_check,
        routes::auth::login,
        routes::auth::logout,
        routes::auth::current_session,
        routes::compositions::list_compositions,
        routes::predictions::submit_prediction,
        routes::predictions::preview_prediction,
        routes::predictions::list_predictions,
    ),
    components(schemas(
        routes::health::HealthResponse,
        routes::auth::LoginRequest,
        routes::auth::LoginResponse,
        routes::auth::SessionResponse,
        routes::compositions::CompositionsResponse,
        routes::predictions::PredictionRecord,
        routes::predictions::PredictionHistoryResponse,
        croprec_core::error::ApiError,
        croprec_core::session::Role,
        croprec_core::catalog::CompositionOption,
        croprec_core::prediction::PredictionForm,
        croprec_core::prediction::PredictionRequest,
        croprec_core::prediction::CropScore,
        croprec_core::prediction::PredictionResponse,
        croprec_core::pipeline::PredictionReport,
        croprec_core::pipeline::RankedCrop,
        croprec_core::pipeline::ReportStatus,
        croprec_core::pipeline::Warning,
        croprec_core::pipeline::WarningKind,
        croprec_core::audit::AuditStatus,
    )),
    modifiers(&SecurityAddon)
)]
struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            utoipa::openapi::security::SecurityScheme::Http(
                utoipa::openapi::security::Http::new(
                    utoipa::openapi::security::HttpAuthScheme::Bearer,
                ),
            ),
        );
    }
}

#[tokio::main]
async fn main() {
    // Load .env if present (dev only)
    let _ = dotenvy::dotenv();

    // Structured JSON logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "croprec_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let config = config::AppConfig::from_env().expect("invalid configuration");

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to database");

    sqlx::migrate!("../migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    let catalog = Arc::new(CompositionCatalog::standard());
    tracing::info!(
        program = %config.engine.program,
        timeout_secs = config.engine.timeout.as_secs(),
        compositions = catalog.len(),
        "prediction engine configured"
    );
    let pipeline = PredictionPipeline::new(
        catalog,
        Arc::new(engine::ProcessEngine::new(config.engine.clone())),
        Arc::new(audit::PgAuditStore::new(pool.clone())),
    );

    let app_state = state::AppState {
        db: pool,
        pipeline,
        session_ttl: config.session_ttl,
    };

    let cors_layer = middleware::cors::build_cors_layer();

    let app = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .merge(routes::health::router())
        .merge(routes::compositions::router())
        .merge(routes::auth::login_router().layer(middleware::rate_limit::login_layer()))
        .merge(routes::auth::session_router())
        .merge(routes::predictions::router().layer(middleware::rate_limit::predictions_layer()))
        .layer(auth::InjectSessionLayer::new(app_state.db.clone()))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .option_layer(config.require_https.then(|| {
                    axum::middleware::from_fn(middleware::https::require_https)
                }))
                .layer(axum::middleware::from_fn(middleware::security_headers::apply))
                .layer(cors_layer),
        )
        .with_state(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Crop recommendation API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .unwrap();
}
