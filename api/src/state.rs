use croprec_core::pipeline::PredictionPipeline;
use sqlx::PgPool;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub pipeline: PredictionPipeline,
    pub session_ttl: chrono::Duration,
}
