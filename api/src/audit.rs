use async_trait::async_trait;
use croprec_core::audit::{AuditError, AuditRecord, AuditStore};
use sqlx::PgPool;
use uuid::Uuid;

/// Audit records in the `predictions` table.
#[derive(Clone)]
pub struct PgAuditStore {
    pool: PgPool,
}

impl PgAuditStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditStore for PgAuditStore {
    async fn insert(&self, record: &AuditRecord) -> Result<Uuid, AuditError> {
        let id = Uuid::now_v7();
        let response = serde_json::to_value(&record.response)
            .map_err(|e| AuditError::Rejected(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO predictions (
                id, user_id, composition_key, nitrogen, phosphorus, potassium,
                climate, humidity, ph, rainfall, soil_type, topography,
                water_availability, response
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(id)
        .bind(record.user_id)
        .bind(&record.composition_key)
        .bind(record.nitrogen)
        .bind(record.phosphorus)
        .bind(record.potassium)
        .bind(&record.climate)
        .bind(record.humidity)
        .bind(record.ph)
        .bind(record.rainfall)
        .bind(&record.soil_type)
        .bind(&record.topography)
        .bind(&record.water_availability)
        .bind(response)
        .execute(&self.pool)
        .await
        .map_err(classify)?;

        Ok(id)
    }
}

fn classify(err: sqlx::Error) -> AuditError {
    match err {
        sqlx::Error::Database(db) => AuditError::Rejected(db.to_string()),
        other => AuditError::Unavailable(other.to_string()),
    }
}
