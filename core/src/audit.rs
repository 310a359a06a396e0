//! Audit persistence: one immutable record per completed, non-preview prediction.

use async_trait::async_trait;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::prediction::{PredictionRequest, PredictionResponse};

/// Row written for a completed interactive prediction.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditRecord {
    pub user_id: Uuid,
    pub composition_key: String,
    pub nitrogen: f64,
    pub phosphorus: f64,
    pub potassium: f64,
    pub climate: String,
    pub humidity: f64,
    pub ph: f64,
    pub rainfall: f64,
    pub soil_type: String,
    pub topography: String,
    pub water_availability: String,
    pub response: PredictionResponse,
}

impl AuditRecord {
    pub fn new(user_id: Uuid, request: &PredictionRequest, response: &PredictionResponse) -> Self {
        Self {
            user_id,
            composition_key: request.composition_key.clone(),
            nitrogen: request.nitrogen,
            phosphorus: request.phosphorus,
            potassium: request.potassium,
            climate: request.climate.clone(),
            humidity: request.humidity,
            ph: request.ph,
            rainfall: request.rainfall,
            soil_type: request.soil_type.clone(),
            topography: request.topography.clone(),
            water_availability: request.water_availability.clone(),
            response: response.clone(),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum AuditError {
    #[error("audit record rejected by storage: {0}")]
    Rejected(String),
    #[error("audit storage unavailable: {0}")]
    Unavailable(String),
}

/// Insert-only storage for audit records. Implementations must bind every
/// field as a query parameter and write the record atomically.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Insert one record and return its id.
    async fn insert(&self, record: &AuditRecord) -> Result<Uuid, AuditError>;
}

/// What happened to the audit trail for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AuditStatus {
    Written { record_id: Uuid },
    /// Preview requests are never persisted.
    SkippedPreview,
    /// The write failed; the prediction is still returned.
    Failed,
}

/// Persistence step outcome, before the pipeline maps it to warnings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistOutcome {
    Written(Uuid),
    SkippedPreview,
    IdentityRequired,
    Failed(AuditError),
}

/// Write the audit record for one classified prediction, honoring the preview
/// and identity rules. Exactly one insert is attempted when a record is due.
pub async fn persist_prediction(
    store: &dyn AuditStore,
    user_id: Option<Uuid>,
    request: &PredictionRequest,
    response: &PredictionResponse,
) -> PersistOutcome {
    if request.is_preview {
        tracing::debug!("preview request, audit record skipped");
        return PersistOutcome::SkippedPreview;
    }

    let Some(user_id) = user_id else {
        return PersistOutcome::IdentityRequired;
    };

    let record = AuditRecord::new(user_id, request, response);
    match store.insert(&record).await {
        Ok(record_id) => {
            tracing::info!(
                user_id = %user_id,
                record_id = %record_id,
                composition_key = %record.composition_key,
                "prediction audit record written"
            );
            PersistOutcome::Written(record_id)
        }
        Err(e) => {
            tracing::warn!(user_id = %user_id, error = %e, "failed to write prediction audit record");
            PersistOutcome::Failed(e)
        }
    }
}
