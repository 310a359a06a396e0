//! Session-gated prediction pipeline.
//!
//! Gate → resolver → engine → reconciler → persistence, strictly in that order.
//! Every stage converts its own failures into a `PipelineError` or a `Warning`;
//! nothing escapes untyped.

use std::sync::Arc;

use serde::Serialize;
use utoipa::ToSchema;

use crate::audit::{AuditStatus, AuditStore, PersistOutcome, persist_prediction};
use crate::catalog::{CompositionCatalog, Resolution};
use crate::engine::{InvocationFailure, PredictionEngine};
use crate::gate::{self, GateDecision};
use crate::prediction::{
    CropScore, FieldError, PREVIEW_DEFAULT_PH, PredictionForm, PredictionInput, PredictionRequest,
    PredictionResponse, PreviewParameters,
};
use crate::reconcile::{Classification, reconcile};
use crate::session::SessionContext;

pub const SUCCESS_MESSAGE: &str = "Crop recommendations generated successfully.";
pub const EMPTY_RESULT_MESSAGE: &str = "No compatible crops were found for the submitted conditions.";
pub const PERSISTENCE_WARNING: &str = "Could not store the prediction.";

/// Fatal outcomes. Each one stops the pipeline before persistence.
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum PipelineError {
    #[error("sign in to request a prediction")]
    Unauthenticated,
    #[error("preview mode requires the admin role")]
    PreviewDenied,
    #[error("invalid {}: {}", .0.field, .0.message)]
    InvalidParameter(FieldError),
    #[error("could not get a prediction from the engine: {0}")]
    InvocationFailed(InvocationFailure),
    #[error("could not parse engine output: {reason}")]
    Malformed { raw: String, reason: String },
    #[error("an identity is required to record a prediction")]
    IdentityRequired,
}

impl PipelineError {
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Unauthenticated => "unauthenticated",
            PipelineError::PreviewDenied => "preview_denied",
            PipelineError::InvalidParameter(_) => "invalid_parameter",
            PipelineError::InvocationFailed(_) => "invocation_failed",
            PipelineError::Malformed { .. } => "malformed",
            PipelineError::IdentityRequired => "identity_required",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    InvalidComposition,
    PersistenceFailure,
}

/// Non-fatal condition reported next to the result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Success,
    EmptyResult,
}

/// A crop in engine rank order, with a display percentage alongside the raw value.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct RankedCrop {
    /// 1-based position in the engine's ordering
    pub rank: usize,
    pub crop: String,
    pub compatibility: f64,
    /// e.g. "92.50%"
    pub compatibility_display: String,
}

fn ranked(scores: &[CropScore]) -> Vec<RankedCrop> {
    scores
        .iter()
        .enumerate()
        .map(|(i, score)| RankedCrop {
            rank: i + 1,
            crop: score.crop.clone(),
            compatibility: score.compatibility,
            compatibility_display: score.percentage_label(),
        })
        .collect()
}

/// Successful pipeline result.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct PredictionReport {
    pub status: ReportStatus,
    pub message: String,
    pub preview: bool,
    /// The conditions the engine was actually called with
    pub conditions: PredictionRequest,
    pub compatible_crops: Vec<RankedCrop>,
    pub incompatible_crops: Vec<RankedCrop>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<Warning>,
    pub audit: AuditStatus,
}

#[derive(Clone)]
pub struct PredictionPipeline {
    catalog: Arc<CompositionCatalog>,
    engine: Arc<dyn PredictionEngine>,
    audit: Arc<dyn AuditStore>,
}

impl PredictionPipeline {
    pub fn new(
        catalog: Arc<CompositionCatalog>,
        engine: Arc<dyn PredictionEngine>,
        audit: Arc<dyn AuditStore>,
    ) -> Self {
        Self {
            catalog,
            engine,
            audit,
        }
    }

    pub fn catalog(&self) -> &CompositionCatalog {
        &self.catalog
    }

    /// Run one request through the pipeline.
    pub async fn run(
        &self,
        session: &SessionContext,
        input: PredictionInput,
    ) -> Result<PredictionReport, PipelineError> {
        let decision = gate::authorize(session, input.is_preview());
        let session = match decision {
            GateDecision::Unauthenticated => return Err(PipelineError::Unauthenticated),
            GateDecision::PreviewDenied => return Err(PipelineError::PreviewDenied),
            GateDecision::PreviewAuthorized(s) | GateDecision::Authenticated(s) => s,
        };

        let mut warnings = Vec::new();
        let (request, resolution) = self
            .build_request(input)
            .map_err(PipelineError::InvalidParameter)?;
        if let Some(diagnostic) = resolution.diagnostic {
            warnings.push(Warning {
                kind: WarningKind::InvalidComposition,
                message: diagnostic,
            });
        }
        request.validate().map_err(PipelineError::InvalidParameter)?;

        let arguments = request.engine_arguments();
        let outcome = self.engine.invoke(&arguments).await;

        let (status, response) = match reconcile(outcome) {
            Classification::InvocationFailed(failure) => {
                tracing::error!(error = %failure, "prediction engine invocation failed");
                return Err(PipelineError::InvocationFailed(failure));
            }
            Classification::Malformed { raw, reason } => {
                tracing::error!(reason = %reason, raw_len = raw.len(), "malformed prediction engine output");
                return Err(PipelineError::Malformed { raw, reason });
            }
            Classification::EmptyResult(response) => (ReportStatus::EmptyResult, response),
            Classification::Success(response) => (ReportStatus::Success, response),
        };

        let audit = match persist_prediction(
            self.audit.as_ref(),
            session.user_id,
            &request,
            &response,
        )
        .await
        {
            PersistOutcome::Written(record_id) => AuditStatus::Written { record_id },
            PersistOutcome::SkippedPreview => AuditStatus::SkippedPreview,
            PersistOutcome::IdentityRequired => return Err(PipelineError::IdentityRequired),
            PersistOutcome::Failed(_) => {
                warnings.push(Warning {
                    kind: WarningKind::PersistenceFailure,
                    message: PERSISTENCE_WARNING.to_string(),
                });
                AuditStatus::Failed
            }
        };

        Ok(build_report(status, request, &response, warnings, audit))
    }

    fn build_request(
        &self,
        input: PredictionInput,
    ) -> Result<(PredictionRequest, Resolution), FieldError> {
        match input {
            PredictionInput::Interactive(form) => Ok(self.interactive_request(form)),
            PredictionInput::Preview(params) => self.preview_request(params),
        }
    }

    fn interactive_request(&self, form: PredictionForm) -> (PredictionRequest, Resolution) {
        let resolution = self.catalog.resolve(form.npk_option.trim());
        let request = PredictionRequest {
            composition_key: resolution.key.clone(),
            composition_label: resolution.label.clone(),
            nitrogen: f64::from(resolution.triple.nitrogen),
            phosphorus: f64::from(resolution.triple.phosphorus),
            potassium: f64::from(resolution.triple.potassium),
            climate: form.climate.trim().to_string(),
            humidity: form.humidity,
            ph: form.ph,
            rainfall: form.rainfall,
            soil_type: form.soil_type.trim().to_string(),
            topography: form.topography.trim().to_string(),
            water_availability: form.water_availability.trim().to_string(),
            is_preview: false,
        };
        (request, resolution)
    }

    /// Preview values come from the query set. The composition key still goes
    /// through the resolver; explicit nutrient values override its triple.
    fn preview_request(
        &self,
        params: PreviewParameters,
    ) -> Result<(PredictionRequest, Resolution), FieldError> {
        let key = params
            .npk_option
            .as_deref()
            .map(str::trim)
            .unwrap_or(self.catalog.default_key())
            .to_string();
        let resolution = self.catalog.resolve(&key);
        let text = |value: Option<String>| value.map(|v| v.trim().to_string()).unwrap_or_default();

        let request = PredictionRequest {
            composition_key: resolution.key.clone(),
            composition_label: resolution.label.clone(),
            nitrogen: params
                .nitrogen
                .unwrap_or(f64::from(resolution.triple.nitrogen)),
            phosphorus: params
                .phosphorus
                .unwrap_or(f64::from(resolution.triple.phosphorus)),
            potassium: params
                .potassium
                .unwrap_or(f64::from(resolution.triple.potassium)),
            climate: text(params.climate),
            humidity: required("humidity", params.humidity)?,
            ph: params.ph.unwrap_or(PREVIEW_DEFAULT_PH),
            rainfall: required("rainfall", params.rainfall)?,
            soil_type: text(params.soil_type),
            topography: text(params.topography),
            water_availability: text(params.water_availability),
            is_preview: true,
        };
        Ok((request, resolution))
    }
}

fn required(field: &'static str, value: Option<f64>) -> Result<f64, FieldError> {
    value.ok_or_else(|| FieldError {
        field,
        message: format!("{field} is required"),
        received: None,
    })
}

fn build_report(
    status: ReportStatus,
    conditions: PredictionRequest,
    response: &PredictionResponse,
    warnings: Vec<Warning>,
    audit: AuditStatus,
) -> PredictionReport {
    let message = match status {
        ReportStatus::Success => SUCCESS_MESSAGE,
        ReportStatus::EmptyResult => EMPTY_RESULT_MESSAGE,
    };
    PredictionReport {
        status,
        message: message.to_string(),
        preview: conditions.is_preview,
        conditions,
        compatible_crops: ranked(&response.compatible_crops),
        incompatible_crops: ranked(&response.incompatible_crops),
        warnings,
        audit,
    }
}
