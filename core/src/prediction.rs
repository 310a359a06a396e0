use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Longest accepted free-text condition value.
pub const MAX_TEXT_FIELD_LEN: usize = 64;

/// Neutral pH, used when a preview request leaves it out.
pub const PREVIEW_DEFAULT_PH: f64 = 7.0;

/// Interactive submission from a signed-in grower.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct PredictionForm {
    /// Composition key, e.g. "balanced-40-20-10". Unknown keys fall back to the default.
    pub npk_option: String,
    pub climate: String,
    /// Relative humidity in percent (0-100)
    pub humidity: f64,
    /// Soil pH (0-14)
    pub ph: f64,
    /// Rainfall in mm
    pub rainfall: f64,
    pub soil_type: String,
    pub topography: String,
    pub water_availability: String,
}

/// Admin preview parameters, taken from the query string.
///
/// Missing nutrient values come from the resolved composition; missing pH
/// defaults to neutral.
#[derive(Debug, Clone, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PreviewParameters {
    /// Must be `true` for the request to be treated as a preview
    #[serde(default)]
    pub admin_view: Option<String>,
    #[serde(default)]
    pub npk_option: Option<String>,
    #[serde(default)]
    pub nitrogen: Option<f64>,
    #[serde(default)]
    pub phosphorus: Option<f64>,
    #[serde(default)]
    pub potassium: Option<f64>,
    #[serde(default)]
    pub climate: Option<String>,
    #[serde(default)]
    pub humidity: Option<f64>,
    #[serde(default)]
    pub ph: Option<f64>,
    #[serde(default)]
    pub rainfall: Option<f64>,
    #[serde(default)]
    pub soil_type: Option<String>,
    #[serde(default)]
    pub topography: Option<String>,
    #[serde(default)]
    pub water_availability: Option<String>,
}

/// Which parameter channel a request arrived on.
#[derive(Debug, Clone)]
pub enum PredictionInput {
    Interactive(PredictionForm),
    Preview(PreviewParameters),
}

impl PredictionInput {
    pub fn is_preview(&self) -> bool {
        matches!(self, PredictionInput::Preview(_))
    }
}

/// Normalized parameters for one engine invocation. Never persisted as-is.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct PredictionRequest {
    pub composition_key: String,
    pub composition_label: String,
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
    pub is_preview: bool,
}

/// A parameter that failed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
    pub received: Option<serde_json::Value>,
}

impl PredictionRequest {
    /// The ten engine arguments, in the fixed positional order the engine expects:
    /// nitrogen, phosphorus, potassium, climate, humidity, pH, rainfall,
    /// soil_type, topography, water_availability.
    pub fn engine_arguments(&self) -> EngineArguments {
        EngineArguments([
            format_number(self.nitrogen),
            format_number(self.phosphorus),
            format_number(self.potassium),
            self.climate.clone(),
            format_number(self.humidity),
            format_number(self.ph),
            format_number(self.rainfall),
            self.soil_type.clone(),
            self.topography.clone(),
            self.water_availability.clone(),
        ])
    }

    pub fn validate(&self) -> Result<(), FieldError> {
        check_range("nitrogen", self.nitrogen, 0.0, f64::MAX)?;
        check_range("phosphorus", self.phosphorus, 0.0, f64::MAX)?;
        check_range("potassium", self.potassium, 0.0, f64::MAX)?;
        check_range("humidity", self.humidity, 0.0, 100.0)?;
        check_range("ph", self.ph, 0.0, 14.0)?;
        check_range("rainfall", self.rainfall, 0.0, f64::MAX)?;
        check_text("climate", &self.climate)?;
        check_text("soil_type", &self.soil_type)?;
        check_text("topography", &self.topography)?;
        check_text("water_availability", &self.water_availability)?;
        Ok(())
    }
}

fn check_range(field: &'static str, value: f64, min: f64, max: f64) -> Result<(), FieldError> {
    if !value.is_finite() || value < min || value > max {
        let bounds = if max == f64::MAX {
            format!("a number >= {}", format_number(min))
        } else {
            format!(
                "a number between {} and {}",
                format_number(min),
                format_number(max)
            )
        };
        return Err(FieldError {
            field,
            message: format!("{field} must be {bounds}"),
            received: serde_json::Number::from_f64(value).map(serde_json::Value::Number),
        });
    }
    Ok(())
}

fn check_text(field: &'static str, value: &str) -> Result<(), FieldError> {
    if value.is_empty() {
        return Err(FieldError {
            field,
            message: format!("{field} must not be empty"),
            received: None,
        });
    }
    if value.chars().count() > MAX_TEXT_FIELD_LEN {
        return Err(FieldError {
            field,
            message: format!("{field} must be at most {MAX_TEXT_FIELD_LEN} characters"),
            received: Some(serde_json::Value::String(value.to_string())),
        });
    }
    if value.chars().any(char::is_control) {
        return Err(FieldError {
            field,
            message: format!("{field} must not contain control characters"),
            received: None,
        });
    }
    Ok(())
}

/// Shortest round-trippable rendering: `40.0` → `"40"`, `6.5` → `"6.5"`.
pub fn format_number(value: f64) -> String {
    value.to_string()
}

/// Ten positional engine arguments. Each element is an opaque token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineArguments(pub [String; 10]);

impl EngineArguments {
    pub const NAMES: [&'static str; 10] = [
        "nitrogen",
        "phosphorus",
        "potassium",
        "climate",
        "humidity",
        "ph",
        "rainfall",
        "soil_type",
        "topography",
        "water_availability",
    ];

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

/// One crop and its compatibility percentage as reported by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CropScore {
    pub crop: String,
    /// Percentage in [0, 100], passed through exactly as the engine reported it
    pub compatibility: f64,
}

impl CropScore {
    /// Two-decimal percentage, e.g. `92.50%`.
    pub fn percentage_label(&self) -> String {
        format!("{:.2}%", self.compatibility)
    }
}

/// Parsed engine document. Both sequences keep the engine's rank order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, ToSchema)]
pub struct PredictionResponse {
    pub compatible_crops: Vec<CropScore>,
    pub incompatible_crops: Vec<CropScore>,
}

impl PredictionResponse {
    pub fn is_empty(&self) -> bool {
        self.compatible_crops.is_empty() && self.incompatible_crops.is_empty()
    }
}
