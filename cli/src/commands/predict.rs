use clap::Args;
use serde_json::json;

use crate::util::{api_request, require_token};

#[derive(Args, Debug, Clone)]
pub struct PredictArgs {
    /// Composition key, see `croprec compositions`
    #[arg(long, default_value = "balanced-40-20-10")]
    pub npk_option: String,
    #[arg(long)]
    pub climate: String,
    /// Relative humidity, 0 to 100
    #[arg(long)]
    pub humidity: f64,
    /// Soil pH, 0 to 14
    #[arg(long)]
    pub ph: f64,
    /// Rainfall in mm
    #[arg(long)]
    pub rainfall: f64,
    #[arg(long)]
    pub soil_type: String,
    #[arg(long)]
    pub topography: String,
    #[arg(long)]
    pub water_availability: String,
}

impl PredictArgs {
    pub fn body(&self) -> serde_json::Value {
        json!({
            "npk_option": self.npk_option,
            "climate": self.climate,
            "humidity": self.humidity,
            "ph": self.ph,
            "rainfall": self.rainfall,
            "soil_type": self.soil_type,
            "topography": self.topography,
            "water_availability": self.water_availability,
        })
    }
}

/// Raw values for admin preview; anything left out is defaulted by the server.
#[derive(Args, Debug, Clone, Default)]
pub struct PreviewArgs {
    #[arg(long)]
    pub npk_option: Option<String>,
    #[arg(long)]
    pub nitrogen: Option<f64>,
    #[arg(long)]
    pub phosphorus: Option<f64>,
    #[arg(long)]
    pub potassium: Option<f64>,
    #[arg(long)]
    pub climate: Option<String>,
    #[arg(long)]
    pub humidity: Option<f64>,
    #[arg(long)]
    pub ph: Option<f64>,
    #[arg(long)]
    pub rainfall: Option<f64>,
    #[arg(long)]
    pub soil_type: Option<String>,
    #[arg(long)]
    pub topography: Option<String>,
    #[arg(long)]
    pub water_availability: Option<String>,
}

impl PreviewArgs {
    pub fn query(&self) -> Vec<(String, String)> {
        let mut query = vec![("admin_view".to_string(), "true".to_string())];
        let mut push = |name: &str, value: Option<String>| {
            if let Some(value) = value {
                query.push((name.to_string(), value));
            }
        };
        push("npk_option", self.npk_option.clone());
        push("nitrogen", self.nitrogen.map(|v| v.to_string()));
        push("phosphorus", self.phosphorus.map(|v| v.to_string()));
        push("potassium", self.potassium.map(|v| v.to_string()));
        push("climate", self.climate.clone());
        push("humidity", self.humidity.map(|v| v.to_string()));
        push("ph", self.ph.map(|v| v.to_string()));
        push("rainfall", self.rainfall.map(|v| v.to_string()));
        push("soil_type", self.soil_type.clone());
        push("topography", self.topography.clone());
        push("water_availability", self.water_availability.clone());
        query
    }
}

pub async fn compositions(api_url: &str) -> i32 {
    api_request(api_url, reqwest::Method::GET, "/v1/compositions", None, None, &[]).await
}

pub async fn predict(api_url: &str, args: &PredictArgs) -> i32 {
    let token = require_token();
    api_request(
        api_url,
        reqwest::Method::POST,
        "/v1/predictions",
        Some(&token),
        Some(args.body()),
        &[],
    )
    .await
}

pub async fn preview(api_url: &str, args: &PreviewArgs) -> i32 {
    let token = require_token();
    api_request(
        api_url,
        reqwest::Method::GET,
        "/v1/predictions/preview",
        Some(&token),
        None,
        &args.query(),
    )
    .await
}

pub async fn history(api_url: &str, limit: Option<u32>) -> i32 {
    let token = require_token();
    let query: Vec<(String, String)> = limit
        .map(|l| vec![("limit".to_string(), l.to_string())])
        .unwrap_or_default();
    api_request(
        api_url,
        reqwest::Method::GET,
        "/v1/predictions",
        Some(&token),
        None,
        &query,
    )
    .await
}
