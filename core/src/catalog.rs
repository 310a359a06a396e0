//! Mineral composition catalog and resolver.
//!
//! The catalog is an ordered, immutable table built once at start-up and shared
//! read-only (behind an `Arc`) by every request.

use serde::Serialize;
use utoipa::ToSchema;

pub const DEFAULT_COMPOSITION_KEY: &str = "balanced-40-20-10";

/// Similarity above which the diagnostic suggests the closest known key.
const SUGGESTION_THRESHOLD: f64 = 0.8;

/// Nitrogen / phosphorus / potassium ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, ToSchema)]
pub struct NutrientTriple {
    pub nitrogen: u32,
    pub phosphorus: u32,
    pub potassium: u32,
}

impl NutrientTriple {
    pub const fn new(nitrogen: u32, phosphorus: u32, potassium: u32) -> Self {
        Self {
            nitrogen,
            phosphorus,
            potassium,
        }
    }
}

impl std::fmt::Display for NutrientTriple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.nitrogen, self.phosphorus, self.potassium)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CatalogEntry {
    key: String,
    triple: NutrientTriple,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("composition key '{0}' appears more than once")]
    DuplicateKey(String),
    #[error("compositions '{first}' and '{second}' share the same nutrient triple")]
    DuplicateTriple { first: String, second: String },
    #[error("default composition '{0}' is not in the catalog")]
    MissingDefault(String),
}

/// Result of resolving a composition key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Resolution {
    /// Canonical catalog key the triple came from.
    pub key: String,
    /// Display label for the canonical key.
    pub label: String,
    pub triple: NutrientTriple,
    /// Set when the requested key was unknown and the default was used.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

impl Resolution {
    pub fn defaulted(&self) -> bool {
        self.diagnostic.is_some()
    }
}

/// One catalog row as exposed to clients.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CompositionOption {
    pub key: String,
    pub label: String,
    /// Label with the ratio appended, e.g. `Balanced 40 20 10 (N:40, P:20, K:10)`.
    pub option_label: String,
    pub nitrogen: u32,
    pub phosphorus: u32,
    pub potassium: u32,
    pub is_default: bool,
}

#[derive(Debug, Clone)]
pub struct CompositionCatalog {
    entries: Vec<CatalogEntry>,
    default_index: usize,
}

impl CompositionCatalog {
    /// Build a catalog, enforcing unique keys, unique triples and a resolvable default.
    pub fn new<I, K>(entries: I, default_key: &str) -> Result<Self, CatalogError>
    where
        I: IntoIterator<Item = (K, NutrientTriple)>,
        K: Into<String>,
    {
        let mut built: Vec<CatalogEntry> = Vec::new();
        for (key, triple) in entries {
            let key = key.into();
            if built.iter().any(|e| e.key == key) {
                return Err(CatalogError::DuplicateKey(key));
            }
            if let Some(existing) = built.iter().find(|e| e.triple == triple) {
                return Err(CatalogError::DuplicateTriple {
                    first: existing.key.clone(),
                    second: key,
                });
            }
            built.push(CatalogEntry { key, triple });
        }

        let default_index = built
            .iter()
            .position(|e| e.key == default_key)
            .ok_or_else(|| CatalogError::MissingDefault(default_key.to_string()))?;

        Ok(Self {
            entries: built,
            default_index,
        })
    }

    /// The fixed fertilizer table offered to growers.
    pub fn standard() -> Self {
        let entries = [
            ("balanced-40-20-10", NutrientTriple::new(40, 20, 10)),
            ("balanced-10-10-10", NutrientTriple::new(10, 10, 10)),
            ("high-n-20-5-5", NutrientTriple::new(20, 5, 5)),
            ("high-p-10-20-10", NutrientTriple::new(10, 20, 10)),
            ("high-k-5-10-20", NutrientTriple::new(5, 10, 20)),
            ("starter-18-24-12", NutrientTriple::new(18, 24, 12)),
            ("flowering-5-10-10", NutrientTriple::new(5, 10, 10)),
            ("vegetative-growth-20-10-10", NutrientTriple::new(20, 10, 10)),
        ];
        Self::new(entries, DEFAULT_COMPOSITION_KEY).expect("invalid standard composition catalog")
    }

    pub fn default_key(&self) -> &str {
        &self.entries[self.default_index].key
    }

    pub fn default_triple(&self) -> NutrientTriple {
        self.entries[self.default_index].triple
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|e| e.key == key)
    }

    /// Keys in catalog order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.key.as_str())
    }

    /// Exact-match lookup; unknown keys fall back to the default triple with a
    /// diagnostic. Never fails.
    pub fn resolve(&self, requested: &str) -> Resolution {
        if let Some(entry) = self.entries.iter().find(|e| e.key == requested) {
            return Resolution {
                key: entry.key.clone(),
                label: display_label(&entry.key),
                triple: entry.triple,
                diagnostic: None,
            };
        }

        let fallback = &self.entries[self.default_index];
        let mut diagnostic = format!(
            "Invalid NPK composition selected. Using default ({}).",
            fallback.triple
        );
        if let Some(suggestion) = self.closest_key(requested) {
            diagnostic.push_str(&format!(" Did you mean '{suggestion}'?"));
        }

        tracing::warn!(
            requested_key = requested,
            default_key = %fallback.key,
            "unknown composition key, using default"
        );

        Resolution {
            key: fallback.key.clone(),
            label: display_label(&fallback.key),
            triple: fallback.triple,
            diagnostic: Some(diagnostic),
        }
    }

    pub fn options(&self) -> Vec<CompositionOption> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, e)| {
                let label = display_label(&e.key);
                CompositionOption {
                    option_label: format!(
                        "{label} (N:{}, P:{}, K:{})",
                        e.triple.nitrogen, e.triple.phosphorus, e.triple.potassium
                    ),
                    label,
                    key: e.key.clone(),
                    nitrogen: e.triple.nitrogen,
                    phosphorus: e.triple.phosphorus,
                    potassium: e.triple.potassium,
                    is_default: i == self.default_index,
                }
            })
            .collect()
    }

    fn closest_key(&self, requested: &str) -> Option<&str> {
        let needle = requested.trim().to_lowercase();
        if needle.is_empty() {
            return None;
        }
        self.entries
            .iter()
            .map(|e| (e.key.as_str(), strsim::normalized_levenshtein(&needle, &e.key)))
            .filter(|(_, score)| *score >= SUGGESTION_THRESHOLD)
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(key, _)| key)
    }
}

/// `balanced-40-20-10` → `Balanced 40 20 10`.
pub fn display_label(key: &str) -> String {
    key.split('-')
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
