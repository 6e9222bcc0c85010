// Static sound catalog: definitions are fixed at build/packaging time and
// never created or destroyed while the engine runs.

use crate::error::{AudioError, Result};
use serde::{Deserialize, Serialize};

/// Sound category. Drives the per-category loop behaviour: dense ambient
/// textures (nature) are overlapped without fades, tonal/rhythmic sounds
/// (ticking, breathing) are crossfaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoundCategory {
    Ticking,
    Breathing,
    Nature,
}

impl SoundCategory {
    /// Dense broadband content makes a fade audible as a dip, so these
    /// categories are overlapped bare.
    pub fn is_dense_texture(&self) -> bool {
        matches!(self, SoundCategory::Nature)
    }
}

/// Exactly one source kind per definition. Modelled as an enum so a
/// definition with zero or two sources cannot exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoundSource {
    /// Path of an asset bundled with the application
    Bundled(String),
    /// Remote content identifier, resolved to a download URL at play time
    Remote(String),
}

/// One catalog entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoundDefinition {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub category: SoundCategory,
    pub source: SoundSource,
}

/// Ordered list of definitions, loaded once from JSON
#[derive(Debug, Clone, Default)]
pub struct SoundCatalog {
    entries: Vec<SoundDefinition>,
}

impl SoundCatalog {
    pub fn new(entries: Vec<SoundDefinition>) -> Self {
        Self { entries }
    }

    /// Parse a catalog from its JSON representation: an ordered array of
    /// definition records.
    pub fn from_json(json: &str) -> Result<Self> {
        let entries: Vec<SoundDefinition> = serde_json::from_str(json)
            .map_err(|e| AudioError::Other(format!("Invalid catalog JSON: {}", e)))?;
        Ok(Self { entries })
    }

    pub fn get(&self, id: &str) -> Option<&SoundDefinition> {
        self.entries.iter().find(|d| d.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SoundDefinition> {
        self.entries.iter()
    }

    /// Entries of one category, in catalog order
    pub fn by_category(&self, category: SoundCategory) -> Vec<&SoundDefinition> {
        self.entries
            .iter()
            .filter(|d| d.category == category)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
