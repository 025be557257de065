use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DifficultyTier {
    Easy,
    Medium,
    Hard,
    VeryHard,
}

impl DifficultyTier {
    pub const ALL: [Self; 4] = [Self::Easy, Self::Medium, Self::Hard, Self::VeryHard];
}

impl fmt::Display for DifficultyTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
            Self::VeryHard => "veryHard",
        })
    }
}

pub const DEFAULT_MOVE_TIME_MS: u64 = 5000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Sent as `Skill Level`.
    pub strength_level: u8,
    pub search_depth_hint: u8,
    /// When set the engine is asked to limit its strength to this Elo.
    pub target_rating: Option<u32>,
    pub move_time_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        resolve(DifficultyTier::Medium)
    }
}

#[must_use]
pub const fn resolve(tier: DifficultyTier) -> EngineConfig {
    let (strength_level, search_depth_hint, target_rating) = match tier {
        DifficultyTier::Easy => (1, 1, None),
        DifficultyTier::Medium => (5, 5, None),
        DifficultyTier::Hard => (10, 10, None),
        DifficultyTier::VeryHard => (20, 20, Some(2000)),
    };
    EngineConfig {
        strength_level,
        search_depth_hint,
        target_rating,
        move_time_ms: DEFAULT_MOVE_TIME_MS,
    }
}

/// `setoption` lines for `config`, in the order they must be sent.
#[must_use]
pub fn to_engine_directives(config: &EngineConfig) -> Vec<String> {
    let mut directives = vec![format!(
        "setoption name Skill Level value {}",
        config.strength_level
    )];
    if let Some(rating) = config.target_rating {
        directives.push("setoption name UCI_LimitStrength value true".to_string());
        directives.push(format!("setoption name UCI_Elo value {rating}"));
    }
    directives
}

/// Partial overrides for one tier. Absent fields keep the tier's value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineOverrides {
    pub strength_level: Option<u8>,
    pub search_depth_hint: Option<u8>,
    pub target_rating: Option<u32>,
    pub move_time_ms: Option<u64>,
    /// Multiplies the move time after `move_time_ms` is applied.
    pub move_time_scale: Option<f32>,
}

impl EngineConfig {
    #[must_use]
    pub fn with_overrides(self, overrides: &EngineOverrides) -> Self {
        let move_time_ms = overrides.move_time_ms.unwrap_or(self.move_time_ms);
        Self {
            strength_level: overrides.strength_level.unwrap_or(self.strength_level),
            search_depth_hint: overrides
                .search_depth_hint
                .unwrap_or(self.search_depth_hint),
            target_rating: overrides.target_rating.or(self.target_rating),
            move_time_ms: apply_scale(move_time_ms, overrides.move_time_scale),
        }
    }

    /// Resolves `tier` and applies the overrides found in `json_str`.
    ///
    /// # Errors
    ///
    /// Returns the parse error when `json_str` is not an overrides object.
    pub fn load_from_json(tier: DifficultyTier, json_str: &str) -> Result<Self, serde_json::Error> {
        let overrides: EngineOverrides = serde_json::from_str(json_str)?;
        Ok(resolve(tier).with_overrides(&overrides))
    }
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
fn apply_scale(default_val: u64, scale: Option<f32>) -> u64 {
    scale
        .filter(|s| s.is_finite() && *s > 0.0)
        .map_or(default_val, |s| (default_val as f64 * f64::from(s)) as u64)
}
