//! Router preferences and decisions.

use serde::{Deserialize, Serialize};

use crate::catalog::ProviderKey;
use crate::error::{Error, Result};

fn default_quality_bias() -> f64 {
    50.0
}

/// Caller preferences that tilt routing between quality and cost/speed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterPreferences {
    /// 0 = cheapest/fastest, 100 = best quality
    #[serde(default = "default_quality_bias")]
    pub quality_bias: f64,

    #[serde(default)]
    pub cost_cap_enabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_cost_usd: Option<f64>,

    #[serde(default)]
    pub latency_cap_enabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_latency_ms: Option<u64>,
}

impl Default for RouterPreferences {
    fn default() -> Self {
        Self {
            quality_bias: default_quality_bias(),
            cost_cap_enabled: false,
            max_cost_usd: None,
            latency_cap_enabled: false,
            max_latency_ms: None,
        }
    }
}

impl RouterPreferences {
    /// `quality_bias` scaled to 0.0..=1.0.
    pub fn quality_factor(&self) -> f64 {
        self.quality_bias / 100.0
    }

    /// Cost cap, only when enabled.
    pub fn cost_cap(&self) -> Option<f64> {
        self.max_cost_usd.filter(|_| self.cost_cap_enabled)
    }

    /// Latency cap, only when enabled.
    pub fn latency_cap(&self) -> Option<u64> {
        self.max_latency_ms.filter(|_| self.latency_cap_enabled)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=100.0).contains(&self.quality_bias) {
            return Err(Error::validation(format!(
                "quality_bias must be within 0..=100, got {}",
                self.quality_bias
            )));
        }
        if let Some(cost) = self.max_cost_usd
            && !(cost > 0.0 && cost.is_finite())
        {
            return Err(Error::validation("preferences.max_cost_usd must be positive"));
        }
        if self.max_latency_ms == Some(0) {
            return Err(Error::validation("preferences.max_latency_ms must be positive"));
        }
        Ok(())
    }
}

/// Provider + model pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelChoice {
    pub provider: ProviderKey,
    pub model_id: String,
}

/// One scored model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterCandidate {
    pub provider: ProviderKey,
    pub model_id: String,
    pub score: f64,
    pub reasons: Vec<String>,
}

/// Outcome of one routing pass. Candidates are sorted by descending score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterDecision {
    pub chosen: ModelChoice,
    pub candidates: Vec<RouterCandidate>,
    pub token_estimate: u64,
    pub reasoning: String,
}

impl RouterDecision {
    pub fn validate(&self) -> Result<()> {
        let Some(top) = self.candidates.first() else {
            return Err(Error::validation("router decision has no candidates"));
        };
        if top.model_id != self.chosen.model_id || top.provider != self.chosen.provider {
            return Err(Error::validation(
                "router decision must choose its top-scored candidate",
            ));
        }
        if self.candidates.iter().any(|c| !c.score.is_finite()) {
            return Err(Error::validation("router candidate score is not finite"));
        }
        if self.candidates.windows(2).any(|w| w[0].score < w[1].score) {
            return Err(Error::validation(
                "router candidates must be sorted by descending score",
            ));
        }
        Ok(())
    }
}
