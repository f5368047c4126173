use std::{env, fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::AllocationError;

/// How a trial's result is turned into a loss value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringMode {
    /// Sum of `size * rank` over seated parties
    TierSum,
    /// Like `TierSum`, but carried debt makes a bad tier cost more
    CompensationWeighted,
    /// Total compensation the allocation would hand out
    LedgerTotal,
}

/// Order in which candidate sessions inside one tier are examined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOrder {
    Random,
    /// Most free seats first
    MostRoom,
    /// Furthest below optimal occupancy first
    ClosestToOptimal,
    /// Fewest first-choice requests first
    LeastPopular,
}

/// Which tiers of a token holder are elevated above plain tiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenScope {
    TopTier,
    AllTiers,
}

/// What happens to a party whose every preference is "no-go"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnplaceablePolicy {
    /// Reject the input before any trial runs
    Fail,
    /// Emit an explicit unassigned row for the party
    Unassign,
}

/// Raw preference scale. `no_go` is the bottom of the scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferenceScale {
    pub no_go: u8,
    pub neutral: u8,
    pub max: u8,
}

impl Default for PreferenceScale {
    fn default() -> Self {
        PreferenceScale { no_go: 0, neutral: 3, max: 5 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocatorConfig {
    pub n_trials: usize,
    pub random_seed_base: u64,
    pub allow_displacement: bool,
    pub scoring_mode: ScoringMode,
    pub session_order: SessionOrder,
    pub token_scope: TokenScope,
    pub unplaceable_policy: UnplaceablePolicy,
    pub repair_underfilled: bool,
    pub relocate_gamemasters: bool,
    pub prioritize_debt: bool,
    pub parallel: bool,
    pub preference_scale: PreferenceScale,
    pub cancelled_session_penalty: i64,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        AllocatorConfig {
            n_trials: 500,
            random_seed_base: 100,
            allow_displacement: true,
            scoring_mode: ScoringMode::TierSum,
            session_order: SessionOrder::Random,
            token_scope: TokenScope::TopTier,
            unplaceable_policy: UnplaceablePolicy::Fail,
            repair_underfilled: true,
            relocate_gamemasters: true,
            prioritize_debt: false,
            parallel: true,
            preference_scale: PreferenceScale::default(),
            cancelled_session_penalty: 10,
        }
    }
}

impl AllocatorConfig {
    /// Seed of the trial with the given index
    pub fn trial_seed(&self, trial: usize) -> u64 {
        self.random_seed_base.wrapping_add(trial as u64)
    }

    /// Applies `ALLOCATOR_TRIALS`, `ALLOCATOR_SEED` and `ALLOCATOR_SCORING`
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(n_trials) = try_load("ALLOCATOR_TRIALS") {
            self.n_trials = n_trials;
        }
        if let Some(seed) = try_load("ALLOCATOR_SEED") {
            self.random_seed_base = seed;
        }
        if let Some(mode) = try_load("ALLOCATOR_SCORING") {
            self.scoring_mode = mode;
        }
        self
    }

    pub fn validate(&self) -> Result<(), AllocationError> {
        if self.n_trials == 0 {
            return Err(AllocationError::InvalidConfig("n_trials must be at least 1".to_string()));
        }
        let scale = &self.preference_scale;
        if !(scale.no_go < scale.neutral && scale.neutral <= scale.max) {
            return Err(AllocationError::InvalidConfig(format!(
                "preference scale must satisfy no_go < neutral <= max, got {}/{}/{}",
                scale.no_go, scale.neutral, scale.max
            )));
        }
        if self.cancelled_session_penalty < 0 {
            return Err(AllocationError::InvalidConfig(
                "cancelled_session_penalty must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

fn try_load<T: FromStr>(key: &str) -> Option<T>
where
    T::Err: Display,
{
    let raw = env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => {
            info!("{key} set to {raw}");
            Some(value)
        }
        Err(e) => {
            warn!("Invalid {key} value {raw:?}: {e}, keeping configured value");
            None
        }
    }
}

impl FromStr for ScoringMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "tier_sum" => Ok(ScoringMode::TierSum),
            "compensation_weighted" => Ok(ScoringMode::CompensationWeighted),
            "ledger_total" => Ok(ScoringMode::LedgerTotal),
            other => Err(format!("unknown scoring mode '{other}'")),
        }
    }
}

impl FromStr for SessionOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "random" => Ok(SessionOrder::Random),
            "most_room" => Ok(SessionOrder::MostRoom),
            "closest_to_optimal" => Ok(SessionOrder::ClosestToOptimal),
            "least_popular" => Ok(SessionOrder::LeastPopular),
            other => Err(format!("unknown session order '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AllocatorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.trial_seed(0), 100);
        assert_eq!(config.trial_seed(7), 107);
    }

    #[test]
    fn zero_trials_is_rejected() {
        let config = AllocatorConfig { n_trials: 0, ..Default::default() };
        assert!(matches!(config.validate(), Err(AllocationError::InvalidConfig(_))));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: AllocatorConfig =
            serde_json::from_str(r#"{"n_trials": 20, "scoring_mode": "ledger_total"}"#).unwrap();
        assert_eq!(config.n_trials, 20);
        assert_eq!(config.scoring_mode, ScoringMode::LedgerTotal);
        assert!(config.allow_displacement);
        assert_eq!(config.preference_scale.neutral, 3);
    }

    #[test]
    fn scoring_mode_parses_cli_spellings() {
        assert_eq!("tier-sum".parse::<ScoringMode>(), Ok(ScoringMode::TierSum));
        assert_eq!("Compensation_Weighted".parse::<ScoringMode>(), Ok(ScoringMode::CompensationWeighted));
        assert!("best".parse::<ScoringMode>().is_err());
    }
}
