//! Scenario configuration.
//!
//! A scenario is a list of steps. Each step carries the reference price for
//! that moment and the actions the script performs before the simulated
//! venue matches resting orders against the price.

use std::path::Path;

use serde::Deserialize;

use helm_core::{InstrumentId, PositionSide, Price};
use helm_engine::EngineConfig;
use helm_orders::IntentLegs;

use crate::error::{ReplayError, ReplayResult};

#[derive(Debug, Clone, Deserialize)]
pub struct ReplayConfig {
    pub instrument: InstrumentId,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub strategy: StrategyConfig,
    pub steps: Vec<ScenarioStep>,
}

/// Settings for the built-in logging strategy.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StrategyConfig {
    /// Move the stop-loss to the entry price after a profitable reduction.
    #[serde(default)]
    pub breakeven_on_reduce: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioStep {
    pub timestamp_ms: u64,
    pub price: Price,
    #[serde(default)]
    pub actions: Vec<Action>,
}

/// Scripted action. Exit sides default to the open or pending position.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    Entry {
        side: PositionSide,
        legs: IntentLegs,
    },
    StopLoss {
        #[serde(default)]
        side: Option<PositionSide>,
        legs: IntentLegs,
    },
    TakeProfit {
        #[serde(default)]
        side: Option<PositionSide>,
        legs: IntentLegs,
    },
    CancelAll,
    Liquidate,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Entry { .. } => "entry",
            Self::StopLoss { .. } => "stop_loss",
            Self::TakeProfit { .. } => "take_profit",
            Self::CancelAll => "cancel_all",
            Self::Liquidate => "liquidate",
        }
    }
}

impl ReplayConfig {
    /// Parse a scenario from TOML text.
    pub fn from_toml(content: &str) -> ReplayResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ReplayError::Config(format!("Failed to parse scenario: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a specific file.
    pub fn from_file(path: impl AsRef<Path>) -> ReplayResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ReplayError::Config(format!("Failed to read scenario: {e}")))?;
        Self::from_toml(&content)
    }

    fn validate(&self) -> ReplayResult<()> {
        if self.steps.is_empty() {
            return Err(ReplayError::Config("scenario has no steps".to_string()));
        }
        for pair in self.steps.windows(2) {
            if pair[1].timestamp_ms < pair[0].timestamp_ms {
                return Err(ReplayError::Config(format!(
                    "step timestamps go backwards: {} after {}",
                    pair[1].timestamp_ms, pair[0].timestamp_ms
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const SCENARIO: &str = r#"
        instrument = "BTC-USD"

        [engine]
        fee_rate = "0.001"

        [strategy]
        breakeven_on_reduce = true

        [[steps]]
        timestamp_ms = 1
        price = "100"
        actions = [
            { kind = "entry", side = "long", legs = ["10", "100"] },
            { kind = "take_profit", legs = [["5", "120"], ["5", "140"]] },
        ]

        [[steps]]
        timestamp_ms = 2
        price = "120"

        [[steps]]
        timestamp_ms = 3
        price = "90"
        actions = [{ kind = "liquidate" }]
    "#;

    #[test]
    fn test_parses_scenario() {
        let config = ReplayConfig::from_toml(SCENARIO).unwrap();
        assert_eq!(config.instrument.as_str(), "BTC-USD");
        assert_eq!(config.engine.fee_rate, dec!(0.001));
        assert!(config.strategy.breakeven_on_reduce);
        assert_eq!(config.steps.len(), 3);
        assert_eq!(config.steps[0].actions.len(), 2);
        assert!(matches!(
            &config.steps[0].actions[1],
            Action::TakeProfit { side: None, legs } if legs.legs().len() == 2
        ));
        assert!(config.steps[1].actions.is_empty());
        assert!(matches!(config.steps[2].actions[0], Action::Liquidate));
    }

    #[test]
    fn test_rejects_backwards_time() {
        let err = ReplayConfig::from_toml(
            r#"
            instrument = "X"
            [[steps]]
            timestamp_ms = 5
            price = "1"
            [[steps]]
            timestamp_ms = 4
            price = "1"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ReplayError::Config(_)));
    }

    #[test]
    fn test_rejects_empty_scenario() {
        let err = ReplayConfig::from_toml("instrument = \"X\"\nsteps = []").unwrap_err();
        assert!(matches!(err, ReplayError::Config(_)));
    }
}
