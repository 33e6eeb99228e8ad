//! Directive type to emergency-condition mapping, plus resolver settings.

use std::collections::BTreeMap;
use std::time::Duration;

use medx_core::DirectiveType;
use serde::{Deserialize, Serialize};

use crate::alerts::AlertConfig;

/// Fixed emergency instructions per directive type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmergencyConditionTable(BTreeMap<DirectiveType, Vec<String>>);

impl Default for EmergencyConditionTable {
    fn default() -> Self {
        let rows: [(DirectiveType, &[&str]); 5] = [
            (
                DirectiveType::Dnr,
                &["No resuscitation", "No mechanical ventilation", "Comfort care only"],
            ),
            (
                DirectiveType::OrganDonation,
                &["Preserve organ viability", "Notify organ procurement organization"],
            ),
            (DirectiveType::DataConsent, &[]),
            (DirectiveType::PowerOfAttorney, &["Contact designated healthcare agent"]),
            (DirectiveType::LivingWill, &["Follow documented end-of-life wishes"]),
        ];
        Self(
            rows.into_iter()
                .map(|(t, cs)| (t, cs.iter().map(|c| (*c).to_string()).collect()))
                .collect(),
        )
    }
}

impl EmergencyConditionTable {
    /// Conditions for a type; empty when the type has none.
    pub fn conditions_for(&self, directive_type: DirectiveType) -> &[String] {
        self.0.get(&directive_type).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Replace the row for one type.
    pub fn set(&mut self, directive_type: DirectiveType, conditions: Vec<String>) {
        self.0.insert(directive_type, conditions);
    }

    /// Overlay `overrides` on top of the defaults.
    pub fn with_overrides(mut self, overrides: BTreeMap<DirectiveType, Vec<String>>) -> Self {
        self.0.extend(overrides);
        self
    }
}

fn default_budget_ms() -> u64 {
    250
}

/// Resolver settings, read from the `emergency` config section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyConfig {
    /// Target end-to-end latency; also bounds the signing call.
    #[serde(default = "default_budget_ms")]
    pub latency_budget_ms: u64,
    /// Per-type replacements for the default condition rows.
    #[serde(default)]
    pub conditions: BTreeMap<DirectiveType, Vec<String>>,
    #[serde(default)]
    pub alerts: AlertConfig,
}

impl Default for EmergencyConfig {
    fn default() -> Self {
        Self {
            latency_budget_ms: default_budget_ms(),
            conditions: BTreeMap::new(),
            alerts: AlertConfig::default(),
        }
    }
}

impl EmergencyConfig {
    pub fn latency_budget(&self) -> Duration {
        Duration::from_millis(self.latency_budget_ms)
    }

    pub fn condition_table(&self) -> EmergencyConditionTable {
        EmergencyConditionTable::default().with_overrides(self.conditions.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dnr_row() {
        let t = EmergencyConditionTable::default();
        assert_eq!(
            t.conditions_for(DirectiveType::Dnr),
            ["No resuscitation", "No mechanical ventilation", "Comfort care only"]
        );
        assert!(t.conditions_for(DirectiveType::DataConsent).is_empty());
    }

    #[test]
    fn overrides_replace_single_rows() {
        let yaml = "latency_budget_ms: 100\nconditions:\n  DATA_CONSENT: [\"Hold release pending review\"]\n";
        let cfg: EmergencyConfig = serde_yaml::from_str(yaml).unwrap();
        let t = cfg.condition_table();
        assert_eq!(cfg.latency_budget(), Duration::from_millis(100));
        assert_eq!(t.conditions_for(DirectiveType::DataConsent), ["Hold release pending review"]);
        assert_eq!(t.conditions_for(DirectiveType::LivingWill).len(), 1);
        assert_eq!(cfg.alerts, AlertConfig::default());
    }
}
