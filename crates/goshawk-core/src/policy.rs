//! Per event class policy decisions.
//!
//! The control plane loads a decision for each event class; probes resolve it
//! once per syscall entry with an O(1) lookup and carry it inside the pending
//! operation. A resolved policy is immutable: configuration reloads bump the
//! generation counter and only affect later syscalls.

use serde::{Deserialize, Serialize};
use strum::EnumString;

use crate::{
    event::EventClass,
    pdk::{ConfigError, ModuleConfig},
};

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumString,
    strum::Display,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PolicyMode {
    /// Emit every occurrence of the event class.
    #[default]
    Accept,
    /// Drop occurrences of the event class at emission time.
    Discard,
    /// Emit occurrences matching the downstream filter rules.
    Filter,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub mode: PolicyMode,
}

/// O(1) lookup of the configured decision for an event class.
#[derive(Debug, Clone)]
pub struct PolicyResolver {
    decisions: [Policy; EventClass::COUNT],
    generation: u64,
}

impl Default for PolicyResolver {
    fn default() -> Self {
        Self {
            decisions: [Policy::default(); EventClass::COUNT],
            generation: 0,
        }
    }
}

impl PolicyResolver {
    /// Build a resolver from module configuration. Each event class reads its
    /// decision from a `<class>_policy` key, defaulting to accept.
    pub fn from_config(config: &ModuleConfig) -> Result<Self, ConfigError> {
        let mut resolver = Self::default();
        resolver.reload(config)?;
        Ok(resolver)
    }

    /// Apply a new configuration generation. Already resolved policies are
    /// unaffected.
    pub fn reload(&mut self, config: &ModuleConfig) -> Result<(), ConfigError> {
        for class in [EventClass::Chown] {
            let key = format!("{class}_policy");
            let mode: PolicyMode = config.with_default(&key, PolicyMode::default())?;
            self.decisions[class.index()] = Policy { mode };
        }
        self.generation += 1;
        Ok(())
    }

    pub fn resolve(&self, class: EventClass) -> Policy {
        self.decisions[class.index()]
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_defaults_to_accept() {
        let resolver = PolicyResolver::from_config(&ModuleConfig::default()).unwrap();
        assert_eq!(resolver.resolve(EventClass::Chown).mode, PolicyMode::Accept);
        assert_eq!(resolver.generation(), 1);
    }

    #[test]
    fn reload_changes_decision_and_generation() {
        let mut config = ModuleConfig::default();
        config.insert("chown_policy".to_string(), "discard".to_string());
        let mut resolver = PolicyResolver::from_config(&config).unwrap();
        assert_eq!(
            resolver.resolve(EventClass::Chown).mode,
            PolicyMode::Discard
        );

        config.insert("chown_policy".to_string(), "filter".to_string());
        resolver.reload(&config).unwrap();
        assert_eq!(resolver.resolve(EventClass::Chown).mode, PolicyMode::Filter);
        assert_eq!(resolver.generation(), 2);
    }

    #[test]
    fn invalid_mode_is_a_config_error() {
        let mut config = ModuleConfig::default();
        config.insert("chown_policy".to_string(), "reject".to_string());
        assert!(PolicyResolver::from_config(&config).is_err());
    }
}
