//! Configuration diff guard.
//!
//! Unique responsibility: decide whether a requested configuration change is
//! already satisfied by the current environment, and compute the minimal set of
//! option updates/removals when it is not.
//!
//! This module is intentionally pure:
//! - No remote calls,
//! - Values compared in their canonical string form (the platform stores strings),
//! - Deterministic output order (keys are kept sorted).
//!
//! Key property: idempotence. Applying a change that is already in place yields
//! an empty mutation, so the caller issues no write at all.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::beanstalk_api::{
    AUTOSCALING_NAMESPACE, MAX_SIZE_OPTION, MIN_SIZE_OPTION, OptionRemoval, OptionSetting,
    OptionUpdate,
};

/// Desired state for a set of keys: `Some(value)` to set, `None` to remove.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DesiredChange {
    entries: BTreeMap<String, Option<String>>,
}

impl DesiredChange {
    /// Create an empty change.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request `key` to hold `value` (stored in canonical string form).
    #[must_use]
    pub fn set(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.entries.insert(key.into(), Some(value.to_string()));
        self
    }

    /// Request `key` to be absent.
    #[must_use]
    pub fn remove(mut self, key: impl Into<String>) -> Self {
        self.entries.insert(key.into(), None);
        self
    }

    /// Insert a raw entry.
    pub fn insert(&mut self, key: impl Into<String>, value: Option<String>) {
        self.entries.insert(key.into(), value);
    }

    /// Whether the change names no key.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of keys named by the change.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Iterate entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.entries
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_deref()))
    }
}

impl<K: Into<String>> FromIterator<(K, Option<String>)> for DesiredChange {
    fn from_iter<I: IntoIterator<Item = (K, Option<String>)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// Minimal mutation turning the current configuration into the desired one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mutation {
    /// Keys to set, with their new value.
    pub updates: Vec<(String, String)>,
    /// Keys to remove.
    pub removals: Vec<String>,
}

impl Mutation {
    /// Whether the mutation does nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty() && self.removals.is_empty()
    }

    /// Convert into remote option changes scoped to `namespace`.
    #[must_use]
    pub fn into_option_changes(self, namespace: &str) -> (Vec<OptionUpdate>, Vec<OptionRemoval>) {
        let updates = self
            .updates
            .into_iter()
            .map(|(option_name, value)| OptionUpdate {
                namespace: namespace.to_string(),
                option_name,
                value,
            })
            .collect();

        let removals = self
            .removals
            .into_iter()
            .map(|option_name| OptionRemoval {
                namespace: namespace.to_string(),
                option_name,
            })
            .collect();

        (updates, removals)
    }
}

/// Whether a single key requires action.
fn key_needs_action(current: &HashMap<String, String>, key: &str, desired: Option<&str>) -> bool {
    desired.map_or_else(
        || current.contains_key(key),
        |value| current.get(key).map(String::as_str) != Some(value),
    )
}

/// Returns true iff at least one key of `desired` is not already satisfied.
#[must_use]
pub fn needs_update(current: &HashMap<String, String>, desired: &DesiredChange) -> bool {
    desired
        .iter()
        .any(|(key, value)| key_needs_action(current, key, value))
}

/// Partition the unsatisfied keys of `desired` into updates and removals.
///
/// Keys that already match are left out of both lists.
#[must_use]
pub fn compute_mutation(current: &HashMap<String, String>, desired: &DesiredChange) -> Mutation {
    let mut mutation = Mutation::default();

    for (key, value) in desired.iter() {
        if !key_needs_action(current, key, value) {
            continue;
        }
        match value {
            Some(v) => mutation.updates.push((key.to_string(), v.to_string())),
            None => mutation.removals.push(key.to_string()),
        }
    }

    mutation
}

/// Project the settings of one namespace to a key/value map.
///
/// A setting without value is kept with an empty string: the key exists.
#[must_use]
pub fn option_values(settings: &[OptionSetting], namespace: &str) -> HashMap<String, String> {
    settings
        .iter()
        .filter(|s| s.namespace == namespace)
        .map(|s| (s.option_name.clone(), s.value.clone().unwrap_or_default()))
        .collect()
}

// ============================================================================
// Scale
// ============================================================================

/// Instance count bounds of an environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScaleRange {
    /// Minimum instance count.
    pub min: u32,
    /// Maximum instance count.
    pub max: u32,
}

impl ScaleRange {
    /// Create a range from explicit bounds.
    #[must_use]
    pub const fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    /// Range pinned to a single instance count.
    #[must_use]
    pub const fn fixed(count: u32) -> Self {
        Self {
            min: count,
            max: count,
        }
    }

    /// Whether `min <= max`.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.min <= self.max
    }
}

impl fmt::Display for ScaleRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.min, self.max)
    }
}

/// Requested scale: a fixed instance count or an explicit range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scale {
    /// Exactly this many instances (min = max).
    Fixed(u32),
    /// Explicit bounds.
    Range(ScaleRange),
}

impl Scale {
    /// Normalize to a range.
    #[must_use]
    pub const fn normalize(self) -> ScaleRange {
        match self {
            Self::Fixed(count) => ScaleRange::fixed(count),
            Self::Range(range) => range,
        }
    }
}

impl From<u32> for Scale {
    fn from(count: u32) -> Self {
        Self::Fixed(count)
    }
}

impl From<ScaleRange> for Scale {
    fn from(range: ScaleRange) -> Self {
        Self::Range(range)
    }
}

impl From<(u32, u32)> for Scale {
    fn from((min, max): (u32, u32)) -> Self {
        Self::Range(ScaleRange::new(min, max))
    }
}

/// Option updates moving `current` to `desired`, or `None` when they are equal.
#[must_use]
pub fn scale_updates(current: ScaleRange, desired: ScaleRange) -> Option<Vec<OptionUpdate>> {
    if current == desired {
        return None;
    }

    Some(vec![
        OptionUpdate {
            namespace: AUTOSCALING_NAMESPACE.to_string(),
            option_name: MIN_SIZE_OPTION.to_string(),
            value: desired.min.to_string(),
        },
        OptionUpdate {
            namespace: AUTOSCALING_NAMESPACE.to_string(),
            option_name: MAX_SIZE_OPTION.to_string(),
            value: desired.max.to_string(),
        },
    ])
}
