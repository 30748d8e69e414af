//! Global build variables.
//!
//! The store is created from external overrides (`-D NAME=VALUE`) before the
//! build description runs. The build description may then read values and
//! provide defaults with [`VariableStore::set`], which never replaces a value
//! that is already present. Once execution starts the store is shared
//! read-only.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

/// Process-wide string variables with override precedence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableStore {
  values: BTreeMap<String, String>,
  overridden: BTreeSet<String>,
}

impl VariableStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Create a store seeded with external overrides.
  ///
  /// Later pairs win over earlier ones with the same name, matching how a
  /// repeated `-D` flag behaves on the command line.
  pub fn with_overrides<I, K, V>(overrides: I) -> Self
  where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
  {
    let mut store = Self::default();
    for (name, value) in overrides {
      let name = name.into();
      store.overridden.insert(name.clone());
      store.values.insert(name, value.into());
    }
    store
  }

  /// Set `name` to `value` unless it already has a value.
  ///
  /// Returns `true` if the value was stored.
  pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) -> bool {
    let name = name.into();
    if self.values.contains_key(&name) {
      debug!(var = %name, overridden = self.overridden.contains(&name), "variable already set, keeping value");
      return false;
    }
    self.values.insert(name, value.into());
    true
  }

  pub fn get(&self, name: &str) -> Option<&str> {
    self.values.get(name).map(String::as_str)
  }

  pub fn get_or<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
    self.get(name).unwrap_or(default)
  }

  /// Whether `name` came from an external override.
  pub fn is_overridden(&self, name: &str) -> bool {
    self.overridden.contains(name)
  }

  pub fn len(&self) -> usize {
    self.values.len()
  }

  pub fn is_empty(&self) -> bool {
    self.values.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
    self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
  }
}

/// Parse a `NAME=VALUE` override. A missing `=` yields an empty value.
pub fn parse_override(raw: &str) -> (String, String) {
  match raw.split_once('=') {
    Some((name, value)) => (name.to_string(), value.to_string()),
    None => (raw.to_string(), String::new()),
  }
}
