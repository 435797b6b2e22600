//! Bind parameter table.

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Ordered list of `(name, value)` pairs bound to a statement.
///
/// Names are unique. Binding an existing name replaces its value in place, so
/// the table order is the order names were first bound.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BindParams {
    entries: Vec<(String, Value)>,
}

impl BindParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Bind under a fresh synthetic name derived from `base` (`base_1`,
    /// `base_2`, ...) and return that name.
    pub fn bind_unique(&mut self, base: &str, value: impl Into<Value>) -> String {
        let mut n = 1;
        let name = loop {
            let candidate = format!("{}_{}", base, n);
            if self.get(&candidate).is_none() {
                break candidate;
            }
            n += 1;
        };
        self.entries.push((name.clone(), value.into()));
        name
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for BindParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = BindParams::new();
        for (k, v) in iter {
            params.bind(k, v);
        }
        params
    }
}
