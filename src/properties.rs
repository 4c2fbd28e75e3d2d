//! Property bags and routing hints carried by requests and responses.

use std::collections::BTreeSet;

/// Immutable, insertion-ordered key → value bag.
///
/// Holds backend-specific options on a request (`"encoding" = "utf-8"`) and
/// metadata on a response (`"modified" = "…"`). Values are strings; backends
/// parse what they need. Every "mutation" returns a new bag.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct Properties {
    entries: Vec<(String, String)>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a bag with `key` set to `value`. An existing key keeps its
    /// position and gets the new value.
    pub fn with(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let (key, value) = (key.into(), value.into());
        let mut entries = self.entries.clone();
        match entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => entries.push((key, value)),
        }
        Self { entries }
    }

    /// Returns a bag without `key`.
    pub fn without(&self, key: &str) -> Self {
        Self {
            entries: self.entries.iter().filter(|(k, _)| k != key).cloned().collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Properties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter().fold(Self::new(), |props, (k, v)| props.with(k, v))
    }
}

/// Routing filters applied on top of scheme and kind matching.
///
/// `name` selects one controller by exact name; `tags` selects controllers
/// sharing at least one tag with the filter. Both unset means "no filter".
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct RoutingHints {
    name: Option<String>,
    tags: Option<BTreeSet<String>>,
}

impl RoutingHints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Adds one tag to the filter set, creating it if needed.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.get_or_insert_with(BTreeSet::new).insert(tag.into());
        self
    }

    pub fn name(&self) -> Option<&str> { self.name.as_deref() }
    pub fn tags(&self) -> Option<&BTreeSet<String>> { self.tags.as_ref() }
}
