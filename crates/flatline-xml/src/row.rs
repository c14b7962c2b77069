use std::collections::{HashMap, HashSet};

/// One flattened record: keys in first-insertion order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Row {
    fields: Vec<(String, String)>,
    index: HashMap<String, usize>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert unless the key is already populated. Returns whether the
    /// value was stored.
    pub fn insert_if_absent(&mut self, key: String, value: String) -> bool {
        if self.index.contains_key(&key) {
            return false;
        }
        self.index.insert(key.clone(), self.fields.len());
        self.fields.push((key, value));
        true
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.index.get(key).map(|&i| self.fields[i].1.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Values laid out against `headers`, empty where a key is missing.
    pub fn values_for<'a>(&'a self, headers: &'a [String]) -> impl Iterator<Item = &'a str> + 'a {
        headers.iter().map(|h| self.get(h).unwrap_or(""))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (k, v) in iter {
            row.insert_if_absent(k.into(), v.into());
        }
        row
    }
}

/// Ordered, deduplicated union of row keys.
#[derive(Clone, Debug, Default)]
pub struct HeaderSet {
    order: Vec<String>,
    seen: HashSet<String>,
}

impl HeaderSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, row: &Row) {
        for key in row.keys() {
            if !self.seen.contains(key) {
                self.seen.insert(key.to_string());
                self.order.push(key.to_string());
            }
        }
    }

    pub fn as_slice(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn into_vec(self) -> Vec<String> {
        self.order
    }
}
