//! Result gathering and input-order projection.

use crate::extract::QueryResult;
use dashmap::DashMap;

/// Concurrent name → result map filled by workers as jobs finish.
#[derive(Debug, Default)]
pub struct ResultCollector {
    results: DashMap<String, QueryResult>,
}

impl ResultCollector {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            results: DashMap::with_capacity(capacity),
        }
    }

    /// Names are unique per batch, so each key has exactly one writer.
    pub fn insert(&self, result: QueryResult) {
        let previous = self.results.insert(result.name.clone(), result);
        debug_assert!(previous.is_none(), "duplicate ROI name in one batch");
    }

    pub fn contains(&self, name: &str) -> bool {
        self.results.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Project results into `order`, skipping names that never completed.
    /// Results whose names are not in `order` are discarded.
    pub fn into_ordered<'n, I>(self, order: I) -> Vec<QueryResult>
    where
        I: IntoIterator<Item = &'n str>,
    {
        order
            .into_iter()
            .filter_map(|name| self.results.remove(name).map(|(_, result)| result))
            .collect()
    }
}

/// Per-ROI results of one batch, in the caller's input order.
///
/// ROIs that intersect no tile are absent from `results` and listed in
/// `unresolved`; ROIs skipped by a batch timeout are listed in `skipped`.
#[derive(Debug, Default)]
pub struct OutputCollection {
    pub results: Vec<QueryResult>,
    pub unresolved: Vec<String>,
    pub skipped: Vec<String>,
}

impl OutputCollection {
    pub fn iter(&self) -> std::slice::Iter<'_, QueryResult> {
        self.results.iter()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&QueryResult> {
        self.results.iter().find(|r| r.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.results.iter().map(|r| r.name.as_str()).collect()
    }

    pub fn total_points(&self) -> usize {
        self.results.iter().map(QueryResult::len).sum()
    }

    /// Whether any result carries tile read errors.
    pub fn has_errors(&self) -> bool {
        self.results.iter().any(QueryResult::is_partial)
    }
}

impl IntoIterator for OutputCollection {
    type Item = QueryResult;
    type IntoIter = std::vec::IntoIter<QueryResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.into_iter()
    }
}

impl<'a> IntoIterator for &'a OutputCollection {
    type Item = &'a QueryResult;
    type IntoIter = std::slice::Iter<'a, QueryResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.iter()
    }
}
