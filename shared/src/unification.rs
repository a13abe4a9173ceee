//! Code unification: equivalent product codes aggregated as one inventory item

use std::collections::{BTreeSet, HashMap};

/// Resolves a product code to the set of codes treated as the same item
///
/// Groups are disjoint; adding a group that overlaps existing ones merges
/// them. An unmapped code resolves to itself.
#[derive(Debug, Clone, Default)]
pub struct CodeUnifier {
    group_of: HashMap<String, usize>,
    groups: Vec<BTreeSet<String>>,
}

impl CodeUnifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(product_code, unification_code)` assignments
    ///
    /// Products sharing a unification code form one group.
    pub fn from_assignments<I, P, U>(assignments: I) -> Self
    where
        I: IntoIterator<Item = (P, U)>,
        P: Into<String>,
        U: Into<String>,
    {
        let mut by_key: HashMap<String, Vec<String>> = HashMap::new();
        for (product, key) in assignments {
            by_key.entry(key.into()).or_default().push(product.into());
        }

        let mut unifier = Self::new();
        let mut keys: Vec<_> = by_key.into_iter().collect();
        keys.sort_by(|a, b| a.0.cmp(&b.0));
        for (_, codes) in keys {
            unifier.add_group(codes);
        }
        unifier
    }

    /// Declare a set of codes as equivalent
    pub fn add_group<I, S>(&mut self, codes: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut merged: BTreeSet<String> = codes.into_iter().map(Into::into).collect();
        if merged.len() < 2 {
            return;
        }

        let touched: BTreeSet<usize> = merged
            .iter()
            .filter_map(|code| self.group_of.get(code).copied())
            .collect();
        for index in &touched {
            merged.extend(std::mem::take(&mut self.groups[*index]));
        }

        let index = self.groups.len();
        for code in &merged {
            self.group_of.insert(code.clone(), index);
        }
        self.groups.push(merged);
    }

    /// All codes equivalent to `code`, always including `code` itself
    pub fn resolve(&self, code: &str) -> BTreeSet<String> {
        match self.group_of.get(code) {
            Some(index) => self.groups[*index].clone(),
            None => BTreeSet::from([code.to_string()]),
        }
    }

    /// Representative code of the group: its smallest member
    pub fn canonical(&self, code: &str) -> String {
        self.group_of
            .get(code)
            .and_then(|index| self.groups[*index].first())
            .cloned()
            .unwrap_or_else(|| code.to_string())
    }

    pub fn is_unified(&self, a: &str, b: &str) -> bool {
        a == b
            || matches!(
                (self.group_of.get(a), self.group_of.get(b)),
                (Some(x), Some(y)) if x == y
            )
    }

    /// Non-trivial groups currently registered
    pub fn groups(&self) -> impl Iterator<Item = &BTreeSet<String>> {
        self.groups.iter().filter(|group| !group.is_empty())
    }
}
