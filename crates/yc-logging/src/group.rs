// Copyright 2024-Present YANDEX LLC
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;

use crate::entry::{Entry, Resource};

/// Entries keyed by the resource they belong to. Arrival order is kept within
/// a resource; iteration order across resources is unspecified.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceGroups {
    groups: HashMap<Resource, Vec<Entry>>,
}

impl ResourceGroups {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, resource: Resource, entry: Entry) {
        self.groups.entry(resource).or_default().push(entry);
    }

    #[must_use]
    pub fn get(&self, resource: &Resource) -> Option<&[Entry]> {
        self.groups.get(resource).map(Vec::as_slice)
    }

    /// Number of distinct resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Total number of entries across all resources.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Resource, &[Entry])> {
        self.groups.iter().map(|(r, e)| (r, e.as_slice()))
    }
}

impl IntoIterator for ResourceGroups {
    type Item = (Resource, Vec<Entry>);
    type IntoIter = std::collections::hash_map::IntoIter<Resource, Vec<Entry>>;

    fn into_iter(self) -> Self::IntoIter {
        self.groups.into_iter()
    }
}

impl FromIterator<(Resource, Entry)> for ResourceGroups {
    fn from_iter<T: IntoIterator<Item = (Resource, Entry)>>(iter: T) -> Self {
        let mut groups = Self::new();
        for (resource, entry) in iter {
            groups.push(resource, entry);
        }
        groups
    }
}
