//! Work item and group models
//!
//! Defines weighted work items and the groups they are partitioned into.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Weight assigned to items with no usable estimate
pub const DEFAULT_WEIGHT: f64 = 1.0;

/// A single independently runnable unit of work (usually one test file)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: String,
    pub weight: f64,
}

impl WorkItem {
    /// Create a work item; negative or non-finite weights are clamped to the default
    pub fn new(id: impl Into<String>, weight: f64) -> Self {
        let weight = if weight.is_finite() && weight >= 0.0 {
            weight
        } else {
            DEFAULT_WEIGHT
        };

        Self {
            id: id.into(),
            weight,
        }
    }

    /// Create a work item with the default weight
    pub fn unweighted(id: impl Into<String>) -> Self {
        Self::new(id, DEFAULT_WEIGHT)
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:.2})", self.id, self.weight)
    }
}

/// Items assigned to one worker
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Group {
    items: Vec<WorkItem>,
    total_weight: f64,
}

impl Group {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: WorkItem) {
        self.total_weight += item.weight;
        self.items.push(item);
    }

    pub fn items(&self) -> &[WorkItem] {
        &self.items
    }

    /// Identifiers in assignment order
    pub fn ids(&self) -> Vec<&str> {
        self.items.iter().map(|i| i.id.as_str()).collect()
    }

    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl FromIterator<WorkItem> for Group {
    fn from_iter<T: IntoIterator<Item = WorkItem>>(iter: T) -> Self {
        let mut group = Group::new();
        for item in iter {
            group.push(item);
        }
        group
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_work_item_clamps_invalid_weight() {
        assert_eq!(WorkItem::new("a", -3.0).weight, DEFAULT_WEIGHT);
        assert_eq!(WorkItem::new("a", f64::NAN).weight, DEFAULT_WEIGHT);
        assert_eq!(WorkItem::new("a", 0.0).weight, 0.0);
        assert_eq!(WorkItem::new("a", 12.5).weight, 12.5);
    }

    #[test]
    fn test_group_tracks_total_weight() {
        let group: Group = vec![WorkItem::new("a", 2.0), WorkItem::new("b", 3.5)]
            .into_iter()
            .collect();

        assert_eq!(group.len(), 2);
        assert_eq!(group.total_weight(), 5.5);
        assert_eq!(group.ids(), vec!["a", "b"]);
    }

    #[test]
    fn test_empty_group() {
        let group = Group::new();
        assert!(group.is_empty());
        assert_eq!(group.total_weight(), 0.0);
    }
}
