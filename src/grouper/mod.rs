//! Work item partitioning
//!
//! Splits weighted work items into a fixed number of groups, either balanced
//! by weight (longest-processing-time-first) or round-robin in input order.

use thiserror::Error;

use crate::models::{Group, WorkItem};

/// Partitioning errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum GroupError {
    #[error("Number of groups must be at least 1")]
    NoGroups,
}

/// Partition `items` into exactly `num_groups` groups.
///
/// With `sorted` the groups are balanced by weight, otherwise items are dealt
/// out round-robin in their original order.
pub fn partition(
    items: Vec<WorkItem>,
    num_groups: usize,
    sorted: bool,
) -> Result<Vec<Group>, GroupError> {
    if sorted {
        in_even_groups_by_size(items, num_groups)
    } else {
        in_groups(items, num_groups)
    }
}

/// Deal items out to groups round-robin, ignoring weight
pub fn in_groups(items: Vec<WorkItem>, num_groups: usize) -> Result<Vec<Group>, GroupError> {
    let mut groups = empty_groups(num_groups)?;

    for (index, item) in items.into_iter().enumerate() {
        groups[index % num_groups].push(item);
    }

    Ok(groups)
}

/// Heaviest item first, always into the currently lightest group
pub fn in_even_groups_by_size(
    mut items: Vec<WorkItem>,
    num_groups: usize,
) -> Result<Vec<Group>, GroupError> {
    let mut groups = empty_groups(num_groups)?;

    // stable: equal weights keep input order
    items.sort_by(|a, b| b.weight.total_cmp(&a.weight));

    for item in items {
        let lightest = lightest_group(&groups);
        groups[lightest].push(item);
    }

    Ok(groups)
}

fn empty_groups(num_groups: usize) -> Result<Vec<Group>, GroupError> {
    if num_groups == 0 {
        return Err(GroupError::NoGroups);
    }
    Ok((0..num_groups).map(|_| Group::new()).collect())
}

/// Index of the group with the smallest total weight; ties go to the lowest index
fn lightest_group(groups: &[Group]) -> usize {
    let mut best = 0;
    for (index, group) in groups.iter().enumerate().skip(1) {
        if group.total_weight() < groups[best].total_weight() {
            best = index;
        }
    }
    best
}
