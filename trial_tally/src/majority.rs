use log::debug;

use std::collections::BTreeMap;

use crate::config::*;
use crate::groups::GroupAssignment;

/// The number of votes received by each label.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct VoteTally {
    // Sorted by decreasing count, then by order of first appearance.
    counts: Vec<(String, u64)>,
}

impl VoteTally {
    /// Counts the votes. Absent votes are simply not passed in.
    pub fn from_votes<'a, I>(votes: I) -> VoteTally
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut counts: Vec<(String, u64)> = Vec::new();
        for v in votes {
            match counts.iter_mut().find(|(l, _)| l == v) {
                Some((_, c)) => *c += 1,
                None => counts.push((v.to_string(), 1)),
            }
        }
        // Stable: labels with equal counts stay in order of appearance.
        counts.sort_by(|a, b| b.1.cmp(&a.1));
        VoteTally { counts }
    }

    /// The most voted label.
    ///
    /// This is a tie as soon as the two best labels have the same number of
    /// votes, however many labels or voters there are. A single vote is
    /// always a majority.
    pub fn majority(&self) -> Majority {
        match self.counts.as_slice() {
            [] => Majority::NoVotes,
            [(_, first), (_, second), ..] if first == second => Majority::Tie,
            [(label, _), ..] => Majority::Label(label.clone()),
        }
    }

    /// The count of the best label (shared by all the best labels on a tie).
    pub fn top_count(&self) -> u64 {
        self.counts.first().map(|(_, c)| *c).unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().map(|(_, c)| *c).sum()
    }

    pub fn count_for(&self, label: &str) -> u64 {
        self.counts
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, c)| *c)
            .unwrap_or(0)
    }

    pub fn counts(&self) -> &[(String, u64)] {
        &self.counts
    }
}

/// Arithmetic mean of the values that are present and not NaN.
pub fn mean_of<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = f64>,
{
    let (sum, n) = values
        .into_iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0u64), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        None
    } else {
        Some(sum / n as f64)
    }
}

/// Aggregates the trials of one item.
pub fn aggregate_item(item_number: ItemNumber, trials: &[&Trial]) -> AggregatedItem {
    let tally = VoteTally::from_votes(trials.iter().map(|t| t.classification.as_str()));
    AggregatedItem {
        item_number,
        majority: tally.majority(),
        total_votes: tally.total(),
        label_counts: tally.counts,
        mean_elapsed: mean_of(trials.iter().map(|t| t.elapsed_seconds)),
    }
}

/// Aggregates, item by item, the trials of all the participants of a group.
///
/// There is no quota here: every participant assigned to the group votes.
pub fn aggregate_group(trials: &[Trial], assignment: &GroupAssignment, group: &str) -> GroupAggregate {
    let mut by_item: BTreeMap<ItemNumber, Vec<&Trial>> = BTreeMap::new();
    for t in trials
        .iter()
        .filter(|t| assignment.group_of(&t.participant_id) == Some(group))
    {
        by_item.entry(t.item_number).or_default().push(t);
    }
    let items: Vec<AggregatedItem> = by_item
        .iter()
        .map(|(item, ts)| aggregate_item(*item, ts))
        .collect();
    debug!(
        "aggregate_group: group {}: {} items, {} ties",
        group,
        items.len(),
        items.iter().filter(|i| i.majority.is_tie()).count()
    );
    GroupAggregate {
        group: group.to_string(),
        items,
    }
}
