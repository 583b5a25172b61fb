use log::{debug, info};

use std::collections::{BTreeMap, BTreeSet};

use crate::config::*;

/// An item dropped because at least one group ended in a tie.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct RemovedTie {
    pub item_number: ItemNumber,
    pub tied_first: bool,
    pub tied_second: bool,
    /// Empty when the first group has no vote for this item.
    pub first_counts: Vec<(String, u64)>,
    pub second_counts: Vec<(String, u64)>,
}

impl RemovedTie {
    pub fn first_count(&self, label: &str) -> u64 {
        count_in(&self.first_counts, label)
    }

    pub fn second_count(&self, label: &str) -> u64 {
        count_in(&self.second_counts, label)
    }
}

fn count_in(counts: &[(String, u64)], label: &str) -> u64 {
    counts
        .iter()
        .find(|(l, _)| l == label)
        .map(|(_, c)| *c)
        .unwrap_or(0)
}

/// An item tied in both groups.
#[derive(PartialEq, Debug, Clone)]
pub struct DoubleTie {
    pub item_number: ItemNumber,
    pub first: AggregatedItem,
    pub second: AggregatedItem,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Reconciliation {
    pub first_group: String,
    pub second_group: String,
    /// The items kept in the final dataset, as seen by each group. Both lists
    /// cover the same items in the same order.
    pub kept_first: Vec<AggregatedItem>,
    pub kept_second: Vec<AggregatedItem>,
    /// Every item tied in at least one group.
    pub removed: Vec<RemovedTie>,
    /// The items tied in both groups (a subset of `removed`).
    pub double_ties: Vec<DoubleTie>,
}

fn index(agg: &GroupAggregate) -> BTreeMap<ItemNumber, &AggregatedItem> {
    agg.items.iter().map(|i| (i.item_number, i)).collect()
}

fn is_tie(item: Option<&&AggregatedItem>) -> bool {
    item.map(|i| i.majority.is_tie()).unwrap_or(false)
}

/// Compares the majorities of two groups and drops the items that ended in a
/// tie in either of them.
///
/// An item missing from one group counts as having no votes there. Items
/// without votes are neither kept nor reported as ties.
pub fn reconcile(first: &GroupAggregate, second: &GroupAggregate) -> Reconciliation {
    let first_items = index(first);
    let second_items = index(second);
    let all_items: BTreeSet<ItemNumber> = first_items
        .keys()
        .chain(second_items.keys())
        .cloned()
        .collect();

    let mut kept_first: Vec<AggregatedItem> = Vec::new();
    let mut kept_second: Vec<AggregatedItem> = Vec::new();
    let mut removed: Vec<RemovedTie> = Vec::new();
    let mut double_ties: Vec<DoubleTie> = Vec::new();

    for item in all_items.iter() {
        let f = first_items.get(item);
        let s = second_items.get(item);
        let (tied_first, tied_second) = (is_tie(f), is_tie(s));

        if tied_first || tied_second {
            debug!(
                "reconcile: item {} removed (tie {}: {}, tie {}: {})",
                item, first.group, tied_first, second.group, tied_second
            );
            removed.push(RemovedTie {
                item_number: *item,
                tied_first,
                tied_second,
                first_counts: f.map(|i| i.label_counts.clone()).unwrap_or_default(),
                second_counts: s.map(|i| i.label_counts.clone()).unwrap_or_default(),
            });
            if let (true, true, Some(f), Some(s)) = (tied_first, tied_second, f, s) {
                double_ties.push(DoubleTie {
                    item_number: *item,
                    first: (*f).clone(),
                    second: (*s).clone(),
                });
            }
            continue;
        }

        match (f, s) {
            (Some(f), Some(s)) if f.majority.label().is_some() && s.majority.label().is_some() => {
                kept_first.push((*f).clone());
                kept_second.push((*s).clone());
            }
            _ => {
                debug!("reconcile: item {} lacks votes in one group", item);
            }
        }
    }

    info!(
        "reconcile: {} items kept, {} removed for ties ({} tied in both {} and {})",
        kept_first.len(),
        removed.len(),
        double_ties.len(),
        first.group,
        second.group
    );

    Reconciliation {
        first_group: first.group.clone(),
        second_group: second.group.clone(),
        kept_first,
        kept_second,
        removed,
        double_ties,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::majority::aggregate_item;

    fn trial(p: &str, item: ItemNumber, label: &str) -> Trial {
        Trial {
            participant_id: p.to_string(),
            item_number: item,
            start_ts: 0,
            end_ts: 1000,
            classification: label.to_string(),
            classified_at: 500,
            elapsed_seconds: 1.0,
        }
    }

    fn aggregate(group: &str, items: &[(ItemNumber, Vec<&str>)]) -> GroupAggregate {
        let items = items
            .iter()
            .map(|(item, votes)| {
                let trials: Vec<Trial> = votes
                    .iter()
                    .enumerate()
                    .map(|(idx, v)| trial(&format!("p{}", idx), *item, v))
                    .collect();
                let refs: Vec<&Trial> = trials.iter().collect();
                aggregate_item(*item, &refs)
            })
            .collect();
        GroupAggregate {
            group: group.to_string(),
            items,
        }
    }

    #[test]
    fn tie_in_one_group_removes_the_item() {
        let m = aggregate(
            "m",
            &[
                (7, vec!["positiva", "negativa", "positiva", "negativa"]),
                (8, vec!["neutra"]),
            ],
        );
        let f = aggregate(
            "f",
            &[
                (7, vec!["positiva", "positiva", "positiva"]),
                (8, vec!["neutra", "neutra", "positiva"]),
            ],
        );
        let r = reconcile(&m, &f);
        assert_eq!(r.kept_first.len(), 1);
        assert_eq!(r.kept_first[0].item_number, 8);
        assert_eq!(r.kept_second[0].item_number, 8);
        assert_eq!(
            r.removed,
            vec![RemovedTie {
                item_number: 7,
                tied_first: true,
                tied_second: false,
                first_counts: vec![("positiva".to_string(), 2), ("negativa".to_string(), 2)],
                second_counts: vec![("positiva".to_string(), 3)],
            }]
        );
        assert_eq!(r.removed[0].second_count("negativa"), 0);
        assert!(r.double_ties.is_empty());
    }

    #[test]
    fn double_ties_are_a_subset_of_removed() {
        let m = aggregate("m", &[(1, vec!["a", "b"]), (2, vec!["a", "b"])]);
        let f = aggregate("f", &[(1, vec!["a", "b"]), (2, vec!["a"])]);
        let r = reconcile(&m, &f);
        assert_eq!(r.removed.len(), 2);
        assert_eq!(r.double_ties.len(), 1);
        assert_eq!(r.double_ties[0].item_number, 1);
        assert!(r.kept_first.is_empty());
    }

    #[test]
    fn item_missing_from_a_group_is_zero_filled() {
        let m = aggregate("m", &[(3, vec!["positiva"])]);
        let f = aggregate("f", &[(4, vec!["positiva", "negativa"])]);
        let r = reconcile(&m, &f);
        assert!(r.kept_first.is_empty());
        assert_eq!(r.removed.len(), 1);
        let removed = &r.removed[0];
        assert_eq!(removed.item_number, 4);
        assert!(!removed.tied_first);
        assert!(removed.tied_second);
        assert_eq!(removed.first_count("positiva"), 0);
        assert_eq!(removed.second_count("positiva"), 1);
    }

    #[test]
    fn items_without_votes_are_not_ties() {
        let empty = GroupAggregate {
            group: "m".to_string(),
            items: vec![aggregate_item(5, &[])],
        };
        let f = aggregate("f", &[(5, vec!["neutra"])]);
        let r = reconcile(&empty, &f);
        assert!(r.removed.is_empty());
        assert!(r.kept_first.is_empty());
    }

    #[test]
    fn kept_items_are_ordered_by_item() {
        let m = aggregate("m", &[(9, vec!["a"]), (2, vec!["b"]), (5, vec!["a"])]);
        let f = aggregate("f", &[(5, vec!["a"]), (9, vec!["b"]), (2, vec!["b"])]);
        let r = reconcile(&m, &f);
        let items: Vec<ItemNumber> = r.kept_second.iter().map(|i| i.item_number).collect();
        assert_eq!(items, vec![2, 5, 9]);
        assert_eq!(r.first_group, "m");
        assert_eq!(r.second_group, "f");
    }
}
