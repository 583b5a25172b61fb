use log::debug;

use std::collections::{BTreeSet, HashMap};

use crate::config::*;
use crate::groups::GroupAssignment;
use crate::majority::VoteTally;

/// The participants represented in the wide rows: the first `quota` members
/// of each group, in order of first appearance.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct QuotaSelection {
    pub groups: Vec<(String, Vec<String>)>,
}

pub fn select_participants(
    assignment: &GroupAssignment,
    group_labels: &[&str],
    quota: usize,
) -> QuotaSelection {
    let groups = group_labels
        .iter()
        .map(|g| {
            let members: Vec<String> = assignment
                .members(g)
                .take(quota)
                .map(|p| p.to_string())
                .collect();
            debug!("select_participants: group {}: {:?}", g, members);
            (g.to_string(), members)
        })
        .collect();
    QuotaSelection { groups }
}

/// What a selected participant answered for an item.
#[derive(PartialEq, Debug, Clone)]
pub struct SlotValue {
    pub participant_id: String,
    pub classification: String,
    pub elapsed_seconds: f64,
}

/// The slots of one group in an item row.
#[derive(PartialEq, Debug, Clone)]
pub struct GroupSlots {
    pub group: String,
    /// One entry per selected participant, by rank. `None` when that
    /// participant has no trial for the item.
    pub slots: Vec<Option<SlotValue>>,
    pub tally: VoteTally,
}

impl GroupSlots {
    pub fn majority(&self) -> Majority {
        self.tally.majority()
    }

    /// The slot of a 1-based rank.
    pub fn rank(&self, rank: usize) -> Option<&SlotValue> {
        rank.checked_sub(1)
            .and_then(|idx| self.slots.get(idx))
            .and_then(|s| s.as_ref())
    }
}

/// The column names of a slot: `<group><rank>_class` and `<group><rank>_tempo`.
pub fn slot_names(group: &str, rank: usize) -> (String, String) {
    (
        format!("{}{}_class", group, rank),
        format!("{}{}_tempo", group, rank),
    )
}

/// The wide form of an item.
#[derive(PartialEq, Debug, Clone)]
pub struct ItemRow {
    pub item_number: ItemNumber,
    pub groups: Vec<GroupSlots>,
}

impl ItemRow {
    pub fn with_offset(&self, offset: ItemNumber) -> ItemRow {
        ItemRow {
            item_number: self.item_number + offset,
            groups: self.groups.clone(),
        }
    }

    pub fn group(&self, group: &str) -> Option<&GroupSlots> {
        self.groups.iter().find(|g| g.group == group)
    }
}

/// Builds one row per item found among the trials, in increasing item order.
pub fn assemble_rows(trials: &[Trial], selection: &QuotaSelection) -> Vec<ItemRow> {
    let by_key: HashMap<(&str, ItemNumber), &Trial> = trials
        .iter()
        .rev()
        .map(|t| ((t.participant_id.as_str(), t.item_number), t))
        .collect();
    let items: BTreeSet<ItemNumber> = trials.iter().map(|t| t.item_number).collect();

    items
        .iter()
        .map(|item| {
            let groups = selection
                .groups
                .iter()
                .map(|(group, members)| {
                    let slots: Vec<Option<SlotValue>> = members
                        .iter()
                        .map(|p| {
                            by_key.get(&(p.as_str(), *item)).map(|t| SlotValue {
                                participant_id: p.clone(),
                                classification: t.classification.clone(),
                                elapsed_seconds: t.elapsed_seconds,
                            })
                        })
                        .collect();
                    let tally = VoteTally::from_votes(
                        slots.iter().flatten().map(|s| s.classification.as_str()),
                    );
                    GroupSlots {
                        group: group.clone(),
                        slots,
                        tally,
                    }
                })
                .collect();
            ItemRow {
                item_number: *item,
                groups,
            }
        })
        .collect()
}

/// The smallest and largest item numbers of a batch.
pub fn item_range(trials: &[Trial]) -> Option<(ItemNumber, ItemNumber)> {
    let min = trials.iter().map(|t| t.item_number).min()?;
    let max = trials.iter().map(|t| t.item_number).max()?;
    Some((min, max))
}

/// The offsets that make item numbers unique across successive batches.
///
/// A batch is shifted by the largest (shifted) item number of the batch
/// before it. Batches with item numbers below 1 are shifted further so that
/// they still start strictly above that number. Empty batches do not move
/// the running maximum.
pub fn batch_offsets(ranges: &[Option<(ItemNumber, ItemNumber)>]) -> Vec<ItemNumber> {
    let mut previous_max: Option<ItemNumber> = None;
    let mut offsets: Vec<ItemNumber> = Vec::new();
    for range in ranges.iter() {
        let offset = match (previous_max, range) {
            (None, _) => 0,
            (Some(prev), Some((min, _))) => prev + (1 - min).max(0),
            (Some(prev), None) => prev,
        };
        if let Some((_, max)) = range {
            previous_max = Some(max + offset);
        }
        offsets.push(offset);
    }
    offsets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::EventLogBuilder;
    use crate::groups::{classify_groups, GroupVocabulary};
    use crate::matcher::match_trials;

    fn batch() -> (Vec<Trial>, GroupAssignment) {
        let mut b = EventLogBuilder::new();
        for (idx, (p, g)) in [
            ("f-a", "Feminino"),
            ("m-a", "Masculino"),
            ("f-b", "Feminino"),
            ("f-c", "Feminino"),
            ("f-d", "Feminino"),
            ("f-e", "Feminino"),
            ("m-b", "Masculino"),
        ]
        .iter()
        .enumerate()
        {
            let t0 = idx as i64 * 10_000;
            b = b.participant(p).group_select(g, t0).trial(1, "positiva", t0, t0 + 1000);
            // Only some participants answered item 2.
            if idx % 2 == 0 {
                b = b.trial(2, "negativa", t0 + 2000, t0 + 3500);
            }
        }
        let events = b.build();
        let trials = match_trials(&events, &TallyRules::DEFAULT_RULES).trials;
        (trials, classify_groups(&events, &GroupVocabulary::gender()))
    }

    #[test]
    fn quota_keeps_the_first_members() {
        let (_, groups) = batch();
        let sel = select_participants(&groups, &["f", "m"], 4);
        let expected: Vec<(String, Vec<String>)> = vec![
            (
                "f".to_string(),
                vec!["f-a", "f-b", "f-c", "f-d"]
                    .into_iter()
                    .map(String::from)
                    .collect(),
            ),
            ("m".to_string(), vec!["m-a".to_string(), "m-b".to_string()]),
        ];
        assert_eq!(sel.groups, expected);
    }

    #[test]
    fn rows_never_exceed_the_quota() {
        let (trials, groups) = batch();
        let sel = select_participants(&groups, &["f", "m"], 4);
        let rows = assemble_rows(&trials, &sel);
        assert_eq!(rows.len(), 2);
        for row in rows.iter() {
            for g in row.groups.iter() {
                assert!(g.slots.len() <= 4);
                assert!(g.slots.iter().flatten().all(|s| s.participant_id != "f-e"));
            }
        }
        let f = rows[0].group("f").unwrap();
        assert_eq!(f.slots.len(), 4);
        assert_eq!(f.majority(), Majority::Label("positiva".to_string()));
        assert_eq!(f.tally.top_count(), 4);
        assert_eq!(rows[0].group("m").unwrap().slots.len(), 2);
    }

    #[test]
    fn missing_trials_leave_absent_slots() {
        let (trials, groups) = batch();
        let sel = select_participants(&groups, &["f", "m"], 4);
        let rows = assemble_rows(&trials, &sel);
        let item2 = &rows[1];
        assert_eq!(item2.item_number, 2);
        // f-c sits at an odd position and skipped item 2.
        let f = item2.group("f").unwrap();
        assert_eq!(f.rank(1).map(|s| s.elapsed_seconds), Some(1.5));
        assert!(f.rank(3).is_none());
        assert_eq!(f.tally.total(), 3);
        // m-a (1) and m-b (6): only m-b answered item 2.
        let m = item2.group("m").unwrap();
        assert!(m.rank(1).is_none());
        assert_eq!(m.rank(2).map(|s| s.classification.as_str()), Some("negativa"));
        assert_eq!(m.tally.total(), 1);
        assert!(m.rank(0).is_none());
        assert!(m.rank(3).is_none());
    }

    #[test]
    fn slot_names_follow_group_and_rank() {
        assert_eq!(
            slot_names("m", 3),
            ("m3_class".to_string(), "m3_tempo".to_string())
        );
    }

    #[test]
    fn offsets_keep_items_unique_across_batches() {
        let offsets = batch_offsets(&[Some((1, 40)), Some((1, 38)), None, Some((3, 10))]);
        assert_eq!(offsets, vec![0, 40, 78, 78]);
        // The second batch starts strictly after the first one.
        assert!(1 + offsets[1] > 40);
        assert!(3 + offsets[3] > 38 + offsets[1]);
    }

    #[test]
    fn offsets_handle_items_below_one() {
        let offsets = batch_offsets(&[Some((0, 5)), Some((-2, 3))]);
        assert_eq!(offsets, vec![0, 8]);
        assert_eq!(-2 + offsets[1], 6);
    }

    #[test]
    fn row_offset_only_moves_the_item() {
        let (trials, groups) = batch();
        let sel = select_participants(&groups, &["f", "m"], 2);
        let row = assemble_rows(&trials, &sel).remove(0);
        let moved = row.with_offset(100);
        assert_eq!(moved.item_number, 101);
        assert_eq!(moved.groups, row.groups);
        assert_eq!(item_range(&trials), Some((1, 2)));
    }
}
