/*!
Trial matching and majority voting for behavioral experiment logs.

The engine takes the events of one or more logs (batches), pairs every
classification with the trial it belongs to, reshapes the answers into one
row per item, and compares the majority labels of two groups of
participants to find the items that ended in a tie.

```
use trial_tally::builder::EventLogBuilder;
use trial_tally::*;

let events = EventLogBuilder::new()
    .participant("P1")
    .group_select("Masculino", 0)
    .trial(1, "positiva", 1000, 2000)
    .participant("P2")
    .group_select("Feminino", 0)
    .trial(1, "negativa", 1000, 3000)
    .build();

let res = run_tally(&[events], &GroupVocabulary::gender(), &TallyRules::DEFAULT_RULES)?;
assert_eq!(res.batches[0].trials.len(), 2);
assert!(res.reconciliation.removed.is_empty());
# Ok::<(), TallyErrors>(())
```

See the [manual] for the input and output formats of the command line tool.
*/

mod config;

pub mod builder;
pub mod groups;
pub mod majority;
pub mod manual;
pub mod matcher;
pub mod pivot;
pub mod reconcile;

use log::{debug, info, warn};

pub use crate::config::*;
pub use crate::groups::{classify_groups, GroupAssignment, GroupMatcher, GroupVocabulary};
pub use crate::majority::{aggregate_group, VoteTally};
pub use crate::matcher::{match_trials, MatchAnomaly};
pub use crate::pivot::{ItemRow, QuotaSelection};
pub use crate::reconcile::{reconcile, Reconciliation};

/// Everything derived from one batch of events.
#[derive(PartialEq, Debug, Clone)]
pub struct BatchTally {
    /// Added to the item numbers of this batch to keep them unique.
    pub item_offset: ItemNumber,
    pub trials: Vec<Trial>,
    pub anomalies: Vec<MatchAnomaly>,
    pub superseded: usize,
    pub groups: GroupAssignment,
    pub selection: QuotaSelection,
    pub rows: Vec<ItemRow>,
}

impl BatchTally {
    fn with_offset(self, offset: ItemNumber) -> BatchTally {
        BatchTally {
            item_offset: offset,
            trials: self.trials.iter().map(|t| t.with_offset(offset)).collect(),
            rows: self.rows.iter().map(|r| r.with_offset(offset)).collect(),
            ..self
        }
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct TallyResult {
    /// In processing order, with the item offsets applied.
    pub batches: Vec<BatchTally>,
    /// The group of every participant over all the batches.
    pub groups: GroupAssignment,
    /// One aggregate per group, in the order of the vocabulary.
    pub aggregates: Vec<GroupAggregate>,
    pub reconciliation: Reconciliation,
}

impl TallyResult {
    pub fn trials(&self) -> impl Iterator<Item = &Trial> {
        self.batches.iter().flat_map(|b| b.trials.iter())
    }

    pub fn rows(&self) -> impl Iterator<Item = &ItemRow> {
        self.batches.iter().flat_map(|b| b.rows.iter())
    }
}

/// Processes one batch on its own. Item numbers are left untouched.
pub fn tally_batch(events: &[Event], vocabulary: &GroupVocabulary, rules: &TallyRules) -> BatchTally {
    let report = matcher::match_trials(events, rules);
    let groups = groups::classify_groups(events, vocabulary);
    let selection =
        pivot::select_participants(&groups, &vocabulary.labels(), rules.participants_per_group);
    let rows = pivot::assemble_rows(&report.trials, &selection);
    debug!(
        "tally_batch: {} events, {} trials, {} participants with a group, {} rows",
        events.len(),
        report.trials.len(),
        groups.len(),
        rows.len()
    );
    BatchTally {
        item_offset: 0,
        trials: report.trials,
        anomalies: report.anomalies,
        superseded: report.superseded,
        groups,
        selection,
        rows,
    }
}

/// Runs the whole engine over batches given in processing order.
///
/// The vocabulary must define exactly two groups: their majorities are
/// reconciled against each other.
pub fn run_tally(
    batches: &[Vec<Event>],
    vocabulary: &GroupVocabulary,
    rules: &TallyRules,
) -> Result<TallyResult, TallyErrors> {
    rules.validate()?;
    let labels = vocabulary.labels();
    if labels.len() != 2 {
        return Err(TallyErrors::GroupCount(labels.len()));
    }
    info!(
        "Processing {} batches, groups: {:?}, rules: {:?}",
        batches.len(),
        labels,
        rules
    );

    let tallies: Vec<BatchTally> = batches
        .iter()
        .map(|events| tally_batch(events, vocabulary, rules))
        .collect();
    let ranges: Vec<_> = tallies.iter().map(|b| pivot::item_range(&b.trials)).collect();
    let offsets = pivot::batch_offsets(&ranges);
    let tallies: Vec<BatchTally> = tallies
        .into_iter()
        .zip(offsets)
        .map(|(b, offset)| b.with_offset(offset))
        .collect();

    let groups = tallies
        .iter()
        .fold(GroupAssignment::default(), |acc, b| acc.merge(&b.groups));
    if !groups.unknown.is_empty() {
        warn!(
            "{} participant(s) excluded: their group answer matches no group",
            groups.unknown.len()
        );
    }

    let all_trials: Vec<Trial> = tallies.iter().flat_map(|b| b.trials.clone()).collect();
    let aggregates: Vec<GroupAggregate> = labels
        .iter()
        .map(|g| majority::aggregate_group(&all_trials, &groups, g))
        .collect();
    let reconciliation = reconcile::reconcile(&aggregates[0], &aggregates[1]);

    Ok(TallyResult {
        batches: tallies,
        groups,
        aggregates,
        reconciliation,
    })
}
