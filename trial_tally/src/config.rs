// ********* Input data structures ***********

use std::error::Error;
use std::fmt::Display;

/// The number identifying a stimulus (a phrase) within an experiment.
///
/// Signed because readers may shift the raw PCIbex order numbers down.
pub type ItemNumber = i64;

/// Event time, in milliseconds.
pub type Timestamp = i64;

/// The kinds of events the engine understands. Everything else in a log is
/// dropped by the readers before reaching the engine.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum EventKind {
    /// Opening boundary of a trial.
    TrialStart,
    /// Closing boundary of a trial.
    TrialEnd,
    /// The label picked by the participant for an item.
    Classification,
    /// The free-text answer to the demographic question.
    GroupSelect,
}

/// One normalized row of an experiment log.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Event {
    pub participant_id: String,
    /// Missing for classifications that have to be located by their time window.
    pub item_number: Option<ItemNumber>,
    pub kind: EventKind,
    pub value: Option<String>,
    pub timestamp: Timestamp,
}

// ******** Output data structures *********

/// One participant's timed answer to one item.
///
/// Invariant: `start_ts <= end_ts`, hence `elapsed_seconds >= 0`.
#[derive(PartialEq, Debug, Clone)]
pub struct Trial {
    pub participant_id: String,
    pub item_number: ItemNumber,
    pub start_ts: Timestamp,
    pub end_ts: Timestamp,
    pub classification: String,
    /// Time of the classification event that was retained for this trial.
    pub classified_at: Timestamp,
    pub elapsed_seconds: f64,
}

impl Trial {
    pub fn with_offset(&self, offset: ItemNumber) -> Trial {
        Trial {
            item_number: self.item_number + offset,
            ..self.clone()
        }
    }
}

/// The outcome of a majority vote.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum Majority {
    Label(String),
    /// The two highest counts are equal.
    Tie,
    /// Nobody voted. This is not a tie.
    NoVotes,
}

impl Majority {
    /// How a tie is written out in the tables.
    pub const TIE_SENTINEL: &'static str = "empate";

    pub fn is_tie(&self) -> bool {
        matches!(self, Majority::Tie)
    }

    pub fn label(&self) -> Option<&str> {
        match self {
            Majority::Label(l) => Some(l.as_str()),
            _ => None,
        }
    }

    pub fn as_output(&self) -> &str {
        match self {
            Majority::Label(l) => l.as_str(),
            Majority::Tie => Majority::TIE_SENTINEL,
            Majority::NoVotes => "",
        }
    }
}

/// The votes of one group of participants for one item.
#[derive(PartialEq, Debug, Clone)]
pub struct AggregatedItem {
    pub item_number: ItemNumber,
    pub majority: Majority,
    /// Sorted by decreasing count, then by order of first appearance.
    pub label_counts: Vec<(String, u64)>,
    pub total_votes: u64,
    pub mean_elapsed: Option<f64>,
}

impl AggregatedItem {
    pub fn count_for(&self, label: &str) -> u64 {
        self.label_counts
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, c)| *c)
            .unwrap_or(0)
    }
}

/// All the aggregated items of one group, in increasing item order.
#[derive(PartialEq, Debug, Clone)]
pub struct GroupAggregate {
    pub group: String,
    pub items: Vec<AggregatedItem>,
}

/// Errors that prevent the engine from running at all.
///
/// Problems with individual records are never errors: they are collected in
/// the reports of each stage.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum TallyErrors {
    /// Elapsed times cannot be rounded to that many decimal places.
    InvalidPrecision(u32),
    /// At least one participant per group is required.
    EmptyQuota,
    /// A group has no label or no fragment to match against.
    EmptyVocabulary,
    /// The same group label is declared twice.
    DuplicateGroup(String),
    /// Reconciliation compares exactly two groups.
    GroupCount(usize),
}

impl Error for TallyErrors {}

impl Display for TallyErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TallyErrors::InvalidPrecision(p) => write!(
                f,
                "cannot round elapsed times to {} decimal places (maximum {})",
                p,
                TallyRules::MAX_DECIMAL_PLACES
            ),
            TallyErrors::EmptyQuota => write!(f, "the number of participants per group must be positive"),
            TallyErrors::EmptyVocabulary => {
                write!(f, "every group needs a label and at least one matching fragment")
            }
            TallyErrors::DuplicateGroup(g) => write!(f, "group {:?} is declared more than once", g),
            TallyErrors::GroupCount(n) => {
                write!(f, "exactly two groups are required for reconciliation, found {}", n)
            }
        }
    }
}

// ********* Configuration **********

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct TallyRules {
    /// Rounding of the elapsed times. The historical scripts used either 2 or 3.
    pub decimal_places: u32,
    /// Maximum number of participants of each group represented in the wide rows.
    pub participants_per_group: usize,
}

impl TallyRules {
    pub const MAX_DECIMAL_PLACES: u32 = 9;

    pub const DEFAULT_RULES: TallyRules = TallyRules {
        decimal_places: 3,
        participants_per_group: 4,
    };

    pub fn validate(&self) -> Result<(), TallyErrors> {
        if self.decimal_places > TallyRules::MAX_DECIMAL_PLACES {
            return Err(TallyErrors::InvalidPrecision(self.decimal_places));
        }
        if self.participants_per_group == 0 {
            return Err(TallyErrors::EmptyQuota);
        }
        Ok(())
    }
}
