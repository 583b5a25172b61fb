use log::{debug, warn};

use std::collections::HashMap;

use crate::config::*;

/// A record that could not be turned into a trial.
///
/// None of these stop the processing: the record is dropped and reported.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum MatchAnomaly {
    /// The classification has no Start or no End for its (participant, item).
    MissingBoundary {
        participant_id: String,
        item_number: ItemNumber,
        has_start: bool,
        has_end: bool,
    },
    /// The trial ends before it starts.
    InvertedBoundary {
        participant_id: String,
        item_number: ItemNumber,
        start_ts: Timestamp,
        end_ts: Timestamp,
    },
    /// The classification happened outside of the window of its trial.
    OutsideWindow {
        participant_id: String,
        item_number: ItemNumber,
        timestamp: Timestamp,
    },
    /// A classification without item number that falls in no trial window.
    Unlocated {
        participant_id: String,
        timestamp: Timestamp,
    },
    /// The label is reserved to mark ties.
    ReservedLabel {
        participant_id: String,
        timestamp: Timestamp,
    },
    /// A classification event without a value.
    EmptyClassification {
        participant_id: String,
        timestamp: Timestamp,
    },
    /// A boundary without item number cannot be attached to any trial.
    UnkeyedBoundary {
        participant_id: String,
        timestamp: Timestamp,
    },
    /// A second Start or End for the same trial. The first one is kept.
    DuplicateBoundary {
        participant_id: String,
        item_number: ItemNumber,
        kind: EventKind,
    },
}

impl MatchAnomaly {
    /// Short name used when counting anomalies in the logs.
    pub fn name(&self) -> &'static str {
        match self {
            MatchAnomaly::MissingBoundary { .. } => "missing boundary",
            MatchAnomaly::InvertedBoundary { .. } => "inverted boundary",
            MatchAnomaly::OutsideWindow { .. } => "outside trial window",
            MatchAnomaly::Unlocated { .. } => "no enclosing trial",
            MatchAnomaly::ReservedLabel { .. } => "reserved label",
            MatchAnomaly::EmptyClassification { .. } => "empty classification",
            MatchAnomaly::UnkeyedBoundary { .. } => "boundary without item",
            MatchAnomaly::DuplicateBoundary { .. } => "duplicate boundary",
        }
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct MatchReport {
    /// In the order of the retained classification events.
    pub trials: Vec<Trial>,
    pub anomalies: Vec<MatchAnomaly>,
    /// Classifications dropped because an earlier one was kept for the same trial.
    pub superseded: usize,
}

/// The [start, end] window of a complete trial.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct TrialWindow {
    pub start_ts: Timestamp,
    pub end_ts: Timestamp,
}

impl TrialWindow {
    pub fn contains(&self, ts: Timestamp) -> bool {
        self.start_ts <= ts && ts <= self.end_ts
    }
}

type TrialKey<'a> = (&'a str, ItemNumber);

/// The trial boundaries of one batch, indexed once and then only read.
#[derive(Debug, Clone)]
pub struct BoundaryIndex<'a> {
    starts: HashMap<TrialKey<'a>, Timestamp>,
    ends: HashMap<TrialKey<'a>, Timestamp>,
    // Complete windows per participant, sorted by start time.
    windows: HashMap<&'a str, Vec<(TrialWindow, ItemNumber)>>,
    anomalies: Vec<MatchAnomaly>,
}

impl<'a> BoundaryIndex<'a> {
    pub fn build(events: &'a [Event]) -> BoundaryIndex<'a> {
        let mut starts: HashMap<TrialKey<'a>, Timestamp> = HashMap::new();
        let mut ends: HashMap<TrialKey<'a>, Timestamp> = HashMap::new();
        let mut anomalies: Vec<MatchAnomaly> = Vec::new();

        for e in events.iter() {
            let target = match e.kind {
                EventKind::TrialStart => &mut starts,
                EventKind::TrialEnd => &mut ends,
                _ => continue,
            };
            let item = match e.item_number {
                Some(item) => item,
                None => {
                    anomalies.push(MatchAnomaly::UnkeyedBoundary {
                        participant_id: e.participant_id.clone(),
                        timestamp: e.timestamp,
                    });
                    continue;
                }
            };
            let key = (e.participant_id.as_str(), item);
            if target.contains_key(&key) {
                anomalies.push(MatchAnomaly::DuplicateBoundary {
                    participant_id: e.participant_id.clone(),
                    item_number: item,
                    kind: e.kind,
                });
            } else {
                target.insert(key, e.timestamp);
            }
        }

        let mut windows: HashMap<&'a str, Vec<(TrialWindow, ItemNumber)>> = HashMap::new();
        for (key, start_ts) in starts.iter() {
            if let Some(end_ts) = ends.get(key) {
                if start_ts <= end_ts {
                    let w = TrialWindow {
                        start_ts: *start_ts,
                        end_ts: *end_ts,
                    };
                    windows.entry(key.0).or_default().push((w, key.1));
                }
            }
        }
        for ws in windows.values_mut() {
            ws.sort_by_key(|(w, item)| (w.start_ts, *item));
        }

        debug!(
            "BoundaryIndex::build: {} starts, {} ends, {} participants with complete trials",
            starts.len(),
            ends.len(),
            windows.len()
        );
        BoundaryIndex {
            starts,
            ends,
            windows,
            anomalies,
        }
    }

    /// The window of a trial, if both of its boundaries are known and ordered.
    pub fn window(&self, participant_id: &str, item: ItemNumber) -> Result<TrialWindow, MatchAnomaly> {
        let key = (participant_id, item);
        match (self.starts.get(&key), self.ends.get(&key)) {
            (Some(s), Some(e)) if s <= e => Ok(TrialWindow {
                start_ts: *s,
                end_ts: *e,
            }),
            (Some(s), Some(e)) => Err(MatchAnomaly::InvertedBoundary {
                participant_id: participant_id.to_string(),
                item_number: item,
                start_ts: *s,
                end_ts: *e,
            }),
            (s, e) => Err(MatchAnomaly::MissingBoundary {
                participant_id: participant_id.to_string(),
                item_number: item,
                has_start: s.is_some(),
                has_end: e.is_some(),
            }),
        }
    }

    /// The item whose window contains the timestamp. When windows overlap, the
    /// one that started first wins.
    pub fn locate(&self, participant_id: &str, ts: Timestamp) -> Option<(ItemNumber, TrialWindow)> {
        self.windows
            .get(participant_id)?
            .iter()
            .find(|(w, _)| w.contains(ts))
            .map(|(w, item)| (*item, *w))
    }

    /// Problems found while indexing the boundaries.
    pub fn anomalies(&self) -> &[MatchAnomaly] {
        &self.anomalies
    }
}

/// Rounds a duration in milliseconds to seconds with the given number of decimals.
pub fn elapsed_seconds(start_ts: Timestamp, end_ts: Timestamp, decimal_places: u32) -> f64 {
    let factor = 10f64.powi(decimal_places as i32);
    ((end_ts - start_ts) as f64 * factor / 1000.0).round() / factor
}

// A classification attached to its trial, before deduplication.
struct Candidate<'a> {
    position: usize,
    key: TrialKey<'a>,
    window: TrialWindow,
    event: &'a Event,
}

fn resolve<'a>(
    index: &BoundaryIndex<'a>,
    position: usize,
    e: &'a Event,
) -> Result<Candidate<'a>, MatchAnomaly> {
    let value = e
        .value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| MatchAnomaly::EmptyClassification {
            participant_id: e.participant_id.clone(),
            timestamp: e.timestamp,
        })?;
    if value == Majority::TIE_SENTINEL {
        return Err(MatchAnomaly::ReservedLabel {
            participant_id: e.participant_id.clone(),
            timestamp: e.timestamp,
        });
    }
    let (item, window) = match e.item_number {
        Some(item) => {
            let w = index.window(&e.participant_id, item)?;
            if !w.contains(e.timestamp) {
                return Err(MatchAnomaly::OutsideWindow {
                    participant_id: e.participant_id.clone(),
                    item_number: item,
                    timestamp: e.timestamp,
                });
            }
            (item, w)
        }
        None => index
            .locate(&e.participant_id, e.timestamp)
            .ok_or_else(|| MatchAnomaly::Unlocated {
                participant_id: e.participant_id.clone(),
                timestamp: e.timestamp,
            })?,
    };
    Ok(Candidate {
        position,
        key: (e.participant_id.as_str(), item),
        window,
        event: e,
    })
}

/// Pairs every classification with the trial it belongs to.
///
/// When a trial received several classifications, the earliest one (by
/// timestamp, then by position in the input) is kept and the others are
/// counted as superseded.
pub fn match_trials(events: &[Event], rules: &TallyRules) -> MatchReport {
    let index = BoundaryIndex::build(events);

    let (resolved, rejected): (Vec<_>, Vec<_>) = events
        .iter()
        .enumerate()
        .filter(|(_, e)| e.kind == EventKind::Classification)
        .map(|(pos, e)| resolve(&index, pos, e))
        .partition(|r| r.is_ok());

    let mut candidates: Vec<Candidate> = resolved.into_iter().filter_map(Result::ok).collect();
    // Stable: equal timestamps keep their input order.
    candidates.sort_by_key(|c| (c.key, c.event.timestamp));

    let mut kept: Vec<&Candidate> = Vec::new();
    for c in candidates.iter() {
        match kept.last() {
            Some(prev) if prev.key == c.key => {}
            _ => kept.push(c),
        }
    }
    let superseded = candidates.len() - kept.len();
    kept.sort_by_key(|c| c.position);

    let trials: Vec<Trial> = kept
        .iter()
        .map(|c| Trial {
            participant_id: c.key.0.to_string(),
            item_number: c.key.1,
            start_ts: c.window.start_ts,
            end_ts: c.window.end_ts,
            classification: c.event.value.clone().unwrap_or_default(),
            classified_at: c.event.timestamp,
            elapsed_seconds: elapsed_seconds(
                c.window.start_ts,
                c.window.end_ts,
                rules.decimal_places,
            ),
        })
        .collect();

    let anomalies: Vec<MatchAnomaly> = index
        .anomalies()
        .iter()
        .cloned()
        .chain(rejected.into_iter().filter_map(Result::err))
        .collect();

    for a in anomalies.iter() {
        debug!("match_trials: dropped record: {:?}", a);
    }
    if !anomalies.is_empty() {
        warn!(
            "match_trials: {} record(s) could not be matched to a trial",
            anomalies.len()
        );
    }
    if superseded > 0 {
        warn!(
            "match_trials: {} repeated classification(s) ignored, the earliest one is kept",
            superseded
        );
    }

    MatchReport {
        trials,
        anomalies,
        superseded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::EventLogBuilder;

    fn rules(decimal_places: u32) -> TallyRules {
        TallyRules {
            decimal_places,
            ..TallyRules::DEFAULT_RULES
        }
    }

    #[test]
    fn single_trial_is_matched() {
        let events = EventLogBuilder::new()
            .participant("P1")
            .trial_start(5, 1000)
            .classification(5, "positiva", 1500)
            .trial_end(5, 2000)
            .build();
        let report = match_trials(&events, &TallyRules::DEFAULT_RULES);
        assert_eq!(
            report.trials,
            vec![Trial {
                participant_id: "P1".to_string(),
                item_number: 5,
                start_ts: 1000,
                end_ts: 2000,
                classification: "positiva".to_string(),
                classified_at: 1500,
                elapsed_seconds: 1.0,
            }]
        );
        assert!(report.anomalies.is_empty());
        assert_eq!(report.superseded, 0);
    }

    #[test]
    fn elapsed_time_follows_precision() {
        assert_eq!(elapsed_seconds(0, 1234, 2), 1.23);
        assert_eq!(elapsed_seconds(0, 1234, 3), 1.234);
        assert_eq!(elapsed_seconds(0, 1235, 2), 1.24);
        let events = EventLogBuilder::new()
            .participant("P1")
            .trial(1, "neutra", 10_000, 12_345)
            .build();
        let report = match_trials(&events, &rules(2));
        assert_eq!(report.trials[0].elapsed_seconds, 2.35);
    }

    #[test]
    fn missing_boundary_is_reported_not_matched() {
        let events = EventLogBuilder::new()
            .participant("P1")
            .trial_start(3, 100)
            .classification(3, "negativa", 150)
            .build();
        let report = match_trials(&events, &TallyRules::DEFAULT_RULES);
        assert!(report.trials.is_empty());
        assert_eq!(
            report.anomalies,
            vec![MatchAnomaly::MissingBoundary {
                participant_id: "P1".to_string(),
                item_number: 3,
                has_start: true,
                has_end: false,
            }]
        );
    }

    #[test]
    fn classification_outside_window_does_not_contribute() {
        let events = EventLogBuilder::new()
            .participant("P1")
            .trial_start(1, 1000)
            .trial_end(1, 2000)
            .classification(1, "positiva", 2500)
            .build();
        let report = match_trials(&events, &TallyRules::DEFAULT_RULES);
        assert!(report.trials.is_empty());
        assert_eq!(report.anomalies[0].name(), "outside trial window");
    }

    #[test]
    fn inverted_boundaries_make_an_incomplete_trial() {
        let events = EventLogBuilder::new()
            .participant("P1")
            .trial_start(1, 2000)
            .classification(1, "positiva", 1500)
            .trial_end(1, 1000)
            .build();
        let report = match_trials(&events, &TallyRules::DEFAULT_RULES);
        assert!(report.trials.is_empty());
        assert!(matches!(
            report.anomalies[0],
            MatchAnomaly::InvertedBoundary { start_ts: 2000, end_ts: 1000, .. }
        ));
    }

    #[test]
    fn earliest_classification_wins() {
        let events = EventLogBuilder::new()
            .participant("P1")
            .trial_start(2, 0)
            .classification(2, "neutra", 800)
            .classification(2, "positiva", 300)
            .trial_end(2, 1000)
            .build();
        let report = match_trials(&events, &TallyRules::DEFAULT_RULES);
        assert_eq!(report.trials.len(), 1);
        assert_eq!(report.trials[0].classification, "positiva");
        assert_eq!(report.trials[0].classified_at, 300);
        assert_eq!(report.superseded, 1);
    }

    #[test]
    fn same_timestamp_keeps_input_order() {
        let events = EventLogBuilder::new()
            .participant("P1")
            .trial_start(2, 0)
            .classification(2, "negativa", 500)
            .classification(2, "positiva", 500)
            .trial_end(2, 1000)
            .build();
        let report = match_trials(&events, &TallyRules::DEFAULT_RULES);
        assert_eq!(report.trials[0].classification, "negativa");
    }

    #[test]
    fn boundaries_without_classification_produce_no_trial() {
        let events = EventLogBuilder::new()
            .participant("P1")
            .trial_start(1, 0)
            .trial_end(1, 100)
            .trial(2, "neutra", 200, 400)
            .build();
        let report = match_trials(&events, &TallyRules::DEFAULT_RULES);
        assert_eq!(report.trials.len(), 1);
        assert_eq!(report.trials[0].item_number, 2);
        assert!(report.anomalies.is_empty());
    }

    #[test]
    fn loose_classification_is_located_by_window() {
        let events = EventLogBuilder::new()
            .participant("P1")
            .trial_start(1, 0)
            .trial_end(1, 1000)
            .trial_start(2, 1100)
            .loose_classification("negativa", 1500)
            .trial_end(2, 2000)
            .loose_classification("positiva", 5000)
            .build();
        let report = match_trials(&events, &TallyRules::DEFAULT_RULES);
        assert_eq!(report.trials.len(), 1);
        assert_eq!(report.trials[0].item_number, 2);
        assert_eq!(report.trials[0].elapsed_seconds, 0.9);
        assert_eq!(
            report.anomalies,
            vec![MatchAnomaly::Unlocated {
                participant_id: "P1".to_string(),
                timestamp: 5000,
            }]
        );
    }

    #[test]
    fn windows_of_other_participants_are_ignored() {
        let events = EventLogBuilder::new()
            .participant("P1")
            .trial_start(1, 0)
            .trial_end(1, 1000)
            .participant("P2")
            .loose_classification("neutra", 500)
            .build();
        let report = match_trials(&events, &TallyRules::DEFAULT_RULES);
        assert!(report.trials.is_empty());
    }

    #[test]
    fn overlapping_windows_prefer_the_earliest_start() {
        let events = EventLogBuilder::new()
            .participant("P1")
            .trial_start(1, 0)
            .trial_start(2, 500)
            .loose_classification("positiva", 700)
            .trial_end(2, 900)
            .trial_end(1, 1000)
            .build();
        let report = match_trials(&events, &TallyRules::DEFAULT_RULES);
        assert_eq!(report.trials[0].item_number, 1);
    }

    #[test]
    fn reserved_label_and_duplicate_boundaries_are_reported() {
        let events = EventLogBuilder::new()
            .participant("P1")
            .trial_start(1, 0)
            .trial_start(1, 50)
            .classification(1, "empate", 100)
            .trial_end(1, 200)
            .build();
        let report = match_trials(&events, &TallyRules::DEFAULT_RULES);
        assert!(report.trials.is_empty());
        let names: Vec<&str> = report.anomalies.iter().map(|a| a.name()).collect();
        assert_eq!(names, vec!["duplicate boundary", "reserved label"]);
    }

    #[test]
    fn trials_never_have_negative_durations() {
        let events = EventLogBuilder::new()
            .participant("A")
            .trial(1, "positiva", 0, 10)
            .trial(2, "negativa", 20, 20)
            .participant("B")
            .trial(1, "neutra", 5, 3000)
            .build();
        let report = match_trials(&events, &TallyRules::DEFAULT_RULES);
        assert_eq!(report.trials.len(), 3);
        for t in report.trials.iter() {
            assert!(t.start_ts <= t.end_ts);
            assert!(t.elapsed_seconds >= 0.0);
        }
    }
}
