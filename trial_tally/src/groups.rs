use log::{debug, warn};

use std::collections::HashMap;

use crate::config::*;

/// One group and the fragments that identify it in a free-text answer.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct GroupMatcher {
    pub label: String,
    /// Matched case-insensitively anywhere in the answer.
    pub fragments: Vec<String>,
}

/// The ordered list of known groups. The first matching group wins.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct GroupVocabulary {
    groups: Vec<GroupMatcher>,
}

impl GroupVocabulary {
    pub fn new(groups: Vec<GroupMatcher>) -> Result<GroupVocabulary, TallyErrors> {
        if groups.is_empty() {
            return Err(TallyErrors::EmptyVocabulary);
        }
        for (idx, g) in groups.iter().enumerate() {
            if g.label.is_empty() || g.fragments.iter().all(|f| f.trim().is_empty()) {
                return Err(TallyErrors::EmptyVocabulary);
            }
            if groups[..idx].iter().any(|other| other.label == g.label) {
                return Err(TallyErrors::DuplicateGroup(g.label.clone()));
            }
        }
        let groups = groups
            .into_iter()
            .map(|g| GroupMatcher {
                label: g.label,
                fragments: g
                    .fragments
                    .iter()
                    .map(|f| f.trim().to_lowercase())
                    .filter(|f| !f.is_empty())
                    .collect(),
            })
            .collect();
        Ok(GroupVocabulary { groups })
    }

    /// The answers of the gender question: "m" for masculine, "f" for feminine.
    pub fn gender() -> GroupVocabulary {
        GroupVocabulary {
            groups: vec![
                GroupMatcher {
                    label: "m".to_string(),
                    fragments: vec!["masculin".to_string()],
                },
                GroupMatcher {
                    label: "f".to_string(),
                    fragments: vec!["feminin".to_string()],
                },
            ],
        }
    }

    pub fn classify(&self, raw_value: &str) -> Option<&str> {
        let normalized = raw_value.to_lowercase();
        self.groups
            .iter()
            .find(|g| g.fragments.iter().any(|f| normalized.contains(f.as_str())))
            .map(|g| g.label.as_str())
    }

    pub fn labels(&self) -> Vec<&str> {
        self.groups.iter().map(|g| g.label.as_str()).collect()
    }
}

/// A participant whose answer matched no group.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct UnknownGroup {
    pub participant_id: String,
    pub raw_value: String,
}

/// The group of each participant, in order of first appearance.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct GroupAssignment {
    assignments: Vec<(String, String)>,
    positions: HashMap<String, usize>,
    pub unknown: Vec<UnknownGroup>,
    /// Group answers ignored because the participant had already answered.
    pub repeated: usize,
}

impl GroupAssignment {
    pub fn group_of(&self, participant_id: &str) -> Option<&str> {
        self.positions
            .get(participant_id)
            .map(|idx| self.assignments[*idx].1.as_str())
    }

    /// The participants of a group, in order of first appearance.
    pub fn members<'a>(&'a self, group: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.assignments
            .iter()
            .filter(move |(_, g)| g == group)
            .map(|(p, _)| p.as_str())
    }

    pub fn assignments(&self) -> &[(String, String)] {
        &self.assignments
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    fn is_known(&self, participant_id: &str) -> bool {
        self.positions.contains_key(participant_id)
            || self.unknown.iter().any(|u| u.participant_id == participant_id)
    }

    fn assign(&mut self, participant_id: &str, group: &str) {
        self.positions
            .insert(participant_id.to_string(), self.assignments.len());
        self.assignments
            .push((participant_id.to_string(), group.to_string()));
    }

    /// Combines the assignments of successive batches. A participant keeps the
    /// group of the batch where it appeared first.
    pub fn merge(&self, later: &GroupAssignment) -> GroupAssignment {
        let mut res = self.clone();
        for (p, g) in later.assignments.iter() {
            if res.is_known(p) {
                res.repeated += 1;
            } else {
                res.assign(p, g);
            }
        }
        for u in later.unknown.iter() {
            if res.is_known(&u.participant_id) {
                res.repeated += 1;
            } else {
                res.unknown.push(u.clone());
            }
        }
        res.repeated += later.repeated;
        res
    }
}

/// Assigns a group to every participant that answered the group question.
///
/// Only the first answer of a participant counts. Answers that match no
/// group are reported in `unknown` and the participant stays without group.
pub fn classify_groups(events: &[Event], vocabulary: &GroupVocabulary) -> GroupAssignment {
    let mut res = GroupAssignment::default();
    for e in events.iter().filter(|e| e.kind == EventKind::GroupSelect) {
        if res.is_known(&e.participant_id) {
            res.repeated += 1;
            continue;
        }
        let raw = e.value.clone().unwrap_or_default();
        match vocabulary.classify(&raw) {
            Some(group) => {
                debug!(
                    "classify_groups: participant {} -> {} ({:?})",
                    e.participant_id, group, raw
                );
                res.assign(&e.participant_id, group);
            }
            None => {
                warn!(
                    "classify_groups: participant {}: unknown group answer {:?}",
                    e.participant_id, raw
                );
                res.unknown.push(UnknownGroup {
                    participant_id: e.participant_id.clone(),
                    raw_value: raw,
                });
            }
        }
    }
    res
}
