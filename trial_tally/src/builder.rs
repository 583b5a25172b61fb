pub use crate::config::*;

/// A builder for assembling the events of a log by hand.
///
/// Mostly used by tests, to avoid spelling out every `Event` field.
///
/// ```
/// use trial_tally::builder::EventLogBuilder;
///
/// let events = EventLogBuilder::new()
///     .participant("P1")
///     .group_select("Feminino", 10)
///     .trial_start(5, 1000)
///     .classification(5, "positiva", 1500)
///     .trial_end(5, 2000)
///     .build();
///
/// assert_eq!(events.len(), 4);
/// ```
#[derive(Debug, Clone, Default)]
pub struct EventLogBuilder {
    current: String,
    events: Vec<Event>,
}

impl EventLogBuilder {
    pub fn new() -> EventLogBuilder {
        EventLogBuilder::default()
    }

    /// Sets the participant for all the events added afterwards.
    pub fn participant(mut self, participant_id: &str) -> EventLogBuilder {
        self.current = participant_id.to_string();
        self
    }

    pub fn trial_start(self, item: ItemNumber, timestamp: Timestamp) -> EventLogBuilder {
        self.push(Some(item), EventKind::TrialStart, Some("Start"), timestamp)
    }

    pub fn trial_end(self, item: ItemNumber, timestamp: Timestamp) -> EventLogBuilder {
        self.push(Some(item), EventKind::TrialEnd, Some("End"), timestamp)
    }

    pub fn classification(
        self,
        item: ItemNumber,
        label: &str,
        timestamp: Timestamp,
    ) -> EventLogBuilder {
        self.push(Some(item), EventKind::Classification, Some(label), timestamp)
    }

    /// A classification that carries no item number. It will be located by
    /// the trial window that contains it.
    pub fn loose_classification(self, label: &str, timestamp: Timestamp) -> EventLogBuilder {
        self.push(None, EventKind::Classification, Some(label), timestamp)
    }

    pub fn group_select(self, raw_value: &str, timestamp: Timestamp) -> EventLogBuilder {
        self.push(None, EventKind::GroupSelect, Some(raw_value), timestamp)
    }

    /// Adds a complete trial: start, classification halfway, end.
    pub fn trial(
        self,
        item: ItemNumber,
        label: &str,
        start: Timestamp,
        end: Timestamp,
    ) -> EventLogBuilder {
        self.trial_start(item, start)
            .classification(item, label, start + (end - start) / 2)
            .trial_end(item, end)
    }

    pub fn add_event(mut self, event: Event) -> EventLogBuilder {
        self.events.push(event);
        self
    }

    pub fn build(self) -> Vec<Event> {
        self.events
    }

    fn push(
        mut self,
        item_number: Option<ItemNumber>,
        kind: EventKind,
        value: Option<&str>,
        timestamp: Timestamp,
    ) -> EventLogBuilder {
        self.events.push(Event {
            participant_id: self.current.clone(),
            item_number,
            kind,
            value: value.map(|v| v.to_string()),
            timestamp,
        });
        self
    }
}
