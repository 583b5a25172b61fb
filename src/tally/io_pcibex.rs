// Reading the result files of PCIbex experiments.

use std::fs;
use std::path::Path;

use csv::StringRecord;
use log::{debug, info, warn};
use snafu::prelude::*;
use trial_tally::{Event, EventKind, ItemNumber, Timestamp};

use crate::tally::io_common::simplify_file_name;
use crate::tally::*;

/// The label of the trials that carry the classifications.
pub const TRIAL_LABEL: &str = "frases";
/// The label of the demographic question.
pub const GROUP_LABEL: &str = "genero";

const COLUMNS_MARKER: &str = "Columns below this comment are as follows:";

/// The columns the reader needs.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
enum Column {
    Participant,
    Item,
    Label,
    Parameter,
    Value,
    EventTime,
}

impl Column {
    const ALL: [Column; 6] = [
        Column::Participant,
        Column::Item,
        Column::Label,
        Column::Parameter,
        Column::Value,
        Column::EventTime,
    ];

    fn name(&self) -> &'static str {
        match self {
            Column::Participant => "participant",
            Column::Item => "item number",
            Column::Label => "label",
            Column::Parameter => "parameter",
            Column::Value => "value",
            Column::EventTime => "event time",
        }
    }

    /// 0-based position in the standard PennController layout.
    fn default_index(&self) -> usize {
        match self {
            Column::Participant => 1,
            Column::Item => 3,
            Column::Label => 5,
            Column::Parameter => 9,
            Column::Value => 10,
            Column::EventTime => 11,
        }
    }

    /// `header` is lowercase, without its trailing dot.
    fn matches(&self, header: &str) -> bool {
        match self {
            Column::Participant => header.contains("participant") || header.contains("md5"),
            Column::Item => header.contains("order number of item") || header == "itemnumber",
            Column::Label => header == "label",
            Column::Parameter => header == "parameter",
            Column::Value => header == "value",
            Column::EventTime => header.replace(' ', "") == "eventtime",
        }
    }
}

/// Where each needed column sits in the rows of a file.
#[derive(Eq, PartialEq, Debug, Clone)]
struct ColumnLayout {
    indexes: [usize; 6],
}

impl ColumnLayout {
    fn index(&self, column: Column) -> usize {
        self.indexes[column as usize]
    }

    fn from_headers(headers: &[String]) -> ColumnLayout {
        let mut indexes = [0; 6];
        for c in Column::ALL.iter() {
            indexes[*c as usize] = headers
                .iter()
                .position(|h| c.matches(h))
                .unwrap_or_else(|| c.default_index());
        }
        ColumnLayout { indexes }
    }

    /// The columns that fall outside of rows of `width` fields.
    fn missing(&self, width: usize) -> Vec<String> {
        Column::ALL
            .iter()
            .filter(|c| self.index(**c) >= width)
            .map(|c| c.name().to_string())
            .collect()
    }
}

/// Reads the column names listed in the first comment block of the file.
///
/// The block looks like `# 1. Results reception time.`, one line per column.
fn column_headers(contents: &str) -> Vec<String> {
    let mut lines = contents.lines().skip_while(|l| !l.contains(COLUMNS_MARKER));
    if lines.next().is_none() {
        return Vec::new();
    }
    lines
        .take_while(|l| l.starts_with('#'))
        .map(|l| {
            let text = l.trim_start_matches('#').trim();
            // Drop the "12." numbering.
            let text = match text.split_once(". ") {
                Some((num, rest)) if num.chars().all(|c| c.is_ascii_digit()) => rest,
                _ => text,
            };
            text.trim_end_matches('.').trim().to_lowercase()
        })
        .collect()
}

/// Settings of the reader that come from the configuration.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct PcibexOptions {
    /// Subtracted from every item number.
    pub item_number_shift: ItemNumber,
    /// Rows with these labels are dropped before anything else.
    pub excluded_labels: Vec<String>,
}

/// What happened to the rows of a file.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct ReadSummary {
    pub rows: usize,
    pub events: usize,
    /// Rows of an excluded label.
    pub excluded: usize,
    /// Rows that carry no event of interest.
    pub ignored: usize,
    /// Rows of interest with an item number or an event time that is not an integer.
    pub mistyped: usize,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct PcibexBatch {
    pub name: String,
    pub events: Vec<Event>,
    pub summary: ReadSummary,
}

enum RowOutcome {
    Event(Event),
    Excluded,
    Ignored,
    Mistyped,
}

fn parse_int(s: &str) -> Option<i64> {
    s.trim().parse::<i64>().ok()
}

fn row_to_event(row: &StringRecord, layout: &ColumnLayout, options: &PcibexOptions) -> RowOutcome {
    let field = |c: Column| row.get(layout.index(c)).map(|s| s.trim()).unwrap_or("");
    let label = field(Column::Label);
    if options.excluded_labels.iter().any(|l| l == label) {
        return RowOutcome::Excluded;
    }
    let parameter = field(Column::Parameter);
    let value = field(Column::Value);

    let kind = match (label, parameter, value) {
        (TRIAL_LABEL, "_Trial_", "Start") => EventKind::TrialStart,
        (TRIAL_LABEL, "_Trial_", "End") => EventKind::TrialEnd,
        (TRIAL_LABEL, "Selection", _) | (TRIAL_LABEL, "classificacao", _) => {
            EventKind::Classification
        }
        (GROUP_LABEL, "Selected", _) => EventKind::GroupSelect,
        _ => return RowOutcome::Ignored,
    };

    let timestamp: Timestamp = match parse_int(field(Column::EventTime)) {
        Some(ts) => ts,
        None => return RowOutcome::Mistyped,
    };
    let item_number = parse_int(field(Column::Item)).map(|i| i - options.item_number_shift);
    let item_number = match kind {
        EventKind::GroupSelect => None,
        // Located later by its time window.
        EventKind::Classification => item_number,
        EventKind::TrialStart | EventKind::TrialEnd => match item_number {
            Some(i) => Some(i),
            None => return RowOutcome::Mistyped,
        },
    };
    let value = match kind {
        EventKind::TrialStart | EventKind::TrialEnd => None,
        EventKind::Classification | EventKind::GroupSelect => Some(value.to_string()),
    };

    RowOutcome::Event(Event {
        participant_id: field(Column::Participant).to_string(),
        item_number,
        kind,
        value,
        timestamp,
    })
}

/// Turns the content of a result file into events.
///
/// `path` only names the file in the errors.
pub fn parse_pcibex(contents: &str, path: &str, options: &PcibexOptions) -> BTallyResult<PcibexBatch> {
    let headers = column_headers(contents);
    let layout = ColumnLayout::from_headers(&headers);
    debug!("parse_pcibex: {}: headers {:?} layout {:?}", path, headers, layout);

    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .comment(Some(b'#'))
        .from_reader(contents.as_bytes());
    let mut rows: Vec<StringRecord> = Vec::new();
    for (idx, record) in rdr.records().enumerate() {
        rows.push(record.context(CsvLineParseSnafu {
            path,
            lineno: idx + 1,
        })?);
    }

    let name = simplify_file_name(Path::new(path));
    if rows.is_empty() {
        warn!("{}: no data row", name);
        return Ok(PcibexBatch {
            name,
            events: Vec::new(),
            summary: ReadSummary::default(),
        });
    }

    let width = rows.iter().map(|r| r.len()).max().unwrap_or(0);
    let missing = layout.missing(width);
    if !missing.is_empty() {
        return Err(Box::new(TallyError::SchemaMismatch {
            path: path.to_string(),
            missing,
        }));
    }

    let mut summary = ReadSummary {
        rows: rows.len(),
        ..ReadSummary::default()
    };
    let mut events: Vec<Event> = Vec::new();
    for row in rows.iter() {
        match row_to_event(row, &layout, options) {
            RowOutcome::Event(e) => events.push(e),
            RowOutcome::Excluded => summary.excluded += 1,
            RowOutcome::Ignored => summary.ignored += 1,
            RowOutcome::Mistyped => summary.mistyped += 1,
        }
    }
    summary.events = events.len();
    if summary.mistyped > 0 {
        warn!(
            "{}: {} row(s) dropped, their item number or event time is not an integer",
            name, summary.mistyped
        );
    }
    info!("{}: {:?}", name, summary);
    Ok(PcibexBatch {
        name,
        events,
        summary,
    })
}

pub fn read_pcibex(path: &Path, options: &PcibexOptions) -> BTallyResult<PcibexBatch> {
    let path_s = path.display().to_string();
    let contents = fs::read_to_string(path).context(OpeningFileSnafu { path: path_s.as_str() })?;
    parse_pcibex(&contents, &path_s, options)
}
