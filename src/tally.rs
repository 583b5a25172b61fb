use log::{debug, error, info, warn};

use snafu::{prelude::*, Snafu};

use std::collections::BTreeMap;
use std::fs;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use text_diff::print_diff;
use trial_tally::{run_tally, Event, TallyErrors, TallyResult};

use crate::args::Args;
use crate::tally::config_reader::*;
use crate::tally::io_pcibex::{PcibexBatch, PcibexOptions};

pub mod config_reader;
mod io_common;
mod io_output;
mod io_pcibex;

#[derive(Debug, Snafu)]
pub enum TallyError {
    #[snafu(display("Error opening file {path}"))]
    OpeningFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing record {lineno} of {path}"))]
    CsvLineParse {
        source: csv::Error,
        path: String,
        lineno: usize,
    },
    #[snafu(display("{path} lacks the column(s): {}", missing.join(", ")))]
    SchemaMismatch { path: String, missing: Vec<String> },
    #[snafu(display("No file matching {pattern:?} in directory {directory}"))]
    EmptyInput { pattern: String, directory: String },
    #[snafu(display("None of the {count} input file(s) could be read"))]
    NoUsableBatch { count: usize },
    #[snafu(display("Error opening configuration {path}"))]
    OpeningJson {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing configuration {path}"))]
    ParsingJson {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("Invalid configuration: {source}"))]
    InvalidConfig { source: TallyErrors },
    #[snafu(display("Error creating output directory {path}"))]
    CreatingDir {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error writing {path}"))]
    CsvWrite { source: csv::Error, path: String },
    #[snafu(display("Difference detected between the item table and the reference {path}"))]
    ReferenceMismatch { path: String },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type TallyRunResult<T> = Result<T, TallyError>;

pub type BTallyResult<T> = Result<T, Box<TallyError>>;

/// What a run produced.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Names of the files that were tallied, in processing order.
    pub batches: Vec<String>,
    /// Files that were skipped, with the reason.
    pub skipped: Vec<(String, String)>,
    pub outputs: Vec<PathBuf>,
}

pub const TRIALS_FILE: &str = "trials.csv";
pub const ITEMS_FILE: &str = "items_wide.csv";
pub const REMOVED_TIES_FILE: &str = "removed_ties.csv";
pub const DOUBLE_TIES_FILE: &str = "double_ties.csv";

fn read_batches(paths: &[PathBuf], settings: &RunSettings) -> (Vec<PcibexBatch>, Vec<(String, String)>) {
    let options = PcibexOptions {
        item_number_shift: settings.item_number_shift,
        excluded_labels: settings.excluded_labels.clone(),
    };
    let mut batches: Vec<PcibexBatch> = Vec::new();
    let mut skipped: Vec<(String, String)> = Vec::new();
    for path in paths.iter() {
        match io_pcibex::read_pcibex(path, &options) {
            Ok(b) => batches.push(b),
            Err(e) => {
                error!("Skipping {}: {}", path.display(), e);
                skipped.push((io_common::simplify_file_name(path), e.to_string()));
            }
        }
    }
    (batches, skipped)
}

fn log_anomalies(names: &[String], res: &TallyResult) {
    for (name, batch) in names.iter().zip(res.batches.iter()) {
        let mut by_kind: BTreeMap<&str, usize> = BTreeMap::new();
        for a in batch.anomalies.iter() {
            debug!("{}: {:?}", name, a);
            *by_kind.entry(a.name()).or_default() += 1;
        }
        if !by_kind.is_empty() {
            warn!("{}: records dropped: {:?}", name, by_kind);
        }
        if batch.superseded > 0 {
            info!(
                "{}: {} later classification(s) ignored in favor of the first one",
                name, batch.superseded
            );
        }
        info!(
            "{}: {} trials, items offset by {}",
            name,
            batch.trials.len(),
            batch.item_offset
        );
    }
    for u in res.groups.unknown.iter() {
        warn!(
            "participant {} excluded, unknown group answer {:?}",
            u.participant_id, u.raw_value
        );
    }
}

fn write_table<F>(dir: &Path, name: &str, delimiter: u8, f: F) -> BTallyResult<PathBuf>
where
    F: FnOnce(&mut csv::Writer<File>) -> csv::Result<()>,
{
    let path = dir.join(name);
    let path_s = path.display().to_string();
    let mut wtr = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_path(&path)
        .context(CsvWriteSnafu { path: path_s.as_str() })?;
    f(&mut wtr).context(CsvWriteSnafu { path: path_s.as_str() })?;
    debug!("write_table: {}", path_s);
    Ok(path)
}

fn wide_table(res: &TallyResult, settings: &RunSettings) -> TallyRunResult<String> {
    let mut wtr = csv::WriterBuilder::new()
        .delimiter(settings.delimiter)
        .from_writer(vec![]);
    io_output::write_wide(
        &mut wtr,
        &settings.vocabulary.labels(),
        settings.rules.participants_per_group,
        res.rows(),
    )
    .context(CsvWriteSnafu { path: ITEMS_FILE })?;
    let bytes = wtr
        .into_inner()
        .map_err(|e| e.to_string())
        .whatever_context::<_, TallyError>("Error flushing the item table")?;
    String::from_utf8(bytes).whatever_context("The item table is not valid UTF-8")
}

fn write_outputs(res: &TallyResult, settings: &RunSettings, wide: &str) -> BTallyResult<Vec<PathBuf>> {
    let dir = settings.output_dir.as_path();
    fs::create_dir_all(dir).context(CreatingDirSnafu {
        path: dir.display().to_string(),
    })?;
    let d = settings.delimiter;
    let labels = &settings.labels;
    let rec = &res.reconciliation;

    let mut outputs: Vec<PathBuf> = vec![write_table(dir, TRIALS_FILE, d, |w| {
        io_output::write_trials(w, res.trials())
    })?];

    let items_path = dir.join(ITEMS_FILE);
    fs::write(&items_path, wide).context(OpeningFileSnafu {
        path: items_path.display().to_string(),
    })?;
    outputs.push(items_path);

    for agg in res.aggregates.iter() {
        let name = format!("aggregate_{}.csv", agg.group);
        outputs.push(write_table(dir, &name, d, |w| {
            io_output::write_aggregate(w, labels, &agg.items)
        })?);
    }
    for (group, kept) in [
        (&rec.first_group, &rec.kept_first),
        (&rec.second_group, &rec.kept_second),
    ] {
        let name = format!("aggregate_{}_no_ties.csv", group);
        outputs.push(write_table(dir, &name, d, |w| {
            io_output::write_aggregate(w, labels, kept)
        })?);
    }
    outputs.push(write_table(dir, REMOVED_TIES_FILE, d, |w| {
        io_output::write_removed_ties(w, labels, rec)
    })?);
    outputs.push(write_table(dir, DOUBLE_TIES_FILE, d, |w| {
        io_output::write_double_ties(w, labels, rec)
    })?);
    Ok(outputs)
}

fn check_reference(wide: &str, reference_path: &str) -> BTallyResult<()> {
    let reference = fs::read_to_string(reference_path).context(OpeningFileSnafu {
        path: reference_path,
    })?;
    if reference.trim_end() != wide.trim_end() {
        warn!("Found differences with the reference {}", reference_path);
        print_diff(reference.trim_end(), wide.trim_end(), "\n");
        return Err(Box::new(TallyError::ReferenceMismatch {
            path: reference_path.to_string(),
        }));
    }
    info!("The item table matches the reference {}", reference_path);
    Ok(())
}

/// Reads every matching file of the input directory, tallies them as
/// successive batches and writes the tables to the output directory.
///
/// A file that cannot be read is skipped. The run fails when nothing is left.
pub fn run_tally_files(settings: &RunSettings, reference: Option<&str>) -> BTallyResult<RunSummary> {
    info!("run_tally_files: settings: {:?}", settings);
    let paths = io_common::find_batches(&settings.input_dir, &settings.file_pattern)?;
    let (batches, skipped) = read_batches(&paths, settings);
    if batches.is_empty() {
        return Err(Box::new(TallyError::NoUsableBatch { count: paths.len() }));
    }

    let names: Vec<String> = batches.iter().map(|b| b.name.clone()).collect();
    let events: Vec<Vec<Event>> = batches.into_iter().map(|b| b.events).collect();
    let res = run_tally(&events, &settings.vocabulary, &settings.rules).context(InvalidConfigSnafu {})?;
    log_anomalies(&names, &res);

    let wide = wide_table(&res, settings)?;
    let outputs = write_outputs(&res, settings, &wide)?;
    info!(
        "{} batch(es) tallied, {} skipped, tables written to {}",
        names.len(),
        skipped.len(),
        settings.output_dir.display()
    );

    if let Some(reference_path) = reference {
        check_reference(&wide, reference_path)?;
    }

    Ok(RunSummary {
        batches: names,
        skipped,
        outputs,
    })
}

pub fn run_from_args(args: &Args) -> BTallyResult<RunSummary> {
    let (config, root) = match &args.config {
        Some(config_path) => {
            let config = read_config(config_path)?;
            let root = Path::new(config_path)
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."));
            (config, root)
        }
        None => (TallyConfig::default(), PathBuf::from(".")),
    };
    let settings = resolve_settings(&config, &root, args)?;
    run_tally_files(&settings, args.reference.as_deref())
}

/// Writes `input` without its comment lines to the standard output when
/// `output` is `stdout`, else to `output` or next to the input as
/// `<name>_clean.csv`.
pub fn strip_comment_file(input: &str, output: Option<&str>) -> BTallyResult<Option<PathBuf>> {
    let in_path = PathBuf::from(input);
    let reader = File::open(&in_path).context(OpeningFileSnafu { path: input })?;
    if output == Some("stdout") {
        let removed = io_common::strip_comments(BufReader::new(reader), std::io::stdout().lock())
            .context(OpeningFileSnafu { path: "stdout" })?;
        info!("{} comment line(s) removed", removed);
        return Ok(None);
    }
    let out_path = match output {
        Some(o) => PathBuf::from(o),
        None => {
            let stem = in_path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            in_path.with_file_name(format!("{}_clean.csv", stem))
        }
    };
    let writer = File::create(&out_path).context(OpeningFileSnafu {
        path: out_path.display().to_string(),
    })?;
    let removed = io_common::strip_comments(BufReader::new(reader), writer).context(OpeningFileSnafu {
        path: out_path.display().to_string(),
    })?;
    info!(
        "{} comment line(s) removed, written to {}",
        removed,
        out_path.display()
    );
    Ok(Some(out_path))
}
