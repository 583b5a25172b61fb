use crate::args::Args;
use crate::tally::*;

use log::debug;
use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use trial_tally::{GroupMatcher, GroupVocabulary, TallyRules};

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize, Default)]
pub struct InputSettings {
    pub directory: Option<String>,
    #[serde(rename = "filePattern")]
    pub file_pattern: Option<String>,
    #[serde(rename = "itemNumberShift")]
    pub item_number_shift: Option<i64>,
    #[serde(rename = "excludedLabels")]
    pub excluded_labels: Option<Vec<String>>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize, Default)]
pub struct OutputSettings {
    #[serde(rename = "outputDirectory")]
    pub output_directory: Option<String>,
    pub delimiter: Option<String>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct GroupSource {
    pub label: String,
    pub matches: Vec<String>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize, Default)]
pub struct RulesSettings {
    #[serde(rename = "participantsPerGroup")]
    pub participants_per_group: Option<usize>,
    #[serde(rename = "decimalPlaces")]
    pub decimal_places: Option<u32>,
    pub labels: Option<Vec<String>>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize, Default)]
pub struct TallyConfig {
    #[serde(rename = "inputSettings", default)]
    pub input_settings: InputSettings,
    #[serde(rename = "outputSettings", default)]
    pub output_settings: OutputSettings,
    pub groups: Option<Vec<GroupSource>>,
    #[serde(default)]
    pub rules: RulesSettings,
}

pub const DEFAULT_FILE_PATTERN: &str = "results_prod*.csv";
pub const DEFAULT_OUTPUT_DIRECTORY: &str = "logs_em_tratamento";

/// The labels that get their own count columns in the reports.
pub fn default_labels() -> Vec<String> {
    vec![
        "positiva".to_string(),
        "negativa".to_string(),
        "neutra".to_string(),
    ]
}

/// Sections of the experiment that never contain trials.
pub fn default_excluded_labels() -> Vec<String> {
    vec![
        "TCLE".to_string(),
        "instrucoes".to_string(),
        "agradecimento".to_string(),
    ]
}

/// Everything a run needs, after merging the configuration file and the
/// command line.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct RunSettings {
    pub input_dir: PathBuf,
    pub file_pattern: String,
    pub item_number_shift: i64,
    pub excluded_labels: Vec<String>,
    pub output_dir: PathBuf,
    pub delimiter: u8,
    pub vocabulary: GroupVocabulary,
    pub rules: TallyRules,
    pub labels: Vec<String>,
}

pub fn read_config(path: &str) -> BTallyResult<TallyConfig> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    let config: TallyConfig =
        serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path })?;
    debug!("read_config: {:?}", config);
    Ok(config)
}

fn parse_delimiter(s: &str) -> TallyRunResult<u8> {
    match s {
        "\\t" | "tab" => Ok(b'\t'),
        _ if s.len() == 1 && s.is_ascii() => Ok(s.as_bytes()[0]),
        _ => whatever!("the delimiter must be a single ASCII character, got {:?}", s),
    }
}

fn build_vocabulary(groups: &Option<Vec<GroupSource>>) -> TallyRunResult<GroupVocabulary> {
    match groups {
        None => Ok(GroupVocabulary::gender()),
        Some(gs) => GroupVocabulary::new(
            gs.iter()
                .map(|g| GroupMatcher {
                    label: g.label.clone(),
                    fragments: g.matches.clone(),
                })
                .collect(),
        )
        .context(InvalidConfigSnafu {}),
    }
}

/// Merges the configuration with the command line flags, which take
/// precedence. Relative directories of the configuration are resolved
/// against `root`, the directory of the configuration file.
pub fn resolve_settings(config: &TallyConfig, root: &Path, args: &Args) -> TallyRunResult<RunSettings> {
    let input_dir = match (&args.input, &config.input_settings.directory) {
        (Some(d), _) => PathBuf::from(d),
        (None, Some(d)) => root.join(d),
        (None, None) => root.to_path_buf(),
    };
    let output_dir = match (&args.out, &config.output_settings.output_directory) {
        (Some(d), _) => PathBuf::from(d),
        (None, Some(d)) => root.join(d),
        (None, None) => root.join(DEFAULT_OUTPUT_DIRECTORY),
    };
    let delimiter = parse_delimiter(
        args.delimiter
            .as_deref()
            .or(config.output_settings.delimiter.as_deref())
            .unwrap_or(","),
    )?;

    let rules = TallyRules {
        decimal_places: args
            .decimal_places
            .or(config.rules.decimal_places)
            .unwrap_or(TallyRules::DEFAULT_RULES.decimal_places),
        participants_per_group: args
            .participants_per_group
            .or(config.rules.participants_per_group)
            .unwrap_or(TallyRules::DEFAULT_RULES.participants_per_group),
    };
    rules.validate().context(InvalidConfigSnafu {})?;

    let vocabulary = build_vocabulary(&config.groups)?;
    if vocabulary.labels().len() != 2 {
        whatever!(
            "exactly two groups must be configured, found {:?}",
            vocabulary.labels()
        )
    }

    let labels = config.rules.labels.clone().unwrap_or_else(default_labels);
    if labels.iter().any(|l| l == trial_tally::Majority::TIE_SENTINEL) {
        whatever!(
            "{:?} marks ties and cannot be used as a label",
            trial_tally::Majority::TIE_SENTINEL
        )
    }

    Ok(RunSettings {
        input_dir,
        file_pattern: args
            .pattern
            .clone()
            .or_else(|| config.input_settings.file_pattern.clone())
            .unwrap_or_else(|| DEFAULT_FILE_PATTERN.to_string()),
        item_number_shift: args
            .item_number_shift
            .or(config.input_settings.item_number_shift)
            .unwrap_or(0),
        excluded_labels: config
            .input_settings
            .excluded_labels
            .clone()
            .unwrap_or_else(default_excluded_labels),
        output_dir,
        delimiter,
        vocabulary,
        rules,
        labels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn args(extra: &[&str]) -> Args {
        let mut all = vec!["trialtally"];
        all.extend_from_slice(extra);
        Args::parse_from(all)
    }

    #[test]
    fn full_config_is_parsed() {
        let js = r#"{
            "inputSettings": {
                "directory": "logs_brutos",
                "filePattern": "bloco_*.csv",
                "itemNumberShift": 3,
                "excludedLabels": ["TCLE"]
            },
            "outputSettings": { "outputDirectory": "out", "delimiter": "\\t" },
            "groups": [
                { "label": "m", "matches": ["masculin"] },
                { "label": "f", "matches": ["feminin"] }
            ],
            "rules": { "participantsPerGroup": 3, "decimalPlaces": 2, "labels": ["sim", "nao"] }
        }"#;
        let config: TallyConfig = serde_json::from_str(js).unwrap();
        let s = resolve_settings(&config, Path::new("/data"), &args(&[])).unwrap();
        assert_eq!(s.input_dir, PathBuf::from("/data/logs_brutos"));
        assert_eq!(s.output_dir, PathBuf::from("/data/out"));
        assert_eq!(s.file_pattern, "bloco_*.csv");
        assert_eq!(s.item_number_shift, 3);
        assert_eq!(s.excluded_labels, vec!["TCLE".to_string()]);
        assert_eq!(s.delimiter, b'\t');
        assert_eq!(s.rules.participants_per_group, 3);
        assert_eq!(s.rules.decimal_places, 2);
        assert_eq!(s.labels, vec!["sim".to_string(), "nao".to_string()]);
        assert_eq!(s.vocabulary.labels(), vec!["m", "f"]);
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config: TallyConfig = serde_json::from_str("{}").unwrap();
        let s = resolve_settings(&config, Path::new("exp"), &args(&[])).unwrap();
        assert_eq!(s.input_dir, PathBuf::from("exp"));
        assert_eq!(s.output_dir, PathBuf::from("exp/logs_em_tratamento"));
        assert_eq!(s.file_pattern, DEFAULT_FILE_PATTERN);
        assert_eq!(s.rules, TallyRules::DEFAULT_RULES);
        assert_eq!(s.labels, default_labels());
        assert_eq!(s.delimiter, b',');
        assert_eq!(s.vocabulary, GroupVocabulary::gender());
    }

    #[test]
    fn command_line_overrides_the_file() {
        let config: TallyConfig = serde_json::from_str(
            r#"{ "rules": { "participantsPerGroup": 3 }, "inputSettings": { "directory": "a" } }"#,
        )
        .unwrap();
        let s = resolve_settings(
            &config,
            Path::new("."),
            &args(&[
                "--participants-per-group",
                "6",
                "--input",
                "elsewhere",
                "--delimiter",
                ";",
            ]),
        )
        .unwrap();
        assert_eq!(s.rules.participants_per_group, 6);
        assert_eq!(s.input_dir, PathBuf::from("elsewhere"));
        assert_eq!(s.delimiter, b';');
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let three_groups: TallyConfig = serde_json::from_str(
            r#"{ "groups": [
                { "label": "a", "matches": ["x"] },
                { "label": "b", "matches": ["y"] },
                { "label": "c", "matches": ["z"] }
            ] }"#,
        )
        .unwrap();
        assert!(resolve_settings(&three_groups, Path::new("."), &args(&[])).is_err());

        let reserved: TallyConfig =
            serde_json::from_str(r#"{ "rules": { "labels": ["empate", "sim"] } }"#).unwrap();
        assert!(resolve_settings(&reserved, Path::new("."), &args(&[])).is_err());

        let config = TallyConfig::default();
        let res = resolve_settings(&config, Path::new("."), &args(&["--participants-per-group", "0"]));
        assert!(matches!(res, Err(TallyError::InvalidConfig { .. })));
        assert!(resolve_settings(&config, Path::new("."), &args(&["--delimiter", "ab"])).is_err());
    }
}
