use clap::Parser;

/// Tabulates the classifications collected by PCIbex experiments.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path, optional) A JSON file describing the input, the output, the groups and the rules.
    /// Relative directories in this file are resolved against the directory of the file.
    #[clap(short, long, value_parser)]
    pub config: Option<String>,

    /// (directory) Where the result files are searched. Overrides the configuration.
    #[clap(short, long, value_parser)]
    pub input: Option<String>,

    /// (default results_prod*.csv) The names of the result files. `*` and `?` are wildcards.
    #[clap(long, value_parser)]
    pub pattern: Option<String>,

    /// (directory) Where the tables are written. Overrides the configuration.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (file path) A reference item table. If provided, the computed item table must match it.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    /// (default 4) How many participants of each group appear in the item table.
    #[clap(long, value_parser)]
    pub participants_per_group: Option<usize>,

    /// (default 3) Rounding of the elapsed times, in decimal places.
    #[clap(long, value_parser)]
    pub decimal_places: Option<u32>,

    /// (default 0) Subtracted from every item number read.
    #[clap(long, value_parser, allow_hyphen_values = true)]
    pub item_number_shift: Option<i64>,

    /// (default ,) The delimiter of the output tables. Use 'tab' for tabs.
    #[clap(long, value_parser)]
    pub delimiter: Option<String>,

    /// (file path) Only removes the comment lines of this file, writing the result to --out
    /// or next to the file. No tabulation happens.
    #[clap(long, value_parser)]
    pub strip_comments: Option<String>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
