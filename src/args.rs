use clap::Parser;

/// This is the ingestion tool for pairwise-comparison survey responses.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path) The JSON document to process: a submission (current or legacy layout) or,
    /// in normalize mode, a saved progress or export document.
    #[clap(short, long, value_parser)]
    pub input: String,

    /// (default ingest) What to do with the input:
    ///  - ingest: validate the submission and append it to the CSV sheets of the output directory
    ///  - validate: only print the validation errors of the submission
    ///  - normalize: map the responses of the input onto the survey definition given with --schema
    #[clap(short, long, value_parser)]
    pub mode: Option<String>,

    /// (file path) The current survey definition, in JSON format. Required by the normalize mode.
    #[clap(short, long, value_parser)]
    pub schema: Option<String>,

    /// (directory path) Where the CSV sheets are written. Setting this option overrides the
    /// directory that may be specified with the --config option.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (file path, optional) The ingestion settings, in JSON format.
    #[clap(short, long, value_parser)]
    pub config: Option<String>,

    /// (file path) A reference file containing the expected output in JSON format. If provided,
    /// pwsurvey will check that its output matches the reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
