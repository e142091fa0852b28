use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "evalstore",
    version,
    about = "Log and inspect evaluation records, metrics and assessments per run"
)]
pub struct Cli {
    /// Artifact root holding one directory per run
    #[arg(long, global = true, env = "EVALSTORE_ARTIFACT_ROOT")]
    pub root: Option<PathBuf>,

    /// SQLite tracking database (runs and run metrics)
    #[arg(long, global = true, env = "EVALSTORE_TRACKING_DB")]
    pub db: Option<PathBuf>,

    /// YAML store config; flags and environment take precedence
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Log evaluations from a JSON or YAML file
    Log(LogArgs),
    /// Log one evaluation per row of a JSON or YAML table
    LogTable(LogTableArgs),
    /// Add or update assessments of a logged evaluation
    Assess(AssessArgs),
    /// Print one logged evaluation
    Get(GetArgs),
    /// List runs in the tracking database
    Runs(RunsArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Text,
}

#[derive(clap::Args, Debug, Clone)]
pub struct LogArgs {
    /// Evaluations: a list, or a single evaluation object
    #[arg(long)]
    pub file: PathBuf,

    /// Defaults to the active run, creating one if none is running
    #[arg(long)]
    pub run_id: Option<String>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct LogTableArgs {
    /// A list of row objects
    #[arg(long)]
    pub file: PathBuf,

    #[arg(long, value_delimiter = ',', required = true)]
    pub input_cols: Vec<String>,

    #[arg(long, value_delimiter = ',', required = true)]
    pub output_cols: Vec<String>,

    #[arg(long, value_delimiter = ',')]
    pub target_cols: Option<Vec<String>>,

    #[arg(long)]
    pub inputs_id_col: Option<String>,

    #[arg(long)]
    pub run_id: Option<String>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct AssessArgs {
    #[arg(long)]
    pub evaluation_id: String,

    /// Assessments: a list, or a single assessment object
    #[arg(long)]
    pub file: PathBuf,

    #[arg(long)]
    pub run_id: Option<String>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct GetArgs {
    #[arg(long)]
    pub run_id: String,

    #[arg(long)]
    pub evaluation_id: String,

    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,
}

#[derive(clap::Args, Debug, Clone)]
pub struct RunsArgs {
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}
