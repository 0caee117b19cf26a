//! CLI command definitions

use crate::execution::SchedulingStrategy;
use clap::Args;
use std::path::PathBuf;

/// Region, role and credential flags shared by service commands
#[derive(Debug, Args, Clone)]
pub struct SessionArgs {
    /// Service region
    #[arg(long, env = "MLPIPE_REGION", default_value = "us-east-1")]
    pub region: String,

    /// Execution role the service assumes
    #[arg(long, env = "MLPIPE_ROLE_ARN")]
    pub role_arn: Option<String>,

    #[arg(long, env = "MLPIPE_ACCESS_KEY_ID", default_value = "")]
    pub access_key_id: String,

    #[arg(long, env = "MLPIPE_SECRET_ACCESS_KEY", default_value = "", hide_env_values = true)]
    pub secret_access_key: String,

    /// Database file for the local service
    #[arg(long, env = "MLPIPE_DB")]
    pub db: Option<PathBuf>,
}

/// Outputs served by the local step runner
#[derive(Debug, Args, Clone)]
pub struct RunnerArgs {
    /// Output value for a step (Step.output=<json>); unspecified outputs get a local artifact URI
    #[arg(long = "output", value_parser = parse_step_output)]
    pub outputs: Vec<(String, String, serde_json::Value)>,

    /// Make a step fail with the given message (Step=message)
    #[arg(long = "fail", value_parser = parse_key_value)]
    pub failures: Vec<(String, String)>,

    /// Scheduling strategy
    #[arg(long, value_enum, default_value_t = SchedulingStrategyArg::Sequential)]
    pub strategy: SchedulingStrategyArg,
}

/// Run a pipeline locally without submitting it
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: PathBuf,

    /// Parameter overrides (name=value)
    #[arg(long = "parameter", short = 'p', value_parser = parse_key_value)]
    pub parameters: Vec<(String, String)>,

    #[command(flatten)]
    pub runner: RunnerArgs,

    /// Print the final execution record as JSON
    #[arg(long)]
    pub json: bool,
}

/// Validate a pipeline configuration
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: PathBuf,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Render the pipeline definition document
#[derive(Debug, Args, Clone)]
pub struct DefinitionCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: PathBuf,

    /// Write to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Create or update a pipeline definition
#[derive(Debug, Args, Clone)]
pub struct UpsertCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: PathBuf,

    #[command(flatten)]
    pub session: SessionArgs,
}

/// Start an execution and wait for it to finish
#[derive(Debug, Args, Clone)]
pub struct StartCommand {
    /// Pipeline name
    pub pipeline: String,

    /// Parameter overrides (name=value)
    #[arg(long = "parameter", short = 'p', value_parser = parse_key_value)]
    pub parameters: Vec<(String, String)>,

    #[command(flatten)]
    pub runner: RunnerArgs,

    #[command(flatten)]
    pub session: SessionArgs,

    /// Print the final execution record as JSON
    #[arg(long)]
    pub json: bool,
}

/// Describe an execution
#[derive(Debug, Args, Clone)]
pub struct DescribeCommand {
    pub execution_id: String,

    #[command(flatten)]
    pub session: SessionArgs,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Stop an execution
#[derive(Debug, Args, Clone)]
pub struct StopCommand {
    pub execution_id: String,

    #[command(flatten)]
    pub session: SessionArgs,
}

/// List pipelines, or the executions of one pipeline
#[derive(Debug, Args, Clone)]
pub struct ListCommand {
    /// Pipeline name
    pub pipeline: Option<String>,

    /// Number of recent executions to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    #[command(flatten)]
    pub session: SessionArgs,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Delete a pipeline definition and its executions
#[derive(Debug, Args, Clone)]
pub struct DeleteCommand {
    pub pipeline: String,

    #[command(flatten)]
    pub session: SessionArgs,
}

/// Register a model endpoint
#[derive(Debug, Args, Clone)]
pub struct CreateEndpointCommand {
    /// Endpoint name
    pub name: String,

    /// Model served by the endpoint
    #[arg(long)]
    pub model: String,

    #[command(flatten)]
    pub session: SessionArgs,
}

/// Delete a pipeline and endpoints after a run
#[derive(Debug, Args, Clone)]
pub struct TeardownCommand {
    /// Pipeline to delete
    #[arg(long)]
    pub pipeline: Option<String>,

    /// Endpoint to delete (repeatable)
    #[arg(long = "endpoint")]
    pub endpoints: Vec<String>,

    #[command(flatten)]
    pub session: SessionArgs,
}

/// Scheduling strategy argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SchedulingStrategyArg {
    Sequential,
    Parallel,
    #[clap(name = "parallel-limited")]
    ParallelLimited,
}

impl From<SchedulingStrategyArg> for SchedulingStrategy {
    fn from(arg: SchedulingStrategyArg) -> Self {
        match arg {
            SchedulingStrategyArg::Sequential => SchedulingStrategy::Sequential,
            SchedulingStrategyArg::Parallel => SchedulingStrategy::Parallel,
            SchedulingStrategyArg::ParallelLimited => SchedulingStrategy::LimitedParallel(4),
        }
    }
}

/// Parse key=value pairs
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("Invalid key=value pair: {}", s)),
    }
}

/// Parse `Step.output=<json>`; values that are not valid JSON are taken as strings
pub fn parse_step_output(s: &str) -> Result<(String, String, serde_json::Value), String> {
    let (target, raw) = parse_key_value(s)?;
    let (step, output) = target
        .split_once('.')
        .filter(|(step, output)| !step.is_empty() && !output.is_empty())
        .ok_or_else(|| format!("Expected Step.output=value, got: {}", s))?;

    let value = serde_json::from_str(&raw).unwrap_or(serde_json::Value::String(raw));
    Ok((step.to_string(), output.to_string(), value))
}
