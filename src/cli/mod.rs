//! Command-line interface

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use commands::{
    CreateEndpointCommand, DefinitionCommand, DeleteCommand, DescribeCommand, ListCommand, RunCommand, StartCommand,
    StopCommand, TeardownCommand, UpsertCommand, ValidateCommand,
};
use std::ffi::OsString;

/// Build, validate and submit ML pipelines
#[derive(Debug, Parser, Clone)]
#[command(name = "mlpipe")]
#[command(version)]
#[command(about = "Build, validate and submit declarative ML pipelines", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Validate a pipeline configuration
    Validate(ValidateCommand),

    /// Print the definition document that would be submitted
    Definition(DefinitionCommand),

    /// Run a pipeline locally
    Run(RunCommand),

    /// Create or update a pipeline definition
    Upsert(UpsertCommand),

    /// Start an execution and wait for it
    Start(StartCommand),

    /// Describe an execution
    Describe(DescribeCommand),

    /// Stop an execution
    Stop(StopCommand),

    /// List pipelines or executions
    List(ListCommand),

    /// Delete a pipeline definition
    Delete(DeleteCommand),

    /// Register a model endpoint
    CreateEndpoint(CreateEndpointCommand),

    /// Delete a pipeline and endpoints
    Teardown(TeardownCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}
