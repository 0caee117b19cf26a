use anyhow::{anyhow, Context, Result};
use ml_pipeline::cli::commands::{
    CreateEndpointCommand, DefinitionCommand, DeleteCommand, DescribeCommand, ListCommand, RunCommand, RunnerArgs,
    SessionArgs, StartCommand, StopCommand, TeardownCommand, UpsertCommand, ValidateCommand,
};
use ml_pipeline::cli::output::*;
use ml_pipeline::cli::{Cli, Command};
use ml_pipeline::core::config::PipelineConfig;
use ml_pipeline::core::{ExecutionRecord, ExecutionStatus, ParameterError, Pipeline};
use ml_pipeline::execution::{ExecutionEngine, SchedulingStrategy, StaticRunner};
use ml_pipeline::service::{
    teardown, wait_for, Credential, EndpointSpec, LocalPipelineService, PipelineService, ServiceConfig,
    SessionContext, TeardownRequest,
};
use std::path::Path;
use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    // Execute command
    match &cli.command {
        Command::Validate(cmd) => validate_pipeline(cmd)?,
        Command::Definition(cmd) => render_definition(cmd)?,
        Command::Run(cmd) => run_pipeline(cmd).await?,
        Command::Upsert(cmd) => upsert_pipeline(cmd).await?,
        Command::Start(cmd) => start_execution(cmd).await?,
        Command::Describe(cmd) => describe_execution(cmd).await?,
        Command::Stop(cmd) => stop_execution(cmd).await?,
        Command::List(cmd) => list(cmd).await?,
        Command::Delete(cmd) => delete_pipeline(cmd).await?,
        Command::CreateEndpoint(cmd) => create_endpoint(cmd).await?,
        Command::Teardown(cmd) => teardown_resources(cmd).await?,
    }

    Ok(())
}

/// Load and validate a pipeline, printing every validation error on failure
fn load_pipeline(path: &Path) -> Result<Pipeline> {
    let config = PipelineConfig::from_file(path).context("Failed to load pipeline config")?;

    match config.to_pipeline() {
        Ok(pipeline) => Ok(pipeline),
        Err(e) => {
            println!("{} Validation failed for {}:", CROSS, style(&config.name).bold());
            for err in e.errors() {
                println!("  - {}", style(err).red());
            }
            Err(anyhow!(e))
        }
    }
}

fn report_parameter_errors(errors: Vec<ParameterError>) -> anyhow::Error {
    println!("{} Invalid parameters:", CROSS);
    for err in &errors {
        println!("  - {}", style(err).red());
    }
    anyhow!("{} invalid parameter(s)", errors.len())
}

fn session(args: &SessionArgs) -> SessionContext {
    let credential = Credential::new(args.access_key_id.clone(), args.secret_access_key.clone());
    let ctx = SessionContext::new(args.region.clone(), credential);
    match &args.role_arn {
        Some(role) => ctx.with_role(role.clone()),
        None => ctx,
    }
}

fn build_runner(args: &RunnerArgs) -> StaticRunner {
    let runner = args
        .outputs
        .iter()
        .fold(StaticRunner::new(), |runner, (step, output, value)| {
            runner.with_output(step.clone(), output.clone(), value.clone())
        });
    args.failures
        .iter()
        .fold(runner, |runner, (step, message)| runner.with_failure(step.clone(), message.clone()))
}

async fn open_service(
    args: &SessionArgs,
    runner: StaticRunner,
    strategy: SchedulingStrategy,
) -> Result<LocalPipelineService<StaticRunner>> {
    let mut config = ServiceConfig::new().with_strategy(strategy);
    if let Some(db) = &args.db {
        config = config.with_db_path(db);
    }

    #[cfg(feature = "sqlite")]
    let service = LocalPipelineService::open(runner, config)
        .await
        .context("Failed to open pipeline store")?;

    #[cfg(not(feature = "sqlite"))]
    let service = LocalPipelineService::new(
        std::sync::Arc::new(ml_pipeline::persistence::InMemoryPipelineStore::new()),
        runner,
        config,
    );

    Ok(service)
}

fn parse_execution_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).context("Invalid execution ID format")
}

fn exit_for(record: &ExecutionRecord) {
    if record.status != ExecutionStatus::Succeeded {
        if let Some(reason) = &record.failure_reason {
            error!("{}", reason);
        }
        std::process::exit(1);
    }
}

fn validate_pipeline(cmd: &ValidateCommand) -> Result<()> {
    println!("{} Validating pipeline...", INFO);

    let pipeline = match load_pipeline(&cmd.file) {
        Ok(pipeline) => pipeline,
        Err(_) => std::process::exit(1),
    };

    println!("{} Pipeline configuration is valid!", CHECK);
    println!("  Name: {}", style(pipeline.name()).bold());
    println!("  Parameters: {}", style(pipeline.parameters().len()).cyan());
    println!(
        "  Steps: {} ({} top-level)",
        style(pipeline.step_count()).cyan(),
        pipeline.steps().len()
    );
    println!("  Order: {}", style(pipeline.execution_order().join(" → ")).dim());

    if cmd.json {
        let json = serde_json::to_string_pretty(&pipeline)?;
        println!("\n{}", json);
    }
    Ok(())
}

fn render_definition(cmd: &DefinitionCommand) -> Result<()> {
    let pipeline = load_pipeline(&cmd.file)?;
    let json = pipeline.definition().to_json_pretty()?;

    match &cmd.output {
        Some(path) => {
            std::fs::write(path, &json).with_context(|| format!("Failed to write {}", path.display()))?;
            println!("{} Definition written to {}", CHECK, style(path.display()).bold());
        }
        None => println!("{}", json),
    }
    Ok(())
}

async fn run_pipeline(cmd: &RunCommand) -> Result<()> {
    let pipeline = load_pipeline(&cmd.file)?;
    println!("{} Loaded pipeline: {}", INFO, style(pipeline.name()).bold());

    let overrides = pipeline
        .parse_overrides(&cmd.parameters)
        .map_err(report_parameter_errors)?;
    let parameters = pipeline
        .resolve_parameters(&overrides)
        .map_err(report_parameter_errors)?;
    for (key, value) in &overrides {
        println!(
            "{} Parameter override: {} = {}",
            INFO,
            style(key).cyan(),
            style(value).dim()
        );
    }

    let json = cmd.json;
    let engine = ExecutionEngine::new(build_runner(&cmd.runner), cmd.runner.strategy.into())
        .with_event_handler(move |event| {
            if !json {
                println!("{}", format_execution_event(&event));
            }
        });

    println!();
    let record = engine.run(&pipeline, parameters).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else if record.status == ExecutionStatus::Succeeded {
        println!(
            "\n{} {} completed {}",
            CHECK,
            style(pipeline.name()).bold(),
            style("successfully").green()
        );
    } else {
        println!("\n{} {} {}", CROSS, style(pipeline.name()).bold(), format_status(record.status));
    }

    exit_for(&record);
    Ok(())
}

async fn upsert_pipeline(cmd: &UpsertCommand) -> Result<()> {
    let pipeline = load_pipeline(&cmd.file)?;
    let service = open_service(&cmd.session, StaticRunner::new(), SchedulingStrategy::Sequential).await?;

    let outcome = service.upsert(&session(&cmd.session), &pipeline).await?;
    println!(
        "{} {} {} (version {}, id {})",
        CHECK,
        if outcome.created { "Created" } else { "Updated" },
        style(pipeline.name()).bold(),
        outcome.version,
        style(&outcome.pipeline_id).dim()
    );
    Ok(())
}

async fn start_execution(cmd: &StartCommand) -> Result<()> {
    let ctx = session(&cmd.session);
    let service = open_service(&cmd.session, build_runner(&cmd.runner), cmd.runner.strategy.into()).await?;

    let stored = service.get_pipeline(&ctx, &cmd.pipeline).await?;
    let overrides = stored
        .pipeline
        .parse_overrides(&cmd.parameters)
        .map_err(report_parameter_errors)?;

    let started = service.start(&ctx, &cmd.pipeline, &overrides).await?;
    println!(
        "{} Started {} ({})",
        ROCKET,
        style(&cmd.pipeline).bold(),
        style(started.execution_id).dim()
    );

    // The local service runs the execution in this process, so always wait for it
    let spinner = create_spinner(format!("Waiting for {}", started.execution_id));
    let record = wait_for(&service, &ctx, started.execution_id, service.config().poll_interval()).await;
    spinner.finish_and_clear();
    let record = record?;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        print_execution(&record);
    }

    exit_for(&record);
    Ok(())
}

async fn describe_execution(cmd: &DescribeCommand) -> Result<()> {
    let execution_id = parse_execution_id(&cmd.execution_id)?;
    let service = open_service(&cmd.session, StaticRunner::new(), SchedulingStrategy::Sequential).await?;

    let record = service.describe(&session(&cmd.session), execution_id).await?;
    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        print_execution(&record);
    }
    Ok(())
}

async fn stop_execution(cmd: &StopCommand) -> Result<()> {
    let execution_id = parse_execution_id(&cmd.execution_id)?;
    let service = open_service(&cmd.session, StaticRunner::new(), SchedulingStrategy::Sequential).await?;

    service.stop(&session(&cmd.session), execution_id).await?;
    println!("{} Stop requested for {}", WARN, style(execution_id).cyan());
    Ok(())
}

async fn list(cmd: &ListCommand) -> Result<()> {
    let ctx = session(&cmd.session);
    let service = open_service(&cmd.session, StaticRunner::new(), SchedulingStrategy::Sequential).await?;

    match &cmd.pipeline {
        None => {
            let pipelines = service.list_pipelines(&ctx).await?;
            if cmd.json {
                println!("{}", serde_json::to_string_pretty(&serde_json::json!({ "pipelines": pipelines }))?);
            } else if pipelines.is_empty() {
                println!("{} No pipelines found", INFO);
            } else {
                println!("{} Pipelines:", INFO);
                for name in &pipelines {
                    println!("  {}", style(name).bold());
                }
            }
        }
        Some(name) => {
            let mut executions = service.list_executions(&ctx, name).await?;
            executions.truncate(cmd.limit);
            if cmd.json {
                println!("{}", serde_json::to_string_pretty(&serde_json::json!({ "executions": executions }))?);
            } else if executions.is_empty() {
                println!("{} No executions found for {}", INFO, style(name).bold());
            } else {
                println!("{} Executions of {} (showing latest {}):", INFO, style(name).bold(), cmd.limit);
                for summary in &executions {
                    println!("  {}", format_execution_summary(summary));
                }
            }
        }
    }
    Ok(())
}

async fn delete_pipeline(cmd: &DeleteCommand) -> Result<()> {
    let service = open_service(&cmd.session, StaticRunner::new(), SchedulingStrategy::Sequential).await?;

    if service.delete_pipeline(&session(&cmd.session), &cmd.pipeline).await? {
        println!("{} Deleted {}", CHECK, style(&cmd.pipeline).bold());
    } else {
        println!("{} Pipeline {} not found", WARN, style(&cmd.pipeline).bold());
    }
    Ok(())
}

async fn create_endpoint(cmd: &CreateEndpointCommand) -> Result<()> {
    let service = open_service(&cmd.session, StaticRunner::new(), SchedulingStrategy::Sequential).await?;
    let spec = EndpointSpec {
        name: cmd.name.clone(),
        model_name: cmd.model.clone(),
    };

    let endpoint = service.create_endpoint(&session(&cmd.session), &spec).await?;
    println!(
        "{} Endpoint {} serves {}",
        CHECK,
        style(&endpoint.name).bold(),
        style(&endpoint.model_name).cyan()
    );
    Ok(())
}

async fn teardown_resources(cmd: &TeardownCommand) -> Result<()> {
    let service = open_service(&cmd.session, StaticRunner::new(), SchedulingStrategy::Sequential).await?;
    let request = TeardownRequest {
        pipeline_name: cmd.pipeline.clone(),
        endpoints: cmd.endpoints.clone(),
    };

    let report = teardown(&service, &session(&cmd.session), &request).await?;
    if let Some(name) = &request.pipeline_name {
        if report.pipeline_deleted {
            println!("{} Deleted pipeline {}", CHECK, style(name).bold());
        } else {
            println!("{} Pipeline {} not found", WARN, style(name).bold());
        }
    }
    for endpoint in &report.endpoints_deleted {
        println!("{} Deleted endpoint {}", CHECK, style(endpoint).bold());
    }
    for endpoint in &report.endpoints_missing {
        println!("{} Endpoint {} not found", WARN, style(endpoint).bold());
    }
    Ok(())
}
