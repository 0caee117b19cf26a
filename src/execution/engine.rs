//! Main execution engine - orchestrates one pipeline execution

use crate::{
    core::{
        condition::Branch, ExecutionContext, ExecutionRecord, ExecutionStatus, ParameterValue, Pipeline, Step,
        StepInput, StepKind, StepRecord,
    },
    execution::{
        runner::{ResolvedStep, StepError, StepRunner},
        scheduler::{ExecutionPlan, ExecutionScheduler, SchedulingStrategy},
    },
};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::task::{self, JoinSet};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Events that can occur during pipeline execution
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    ExecutionStarted {
        execution_id: Uuid,
        pipeline_name: String,
    },
    StepStarted {
        step: String,
        kind: StepKind,
    },
    StepSucceeded {
        step: String,
        outputs: BTreeMap<String, Value>,
    },
    StepFailed {
        step: String,
        reason: String,
    },
    ConditionEvaluated {
        step: String,
        branch: Branch,
    },
    ExecutionFinished {
        execution_id: Uuid,
        status: ExecutionStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// Shared, live view of an execution
pub type SharedRecord = Arc<RwLock<ExecutionRecord>>;

/// Cooperative stop request for a running execution
#[derive(Debug, Clone)]
pub struct StopSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn request(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_requested(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once a stop has been requested
    pub async fn requested(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as self, so this only returns once the flag is set
        let _ = rx.wait_for(|stop| *stop).await;
    }
}

type StepOutcome = (String, Result<BTreeMap<String, Value>, StepError>);

/// Main pipeline execution engine
pub struct ExecutionEngine<R> {
    runner: Arc<R>,
    strategy: SchedulingStrategy,
    step_timeout: Option<Duration>,
    event_handlers: Vec<EventHandler>,
}

impl<R: StepRunner + 'static> ExecutionEngine<R> {
    pub fn new(runner: R, strategy: SchedulingStrategy) -> Self {
        Self::with_shared_runner(Arc::new(runner), strategy)
    }

    pub fn with_shared_runner(runner: Arc<R>, strategy: SchedulingStrategy) -> Self {
        Self {
            runner,
            strategy,
            step_timeout: None,
            event_handlers: Vec::new(),
        }
    }

    /// Fail any step whose runner takes longer than `timeout`
    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = Some(timeout);
        self
    }

    /// Add an event handler
    pub fn with_event_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.event_handlers.push(Arc::new(handler));
        self
    }

    /// Emit an event to all handlers
    fn emit_event(&self, event: ExecutionEvent) {
        for handler in &self.event_handlers {
            handler(event.clone());
        }
    }

    /// Run a pipeline to completion with already-resolved parameter values.
    ///
    /// The record is not tied to a stored definition, so its version is 0.
    pub async fn run(&self, pipeline: &Pipeline, parameters: BTreeMap<String, ParameterValue>) -> ExecutionRecord {
        let record = Arc::new(RwLock::new(ExecutionRecord::new(pipeline.name(), 0, parameters)));
        self.execute(pipeline, record.clone(), StopSignal::new()).await;
        let snapshot = record.read().await.clone();
        snapshot
    }

    /// Execute the pipeline, keeping `record` up to date as steps progress
    pub async fn execute(&self, pipeline: &Pipeline, record: SharedRecord, stop: StopSignal) -> ExecutionStatus {
        let (execution_id, parameters) = {
            let mut rec = record.write().await;
            if rec.status == ExecutionStatus::Pending {
                rec.start();
            }
            (rec.execution_id, rec.parameters.clone())
        };

        info!("Starting pipeline execution: {} ({})", pipeline.name(), execution_id);
        self.emit_event(ExecutionEvent::ExecutionStarted {
            execution_id,
            pipeline_name: pipeline.name().to_string(),
        });

        let scheduler = ExecutionScheduler::new(self.strategy);
        let mut plan = ExecutionPlan::new(pipeline);
        let mut context = ExecutionContext::new(parameters);
        let mut running: JoinSet<StepOutcome> = JoinSet::new();
        let mut in_flight: HashMap<task::Id, String> = HashMap::new();
        let mut failure: Option<String> = None;
        let mut stopped = false;

        loop {
            if stop.is_requested() {
                stopped = true;
                break;
            }

            if failure.is_none() {
                for name in scheduler.next_steps(&plan) {
                    let Some(step) = pipeline.step(&name) else {
                        continue;
                    };
                    plan.set_status(&name, ExecutionStatus::Executing);
                    self.record_started(&record, step).await;

                    if let Some(node) = &step.condition {
                        let resolve = |input: &StepInput| context.resolve(input);
                        match node.select_branch(&resolve) {
                            Ok(branch) => {
                                debug!("Condition {} selected the {} arm", name, branch);
                                plan.activate(node.arm(branch).iter().map(|s| s.name.clone()));
                                plan.set_status(&name, ExecutionStatus::Succeeded);
                                self.record_condition(&record, &name, branch).await;
                            }
                            Err(e) => {
                                let reason = e.to_string();
                                plan.set_status(&name, ExecutionStatus::Failed);
                                self.record_failed(&record, &name, &reason).await;
                                failure.get_or_insert(reason);
                                break;
                            }
                        }
                        continue;
                    }

                    match self.resolve_step(execution_id, step, &context) {
                        Ok(resolved) => {
                            let runner = self.runner.clone();
                            let timeout = self.step_timeout;
                            let handle = running.spawn(async move {
                                let result = run_with_timeout(runner.as_ref(), &resolved, timeout).await;
                                (resolved.name, result)
                            });
                            in_flight.insert(handle.id(), name.clone());
                        }
                        Err(e) => {
                            let reason = e.to_string();
                            plan.set_status(&name, ExecutionStatus::Failed);
                            self.record_failed(&record, &name, &reason).await;
                            failure.get_or_insert(reason);
                            break;
                        }
                    }
                }
            }

            if running.is_empty() {
                if failure.is_some() || scheduler.next_steps(&plan).is_empty() {
                    break;
                }
                continue;
            }

            let joined = tokio::select! {
                joined = running.join_next_with_id() => joined,
                _ = stop.requested() => {
                    stopped = true;
                    break;
                }
            };

            let Some(joined) = joined else {
                continue;
            };
            let (name, result) = match joined {
                Ok((id, outcome)) => {
                    in_flight.remove(&id);
                    outcome
                }
                Err(e) => {
                    let reason = format!("step task ended abnormally: {}", e);
                    match in_flight.remove(&e.id()) {
                        Some(name) => {
                            plan.set_status(&name, ExecutionStatus::Failed);
                            self.record_failed(&record, &name, &reason).await;
                        }
                        None => warn!("{}", reason),
                    }
                    failure.get_or_insert(reason);
                    continue;
                }
            };

            let result = result.and_then(|outputs| {
                pipeline
                    .step(&name)
                    .map(|step| declared_outputs(step, outputs))
                    .unwrap_or_else(|| Ok(BTreeMap::new()))
            });

            match result {
                Ok(outputs) => {
                    plan.set_status(&name, ExecutionStatus::Succeeded);
                    context.set_step_outputs(&name, outputs.clone());
                    self.record_succeeded(&record, &name, outputs).await;
                }
                Err(e) => {
                    let reason = e.to_string();
                    plan.set_status(&name, ExecutionStatus::Failed);
                    self.record_failed(&record, &name, &reason).await;
                    failure.get_or_insert(reason);
                }
            }
        }

        if stopped {
            running.abort_all();
            while running.join_next().await.is_some() {}
        }

        let (status, reason) = match (stopped, failure) {
            (true, _) => (ExecutionStatus::Stopped, None),
            (false, Some(reason)) => (ExecutionStatus::Failed, Some(reason)),
            (false, None) => (ExecutionStatus::Succeeded, None),
        };

        {
            let mut rec = record.write().await;
            if status == ExecutionStatus::Stopped {
                for step in rec.steps.iter_mut().filter(|s| s.status == ExecutionStatus::Executing) {
                    step.status = ExecutionStatus::Stopped;
                    step.ended_at = Some(chrono::Utc::now());
                }
            }
            rec.finish(status, reason);
        }

        info!("Pipeline execution finished: {} - {}", pipeline.name(), status);
        self.emit_event(ExecutionEvent::ExecutionFinished { execution_id, status });

        status
    }

    fn resolve_step(
        &self,
        execution_id: Uuid,
        step: &Step,
        context: &ExecutionContext,
    ) -> Result<ResolvedStep, StepError> {
        let mut inputs = BTreeMap::new();
        for (input, value) in &step.inputs {
            let resolved = context.resolve(value).map_err(|e| StepError::Unresolved {
                input: input.clone(),
                reason: e.to_string(),
            })?;
            inputs.insert(input.clone(), resolved);
        }

        Ok(ResolvedStep {
            execution_id,
            name: step.name.clone(),
            kind: step.kind,
            payload: step.payload.clone(),
            inputs,
            outputs: step.outputs.clone(),
        })
    }

    async fn record_started(&self, record: &SharedRecord, step: &Step) {
        let mut entry = StepRecord::new(step.name.clone(), step.kind);
        entry.start();
        record.write().await.steps.push(entry);

        debug!("Step started: {}", step.name);
        self.emit_event(ExecutionEvent::StepStarted {
            step: step.name.clone(),
            kind: step.kind,
        });
    }

    async fn record_succeeded(&self, record: &SharedRecord, name: &str, outputs: BTreeMap<String, Value>) {
        if let Some(entry) = record.write().await.step_mut(name) {
            entry.succeed(outputs.clone());
        }
        self.emit_event(ExecutionEvent::StepSucceeded {
            step: name.to_string(),
            outputs,
        });
    }

    async fn record_condition(&self, record: &SharedRecord, name: &str, branch: Branch) {
        if let Some(entry) = record.write().await.step_mut(name) {
            entry.outcome = Some(branch);
            entry.succeed(BTreeMap::new());
        }
        self.emit_event(ExecutionEvent::ConditionEvaluated {
            step: name.to_string(),
            branch,
        });
    }

    async fn record_failed(&self, record: &SharedRecord, name: &str, reason: &str) {
        warn!("Step {} failed: {}", name, reason);
        if let Some(entry) = record.write().await.step_mut(name) {
            entry.fail(reason);
        }
        self.emit_event(ExecutionEvent::StepFailed {
            step: name.to_string(),
            reason: reason.to_string(),
        });
    }
}

async fn run_with_timeout<R: StepRunner + ?Sized>(
    runner: &R,
    step: &ResolvedStep,
    timeout: Option<Duration>,
) -> Result<BTreeMap<String, Value>, StepError> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, runner.run(step))
            .await
            .unwrap_or(Err(StepError::Timeout(limit))),
        None => runner.run(step).await,
    }
}

/// Keep only the declared outputs, failing if any is missing
fn declared_outputs(step: &Step, mut produced: BTreeMap<String, Value>) -> Result<BTreeMap<String, Value>, StepError> {
    let mut outputs = BTreeMap::new();
    for output in &step.outputs {
        match produced.remove(output) {
            Some(value) => {
                outputs.insert(output.clone(), value);
            }
            None => {
                return Err(StepError::MissingOutput {
                    step: step.name.clone(),
                    output: output.clone(),
                })
            }
        }
    }
    Ok(outputs)
}
