//! Workflow execution engine: wave batching, parallel dispatch, layered
//! retry, deadline enforcement, and result/history accounting.

use super::{
    Step, StepStatus, Workflow, WorkflowErrorInfo, WorkflowMetrics, WorkflowRun, WorkflowStatus,
};
use crate::{
    agent::{EventSink, ExecutionContext},
    error::{AgentFlowError, Result},
    types::{EventCategory, ExecutionEvent},
};
use futures::future::join_all;
use serde_json::json;
use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn, Instrument};

/// Upper bound on any single step or workflow backoff wait
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Mutable state of one execution, shared across concurrently running
/// steps behind a workflow-local mutex.
#[derive(Default)]
struct RunState {
    results: HashMap<String, serde_json::Value>,
    history: Vec<ExecutionEvent>,
    statuses: HashMap<String, StepStatus>,
    attempts: HashMap<String, u32>,
    durations: HashMap<String, Duration>,
    retried: HashSet<String>,
    errors: HashMap<String, String>,
}

fn lock(state: &Mutex<RunState>) -> MutexGuard<'_, RunState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn push_event(state: &Mutex<RunState>, event: ExecutionEvent) {
    lock(state).history.push(event);
}

fn backoff(attempt: u32) -> Duration {
    Duration::from_secs(2_u64.saturating_pow(attempt)).min(MAX_BACKOFF)
}

impl Workflow {
    /// Execute the workflow and return its result bundle.
    ///
    /// Graph validation failures (unknown dependencies, cycles) and
    /// repeated execution are reported as `Err` before any step runs.
    /// Step failures, deadline expiry, and cancellation are reported
    /// inside the returned bundle: `status` is terminal, `results` holds
    /// the partial set that committed, and `error` names the terminating
    /// kind.
    pub async fn execute(&mut self) -> Result<WorkflowRun> {
        if self.status != WorkflowStatus::Pending {
            return Err(AgentFlowError::validation(
                "workflow has already been executed",
            ));
        }

        let span = tracing::info_span!(
            "workflow",
            workflow_id = %self.workflow_id,
            workflow = %self.config.name,
        );
        self.execute_inner().instrument(span).await
    }

    async fn execute_inner(&mut self) -> Result<WorkflowRun> {
        info!(steps = self.steps.len(), "starting workflow execution");
        self.status = WorkflowStatus::Running;

        let state = Arc::new(Mutex::new(RunState::default()));
        push_event(&state, ExecutionEvent::new(EventCategory::WorkflowStart));

        if let Err(err) = self.validate() {
            error!(error = %err, "workflow validation failed");
            self.status = WorkflowStatus::Failed;
            push_event(
                &state,
                ExecutionEvent::new(EventCategory::WorkflowEnd)
                    .payload(json!({ "error_kind": err.kind(), "error": err.to_string() })),
            );
            return Err(err);
        }

        let started = Instant::now();
        let timeout_ms = self.config.timeout.as_millis() as u64;

        let outcome =
            match tokio::time::timeout(self.config.timeout, self.run_with_retries(&state)).await {
                Ok(result) => result,
                Err(_) => {
                    // In-flight step futures are dropped with the run; the
                    // token tells tool handlers and any stragglers to stop.
                    self.cancel.cancel();
                    Err(AgentFlowError::workflow_timeout(timeout_ms))
                }
            };

        let elapsed = started.elapsed();
        self.write_back(&state, outcome.is_ok());

        let (status, error_info) = match &outcome {
            Ok(()) => (WorkflowStatus::Completed, None),
            Err(err) => {
                let status = if matches!(err, AgentFlowError::Cancelled) {
                    WorkflowStatus::Cancelled
                } else {
                    WorkflowStatus::Failed
                };
                let step_id = lock(&state)
                    .history
                    .iter()
                    .rev()
                    .find(|event| event.category == EventCategory::StepFailure)
                    .and_then(|event| event.step_id.clone());
                (
                    status,
                    Some(WorkflowErrorInfo {
                        step_id,
                        kind: err.kind().to_string(),
                        message: err.to_string(),
                    }),
                )
            }
        };
        self.status = status;

        let mut end_event = ExecutionEvent::new(EventCategory::WorkflowEnd).duration(elapsed);
        match &error_info {
            Some(info) => {
                let cancelled = matches!(
                    outcome,
                    Err(AgentFlowError::WorkflowTimeout { .. }) | Err(AgentFlowError::Cancelled)
                );
                end_event = end_event.payload(json!({
                    "error_kind": info.kind,
                    "error": info.message,
                    "cancelled": cancelled,
                }));
            }
            None => {
                end_event = end_event.payload(json!({ "completed": true }));
            }
        }
        push_event(&state, end_event);

        let metrics = self.build_metrics(&state, elapsed);
        let run = {
            let s = lock(&state);
            WorkflowRun {
                workflow_id: self.workflow_id,
                status: self.status,
                results: s.results.clone(),
                history: s.history.clone(),
                metrics,
                error: error_info,
            }
        };

        match self.status {
            WorkflowStatus::Completed => {
                info!(elapsed_ms = elapsed.as_millis() as u64, "workflow completed");
            }
            _ => {
                warn!(
                    status = ?self.status,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "workflow did not complete"
                );
            }
        }

        Ok(run)
    }

    async fn run_with_retries(&self, state: &Arc<Mutex<RunState>>) -> Result<()> {
        let mut attempt: u32 = 0;

        loop {
            self.reset_run(state);

            match self.run_waves(state).await {
                Ok(()) => return Ok(()),
                Err(err) if err.is_retryable() && attempt < self.config.max_workflow_retries => {
                    let delay = backoff(attempt + 1);
                    warn!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "workflow attempt failed with a transient error, retrying"
                    );
                    tokio::select! {
                        () = self.cancel.cancelled() => return Err(AgentFlowError::Cancelled),
                        () = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn reset_run(&self, state: &Arc<Mutex<RunState>>) {
        let mut s = lock(state);
        s.results.clear();
        s.attempts.clear();
        s.durations.clear();
        s.retried.clear();
        s.errors.clear();
        s.statuses = self
            .steps
            .iter()
            .map(|step| (step.step_id.clone(), StepStatus::Pending))
            .collect();
    }

    async fn run_waves(&self, state: &Arc<Mutex<RunState>>) -> Result<()> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_parallel_steps.max(1)));

        loop {
            if self.cancel.is_cancelled() {
                return Err(AgentFlowError::Cancelled);
            }

            let wave = self.next_wave(state);
            if wave.is_empty() {
                return Ok(());
            }

            if self.config.verbose_logging {
                debug!(steps = wave.len(), "dispatching wave");
            }

            let failure = if self.config.enable_parallel && wave.len() > 1 {
                let futures: Vec<_> = wave
                    .iter()
                    .map(|&idx| {
                        let semaphore = Arc::clone(&semaphore);
                        async move {
                            let _permit = semaphore
                                .acquire_owned()
                                .await
                                .map_err(|_| AgentFlowError::Cancelled)?;
                            self.run_step(idx, state).await
                        }
                    })
                    .collect();

                // The whole wave runs to completion: siblings of a failing
                // step still commit their results.
                join_all(futures)
                    .await
                    .into_iter()
                    .find_map(|outcome| outcome.err())
            } else {
                let mut failure = None;
                for &idx in &wave {
                    if let Err(err) = self.run_step(idx, state).await {
                        failure = Some(err);
                        break;
                    }
                }
                failure
            };

            if let Some(err) = failure {
                self.skip_pending(state);
                return Err(err);
            }
        }
    }

    /// Steps whose dependencies are all successful, in insertion order.
    fn next_wave(&self, state: &Arc<Mutex<RunState>>) -> Vec<usize> {
        let s = lock(state);
        self.steps
            .iter()
            .enumerate()
            .filter(|(_, step)| {
                s.statuses.get(&step.step_id) == Some(&StepStatus::Pending)
                    && step
                        .dependencies
                        .iter()
                        .all(|dep| s.statuses.get(dep) == Some(&StepStatus::Success))
            })
            .map(|(idx, _)| idx)
            .collect()
    }

    async fn run_step(&self, idx: usize, state: &Arc<Mutex<RunState>>) -> Result<()> {
        let step = &self.steps[idx];
        let step_id = step.step_id.clone();
        let step_timeout = step
            .agent
            .config()
            .invoke_timeout
            .unwrap_or(self.config.default_step_timeout);
        let timeout_ms = step_timeout.as_millis() as u64;

        {
            let mut s = lock(state);
            s.statuses.insert(step_id.clone(), StepStatus::Running);
            s.history
                .push(ExecutionEvent::new(EventCategory::StepStart).step(step_id.as_str()));
        }
        info!(step = %step_id, agent = step.agent.name(), "step started");

        let inputs = self.effective_inputs(step, state);

        let sink: EventSink = {
            let state = Arc::clone(state);
            Arc::new(move |event: ExecutionEvent| push_event(&state, event))
        };
        let ctx = ExecutionContext::scoped(step_id.clone(), self.cancel.clone(), sink);

        let started = Instant::now();
        let max_attempts = self.config.max_step_retries + 1;
        let mut attempt: u32 = 1;

        loop {
            {
                let mut s = lock(state);
                s.attempts.insert(step_id.clone(), attempt);
                s.history.push(
                    ExecutionEvent::new(EventCategory::StepAttempt)
                        .step(step_id.as_str())
                        .attempt(attempt),
                );
            }

            let outcome = if step_timeout.is_zero() {
                // A zero deadline fails before the model is ever invoked.
                Err(AgentFlowError::step_timeout(step_id.as_str(), 0))
            } else {
                match tokio::time::timeout(step_timeout, step.agent.execute(&inputs, &ctx)).await {
                    Ok(result) => result,
                    Err(_) => Err(AgentFlowError::step_timeout(step_id.as_str(), timeout_ms)),
                }
            };

            match outcome {
                Ok(value) => {
                    let elapsed = started.elapsed();
                    let mut s = lock(state);
                    if self.cancel.is_cancelled() {
                        // The token fired while the agent was finishing; do
                        // not commit the result.
                        return Err(AgentFlowError::Cancelled);
                    }
                    s.results.insert(step_id.clone(), value);
                    s.durations.insert(step_id.clone(), elapsed);
                    s.statuses.insert(step_id.clone(), StepStatus::Success);
                    if attempt > 1 {
                        s.retried.insert(step_id.clone());
                    }
                    s.history.push(
                        ExecutionEvent::new(EventCategory::StepSuccess)
                            .step(step_id.as_str())
                            .attempt(attempt)
                            .duration(elapsed),
                    );
                    drop(s);
                    info!(step = %step_id, attempt, "step completed");
                    return Ok(());
                }
                Err(AgentFlowError::Cancelled) => return Err(AgentFlowError::Cancelled),
                Err(err) => {
                    if err.is_retryable() && attempt < max_attempts && !self.cancel.is_cancelled()
                    {
                        push_event(
                            state,
                            ExecutionEvent::new(EventCategory::StepRetry)
                                .step(step_id.as_str())
                                .attempt(attempt)
                                .payload(json!({
                                    "error_kind": err.kind(),
                                    "error": err.to_string(),
                                })),
                        );
                        warn!(step = %step_id, attempt, error = %err, "step attempt failed, retrying");

                        let delay = backoff(attempt);
                        tokio::select! {
                            () = self.cancel.cancelled() => return Err(AgentFlowError::Cancelled),
                            () = tokio::time::sleep(delay) => {}
                        }
                        attempt += 1;
                    } else {
                        let elapsed = started.elapsed();
                        {
                            let mut s = lock(state);
                            s.statuses.insert(step_id.clone(), StepStatus::Failed);
                            s.errors.insert(step_id.clone(), err.to_string());
                            s.durations.insert(step_id.clone(), elapsed);
                            s.history.push(
                                ExecutionEvent::new(EventCategory::StepFailure)
                                    .step(step_id.as_str())
                                    .attempt(attempt)
                                    .duration(elapsed)
                                    .payload(json!({
                                        "error_kind": err.kind(),
                                        "error": err.to_string(),
                                    })),
                            );
                        }
                        error!(step = %step_id, attempt, error = %err, "step failed");
                        return Err(err);
                    }
                }
            }
        }
    }

    /// Literal inputs augmented with a `<dep>_result` entry per dependency.
    /// Dependency results are final committed values: a step only becomes
    /// eligible once every dependency reached success.
    fn effective_inputs(
        &self,
        step: &Step,
        state: &Arc<Mutex<RunState>>,
    ) -> HashMap<String, serde_json::Value> {
        let mut inputs = step.inputs.clone();
        let s = lock(state);
        for dep in &step.dependencies {
            if let Some(result) = s.results.get(dep) {
                inputs.insert(format!("{dep}_result"), result.clone());
            }
        }
        inputs
    }

    fn skip_pending(&self, state: &Arc<Mutex<RunState>>) {
        let mut s = lock(state);
        for status in s.statuses.values_mut() {
            if *status == StepStatus::Pending {
                *status = StepStatus::Skipped;
            }
        }
    }

    fn write_back(&mut self, state: &Arc<Mutex<RunState>>, completed: bool) {
        let s = lock(state);
        for step in &mut self.steps {
            step.status = s
                .statuses
                .get(&step.step_id)
                .copied()
                .unwrap_or(StepStatus::Pending);
            step.attempts = s.attempts.get(&step.step_id).copied().unwrap_or(0);
            step.result = s.results.get(&step.step_id).cloned();
            step.error = s.errors.get(&step.step_id).cloned();

            if !completed && matches!(step.status, StepStatus::Pending | StepStatus::Running) {
                step.status = StepStatus::Skipped;
            }
        }
    }

    fn build_metrics(&self, state: &Arc<Mutex<RunState>>, elapsed: Duration) -> WorkflowMetrics {
        let s = lock(state);
        WorkflowMetrics {
            total_steps: self.steps.len(),
            completed_steps: s
                .statuses
                .values()
                .filter(|status| **status == StepStatus::Success)
                .count(),
            failed_steps: s
                .statuses
                .values()
                .filter(|status| **status == StepStatus::Failed)
                .count(),
            retried_steps: s.retried.len(),
            total_elapsed_seconds: elapsed.as_secs_f64(),
            step_durations_ms: s
                .durations
                .iter()
                .map(|(step_id, duration)| (step_id.clone(), duration.as_millis() as u64))
                .collect(),
        }
    }
}
