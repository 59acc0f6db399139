//! Execution coordinator
//!
//! Drives one query through the Plan -> Execute -> Replan loop:
//!
//! ```text
//! PLANNING -> EXECUTING -> EVALUATING -> {EXECUTING | PLANNING | DONE | ABORTED}
//! ```
//!
//! Steps run strictly sequentially; later steps consume earlier outputs,
//! so there is nothing to parallelize inside one query. Step-local
//! failures become Result Records and flow through the decision
//! procedure; only a routing miss (configuration fault) escapes as an
//! error. The coordinator never invents data: when no sanctioned path
//! remains it stops and says why.

use anyhow::anyhow;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::AppError;
use crate::orchestrator::context::{ContextStore, ResultRecord};
use crate::orchestrator::evaluator::{self, Decision};
use crate::orchestrator::intent::Intent;
use crate::orchestrator::invoker::ToolInvoker;
use crate::orchestrator::plan::{Plan, ReplanEvent, StepStatus};
use crate::orchestrator::planner::{PlanGenerator, ReplanRequest};

/// Abort reason when the replan counter exceeds its ceiling
pub const REASON_REPLAN_LIMIT: &str = "replan-limit-exceeded";
/// Abort reason when the planning collaborator produced unusable output
pub const REASON_PLAN_GENERATION: &str = "plan-generation-failed";
/// Abort reason when the caller cancelled between steps
pub const REASON_CANCELLED: &str = "cancelled";

/// Cooperative cancellation handle
///
/// Checked at the top of every EXECUTING transition; a query is never
/// interrupted mid-invocation.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// A fresh, uncancelled flag
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation before the next step starts
    #[allow(dead_code)] // Used by library callers
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Terminal status of a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueryStatus {
    /// The plan ran to completion and an answer was synthesized
    Done,
    /// The query stopped without an answer
    Aborted,
}

/// One entry of the caller-visible trace
#[derive(Debug, Clone, Serialize)]
pub struct TraceEntry {
    /// Query-global step position
    pub position: usize,
    /// The step's declared intent
    pub intent: Intent,
    /// The write-once outcome
    #[serde(flatten)]
    pub record: ResultRecord,
}

/// Everything the caller gets back for one query
#[derive(Debug, Clone, Serialize)]
pub struct QueryOutcome {
    /// Synthesized answer; `None` on abort (never a fabricated guess)
    pub final_answer: Option<String>,
    /// Terminal status
    pub status: QueryStatus,
    /// Specific abort reason, when aborted
    pub abort_reason: Option<String>,
    /// Ordered Result Records for every executed step, even on abort
    pub trace: Vec<TraceEntry>,
    /// Every plan revision that happened, in order
    pub replans: Vec<ReplanEvent>,
}

/// Progress notification emitted while a query runs
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ProgressEvent {
    /// A planning round started
    Planning {
        /// 0 for the initial plan, then the replan count
        attempt: u32,
    },
    /// A plan was adopted
    PlanReady {
        /// Number of steps in the adopted plan
        num_steps: usize,
    },
    /// A step began executing
    StepStarted {
        /// Query-global position
        position: usize,
        /// Declared intent
        intent: Intent,
    },
    /// A step finished and its record was written
    StepFinished {
        /// Query-global position
        position: usize,
        /// Declared intent
        intent: Intent,
        /// Terminal step status
        status: StepStatus,
    },
    /// The current plan was discarded and a revision requested
    Replanning {
        /// Replan count after this revision was requested
        count: u32,
        /// Why the plan is no longer viable
        reason: String,
    },
    /// The query reached a terminal state
    Finished {
        /// Terminal status
        status: QueryStatus,
        /// Abort reason, when aborted
        abort_reason: Option<String>,
    },
}

/// Internal state-machine phases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Planning,
    Executing,
    Evaluating,
}

/// Drives queries through the plan/execute/replan loop
pub struct ExecutionCoordinator {
    generator: PlanGenerator,
    invoker: ToolInvoker,
    replan_ceiling: u32,
}

impl ExecutionCoordinator {
    /// Create a coordinator with a fixed replan ceiling
    pub fn new(generator: PlanGenerator, invoker: ToolInvoker, replan_ceiling: u32) -> Self {
        Self {
            generator,
            invoker,
            replan_ceiling,
        }
    }

    /// Run one query to a terminal state
    pub async fn run(&self, query: &str) -> Result<QueryOutcome, AppError> {
        self.run_with(query, CancelFlag::new(), None).await
    }

    /// Run one query with a cancellation flag and optional progress events
    ///
    /// Returns `Err` only for faults that mean the orchestration itself
    /// cannot proceed (unknown intent, write-once violation). Everything
    /// else, including plan-generation failure, terminates in a
    /// [`QueryOutcome`] with a specific abort reason and the partial
    /// trace.
    pub async fn run_with(
        &self,
        query: &str,
        cancel: CancelFlag,
        events: Option<mpsc::UnboundedSender<ProgressEvent>>,
    ) -> Result<QueryOutcome, AppError> {
        let mut context = ContextStore::new();
        let mut intents: BTreeMap<usize, Intent> = BTreeMap::new();
        let mut replans: Vec<ReplanEvent> = Vec::new();
        let mut replan_count: u32 = 0;
        let mut pending_replan: Option<ReplanRequest> = None;

        let mut plan: Option<Plan> = None;
        let mut index: usize = 0;
        let mut next_position: usize = 1;
        let mut latest_record: Option<ResultRecord> = None;

        let emit = |event: ProgressEvent| {
            if let Some(sender) = &events {
                let _ = sender.send(event);
            }
        };

        let mut phase = Phase::Planning;

        loop {
            match phase {
                Phase::Planning => {
                    emit(ProgressEvent::Planning {
                        attempt: replan_count,
                    });

                    let generated = self
                        .generator
                        .generate(query, &context, pending_replan.as_ref(), next_position)
                        .await;

                    let new_plan = match generated {
                        Ok(new_plan) => new_plan,
                        Err(e) => {
                            tracing::error!(error = %e, "Plan generation failed, aborting query");
                            return Ok(self.finish_aborted(
                                REASON_PLAN_GENERATION,
                                &context,
                                &intents,
                                replans,
                                emit,
                            ));
                        }
                    };

                    tracing::debug!(
                        num_steps = new_plan.len(),
                        replan_count = replan_count,
                        "Adopted plan"
                    );

                    for step in &new_plan.steps {
                        intents.insert(step.position, step.action.intent());
                    }
                    next_position = new_plan.next_free_position();

                    if let Some(request) = pending_replan.take() {
                        if let Some(old_plan) = plan.take() {
                            replans.push(ReplanEvent {
                                triggered_by: request.failed_position,
                                reason: request.reason,
                                old_plan,
                                new_plan: new_plan.clone(),
                            });
                        }
                    }

                    emit(ProgressEvent::PlanReady {
                        num_steps: new_plan.len(),
                    });

                    plan = Some(new_plan);
                    index = 0;
                    phase = Phase::Executing;
                }

                Phase::Executing => {
                    if cancel.is_cancelled() {
                        tracing::info!("Query cancelled between steps");
                        if let Some(current) = plan.as_mut() {
                            current.skip_remaining();
                        }
                        return Ok(self.finish_aborted(
                            REASON_CANCELLED,
                            &context,
                            &intents,
                            replans,
                            emit,
                        ));
                    }

                    let current = plan.as_mut().ok_or_else(|| {
                        AppError::Internal(anyhow!(
                            "state machine entered EXECUTING without a plan (this should not happen)"
                        ))
                    })?;
                    current.steps[index].status = StepStatus::Running;
                    let step = &current.steps[index];

                    emit(ProgressEvent::StepStarted {
                        position: step.position,
                        intent: step.action.intent(),
                    });

                    let record = self
                        .invoker
                        .invoke(step, &mut context)
                        .await
                        .map_err(|e| AppError::Routing(e.0.to_string()))?;

                    context.record(step.position, record.clone()).map_err(|e| {
                        AppError::Internal(anyhow!("result record invariant violated: {e}"))
                    })?;

                    let position = step.position;
                    let intent = step.action.intent();
                    current.steps[index].status = record.status;

                    emit(ProgressEvent::StepFinished {
                        position,
                        intent,
                        status: record.status,
                    });

                    latest_record = Some(record);
                    phase = Phase::Evaluating;
                }

                Phase::Evaluating => {
                    let current = plan.as_mut().ok_or_else(|| {
                        AppError::Internal(anyhow!(
                            "state machine entered EVALUATING without a plan (this should not happen)"
                        ))
                    })?;
                    let step = &current.steps[index];
                    let record = latest_record.as_ref().ok_or_else(|| {
                        AppError::Internal(anyhow!(
                            "state machine entered EVALUATING without a step result (this should not happen)"
                        ))
                    })?;

                    match evaluator::evaluate(step, record) {
                        Decision::Continue => {
                            index += 1;
                            if index >= current.len() {
                                return Ok(self.finish_done(
                                    current, &context, &intents, replans, emit,
                                ));
                            }
                            phase = Phase::Executing;
                        }
                        Decision::Replan { reason } => {
                            replan_count += 1;
                            tracing::warn!(
                                position = step.position,
                                replan_count = replan_count,
                                ceiling = self.replan_ceiling,
                                reason = %reason,
                                "Replan requested"
                            );

                            if replan_count > self.replan_ceiling {
                                current.skip_remaining();
                                return Ok(self.finish_aborted(
                                    REASON_REPLAN_LIMIT,
                                    &context,
                                    &intents,
                                    replans,
                                    emit,
                                ));
                            }

                            emit(ProgressEvent::Replanning {
                                count: replan_count,
                                reason: reason.clone(),
                            });

                            pending_replan = Some(ReplanRequest {
                                failed_position: step.position,
                                failed_intent: step.action.intent(),
                                reason,
                                fallback_note: step
                                    .fallback
                                    .as_ref()
                                    .and_then(|f| f.note.clone()),
                            });
                            current.skip_remaining();
                            phase = Phase::Planning;
                        }
                        Decision::Abort { reason } => {
                            current.skip_remaining();
                            return Ok(self.finish_aborted(
                                &reason, &context, &intents, replans, emit,
                            ));
                        }
                    }
                }
            }
        }
    }

    /// Terminal DONE: hand the final context to answer extraction
    fn finish_done(
        &self,
        plan: &Plan,
        context: &ContextStore,
        intents: &BTreeMap<usize, Intent>,
        replans: Vec<ReplanEvent>,
        emit: impl Fn(ProgressEvent),
    ) -> QueryOutcome {
        // The answer is the last succeeded synthesize step's payload.
        let final_answer = plan
            .steps
            .iter()
            .rev()
            .find(|step| {
                step.action.intent() == Intent::Synthesize && step.status == StepStatus::Succeeded
            })
            .and_then(|step| context.resolve_output(step.position, None).ok());

        emit(ProgressEvent::Finished {
            status: QueryStatus::Done,
            abort_reason: None,
        });

        QueryOutcome {
            final_answer,
            status: QueryStatus::Done,
            abort_reason: None,
            trace: build_trace(context, intents),
            replans,
        }
    }

    /// Terminal ABORTED: no fabricated answer, full partial trace
    fn finish_aborted(
        &self,
        reason: &str,
        context: &ContextStore,
        intents: &BTreeMap<usize, Intent>,
        replans: Vec<ReplanEvent>,
        emit: impl Fn(ProgressEvent),
    ) -> QueryOutcome {
        emit(ProgressEvent::Finished {
            status: QueryStatus::Aborted,
            abort_reason: Some(reason.to_string()),
        });

        QueryOutcome {
            final_answer: None,
            status: QueryStatus::Aborted,
            abort_reason: Some(reason.to_string()),
            trace: build_trace(context, intents),
            replans,
        }
    }
}

/// Assemble the ordered trace from the context store
fn build_trace(context: &ContextStore, intents: &BTreeMap<usize, Intent>) -> Vec<TraceEntry> {
    context
        .iter()
        .map(|(position, record)| TraceEntry {
            position,
            intent: intents
                .get(&position)
                .copied()
                .unwrap_or(Intent::Synthesize),
            record: record.clone(),
        })
        .collect()
}
