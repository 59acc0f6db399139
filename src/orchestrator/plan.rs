//! Plan and step model
//!
//! A plan is an ordered sequence of steps. The Plan Generator produces a
//! draft (steps without positions) from the completion service's JSON;
//! the coordinator adopts a draft by assigning query-global positions so
//! that records from superseded plans and their replacements coexist in
//! one trace.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::orchestrator::intent::{Intent, StepAction};

/// Execution status of a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepStatus {
    /// Not yet executed
    #[default]
    Pending,
    /// Currently executing
    Running,
    /// Executed and produced a result
    Succeeded,
    /// Executed and failed
    Failed,
    /// Abandoned when its plan was superseded
    Skipped,
}

/// Recovery strategy a step declares for when it fails or comes back empty
///
/// The Replan Decision Procedure only replans when the failing step
/// declares one of these; without a sanctioned alternative the query
/// aborts rather than guessing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FallbackStrategy {
    /// Retry entity resolution with a broader identifier kind (e.g. name search)
    BroadenEntitySearch,
    /// Retry the search with a narrower date range
    NarrowDateRange,
    /// Extract a different section covering the same informational goal
    AlternateSection,
    /// Fall back to full-text search when targeted extraction finds nothing
    FullTextFallback,
    /// Try a different XBRL tag for the same metric
    AlternateMetricTag,
}

/// A step's declared fallback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fallback {
    /// Which alternative path exists
    pub strategy: FallbackStrategy,
    /// Optional free-text hint for the next planning round
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// A step as produced by the Plan Generator, before adoption
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftStep {
    /// Intent and typed parameters
    #[serde(flatten)]
    pub action: StepAction,
    /// Declared alternative path, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<Fallback>,
}

/// A plan draft as parsed from the planning collaborator's JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanDraft {
    /// Ordered steps
    pub steps: Vec<DraftStep>,
}

/// An adopted step with its query-global position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Query-global position (1-based); doubles as the trace key
    pub position: usize,
    /// Intent and typed parameters
    #[serde(flatten)]
    pub action: StepAction,
    /// Declared alternative path, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<Fallback>,
    /// Execution status
    #[serde(default)]
    pub status: StepStatus,
}

/// An adopted, validated plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// Ordered steps with query-global positions
    pub steps: Vec<Step>,
}

/// Validation failures for a plan draft
#[derive(Error, Debug, PartialEq)]
pub enum PlanError {
    /// The draft contained no steps
    #[error("plan has no steps")]
    Empty,
    /// The final step is not a synthesize step
    #[error("plan must end with a synthesize step, found {0}")]
    MissingSynthesize(Intent),
}

impl Plan {
    /// Adopt a draft, assigning query-global positions starting at `first_position`
    ///
    /// Validation: the draft must be non-empty and must end with a
    /// `synthesize` step. References to later positions are not rejected
    /// here; they surface at execution time as unresolved references so
    /// the decision procedure can ask for a repaired plan.
    pub fn adopt(draft: PlanDraft, first_position: usize) -> Result<Self, PlanError> {
        let last = draft.steps.last().ok_or(PlanError::Empty)?;
        let last_intent = last.action.intent();
        if last_intent != Intent::Synthesize {
            return Err(PlanError::MissingSynthesize(last_intent));
        }

        let steps = draft
            .steps
            .into_iter()
            .enumerate()
            .map(|(idx, draft_step)| Step {
                position: first_position + idx,
                action: draft_step.action,
                fallback: draft_step.fallback,
                status: StepStatus::Pending,
            })
            .collect();

        Ok(Plan { steps })
    }

    /// Number of steps in the plan
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the plan has no steps
    #[allow(dead_code)] // Paired with len()
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Position one past the plan's last step
    pub fn next_free_position(&self) -> usize {
        self.steps.last().map(|s| s.position + 1).unwrap_or(1)
    }

    /// Mark every step that never ran as skipped (plan superseded)
    pub fn skip_remaining(&mut self) {
        for step in &mut self.steps {
            if matches!(step.status, StepStatus::Pending | StepStatus::Running) {
                step.status = StepStatus::Skipped;
            }
        }
    }
}

/// A recorded plan revision
///
/// Kept for the life of the query; bounds nothing by itself (the
/// coordinator's counter does that) but tells the caller exactly why and
/// where each revision happened.
#[derive(Debug, Clone, Serialize)]
pub struct ReplanEvent {
    /// Position of the step whose outcome triggered the revision
    pub triggered_by: usize,
    /// Failure or ambiguity reason handed to the generator
    pub reason: String,
    /// Snapshot of the superseded plan
    pub old_plan: Plan,
    /// The adopted replacement
    pub new_plan: Plan,
}
