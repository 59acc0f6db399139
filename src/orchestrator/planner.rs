//! Plan generator
//!
//! Turns a query (plus whatever the query has already gathered) into an
//! ordered plan by prompting the completion service in JSON mode. The
//! response is untrusted data: it is parsed and validated against the
//! step schema before anything acts on it, and an unusable response is a
//! fatal `PlanGenerationError`, never silently retried with a different
//! assumption.

use std::fmt::Write as _;
use std::sync::Arc;
use thiserror::Error;

use crate::knowledge;
use crate::llm::{CompletionClient, CompletionError};
use crate::orchestrator::context::ContextStore;
use crate::orchestrator::intent::Intent;
use crate::orchestrator::plan::{Plan, PlanDraft, PlanError};

/// Planning failed in a way that aborts the current attempt
#[derive(Error, Debug)]
pub enum PlanGenerationError {
    /// The completion service could not be reached or answered garbage
    #[error("planning collaborator failed: {0}")]
    Completion(#[from] CompletionError),

    /// The response was not parseable into the plan schema
    #[error("planner response did not match the plan schema: {0}")]
    Parse(String),

    /// The response parsed but failed plan validation
    #[error("planner produced an invalid plan: {0}")]
    Invalid(#[from] PlanError),
}

/// Failure context handed to the generator when revising a plan
#[derive(Debug, Clone)]
pub struct ReplanRequest {
    /// Position of the step whose outcome forced the revision
    pub failed_position: usize,
    /// Intent of that step
    pub failed_intent: Intent,
    /// Why the old plan is no longer viable
    pub reason: String,
    /// The step's declared fallback note, if any
    pub fallback_note: Option<String>,
}

/// Generates and revises plans through the completion service
pub struct PlanGenerator {
    completion: Arc<dyn CompletionClient>,
}

impl PlanGenerator {
    /// Create a generator over a completion client
    pub fn new(completion: Arc<dyn CompletionClient>) -> Self {
        Self { completion }
    }

    /// Produce a plan for the query
    ///
    /// `replan` carries the failure context when an earlier plan is being
    /// revised; `first_position` is the query-global position the new
    /// plan's steps start at. Succeeded results already in `context` are
    /// summarized into the prompt so the new plan references them instead
    /// of re-gathering.
    pub async fn generate(
        &self,
        query: &str,
        context: &ContextStore,
        replan: Option<&ReplanRequest>,
        first_position: usize,
    ) -> Result<Plan, PlanGenerationError> {
        let system = build_system_prompt();
        let user = build_user_prompt(query, context, replan, first_position);

        tracing::debug!(
            query_len = query.len(),
            first_position = first_position,
            replanning = replan.is_some(),
            "Requesting plan from completion service"
        );

        let response = self.completion.complete(&system, &user, true).await?;

        let json_text = extract_json(&response);
        let draft: PlanDraft = serde_json::from_str(json_text)
            .map_err(|e| PlanGenerationError::Parse(format!("{e} - response: {response}")))?;

        let plan = Plan::adopt(draft, first_position)?;

        tracing::debug!(
            num_steps = plan.len(),
            first_position = first_position,
            "Planner produced valid plan"
        );

        Ok(plan)
    }
}

/// Pull the JSON object out of a completion that may wrap it in fences
fn extract_json(text: &str) -> &str {
    let trimmed = text.trim();
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        return rest
            .find("```")
            .map(|end| rest[..end].trim())
            .unwrap_or_else(|| rest.trim());
    }
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            return &trimmed[start..=end];
        }
    }
    trimmed
}

/// The planner's standing instructions: vocabulary, schema, and rules
fn build_system_prompt() -> String {
    let sections_10k = knowledge::FORM_10K_SECTIONS
        .iter()
        .map(|(id, name)| format!("* \"{id}\" - {name}"))
        .collect::<Vec<_>>()
        .join("\n");

    let sections_10q = knowledge::FORM_10Q_SECTIONS
        .iter()
        .map(|(id, name)| format!("* \"{id}\" - {name}"))
        .collect::<Vec<_>>()
        .join("\n");

    let metrics = knowledge::XBRL_METRICS
        .iter()
        .map(|(metric, tags)| format!("* {}: {}...", metric, tags.iter().take(2).cloned().collect::<Vec<_>>().join(", ")))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You are a planning agent for SEC filing analysis. Break the user's question into an ordered JSON plan of steps.

Available step intents and parameters:

1. "resolve-entity": resolve a company identifier.
   params: {{"identifier": "...", "kind": "ticker" | "cik" | "name"}}

2. "locate-document": find one filing for a resolved company.
   params: {{"entity": <value>, "form_type": "10-K" | "10-Q" | "8-K", "date_range": {{"from": "YYYY-MM-DD", "to": "YYYY-MM-DD"}}}}
   "date_range" is optional; omit it for the most recent filing.

3. "extract-section": extract one section's text from a filing.
   params: {{"document": <value>, "section": "<section id>"}}
   10-K section ids:
{sections_10k}
   10-Q section ids:
{sections_10q}

4. "convert-structured-data": structured financial metrics from a filing's XBRL data.
   params: {{"document": <value>, "metric": "<metric key>"}}
   metric keys:
{metrics}

5. "search-text": full-text search across filings.
   params: {{"phrase": "...", "form_types": ["10-K"], "date_range": {{...}}}}

6. "compare": compare two prior outputs.
   params: {{"question": "...", "left": <value>, "right": <value>}}

7. "synthesize": produce the final answer from gathered context.
   params: {{"question": "...", "sources": [<value>, ...]}}

A <value> is either a literal string or a reference to an earlier step's output:
{{"step": N}} for the whole output, or {{"step": N, "field": "cik"}} for one field.

Output format (JSON only):
{{"steps": [{{"intent": "...", "params": {{...}}, "fallback": {{"strategy": "...", "note": "..."}}}}]}}

Rules:
- Use only the intents listed above, with exactly their parameters.
- The last step MUST be "synthesize".
- Declare "fallback" ONLY when a genuine alternative path exists. Strategies:
  "broaden-entity-search", "narrow-date-range", "alternate-section",
  "full-text-fallback", "alternate-metric-tag". Omit "fallback" otherwise.
- Reference earlier outputs with {{"step": N}}; never paste placeholder text.
- Return ONLY valid JSON, no other text."#
    )
}

/// The per-call prompt: query, analysis hints, and any replan context
fn build_user_prompt(
    query: &str,
    context: &ContextStore,
    replan: Option<&ReplanRequest>,
    first_position: usize,
) -> String {
    let analysis = knowledge::analyze_query(query);

    let mut prompt = format!("Question: {query}\n\nAnalysis:\n");
    let _ = writeln!(prompt, "- Form type: {}", analysis.form_type);
    let _ = writeln!(
        prompt,
        "- Company identifier kind: {}",
        analysis.identifier_kind.as_str()
    );
    match &analysis.date_range {
        Some(range) => {
            let _ = writeln!(prompt, "- Date filter: {} to {}", range.from, range.to);
        }
        None => {
            let _ = writeln!(prompt, "- Date filter: most recent");
        }
    }
    let _ = writeln!(
        prompt,
        "- Needs financial data: {}",
        if analysis.requires_financial_data { "yes" } else { "no" }
    );
    let _ = writeln!(
        prompt,
        "- Needs section text: {}",
        if analysis.requires_section_text { "yes" } else { "no" }
    );
    if let Some(section_id) = analysis.section_id {
        let _ = writeln!(prompt, "- Likely section: {section_id}");
    }
    if !analysis.metrics.is_empty() {
        let _ = writeln!(prompt, "- Metrics mentioned: {}", analysis.metrics.join(", "));
    }

    let summaries = context.succeeded_summaries(400);
    if !summaries.is_empty() {
        prompt.push_str("\nAlready gathered (reference these by step number, do not re-fetch):\n");
        for (position, summary) in &summaries {
            let _ = writeln!(prompt, "- step {position}: {summary}");
        }
    }

    if let Some(request) = replan {
        prompt.push_str("\nThe previous plan is no longer viable.\n");
        let _ = writeln!(
            prompt,
            "- Step {} ({}) outcome: {}",
            request.failed_position, request.failed_intent, request.reason
        );
        if let Some(note) = &request.fallback_note {
            let _ = writeln!(prompt, "- Declared alternative: {note}");
        }
        prompt.push_str(
            "Produce a revised plan that pursues the declared alternative path. \
             Do not repeat steps whose results are already gathered.\n",
        );
    }

    let _ = writeln!(
        prompt,
        "\nYour new steps will be numbered starting at {first_position}. \
         Step references must use those numbers or the numbers of already-gathered steps."
    );

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::context::ResultRecord;
    use async_trait::async_trait;
    use serde_json::json;

    struct CannedCompletion {
        response: String,
    }

    #[async_trait]
    impl CompletionClient for CannedCompletion {
        async fn complete(
            &self,
            _system: &str,
            _user: &str,
            _force_json: bool,
        ) -> Result<String, CompletionError> {
            Ok(self.response.clone())
        }
    }

    fn generator_returning(response: &str) -> PlanGenerator {
        PlanGenerator::new(Arc::new(CannedCompletion {
            response: response.to_string(),
        }))
    }

    const VALID_PLAN: &str = r#"{
        "steps": [
            {"intent": "resolve-entity", "params": {"identifier": "AAPL", "kind": "ticker"}},
            {"intent": "synthesize", "params": {"question": "q", "sources": [{"step": 1}]}}
        ]
    }"#;

    #[tokio::test]
    async fn test_generate_parses_valid_plan() {
        let generator = generator_returning(VALID_PLAN);
        let context = ContextStore::new();

        let plan = generator
            .generate("What is Apple's CIK?", &context, None, 1)
            .await
            .unwrap();

        assert_eq!(plan.len(), 2);
        assert_eq!(plan.steps[0].position, 1);
        assert_eq!(plan.steps[1].action.intent(), Intent::Synthesize);
    }

    #[tokio::test]
    async fn test_generate_strips_markdown_fences() {
        let fenced = format!("```json\n{VALID_PLAN}\n```");
        let generator = generator_returning(&fenced);
        let context = ContextStore::new();

        let plan = generator.generate("q", &context, None, 1).await.unwrap();
        assert_eq!(plan.len(), 2);
    }

    #[tokio::test]
    async fn test_generate_rejects_non_json() {
        let generator = generator_returning("I cannot help with that.");
        let context = ContextStore::new();

        let result = generator.generate("q", &context, None, 1).await;
        assert!(matches!(result, Err(PlanGenerationError::Parse(_))));
    }

    #[tokio::test]
    async fn test_generate_rejects_plan_without_synthesize() {
        let generator = generator_returning(
            r#"{"steps": [{"intent": "resolve-entity", "params": {"identifier": "AAPL", "kind": "ticker"}}]}"#,
        );
        let context = ContextStore::new();

        let result = generator.generate("q", &context, None, 1).await;
        assert!(matches!(result, Err(PlanGenerationError::Invalid(_))));
    }

    #[tokio::test]
    async fn test_generate_rejects_unknown_intent() {
        let generator = generator_returning(
            r#"{"steps": [{"intent": "divine-the-answer", "params": {}}]}"#,
        );
        let context = ContextStore::new();

        let result = generator.generate("q", &context, None, 1).await;
        assert!(matches!(result, Err(PlanGenerationError::Parse(_))));
    }

    #[test]
    fn test_system_prompt_lists_vocabulary() {
        let prompt = build_system_prompt();
        for intent in Intent::ALL {
            assert!(
                prompt.contains(intent.as_str()),
                "system prompt should mention {intent}"
            );
        }
        assert!(prompt.contains("Risk Factors"));
        assert!(prompt.contains("revenue"));
        assert!(prompt.contains("MUST be \"synthesize\""));
    }

    #[test]
    fn test_user_prompt_includes_analysis() {
        let context = ContextStore::new();
        let prompt = build_user_prompt("Apple 10-K risk factors for 2023", &context, None, 1);
        assert!(prompt.contains("Form type: 10-K"));
        assert!(prompt.contains("2023-01-01"));
        assert!(prompt.contains("numbered starting at 1"));
    }

    #[test]
    fn test_user_prompt_includes_replan_context() {
        let mut context = ContextStore::new();
        context
            .record(1, ResultRecord::succeeded(Some(json!({"cik": "320193"}))))
            .unwrap();

        let request = ReplanRequest {
            failed_position: 2,
            failed_intent: Intent::ExtractSection,
            reason: "section 1C absent from filing".to_string(),
            fallback_note: Some("risk discussion also appears in item 7".to_string()),
        };
        let prompt = build_user_prompt("q", &context, Some(&request), 3);

        assert!(prompt.contains("step 1"));
        assert!(prompt.contains("no longer viable"));
        assert!(prompt.contains("section 1C absent"));
        assert!(prompt.contains("item 7"));
        assert!(prompt.contains("numbered starting at 3"));
    }

    #[test]
    fn test_extract_json_variants() {
        assert_eq!(extract_json(r#"{"a": 1}"#), r#"{"a": 1}"#);
        assert_eq!(extract_json("```json\n{\"a\": 1}\n```"), r#"{"a": 1}"#);
        assert_eq!(extract_json("noise {\"a\": 1} trailing"), r#"{"a": 1}"#);
    }
}
