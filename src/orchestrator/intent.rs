//! Step intents and typed parameters
//!
//! Every plan step declares one intent from a closed set, and each intent
//! carries its own strongly typed parameter record. The planner's JSON is
//! deserialized directly into these types, so an intent outside the
//! vocabulary or a parameter of the wrong shape is unrepresentable past
//! the validation boundary.
//!
//! Parameters that depend on an earlier step's result are written as a
//! [`ValueSource::StepOutput`] reference. Only the coordinator resolves
//! those references; tools always receive concrete values.

use serde::{Deserialize, Serialize};

use crate::knowledge::{DateRange, IdentifierKind};

/// The closed set of step intents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Intent {
    /// Resolve a company identifier (ticker, CIK, name) to an entity
    ResolveEntity,
    /// Find a specific filing for an entity
    LocateDocument,
    /// Extract one section's text from a filing
    ExtractSection,
    /// Convert a filing's XBRL data to structured financial metrics
    ConvertStructuredData,
    /// Full-text search across filings
    SearchText,
    /// Compare two prior step outputs
    Compare,
    /// Produce the final answer from gathered context
    Synthesize,
}

impl Intent {
    /// All intents, in planning-vocabulary order
    pub const ALL: [Intent; 7] = [
        Intent::ResolveEntity,
        Intent::LocateDocument,
        Intent::ExtractSection,
        Intent::ConvertStructuredData,
        Intent::SearchText,
        Intent::Compare,
        Intent::Synthesize,
    ];

    /// Kebab-case wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::ResolveEntity => "resolve-entity",
            Intent::LocateDocument => "locate-document",
            Intent::ExtractSection => "extract-section",
            Intent::ConvertStructuredData => "convert-structured-data",
            Intent::SearchText => "search-text",
            Intent::Compare => "compare",
            Intent::Synthesize => "synthesize",
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parameter value: either a literal or a reference to a prior step's output
///
/// On the wire a literal is a plain JSON string and a reference is an
/// object: `{"step": 2, "field": "cik"}`. `field` selects one key out of
/// the referenced step's payload; without it the whole payload is
/// substituted as text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ValueSource {
    /// Concrete value known at planning time
    Literal(String),
    /// Output of the step at the given query-global position
    StepOutput {
        /// Query-global position of the referenced step
        step: usize,
        /// Optional field within the referenced payload
        #[serde(default, skip_serializing_if = "Option::is_none")]
        field: Option<String>,
    },
}

impl ValueSource {
    /// The literal value, if this source is concrete
    pub fn as_literal(&self) -> Option<&str> {
        match self {
            ValueSource::Literal(value) => Some(value),
            ValueSource::StepOutput { .. } => None,
        }
    }
}

/// Parameters for `resolve-entity`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolveEntityParams {
    /// Identifier exactly as it appears in the query, e.g. "AAPL"
    pub identifier: String,
    /// What kind of identifier it is
    pub kind: IdentifierKind,
}

/// Parameters for `locate-document`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocateDocumentParams {
    /// Entity CIK, usually a reference to a resolve-entity step
    pub entity: ValueSource,
    /// Form type to search for (10-K, 10-Q, 8-K)
    pub form_type: String,
    /// Optional filing-date constraint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_range: Option<DateRange>,
}

/// Parameters for `extract-section`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractSectionParams {
    /// Filing URL, usually a reference to a locate-document step
    pub document: ValueSource,
    /// Section id within the filing, e.g. "1A" or "part1item2"
    pub section: String,
}

/// Parameters for `convert-structured-data`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvertStructuredDataParams {
    /// Filing URL, usually a reference to a locate-document step
    pub document: ValueSource,
    /// Optional metric key to narrow the conversion, e.g. "revenue"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric: Option<String>,
}

/// Parameters for `search-text`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchTextParams {
    /// Phrase to search for
    pub phrase: String,
    /// Form types to restrict the search to (empty = all)
    #[serde(default)]
    pub form_types: Vec<String>,
    /// Optional filing-date constraint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_range: Option<DateRange>,
}

/// Parameters for `compare`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompareParams {
    /// What aspect to compare
    pub question: String,
    /// First input
    pub left: ValueSource,
    /// Second input
    pub right: ValueSource,
}

/// Parameters for `synthesize`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesizeParams {
    /// The original user question
    pub question: String,
    /// Prior step outputs to synthesize the answer from
    pub sources: Vec<ValueSource>,
}

/// A step's intent together with its typed parameters
///
/// Adjacently tagged: `{"intent": "extract-section", "params": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "intent", content = "params", rename_all = "kebab-case")]
pub enum StepAction {
    /// Resolve a company identifier
    ResolveEntity(ResolveEntityParams),
    /// Find a filing
    LocateDocument(LocateDocumentParams),
    /// Extract a section's text
    ExtractSection(ExtractSectionParams),
    /// Convert XBRL data
    ConvertStructuredData(ConvertStructuredDataParams),
    /// Full-text search
    SearchText(SearchTextParams),
    /// Compare two outputs
    Compare(CompareParams),
    /// Produce the final answer
    Synthesize(SynthesizeParams),
}

impl StepAction {
    /// The intent this action declares
    pub fn intent(&self) -> Intent {
        match self {
            StepAction::ResolveEntity(_) => Intent::ResolveEntity,
            StepAction::LocateDocument(_) => Intent::LocateDocument,
            StepAction::ExtractSection(_) => Intent::ExtractSection,
            StepAction::ConvertStructuredData(_) => Intent::ConvertStructuredData,
            StepAction::SearchText(_) => Intent::SearchText,
            StepAction::Compare(_) => Intent::Compare,
            StepAction::Synthesize(_) => Intent::Synthesize,
        }
    }

    /// Mutable references to every value source in the parameters
    ///
    /// Used by the invoker to substitute step-output references with
    /// concrete literals before the tool sees them.
    pub fn sources_mut(&mut self) -> Vec<&mut ValueSource> {
        match self {
            StepAction::ResolveEntity(_) => Vec::new(),
            StepAction::LocateDocument(p) => vec![&mut p.entity],
            StepAction::ExtractSection(p) => vec![&mut p.document],
            StepAction::ConvertStructuredData(p) => vec![&mut p.document],
            StepAction::SearchText(_) => Vec::new(),
            StepAction::Compare(p) => vec![&mut p.left, &mut p.right],
            StepAction::Synthesize(p) => p.sources.iter_mut().collect(),
        }
    }

    /// Shared references to every value source in the parameters
    #[allow(dead_code)] // Paired with sources_mut()
    pub fn sources(&self) -> Vec<&ValueSource> {
        match self {
            StepAction::ResolveEntity(_) => Vec::new(),
            StepAction::LocateDocument(p) => vec![&p.entity],
            StepAction::ExtractSection(p) => vec![&p.document],
            StepAction::ConvertStructuredData(p) => vec![&p.document],
            StepAction::SearchText(_) => Vec::new(),
            StepAction::Compare(p) => vec![&p.left, &p.right],
            StepAction::Synthesize(p) => p.sources.iter().collect(),
        }
    }

    /// Serialize the (fully resolved) parameters for a tool call
    pub fn params_json(&self) -> serde_json::Value {
        // The adjacently tagged representation nests params under "params"
        let value = serde_json::to_value(self).unwrap_or(serde_json::Value::Null);
        value
            .get("params")
            .cloned()
            .unwrap_or(serde_json::Value::Null)
    }
}
