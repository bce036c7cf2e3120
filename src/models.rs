use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchRequest {
    pub query: String,
}

/// One planned web search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SearchDirective {
    /// The search term to use for the web search.
    #[schemars(length(min = 1))]
    pub term: String,
    /// Your reasoning for why this search is important to the query.
    #[schemars(length(min = 1))]
    pub reason: String,
}

impl SearchDirective {
    pub fn is_complete(&self) -> bool {
        !self.term.trim().is_empty() && !self.reason.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SearchPlan {
    /// A list of web searches to perform to best answer the query.
    pub searches: Vec<SearchDirective>,
}

/// Outcome of one search. `summary` is `None` when the search failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub directive: SearchDirective,
    pub summary: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Report {
    /// A short 2-3 sentence summary of the findings.
    #[schemars(length(min = 1))]
    pub short_summary: String,
    /// The final report, in markdown.
    #[schemars(length(min = 1))]
    pub markdown_body: String,
    /// Suggested topics to research further.
    pub follow_up_questions: Vec<String>,
}

impl Report {
    pub fn word_count(&self) -> usize {
        self.markdown_body.split_whitespace().count()
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.markdown_body)?;
        if !self.follow_up_questions.is_empty() {
            write!(f, "\n\n## Follow-up questions\n")?;
            for question in &self.follow_up_questions {
                write!(f, "\n- {}", question)?;
            }
        }
        Ok(())
    }
}

/// Shared run state carried through the graph session context.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResearchContext {
    pub query: String,
    pub plan: Vec<SearchDirective>,
    pub summaries: Vec<String>,
    pub report: Option<Report>,
    pub delivery_error: Option<String>,
}

pub type TaskTimes = HashMap<String, u64>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Planning,
    Searching,
    Writing,
    Sending,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Planning => "planning",
            Stage::Searching => "searching",
            Stage::Writing => "writing",
            Stage::Sending => "sending",
        };
        f.write_str(name)
    }
}

/// A value observed on the progress stream.
///
/// A run yields one `Stage` event per stage entered, at most one
/// `DeliveryFailed`, and ends with exactly one `Done` or `Failed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    Stage { stage: Stage },
    DeliveryFailed { message: String },
    Done { report: Report },
    Failed { stage: Stage, message: String },
}

impl ProgressEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ProgressEvent::Stage { .. } => "stage",
            ProgressEvent::DeliveryFailed { .. } => "delivery_failed",
            ProgressEvent::Done { .. } => "done",
            ProgressEvent::Failed { .. } => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressEvent::Done { .. } | ProgressEvent::Failed { .. })
    }
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressEvent::Stage { stage } => match stage {
                Stage::Planning => f.write_str("Planning searches..."),
                Stage::Searching => f.write_str("Searching the web..."),
                Stage::Writing => f.write_str("Writing report..."),
                Stage::Sending => f.write_str("Sending report by email..."),
            },
            ProgressEvent::DeliveryFailed { message } => {
                write!(f, "Email delivery failed: {}", message)
            }
            ProgressEvent::Done { report } => write!(f, "{}", report),
            ProgressEvent::Failed { stage, message } => {
                write!(f, "Research failed while {}: {}", stage, message)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TavilySearchRequest {
    pub query: String,
    pub max_results: i32,
    pub search_depth: String,
    pub include_raw_content: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TavilySearchResponse {
    pub results: Vec<TavilyResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TavilyResult {
    pub title: String,
    pub url: String,
    pub content: String,
    #[serde(default)]
    pub score: f64,
}
