use super::{load_research_context, record_task_time, RESEARCH_CONTEXT};
use crate::models::{SearchDirective, SearchResult, Stage};
use crate::progress::ProgressSink;
use crate::tools::llm::{invoke_structured, Capability, ReasoningClient, StructuredCall};
use async_trait::async_trait;
use futures::future::join_all;
use graph_flow::{Context, GraphError, NextAction, Task, TaskResult};
use std::sync::Arc;
use tracing::{info, instrument, warn};

const SEARCH_INSTRUCTIONS: &str = "You are a research assistant. Given a search term, you search \
the web for that term and produce a concise summary of the results. The summary must be 2-3 \
paragraphs and less than 300 words. Capture the main points. Write succinctly, no need for \
complete sentences or good grammar. This will be consumed by someone synthesizing a report, so \
it is vital you capture the essence and ignore any fluff. Do not include any additional \
commentary other than the summary itself.";

pub struct SearcherTask {
    client: Arc<dyn ReasoningClient>,
    progress: ProgressSink,
}

impl SearcherTask {
    pub const ID: &'static str = "searcher";

    pub fn new(client: Arc<dyn ReasoningClient>, progress: ProgressSink) -> Self {
        Self { client, progress }
    }
}

#[async_trait]
impl Task for SearcherTask {
    fn id(&self) -> &str {
        Self::ID
    }

    #[instrument(skip(self, context))]
    async fn run(&self, context: Context) -> Result<TaskResult, GraphError> {
        let start_time = std::time::Instant::now();
        self.progress.enter(Stage::Searching);

        let mut research_context = load_research_context(&context).await?;
        let results = search_all(self.client.as_ref(), &research_context.plan).await;
        let summaries = present_summaries(results);

        info!(
            "Completed {} of {} searches",
            summaries.len(),
            research_context.plan.len()
        );
        research_context.summaries = summaries;
        context.set(RESEARCH_CONTEXT, research_context).await;
        record_task_time(&context, Self::ID, start_time).await;

        Ok(TaskResult::new(
            Some("Searches completed".to_string()),
            NextAction::ContinueAndExecute,
        ))
    }
}

/// Runs every directive concurrently and waits for all of them. Results
/// come back in plan order.
pub async fn search_all(
    client: &dyn ReasoningClient,
    plan: &[SearchDirective],
) -> Vec<SearchResult> {
    join_all(plan.iter().map(|directive| search(client, directive))).await
}

/// Searches one directive. Never fails: any error becomes an absent summary.
pub async fn search(client: &dyn ReasoningClient, directive: &SearchDirective) -> SearchResult {
    info!("Searching: {}", directive.term);
    let call = StructuredCall::new::<String>(
        "search",
        SEARCH_INSTRUCTIONS,
        format!(
            "Search term: {}\nReason for searching: {}",
            directive.term, directive.reason
        ),
    );
    let outcome = match call {
        Ok(call) => {
            invoke_structured::<String>(client, call.with_capability(Capability::WebSearch)).await
        }
        Err(e) => Err(e),
    };

    let summary = match outcome {
        Ok(text) if !text.trim().is_empty() => Some(text),
        Ok(_) => {
            warn!(term = %directive.term, "search returned an empty summary");
            None
        }
        Err(e) => {
            warn!(term = %directive.term, error = %e, "search failed");
            None
        }
    };

    SearchResult {
        directive: directive.clone(),
        summary,
    }
}

/// Drops failed searches, keeping the remaining summaries in order.
pub fn present_summaries(results: Vec<SearchResult>) -> Vec<String> {
    results.into_iter().filter_map(|r| r.summary).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CallError;
    use serde_json::{json, Value};

    struct FailOn(&'static str);

    #[async_trait]
    impl ReasoningClient for FailOn {
        async fn invoke(&self, call: StructuredCall) -> Result<Value, CallError> {
            if call.input.contains(self.0) {
                return Err(CallError::Transport("connection reset".into()));
            }
            if call.input.contains("blank") {
                return Ok(json!("   "));
            }
            Ok(json!(format!("summary of {}", call.input.lines().next().unwrap_or(""))))
        }
    }

    fn directive(term: &str) -> SearchDirective {
        SearchDirective {
            term: term.into(),
            reason: "needed".into(),
        }
    }

    #[tokio::test]
    async fn test_failure_becomes_absent_summary() {
        let result = search(&FailOn("broken"), &directive("broken")).await;
        assert!(result.summary.is_none());
        assert_eq!(result.directive.term, "broken");
    }

    #[tokio::test]
    async fn test_blank_summary_is_absent() {
        let result = search(&FailOn("never"), &directive("blank")).await;
        assert!(result.summary.is_none());
    }

    #[tokio::test]
    async fn test_search_all_keeps_plan_order() {
        let plan = vec![directive("a"), directive("broken"), directive("c")];
        let results = search_all(&FailOn("broken"), &plan).await;
        assert_eq!(results.len(), 3);

        let summaries = present_summaries(results);
        assert_eq!(
            summaries,
            vec!["summary of Search term: a", "summary of Search term: c"]
        );
    }

    #[tokio::test]
    async fn test_search_requests_web_search() {
        struct Inspect;

        #[async_trait]
        impl ReasoningClient for Inspect {
            async fn invoke(&self, call: StructuredCall) -> Result<Value, CallError> {
                assert_eq!(call.capabilities, vec![Capability::WebSearch]);
                assert!(call.expects_text());
                Ok(json!("ok"))
            }
        }

        let result = search(&Inspect, &directive("reefs")).await;
        assert_eq!(result.summary.as_deref(), Some("ok"));
    }
}
