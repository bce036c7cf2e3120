use super::{fatal, load_research_context, record_task_time, RESEARCH_CONTEXT};
use crate::error::CallError;
use crate::models::{Report, Stage};
use crate::progress::ProgressSink;
use crate::tools::llm::{invoke_structured, ReasoningClient, StructuredCall};
use async_trait::async_trait;
use graph_flow::{Context, GraphError, NextAction, Task, TaskResult};
use std::sync::Arc;
use tracing::{info, instrument};

pub struct WriterTask {
    client: Arc<dyn ReasoningClient>,
    progress: ProgressSink,
    min_words: usize,
}

impl WriterTask {
    pub const ID: &'static str = "writer";

    pub fn new(client: Arc<dyn ReasoningClient>, progress: ProgressSink, min_words: usize) -> Self {
        Self {
            client,
            progress,
            min_words,
        }
    }
}

#[async_trait]
impl Task for WriterTask {
    fn id(&self) -> &str {
        Self::ID
    }

    #[instrument(skip(self, context))]
    async fn run(&self, context: Context) -> Result<TaskResult, GraphError> {
        let start_time = std::time::Instant::now();
        self.progress.enter(Stage::Writing);

        let mut research_context = load_research_context(&context).await?;
        let report = write_report(
            self.client.as_ref(),
            &research_context.query,
            &research_context.summaries,
            self.min_words,
        )
        .await
        .map_err(|e| fatal(&self.progress, Stage::Writing, e))?;

        info!("Generated report with {} words", report.word_count());
        research_context.report = Some(report);
        context.set(RESEARCH_CONTEXT, research_context).await;
        record_task_time(&context, Self::ID, start_time).await;

        // Pausing here persists the session, so the report survives a
        // failure while sending.
        Ok(TaskResult::new(
            Some("Report written".to_string()),
            NextAction::Continue,
        ))
    }
}

fn writer_instructions(min_words: usize) -> String {
    format!(
        r#"You are a senior researcher tasked with writing a cohesive report for a research query.
You will be provided with the original query, and some initial research done by a research assistant.

Requirements:
- First come up with an outline for the report that describes its structure and flow
- Then write the report in markdown and return it as the markdown body
- The report should be lengthy and detailed, at least {} words
- Write a 2-3 sentence short summary of the findings
- Suggest follow-up questions worth researching further
- If the research contains no usable information, say so plainly instead of inventing facts"#,
        min_words
    )
}

/// Prompt input: the query followed by numbered summaries in plan order.
pub fn writer_input(query: &str, summaries: &[String]) -> String {
    if summaries.is_empty() {
        return format!(
            "Original query: {}\n\nSummarized search results: none (every search failed)",
            query
        );
    }
    let body = summaries
        .iter()
        .enumerate()
        .map(|(i, summary)| format!("[{}] {}", i + 1, summary.trim()))
        .collect::<Vec<_>>()
        .join("\n\n");
    format!(
        "Original query: {}\n\nSummarized search results:\n\n{}",
        query, body
    )
}

/// Writes the report. Runs even with no summaries.
pub async fn write_report(
    client: &dyn ReasoningClient,
    query: &str,
    summaries: &[String],
    min_words: usize,
) -> Result<Report, CallError> {
    let call = StructuredCall::new::<Report>(
        "writer",
        writer_instructions(min_words),
        writer_input(query, summaries),
    )?;
    invoke_structured(client, call).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_numbers_summaries_in_order() {
        let input = writer_input(
            "coral reefs",
            &["first".to_string(), "second".to_string()],
        );
        let first = input.find("[1] first").unwrap();
        let second = input.find("[2] second").unwrap();
        assert!(first < second);
        assert!(input.starts_with("Original query: coral reefs"));
    }

    #[test]
    fn test_input_without_summaries() {
        let input = writer_input("coral reefs", &[]);
        assert!(input.contains("none (every search failed)"));
    }

    #[test]
    fn test_instructions_carry_word_target() {
        assert!(writer_instructions(1500).contains("at least 1500 words"));
    }
}
