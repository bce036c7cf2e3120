use super::{load_research_context, record_task_time, RESEARCH_CONTEXT};
use crate::config::EmailConfig;
use crate::error::DeliveryError;
use crate::models::{ProgressEvent, Report, Stage};
use crate::progress::ProgressSink;
use crate::tools::llm::{invoke_structured, ReasoningClient, StructuredCall};
use crate::tools::sendgrid::{Mailer, OutgoingEmail};
use async_trait::async_trait;
use graph_flow::{Context, GraphError, NextAction, Task, TaskResult};
use pulldown_cmark::{html, Options, Parser};
use schemars::JsonSchema;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

const MAX_SUBJECT_QUERY_CHARS: usize = 80;

/// Fixed sender and recipient for report emails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub from: String,
    pub to: String,
}

impl From<&EmailConfig> for Envelope {
    fn from(config: &EmailConfig) -> Self {
        Self {
            from: config.from.clone(),
            to: config.to.clone(),
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct EmailSubject {
    /// Subject line for the email, under 80 characters.
    #[schemars(length(min = 1))]
    subject: String,
}

pub struct DeliveryTask {
    client: Arc<dyn ReasoningClient>,
    mailer: Arc<dyn Mailer>,
    envelope: Envelope,
    progress: ProgressSink,
}

impl DeliveryTask {
    pub const ID: &'static str = "delivery";

    pub fn new(
        client: Arc<dyn ReasoningClient>,
        mailer: Arc<dyn Mailer>,
        envelope: Envelope,
        progress: ProgressSink,
    ) -> Self {
        Self {
            client,
            mailer,
            envelope,
            progress,
        }
    }
}

#[async_trait]
impl Task for DeliveryTask {
    fn id(&self) -> &str {
        Self::ID
    }

    #[instrument(skip(self, context))]
    async fn run(&self, context: Context) -> Result<TaskResult, GraphError> {
        let start_time = std::time::Instant::now();
        self.progress.enter(Stage::Sending);

        let mut research_context = load_research_context(&context).await?;
        let report = research_context
            .report
            .clone()
            .ok_or_else(|| GraphError::ContextError("Report not found".to_string()))?;

        let outcome = deliver(
            self.client.as_ref(),
            self.mailer.as_ref(),
            &self.envelope,
            &research_context.query,
            &report,
        )
        .await;

        // The report stays in the context either way.
        let status = match outcome {
            Ok(()) => {
                info!("Report emailed to {}", self.envelope.to);
                "Report emailed"
            }
            Err(e) => {
                warn!(error = %e, "report delivery failed");
                self.progress.emit(ProgressEvent::DeliveryFailed {
                    message: e.to_string(),
                });
                research_context.delivery_error = Some(e.to_string());
                "Report delivery failed"
            }
        };

        context.set(RESEARCH_CONTEXT, research_context).await;
        record_task_time(&context, Self::ID, start_time).await;

        Ok(TaskResult::new(Some(status.to_string()), NextAction::End))
    }
}

/// Converts the report to HTML, picks a subject and sends it.
pub async fn deliver(
    client: &dyn ReasoningClient,
    mailer: &dyn Mailer,
    envelope: &Envelope,
    query: &str,
    report: &Report,
) -> Result<(), DeliveryError> {
    let email = OutgoingEmail {
        from: envelope.from.clone(),
        to: envelope.to.clone(),
        subject: subject_line(client, query, report).await,
        html_body: render_html(report),
    };
    mailer.send(&email).await
}

async fn subject_line(client: &dyn ReasoningClient, query: &str, report: &Report) -> String {
    let call = StructuredCall::new::<EmailSubject>(
        "subject",
        "Write a clear, specific email subject line for the research report described below.",
        format!("Query: {}\n\nSummary: {}", query, report.short_summary),
    );
    let outcome = match call {
        Ok(call) => invoke_structured::<EmailSubject>(client, call).await,
        Err(e) => Err(e),
    };
    match outcome {
        Ok(EmailSubject { subject }) if !subject.trim().is_empty() => subject.trim().to_string(),
        _ => {
            debug!("using fallback subject line");
            fallback_subject(query)
        }
    }
}

pub fn fallback_subject(query: &str) -> String {
    let query = query.trim();
    if query.chars().count() <= MAX_SUBJECT_QUERY_CHARS {
        return format!("Research report: {}", query);
    }
    let cut: String = query.chars().take(MAX_SUBJECT_QUERY_CHARS).collect();
    format!("Research report: {}...", cut.trim_end())
}

/// Renders the report as a standalone HTML document, leading with the short
/// summary.
pub fn render_html(report: &Report) -> String {
    let markdown = format!("> {}\n\n{}", report.short_summary.trim(), report);

    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);
    options.insert(Options::ENABLE_FOOTNOTES);

    let mut body = String::new();
    html::push_html(&mut body, Parser::new_ext(&markdown, options));

    format!(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"></head>\n<body>\n{}</body>\n</html>\n",
        body
    )
}
