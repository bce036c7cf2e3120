#![allow(dead_code)]

use async_trait::async_trait;
use futures::StreamExt;
use research_mailer::config::ResearchConfig;
use research_mailer::error::{CallError, DeliveryError};
use research_mailer::tasks::Envelope;
use research_mailer::tools::llm::{ReasoningClient, StructuredCall};
use research_mailer::tools::sendgrid::{Mailer, OutgoingEmail};
use research_mailer::{Pipeline, ProgressEvent, Report, SearchDirective};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Barrier;

/// Reasoning service fake that answers by call name.
pub struct ScriptedClient {
    pub plan: Vec<SearchDirective>,
    pub report: Report,
    pub failing_terms: Vec<String>,
    pub fail_planner: bool,
    pub fail_writer: bool,
    /// Delays the search for one term.
    pub search_delay: Option<(String, Duration)>,
    /// Every search waits here before answering.
    pub search_barrier: Option<Arc<Barrier>>,
    calls: Mutex<Vec<StructuredCall>>,
}

impl ScriptedClient {
    pub fn new(plan_size: usize) -> Self {
        Self {
            plan: directives(plan_size),
            report: report(200),
            failing_terms: Vec::new(),
            fail_planner: false,
            fail_writer: false,
            search_delay: None,
            search_barrier: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls_named(&self, name: &str) -> Vec<StructuredCall> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.name == name)
            .cloned()
            .collect()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

fn search_term(input: &str) -> &str {
    input
        .lines()
        .next()
        .and_then(|line| line.strip_prefix("Search term: "))
        .unwrap_or("")
}

pub fn summary_for(term: &str) -> String {
    format!("Findings for {}", term)
}

#[async_trait]
impl ReasoningClient for ScriptedClient {
    async fn invoke(&self, call: StructuredCall) -> Result<Value, CallError> {
        self.calls.lock().unwrap().push(call.clone());
        match call.name {
            "planner" if self.fail_planner => Err(CallError::Remote("planner unavailable".into())),
            "planner" => Ok(json!({ "searches": self.plan })),
            "search" => {
                let term = search_term(&call.input);
                if let Some(barrier) = &self.search_barrier {
                    barrier.wait().await;
                }
                if let Some((slow, delay)) = &self.search_delay {
                    if slow == term {
                        tokio::time::sleep(*delay).await;
                    }
                }
                if self.failing_terms.iter().any(|t| t == term) {
                    Err(CallError::Transport(format!("search for {} timed out", term)))
                } else {
                    Ok(json!(summary_for(term)))
                }
            }
            "writer" if self.fail_writer => Err(CallError::Decoding("missing markdown_body".into())),
            "writer" => Ok(serde_json::to_value(&self.report).unwrap()),
            "subject" => Ok(json!({ "subject": "Reef research" })),
            other => Err(CallError::Remote(format!("unexpected call {}", other))),
        }
    }
}

#[derive(Default)]
pub struct RecordingMailer {
    pub fail: bool,
    pub delay: Option<Duration>,
    pub sent: Mutex<Vec<OutgoingEmail>>,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), DeliveryError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(DeliveryError::Rejected {
                status: 401,
                body: "invalid api key".into(),
            });
        }
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

pub fn directives(n: usize) -> Vec<SearchDirective> {
    (1..=n)
        .map(|i| SearchDirective {
            term: format!("reef term {}", i),
            reason: format!("covers aspect {}", i),
        })
        .collect()
}

pub fn report(words: usize) -> Report {
    Report {
        short_summary: "Microplastics harm coral health.".into(),
        markdown_body: format!("# Microplastics and coral reefs\n\n{}", "coral ".repeat(words)),
        follow_up_questions: vec![
            "Which reef regions are most exposed?".into(),
            "Can corals expel ingested plastic?".into(),
        ],
    }
}

pub fn pipeline(
    client: Arc<dyn ReasoningClient>,
    mailer: Arc<RecordingMailer>,
    settings: ResearchConfig,
) -> Pipeline {
    Pipeline::new(
        client,
        mailer,
        Envelope {
            from: "bot@example.com".into(),
            to: "me@example.com".into(),
        },
        settings,
    )
}

pub async fn collect(pipeline: &Pipeline, query: &str) -> Vec<ProgressEvent> {
    pipeline.run(query).collect().await
}
