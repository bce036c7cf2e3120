//! Runs one research query through plan, search, write and send.
//!
//! Each stage is a graph-flow task wired into a linear graph
//! (`planner -> searcher -> writer -> delivery`). A run owns its own graph
//! and in-memory session store; nothing outlives the returned stream.

use crate::config::{Config, ResearchConfig};
use crate::error::StageError;
use crate::models::{ProgressEvent, Report, ResearchContext, Stage, TaskTimes};
use crate::progress::{ProgressSink, ProgressStream};
use crate::tasks::{
    DeliveryTask, Envelope, PlannerTask, SearcherTask, WriterTask, RESEARCH_CONTEXT, TASK_TIMES,
};
use crate::tools::llm::{ReasoningClient, RigReasoningClient};
use crate::tools::sendgrid::{Mailer, SendGridMailer};
use graph_flow::{
    ExecutionStatus, FlowRunner, Graph, GraphBuilder, InMemorySessionStorage, Session,
    SessionStorage,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct Pipeline {
    client: Arc<dyn ReasoningClient>,
    mailer: Arc<dyn Mailer>,
    envelope: Envelope,
    settings: ResearchConfig,
}

impl Pipeline {
    pub fn new(
        client: Arc<dyn ReasoningClient>,
        mailer: Arc<dyn Mailer>,
        envelope: Envelope,
        settings: ResearchConfig,
    ) -> Self {
        Self {
            client,
            mailer,
            envelope,
            settings,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Arc::new(RigReasoningClient::new(&config.llm)),
            Arc::new(SendGridMailer::new(&config.email)),
            Envelope::from(&config.email),
            config.research.clone(),
        )
    }

    /// Starts a run in the background and returns its progress stream.
    ///
    /// The stream yields a `Stage` event as each stage begins and ends with
    /// exactly one `Done` or `Failed`. Must be called inside a tokio runtime.
    pub fn run(&self, query: impl Into<String>) -> ProgressStream {
        let (sink, stream) = ProgressSink::channel();
        let pipeline = self.clone();
        let query = query.into();
        tokio::spawn(async move {
            pipeline.drive(query, sink).await;
        });
        stream
    }

    async fn drive(&self, query: String, sink: ProgressSink) {
        let start_time = Instant::now();
        let terminal = match self.execute(&query, &sink).await {
            Ok(report) => {
                info!("Research run completed in {:?}", start_time.elapsed());
                ProgressEvent::Done { report }
            }
            Err(failure) => {
                error!(stage = %failure.stage, "Research run failed: {}", failure.message);
                ProgressEvent::Failed {
                    stage: failure.stage,
                    message: failure.message,
                }
            }
        };
        sink.emit(terminal);
        sink.close();
    }

    fn build_graph(&self, progress: &ProgressSink) -> Graph {
        let mut graph = GraphBuilder::new("research_pipeline")
            .add_task(Arc::new(PlannerTask::new(
                self.client.clone(),
                progress.clone(),
                self.settings.plan_size,
            )))
            .add_task(Arc::new(SearcherTask::new(
                self.client.clone(),
                progress.clone(),
            )))
            .add_task(Arc::new(WriterTask::new(
                self.client.clone(),
                progress.clone(),
                self.settings.min_report_words,
            )))
            .add_task(Arc::new(DeliveryTask::new(
                self.client.clone(),
                self.mailer.clone(),
                self.envelope.clone(),
                progress.clone(),
            )))
            .add_edge(PlannerTask::ID, SearcherTask::ID)
            .add_edge(SearcherTask::ID, WriterTask::ID)
            .add_edge(WriterTask::ID, DeliveryTask::ID)
            .build();
        // Stages run without a deadline; a slow search must not cancel its
        // siblings.
        graph.set_task_timeout(Duration::MAX);
        graph
    }

    async fn execute(&self, query: &str, sink: &ProgressSink) -> Result<Report, StageError> {
        if query.trim().is_empty() {
            return Err(StageError::new(Stage::Planning, "query must not be empty"));
        }

        let storage: Arc<dyn SessionStorage> = Arc::new(InMemorySessionStorage::new());
        let runner = FlowRunner::new(Arc::new(self.build_graph(sink)), storage.clone());

        let session_id = Uuid::new_v4().to_string();
        info!("Starting research run {}", session_id);

        let session = Session::new_from_task(session_id.clone(), PlannerTask::ID);
        let research_context = ResearchContext {
            query: query.trim().to_string(),
            ..ResearchContext::default()
        };
        session
            .context
            .set(RESEARCH_CONTEXT, research_context)
            .await;
        storage
            .save(session)
            .await
            .map_err(|e| sink.failure_or(e))?;

        loop {
            let failure = match runner.run(&session_id).await {
                Ok(result) => match &result.status {
                    ExecutionStatus::Completed => break,
                    ExecutionStatus::Paused { next_task_id, .. } => {
                        debug!("Run paused, next task: {}", next_task_id);
                        continue;
                    }
                    ExecutionStatus::Error(e) => sink.failure_or(e),
                    _ => continue,
                },
                Err(e) => sink.failure_or(e),
            };

            if failure.stage == Stage::Sending {
                if let Some(report) = written_report(storage.as_ref(), &session_id).await {
                    warn!("Sending failed after the report was written: {}", failure.message);
                    sink.emit(ProgressEvent::DeliveryFailed {
                        message: failure.message,
                    });
                    return Ok(report);
                }
            }
            return Err(failure);
        }

        let session = storage
            .get(&session_id)
            .await
            .map_err(|e| sink.failure_or(e))?
            .ok_or_else(|| sink.failure_or("session disappeared"))?;

        let task_times: TaskTimes = session.context.get(TASK_TIMES).await.unwrap_or_default();
        info!(?task_times, "Stage timings");

        let research_context: ResearchContext = session
            .context
            .get(RESEARCH_CONTEXT)
            .await
            .ok_or_else(|| sink.failure_or("research context missing"))?;
        if let Some(delivery_error) = &research_context.delivery_error {
            warn!("Report delivered to the stream only: {}", delivery_error);
        }

        research_context
            .report
            .ok_or_else(|| StageError::new(Stage::Writing, "no report was produced"))
    }
}

/// The report saved by the writer stage, if the run got that far.
async fn written_report(storage: &dyn SessionStorage, session_id: &str) -> Option<Report> {
    let session = storage.get(session_id).await.ok()??;
    let research_context: ResearchContext = session.context.get(RESEARCH_CONTEXT).await?;
    research_context.report
}
