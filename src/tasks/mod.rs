mod delivery;
mod planner;
mod searcher;
mod writer;

pub use delivery::{deliver, fallback_subject, render_html, DeliveryTask, Envelope};
pub use planner::{plan_searches, planner_schema, PlannerTask};
pub use searcher::{present_summaries, search, search_all, SearcherTask};
pub use writer::{write_report, writer_input, WriterTask};

use crate::error::{CallError, StageError};
use crate::models::{ResearchContext, Stage, TaskTimes};
use crate::progress::ProgressSink;
use graph_flow::{Context, GraphError};
use std::time::Instant;

pub const RESEARCH_CONTEXT: &str = "research_context";
pub const TASK_TIMES: &str = "task_times";

async fn load_research_context(context: &Context) -> Result<ResearchContext, GraphError> {
    context
        .get(RESEARCH_CONTEXT)
        .await
        .ok_or_else(|| GraphError::ContextError("Research context not found".to_string()))
}

async fn record_task_time(context: &Context, task_id: &str, start_time: Instant) {
    let elapsed = start_time.elapsed().as_millis() as u64;
    let mut task_times: TaskTimes = context.get(TASK_TIMES).await.unwrap_or_default();
    task_times.insert(task_id.to_string(), elapsed);
    context.set(TASK_TIMES, task_times).await;
}

/// Records a fatal stage failure for the orchestrator and converts it for
/// the graph runner.
fn fatal(progress: &ProgressSink, stage: Stage, err: CallError) -> GraphError {
    progress.record_failure(StageError::new(stage, err.to_string()));
    GraphError::Other(anyhow::Error::new(err))
}
