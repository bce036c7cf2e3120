use super::{fatal, load_research_context, record_task_time, RESEARCH_CONTEXT};
use crate::error::CallError;
use crate::models::{SearchPlan, Stage};
use crate::progress::ProgressSink;
use crate::tools::llm::{invoke_structured, schema_for, ReasoningClient, StructuredCall};
use async_trait::async_trait;
use graph_flow::{Context, GraphError, NextAction, Task, TaskResult};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, instrument};

const PLANNER_INSTRUCTIONS: &str = "You are a helpful research assistant. Given a query, come up \
with a set of web searches to perform to best answer the query. Each search needs a concrete \
search term and a one-sentence reason explaining what it contributes.";

pub struct PlannerTask {
    client: Arc<dyn ReasoningClient>,
    progress: ProgressSink,
    plan_size: usize,
}

impl PlannerTask {
    pub const ID: &'static str = "planner";

    pub fn new(client: Arc<dyn ReasoningClient>, progress: ProgressSink, plan_size: usize) -> Self {
        Self {
            client,
            progress,
            plan_size,
        }
    }
}

#[async_trait]
impl Task for PlannerTask {
    fn id(&self) -> &str {
        Self::ID
    }

    #[instrument(skip(self, context))]
    async fn run(&self, context: Context) -> Result<TaskResult, GraphError> {
        let start_time = std::time::Instant::now();
        self.progress.enter(Stage::Planning);

        let mut research_context = load_research_context(&context).await?;
        let plan = plan_searches(self.client.as_ref(), &research_context.query, self.plan_size)
            .await
            .map_err(|e| fatal(&self.progress, Stage::Planning, e))?;

        info!("Planned {} searches", plan.searches.len());
        research_context.plan = plan.searches;
        context.set(RESEARCH_CONTEXT, research_context).await;
        record_task_time(&context, Self::ID, start_time).await;

        Ok(TaskResult::new(
            Some("Searches planned".to_string()),
            NextAction::ContinueAndExecute,
        ))
    }
}

/// `SearchPlan` schema pinned to exactly `plan_size` searches.
pub fn planner_schema(plan_size: usize) -> Result<Value, CallError> {
    let mut schema = schema_for::<SearchPlan>()?;
    if let Some(searches) = schema
        .pointer_mut("/properties/searches")
        .and_then(Value::as_object_mut)
    {
        searches.insert("minItems".to_string(), json!(plan_size));
        searches.insert("maxItems".to_string(), json!(plan_size));
    }
    Ok(schema)
}

/// Asks the reasoning service for exactly `plan_size` search directives.
pub async fn plan_searches(
    client: &dyn ReasoningClient,
    query: &str,
    plan_size: usize,
) -> Result<SearchPlan, CallError> {
    let mut call = StructuredCall::new::<SearchPlan>(
        "planner",
        format!("{} Output exactly {} searches.", PLANNER_INSTRUCTIONS, plan_size),
        format!("Query: {}", query),
    )?;
    call.output_schema = planner_schema(plan_size)?;

    let plan: SearchPlan = invoke_structured(client, call).await?;

    if plan.searches.len() != plan_size {
        return Err(CallError::Decoding(format!(
            "expected {} searches, got {}",
            plan_size,
            plan.searches.len()
        )));
    }
    if let Some(blank) = plan.searches.iter().position(|d| !d.is_complete()) {
        return Err(CallError::Decoding(format!(
            "search {} has a blank term or reason",
            blank + 1
        )));
    }
    Ok(plan)
}
