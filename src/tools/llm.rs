use crate::config::LlmConfig;
use crate::error::CallError;
use crate::tools::tavily::TavilySearch;
use async_trait::async_trait;
use rig::completion::{CompletionError, Prompt, PromptError};
use rig::prelude::*;
use rig::providers::openai;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Instant;
use tracing::{debug, instrument, warn};

/// Capabilities the reasoning service may use on its own during a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    WebSearch,
}

/// One request to the reasoning service.
#[derive(Debug, Clone)]
pub struct StructuredCall {
    /// Short label used in logs, e.g. `"planner"`.
    pub name: &'static str,
    pub instructions: String,
    pub input: String,
    pub output_schema: Value,
    pub capabilities: Vec<Capability>,
}

impl StructuredCall {
    pub fn new<T: JsonSchema>(
        name: &'static str,
        instructions: impl Into<String>,
        input: impl Into<String>,
    ) -> Result<Self, CallError> {
        Ok(Self {
            name,
            instructions: instructions.into(),
            input: input.into(),
            output_schema: schema_for::<T>()?,
            capabilities: Vec::new(),
        })
    }

    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capabilities.push(capability);
        self
    }

    pub fn expects_text(&self) -> bool {
        self.output_schema.get("type").and_then(Value::as_str) == Some("string")
    }
}

/// The remote reasoning service. Implementations return the raw payload;
/// [`invoke_structured`] owns schema enforcement.
#[async_trait]
pub trait ReasoningClient: Send + Sync {
    async fn invoke(&self, call: StructuredCall) -> Result<Value, CallError>;
}

pub fn schema_for<T: JsonSchema>() -> Result<Value, CallError> {
    let schema = serde_json::to_value(schemars::schema_for!(T))
        .map_err(|e| CallError::Decoding(format!("cannot build output schema: {}", e)))?;
    match schema.as_object() {
        Some(object) if !object.is_empty() => Ok(schema),
        _ => Err(CallError::Decoding("output schema is empty".to_string())),
    }
}

/// Runs `call` and decodes the result into `T`, rejecting anything that does
/// not match the call's schema.
pub async fn invoke_structured<T: DeserializeOwned>(
    client: &dyn ReasoningClient,
    call: StructuredCall,
) -> Result<T, CallError> {
    let name = call.name;
    let schema = call.output_schema.clone();
    let start = Instant::now();

    let result = client
        .invoke(call)
        .await
        .and_then(|value| conform(&schema, value))
        .and_then(|value| {
            serde_json::from_value::<T>(value).map_err(|e| CallError::Decoding(e.to_string()))
        });

    let elapsed_ms = start.elapsed().as_millis() as u64;
    match &result {
        Ok(_) => debug!(call = name, elapsed_ms, "structured call succeeded"),
        Err(e) => warn!(call = name, elapsed_ms, error = %e, "structured call failed"),
    }
    result
}

/// Validates `value` against a JSON schema.
pub fn conform(schema: &Value, value: Value) -> Result<Value, CallError> {
    let validator = jsonschema::validator_for(schema)
        .map_err(|e| CallError::Decoding(format!("invalid output schema: {}", e)))?;

    let problems: Vec<String> = validator
        .iter_errors(&value)
        .map(|e| e.to_string())
        .collect();

    if problems.is_empty() {
        Ok(value)
    } else {
        Err(CallError::Decoding(problems.join("; ")))
    }
}

/// Turns model text into a JSON value. Text-shaped schemas take the reply
/// verbatim when it isn't a JSON string.
pub fn parse_payload(text: &str, expects_text: bool) -> Result<Value, CallError> {
    let body = strip_code_fence(text);
    match serde_json::from_str::<Value>(body) {
        Ok(Value::String(s)) => Ok(Value::String(s)),
        Ok(_) | Err(_) if expects_text => Ok(Value::String(text.trim().to_string())),
        Ok(value) => Ok(value),
        Err(e) => Err(CallError::Decoding(format!("reply is not JSON: {}", e))),
    }
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn structured_preamble(call: &StructuredCall) -> String {
    if call.expects_text() {
        return format!("{}\n\nRespond with plain text only.", call.instructions);
    }
    format!(
        "{}\n\nRespond with a single JSON value that matches this JSON schema. \
         Do not add any text before or after the JSON.\n{}",
        call.instructions, call.output_schema
    )
}

/// OpenAI-backed client driven through rig agents.
pub struct RigReasoningClient {
    client: openai::Client,
    model: String,
    web_search: Option<TavilySearch>,
    max_turns: usize,
}

impl RigReasoningClient {
    pub fn new(config: &LlmConfig) -> Self {
        Self {
            client: openai::Client::new(&config.openai_api_key),
            model: config.model.clone(),
            web_search: config.tavily_api_key.as_deref().map(TavilySearch::new),
            max_turns: config.search_max_turns,
        }
    }
}

#[async_trait]
impl ReasoningClient for RigReasoningClient {
    #[instrument(skip(self, call), fields(call = call.name, model = %self.model))]
    async fn invoke(&self, call: StructuredCall) -> Result<Value, CallError> {
        let preamble = structured_preamble(&call);
        let mut builder = self.client.agent(&self.model).preamble(&preamble);
        let mut turns = 0;

        if call.capabilities.contains(&Capability::WebSearch) {
            match &self.web_search {
                Some(tool) => {
                    builder = builder.tool(tool.clone());
                    turns = self.max_turns;
                }
                None => debug!("web search requested without a search tool; answering unaided"),
            }
        }

        let agent = builder.build();
        let response = agent
            .prompt(call.input.as_str())
            .multi_turn(turns)
            .await
            .map_err(|e| match e {
                PromptError::CompletionError(CompletionError::HttpError(e)) => {
                    CallError::Transport(e.to_string())
                }
                other => CallError::Remote(other.to_string()),
            })?;

        debug!(chars = response.len(), "reasoning service replied");
        parse_payload(&response, call.expects_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, JsonSchema)]
    struct Subject {
        #[schemars(length(min = 1))]
        subject: String,
    }

    struct Canned(Value);

    #[async_trait]
    impl ReasoningClient for Canned {
        async fn invoke(&self, _call: StructuredCall) -> Result<Value, CallError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fence("  {\"a\": 1} "), "{\"a\": 1}");
    }

    #[test]
    fn test_parse_payload_object() {
        let value = parse_payload("```json\n{\"subject\": \"Hi\"}\n```", false).unwrap();
        assert_eq!(value, json!({"subject": "Hi"}));
    }

    #[test]
    fn test_parse_payload_free_text_for_string_schema() {
        let value = parse_payload("Coral reefs are declining.", true).unwrap();
        assert_eq!(value, json!("Coral reefs are declining."));
    }

    #[test]
    fn test_parse_payload_rejects_prose_for_object_schema() {
        let err = parse_payload("Sorry, I can't do that.", false).unwrap_err();
        assert!(matches!(err, CallError::Decoding(_)));
    }

    #[test]
    fn test_string_schema_expects_text() {
        let call = StructuredCall::new::<String>("search", "Summarize", "term").unwrap();
        assert!(call.expects_text());
        let call = StructuredCall::new::<Subject>("subject", "Write a subject", "report").unwrap();
        assert!(!call.expects_text());
    }

    #[test]
    fn test_conform_rejects_empty_string_field() {
        let schema = schema_for::<Subject>().unwrap();
        let err = conform(&schema, json!({"subject": ""})).unwrap_err();
        assert!(matches!(err, CallError::Decoding(_)));
    }

    #[test]
    fn test_schema_for_is_never_permissive() {
        let schema = schema_for::<Subject>().unwrap();
        assert_eq!(schema["required"], json!(["subject"]));
        assert!(matches!(
            conform(&schema, json!({})),
            Err(CallError::Decoding(_))
        ));
    }

    #[tokio::test]
    async fn test_invoke_structured_decodes() {
        let client = Canned(json!({"subject": "Reef report"}));
        let call = StructuredCall::new::<Subject>("subject", "Write a subject", "report").unwrap();
        let subject: Subject = invoke_structured(&client, call).await.unwrap();
        assert_eq!(subject.subject, "Reef report");
    }

    #[tokio::test]
    async fn test_invoke_structured_rejects_wrong_shape() {
        let client = Canned(json!({"title": "Reef report"}));
        let call = StructuredCall::new::<Subject>("subject", "Write a subject", "report").unwrap();
        let result: Result<Subject, _> = invoke_structured(&client, call).await;
        assert!(matches!(result, Err(CallError::Decoding(_))));
    }
}
