use crate::models::{TavilyResult, TavilySearchRequest, TavilySearchResponse};
use rig::completion::ToolDefinition;
use rig::tool::Tool;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::debug;

const TAVILY_URL: &str = "https://api.tavily.com/search";

#[derive(Debug, Error)]
#[error("Tavily error: {0}")]
pub struct TavilyError(String);

/// Web search tool the model may call while answering a search directive.
#[derive(Debug, Clone)]
pub struct TavilySearch {
    api_key: String,
    endpoint: String,
    max_results: i32,
    http: reqwest::Client,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TavilySearchArgs {
    pub query: String,
}

impl TavilySearch {
    pub fn new(api_key: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            endpoint: TAVILY_URL.to_string(),
            max_results: 5,
            http: reqwest::Client::new(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

impl Tool for TavilySearch {
    const NAME: &'static str = "web_search";

    type Error = TavilyError;
    type Args = TavilySearchArgs;
    type Output = String;

    async fn definition(&self, _prompt: String) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.to_string(),
            description: "Search the web and return the most relevant pages with their content"
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The search query"
                    }
                },
                "required": ["query"]
            }),
        }
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        debug!(query = %args.query, "web search");
        let request = TavilySearchRequest {
            query: args.query,
            max_results: self.max_results,
            search_depth: "advanced".to_string(),
            include_raw_content: false,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| TavilyError(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(TavilyError(format!("HTTP {}", response.status())));
        }

        let search_response: TavilySearchResponse = response
            .json()
            .await
            .map_err(|e| TavilyError(format!("Failed to parse response: {}", e)))?;

        Ok(format_results(&search_response.results))
    }
}

/// Renders results as `Title/URL/Content` blocks separated by `---`.
pub fn format_results(results: &[TavilyResult]) -> String {
    if results.is_empty() {
        return "No results found.".to_string();
    }
    results
        .iter()
        .map(|r| format!("Title: {}\nURL: {}\nContent: {}\n", r.title, r.url, r.content))
        .collect::<Vec<_>>()
        .join("\n---\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_format_results() {
        let results = vec![
            TavilyResult {
                title: "Reefs".into(),
                url: "https://a.example".into(),
                content: "Microplastics found in coral tissue.".into(),
                score: 0.9,
            },
            TavilyResult {
                title: "Ocean".into(),
                url: "https://b.example".into(),
                content: "Plastic load rising.".into(),
                score: 0.5,
            },
        ];
        let text = format_results(&results);
        assert!(text.starts_with("Title: Reefs\nURL: https://a.example"));
        assert_eq!(text.matches("\n---\n").count(), 1);
    }

    #[test]
    fn test_format_no_results() {
        assert_eq!(format_results(&[]), "No results found.");
    }

    #[tokio::test]
    async fn test_call_posts_query_with_bearer_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("authorization", "Bearer tvly-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{"title": "T", "url": "https://t.example", "content": "C"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let tool = TavilySearch::new("tvly-test").with_endpoint(server.uri());
        let output = tool
            .call(TavilySearchArgs {
                query: "coral".into(),
            })
            .await
            .unwrap();
        assert!(output.contains("URL: https://t.example"));
    }

    #[tokio::test]
    async fn test_call_surfaces_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let tool = TavilySearch::new("bad").with_endpoint(server.uri());
        let err = tool
            .call(TavilySearchArgs {
                query: "coral".into(),
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("401"));
    }
}
