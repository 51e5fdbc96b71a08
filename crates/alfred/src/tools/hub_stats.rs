use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::Tool;
use crate::errors::{AgentError, AgentResult};

pub const HUGGING_FACE_URL: &str = "https://huggingface.co";

#[derive(Debug, Deserialize)]
struct HubModel {
    id: String,
    #[serde(default)]
    downloads: u64,
}

/// Reports an author's most downloaded model on the Hugging Face Hub
pub struct HubStatsTool {
    client: Client,
    base_url: String,
}

impl HubStatsTool {
    pub fn new(client: Client) -> Self {
        Self::with_base_url(client, HUGGING_FACE_URL)
    }

    pub fn with_base_url<S: Into<String>>(client: Client, base_url: S) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    async fn top_model(&self, author: &str) -> reqwest::Result<Option<HubModel>> {
        let url = format!("{}/api/models", self.base_url.trim_end_matches('/'));
        let models: Vec<HubModel> = self
            .client
            .get(&url)
            .query(&[
                ("author", author),
                ("sort", "downloads"),
                ("direction", "-1"),
                ("limit", "1"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(models.into_iter().next())
    }
}

#[async_trait]
impl Tool for HubStatsTool {
    fn name(&self) -> &str {
        "get_hub_stats"
    }

    fn description(&self) -> &str {
        "Fetches the most downloaded model from a specific author on the Hugging Face Hub."
    }

    fn parameter(&self) -> &str {
        "author"
    }

    fn parameter_description(&self) -> &str {
        "The username of the model author or organization to find models from."
    }

    async fn invoke(&self, author: &str) -> AgentResult<String> {
        let model = self.top_model(author).await.map_err(|e| {
            AgentError::ExecutionError(format!("Error fetching models for {}: {}", author, e))
        })?;

        Ok(match model {
            Some(model) => format!(
                "The most downloaded model by {} is {} with {} downloads.",
                author,
                model.id,
                thousands(model.downloads)
            ),
            None => format!("No models found for author {}.", author),
        })
    }
}

/// `1234567` -> `1,234,567`
fn thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, digit) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(digit);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_thousands() {
        assert_eq!(thousands(0), "0");
        assert_eq!(thousands(999), "999");
        assert_eq!(thousands(1000), "1,000");
        assert_eq!(thousands(1234567), "1,234,567");
    }

    #[tokio::test]
    async fn test_most_downloaded_model() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/models"))
            .and(query_param("author", "facebook"))
            .and(query_param("sort", "downloads"))
            .and(query_param("limit", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": "facebook/esm2_t6_8M_UR50D", "downloads": 12345678, "likes": 20}
            ])))
            .mount(&server)
            .await;

        let tool = HubStatsTool::with_base_url(Client::new(), server.uri());
        let output = tool.invoke("facebook").await.unwrap();

        assert_eq!(
            output,
            "The most downloaded model by facebook is facebook/esm2_t6_8M_UR50D with 12,345,678 downloads."
        );
    }

    #[tokio::test]
    async fn test_no_models() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let tool = HubStatsTool::with_base_url(Client::new(), server.uri());
        assert_eq!(
            tool.invoke("nobody").await.unwrap(),
            "No models found for author nobody."
        );
    }

    #[tokio::test]
    async fn test_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let tool = HubStatsTool::with_base_url(Client::new(), server.uri());
        match tool.invoke("facebook").await {
            Err(AgentError::ExecutionError(msg)) => {
                assert!(msg.starts_with("Error fetching models for facebook"))
            }
            other => panic!("expected execution error, got {:?}", other),
        }
    }
}
