use crate::config::ProviderConfig;
use crate::providers::{check_status, client, LlmProvider, ProviderError};
use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

/// Local models served by Ollama; no API key involved
pub struct OllamaProvider {
    client: Client,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OllamaProvider {
    pub fn new(config: &ProviderConfig, timeout: Duration) -> Result<Self, ProviderError> {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());

        Ok(OllamaProvider {
            client: client(timeout)?,
            base_url,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn provider_name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, instructions: &str, content: &str) -> Result<String, ProviderError> {
        // Ollama uses OpenAI-compatible API
        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .json(&json!({
                "model": self.model,
                "messages": [
                    {"role": "system", "content": instructions},
                    {"role": "user", "content": content}
                ],
                "temperature": self.temperature,
                "max_tokens": self.max_tokens
            }))
            .send()
            .await?;

        let response_body: Value = check_status("ollama", response).await?.json().await?;
        debug!("Ollama response: {:?}", response_body);

        response_body["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or(ProviderError::EmptyResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    #[tokio::test]
    async fn test_complete_without_api_key() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices": [{"message": {"content": "{\"nutrition\": []}"}}]}"#)
            .create_async()
            .await;

        let config = ProviderConfig {
            enabled: true,
            model: "llama3.2".to_string(),
            temperature: 0.2,
            max_tokens: 2000,
            api_key: None,
            base_url: Some(server.url()),
        };
        let provider = OllamaProvider::new(&config, Duration::from_secs(5)).unwrap();

        let result = provider.complete("Return JSON", "text").await.unwrap();
        assert_eq!(result, r#"{"nutrition": []}"#);
        assert_eq!(provider.provider_name(), "ollama");
        mock.assert_async().await;
    }
}
