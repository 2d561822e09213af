use serde::{Deserialize, Serialize};

use super::LlmError;

/// LLM client abstraction (allows mocking). Both the conversational
/// generator and the parsing fallback go through this seam — injected
/// explicitly, never a module-level singleton.
pub trait LlmClient: Send + Sync {
    fn generate(&self, model: &str, prompt: &str, system: &str) -> Result<String, LlmError>;

    fn list_models(&self) -> Result<Vec<String>, LlmError>;

    fn is_model_available(&self, model: &str) -> Result<bool, LlmError> {
        Ok(self.list_models()?.iter().any(|m| m == model))
    }
}

/// Ollama HTTP client for local LLM inference.
pub struct OllamaClient {
    base_url: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl OllamaClient {
    /// Create a new OllamaClient pointing at an Ollama instance.
    pub fn new(base_url: &str, timeout_secs: u64) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            timeout_secs,
        }
    }

    /// Default Ollama instance at localhost:11434 with a 60s timeout —
    /// conversational replies are short, a hung call must not stall the
    /// conversation for long.
    pub fn default_local() -> Self {
        Self::new("http://localhost:11434", 60)
    }

    /// Honor the MEDIAGENT_OLLAMA_URL override, else localhost.
    pub fn from_env() -> Self {
        match std::env::var(crate::config::OLLAMA_URL_ENV) {
            Ok(url) if !url.trim().is_empty() => Self::new(url.trim(), 60),
            _ => Self::default_local(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Request body for Ollama /api/generate
#[derive(Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
}

/// Response body from Ollama /api/generate
#[derive(Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

/// Response body from Ollama /api/tags
#[derive(Deserialize)]
struct OllamaTagsResponse {
    models: Vec<OllamaModel>,
}

#[derive(Deserialize)]
struct OllamaModel {
    name: String,
}

impl LlmClient for OllamaClient {
    fn generate(&self, model: &str, prompt: &str, system: &str) -> Result<String, LlmError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = OllamaGenerateRequest {
            model,
            prompt,
            system,
            stream: false,
        };

        let response = self.client.post(&url).json(&body).send().map_err(|e| {
            if e.is_connect() {
                LlmError::Connection(self.base_url.clone())
            } else if e.is_timeout() {
                LlmError::Http(format!("Request timed out after {}s", self.timeout_secs))
            } else {
                LlmError::Http(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: OllamaGenerateResponse = response
            .json()
            .map_err(|e| LlmError::ResponseParsing(e.to_string()))?;

        Ok(parsed.response)
    }

    fn list_models(&self) -> Result<Vec<String>, LlmError> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self.client.get(&url).send().map_err(|e| {
            if e.is_connect() {
                LlmError::Connection(self.base_url.clone())
            } else {
                LlmError::Http(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: OllamaTagsResponse = response
            .json()
            .map_err(|e| LlmError::ResponseParsing(e.to_string()))?;

        Ok(parsed.models.into_iter().map(|m| m.name).collect())
    }
}

/// Mock LLM client for testing — returns a configurable response
/// or fails every call.
pub struct MockLlmClient {
    response: Option<String>,
}

impl MockLlmClient {
    pub fn new(response: &str) -> Self {
        Self {
            response: Some(response.to_string()),
        }
    }

    /// A client whose every call fails, for exercising degradation paths.
    pub fn failing() -> Self {
        Self { response: None }
    }
}

impl LlmClient for MockLlmClient {
    fn generate(&self, _model: &str, _prompt: &str, _system: &str) -> Result<String, LlmError> {
        match &self.response {
            Some(r) => Ok(r.clone()),
            None => Err(LlmError::Connection("http://localhost:11434".into())),
        }
    }

    fn list_models(&self) -> Result<Vec<String>, LlmError> {
        match &self.response {
            Some(_) => Ok(vec!["llama3.1:8b".into()]),
            None => Err(LlmError::Connection("http://localhost:11434".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_client_returns_configured_response() {
        let client = MockLlmClient::new("test response");
        let result = client.generate("model", "prompt", "system").unwrap();
        assert_eq!(result, "test response");
    }

    #[test]
    fn failing_mock_errors_every_call() {
        let client = MockLlmClient::failing();
        assert!(client.generate("model", "prompt", "system").is_err());
        assert!(client.list_models().is_err());
    }

    #[test]
    fn model_availability_checks_the_tag_list() {
        let client = MockLlmClient::new("ok");
        assert!(client.is_model_available("llama3.1:8b").unwrap());
        assert!(!client.is_model_available("mistral:7b").unwrap());
    }

    #[test]
    fn ollama_client_trims_trailing_slash() {
        let client = OllamaClient::new("http://localhost:11434/", 60);
        assert_eq!(client.base_url(), "http://localhost:11434");
    }

    #[test]
    fn default_local_uses_standard_port() {
        let client = OllamaClient::default_local();
        assert_eq!(client.base_url(), "http://localhost:11434");
    }
}
