//! Ollama client and the completion-provider seam.
//!
//! The model is used **only** to propose glyph assignments. Everything that
//! constrains the proposal (the lexicon membership check, the glyph caps, the
//! permission gate) is engine-owned and lives outside this module.
//!
//! [`CompletionProvider`] abstracts over how a completion is obtained so the
//! engine can run against the real Ollama host or a scripted stand-in in tests.

use std::cell::{Cell, RefCell};

use miette::Diagnostic;
use thiserror::Error;

/// Errors from the LLM subsystem.
#[derive(Debug, Error, Diagnostic)]
pub enum LlmError {
    #[error("Ollama is not available at {url}")]
    #[diagnostic(
        code(scribe::llm::unavailable),
        help("Start Ollama with `ollama serve`, or point --ollama-url at a running host.")
    )]
    Unavailable { url: String },

    #[error("Ollama request failed: {message}")]
    #[diagnostic(
        code(scribe::llm::request_failed),
        help("Check that Ollama is running and the model is pulled.")
    )]
    RequestFailed { message: String },

    #[error("failed to parse Ollama response: {message}")]
    #[diagnostic(
        code(scribe::llm::parse_error),
        help("The model host returned an unexpected response format.")
    )]
    ParseError { message: String },

    #[error("failed to pull model \"{model}\": {message}")]
    #[diagnostic(
        code(scribe::llm::model_pull),
        help("Check your internet connection or manually run: ollama pull {model}")
    )]
    ModelPull { model: String, message: String },

    #[error("scripted provider exhausted after {served} completions")]
    #[diagnostic(
        code(scribe::llm::script_exhausted),
        help("Register enough responses on the ScriptedProvider for the documents under test.")
    )]
    ScriptExhausted { served: usize },
}

/// Capability the engine needs from a generative model: one prompt in, text out.
pub trait CompletionProvider {
    /// Produce a completion for the prompt, or fail with a provider error.
    fn complete(&self, prompt: &str) -> Result<String, LlmError>;
}

/// Configuration for the Ollama client.
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    /// Base URL for the Ollama API.
    pub base_url: String,
    /// Model name to use.
    pub model: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".into(),
            model: "llama3.2".into(),
            timeout_secs: 120,
        }
    }
}

/// Client for the Ollama REST API.
pub struct OllamaClient {
    config: OllamaConfig,
    available: bool,
    /// Models available locally after `probe()`.
    available_models: Vec<String>,
}

impl OllamaClient {
    /// Create a new Ollama client with the given configuration.
    pub fn new(config: OllamaConfig) -> Self {
        Self {
            config,
            available: false,
            available_models: Vec::new(),
        }
    }

    /// Probe the Ollama server to check availability.
    ///
    /// Sends a lightweight request to the `/api/tags` endpoint and parses the
    /// list of locally available models.
    pub fn probe(&mut self) -> bool {
        let url = format!("{}/api/tags", self.config.base_url);
        let agent = ureq::AgentBuilder::new()
            .timeout(std::time::Duration::from_secs(5))
            .build();

        match agent.get(&url).call() {
            Ok(resp) => {
                if resp.status() != 200 {
                    self.available = false;
                    return false;
                }
                self.available = true;

                if let Ok(body) = resp.into_string() {
                    if let Ok(json) = serde_json::from_str::<serde_json::Value>(&body) {
                        self.available_models = json["models"]
                            .as_array()
                            .map(|arr| {
                                arr.iter()
                                    .filter_map(|m| m["name"].as_str().map(|s| s.to_string()))
                                    .collect()
                            })
                            .unwrap_or_default();
                    }
                }

                true
            }
            Err(_) => {
                self.available = false;
                self.available_models.clear();
                false
            }
        }
    }

    /// Whether the configured model is locally available.
    pub fn has_model(&self) -> bool {
        let target = &self.config.model;
        self.available_models
            .iter()
            .any(|m| m == target || m.split(':').next() == Some(target))
    }

    /// Ensure the configured model is available, pulling it if necessary.
    ///
    /// Call this after `probe()` returns true, before processing a vault.
    pub fn ensure_model(&mut self) -> Result<(), LlmError> {
        if !self.available {
            return Err(LlmError::Unavailable {
                url: self.config.base_url.clone(),
            });
        }

        if self.has_model() {
            return Ok(());
        }

        // Model not present locally — pull it.
        tracing::info!(model = %self.config.model, "pulling model, this may take a few minutes");

        let url = format!("{}/api/pull", self.config.base_url);
        let agent = ureq::AgentBuilder::new()
            .timeout(std::time::Duration::from_secs(600)) // pulls can be slow
            .build();

        let body = serde_json::json!({
            "name": self.config.model,
            "stream": false,
        });

        let body_str = serde_json::to_string(&body).map_err(|e| LlmError::ModelPull {
            model: self.config.model.clone(),
            message: format!("JSON serialize error: {e}"),
        })?;

        let resp = agent
            .post(&url)
            .set("Content-Type", "application/json")
            .send_string(&body_str)
            .map_err(|e: ureq::Error| LlmError::ModelPull {
                model: self.config.model.clone(),
                message: e.to_string(),
            })?;

        if resp.status() == 200 {
            // Re-probe to refresh the model list.
            self.probe();
            Ok(())
        } else {
            Err(LlmError::ModelPull {
                model: self.config.model.clone(),
                message: format!("server returned status {}", resp.status()),
            })
        }
    }

    /// Whether the Ollama server is available.
    pub fn is_available(&self) -> bool {
        self.available
    }

    /// Get the model name being used.
    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Generate a completion from a prompt.
    fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        if !self.available {
            return Err(LlmError::Unavailable {
                url: self.config.base_url.clone(),
            });
        }

        let url = format!("{}/api/generate", self.config.base_url);
        let agent = ureq::AgentBuilder::new()
            .timeout(std::time::Duration::from_secs(self.config.timeout_secs))
            .build();

        let body = serde_json::json!({
            "model": self.config.model,
            "prompt": prompt,
            "stream": false,
            // Low temperature: the output grammar matters more than creativity.
            "options": { "temperature": 0.3 },
        });

        let body_str = serde_json::to_string(&body).map_err(|e| LlmError::RequestFailed {
            message: format!("JSON serialize error: {e}"),
        })?;

        let resp = agent
            .post(&url)
            .set("Content-Type", "application/json")
            .send_string(&body_str)
            .map_err(|e: ureq::Error| LlmError::RequestFailed {
                message: e.to_string(),
            })?;

        let resp_str = resp.into_string().map_err(|e| LlmError::ParseError {
            message: e.to_string(),
        })?;

        let json: serde_json::Value =
            serde_json::from_str(&resp_str).map_err(|e| LlmError::ParseError {
                message: e.to_string(),
            })?;

        json["response"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| LlmError::ParseError {
                message: "missing 'response' field".into(),
            })
    }
}

impl CompletionProvider for OllamaClient {
    fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        self.generate(prompt)
    }
}

impl std::fmt::Debug for OllamaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OllamaClient")
            .field("base_url", &self.config.base_url)
            .field("model", &self.config.model)
            .field("available", &self.available)
            .finish()
    }
}

/// Deterministic provider for tests: serves preconfigured completions in order.
///
/// Processing is single-threaded, so interior mutability via `RefCell` is fine.
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    responses: RefCell<Vec<Result<String, String>>>,
    served: Cell<usize>,
}

impl ScriptedProvider {
    /// Create an empty scripted provider. Every call fails until responses are added.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful completion.
    pub fn with_response(self, text: impl Into<String>) -> Self {
        self.responses.borrow_mut().push(Ok(text.into()));
        self
    }

    /// Queue a provider failure.
    pub fn with_failure(self, message: impl Into<String>) -> Self {
        self.responses.borrow_mut().push(Err(message.into()));
        self
    }

    /// Number of completions served so far.
    pub fn served(&self) -> usize {
        self.served.get()
    }
}

impl CompletionProvider for ScriptedProvider {
    fn complete(&self, _prompt: &str) -> Result<String, LlmError> {
        let idx = self.served.get();
        let responses = self.responses.borrow();
        match responses.get(idx) {
            Some(entry) => {
                self.served.set(idx + 1);
                match entry {
                    Ok(text) => Ok(text.clone()),
                    Err(message) => Err(LlmError::RequestFailed {
                        message: message.clone(),
                    }),
                }
            }
            None => Err(LlmError::ScriptExhausted { served: idx }),
        }
    }
}
