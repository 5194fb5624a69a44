use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::RetrievalError;

/// Timeout for the remote context endpoint.
const CONTEXT_TIMEOUT_SECS: u64 = 10;

/// Context returned by a context source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalContext {
    #[serde(default)]
    pub context: String,
    #[serde(default = "remote_source")]
    pub source: String,
}

fn remote_source() -> String {
    "remote".to_string()
}

impl ExternalContext {
    /// Placeholder used when no remote source answered.
    pub fn local(query: &str) -> Self {
        Self {
            context: format!("Local context for: {query}"),
            source: "local".to_string(),
        }
    }

    pub fn is_local(&self) -> bool {
        self.source == "local"
    }
}

/// Remote context provider.
pub trait ContextSource: Send + Sync {
    fn fetch(&self, query: &str, context_type: &str) -> Result<ExternalContext, RetrievalError>;
}

#[derive(Serialize)]
struct ContextRequest<'a> {
    query: &'a str,
    context_type: &'a str,
    model: &'a str,
}

/// HTTP context endpoint: `POST {url}/context`.
pub struct HttpContextSource {
    url: String,
    model: String,
    client: reqwest::blocking::Client,
}

impl HttpContextSource {
    pub fn new(url: &str, model: &str) -> Result<Self, RetrievalError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(CONTEXT_TIMEOUT_SECS))
            .build()
            .map_err(|e| RetrievalError::Http(e.to_string()))?;
        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl ContextSource for HttpContextSource {
    fn fetch(&self, query: &str, context_type: &str) -> Result<ExternalContext, RetrievalError> {
        let body = ContextRequest {
            query,
            context_type,
            model: &self.model,
        };

        let response = self
            .client
            .post(format!("{}/context", self.url))
            .json(&body)
            .send()
            .map_err(|e| RetrievalError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RetrievalError::Status(status.as_u16()));
        }

        response
            .json()
            .map_err(|e| RetrievalError::InvalidResponse(e.to_string()))
    }
}
