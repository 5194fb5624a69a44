use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::RetrievalError;

/// One searchable piece of the knowledge base.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KnowledgeChunk {
    /// File stem the chunk came from.
    pub source: String,
    pub text: String,
    /// Share of query terms found in the chunk (0.0–1.0). Zero until searched.
    pub relevance: f32,
}

#[derive(Debug, Default, Deserialize)]
struct KnowledgeFile {
    #[serde(default)]
    regulations: Vec<Regulation>,
    #[serde(default)]
    typologies: Vec<Typology>,
    #[serde(default)]
    high_risk_countries: Vec<Country>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Regulation {
    name: String,
    requirements: Vec<String>,
    risk_indicators: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Typology {
    name: String,
    description: String,
    indicators: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Country {
    name: String,
    risk_level: String,
    risk_factors: Vec<String>,
}

/// Regulations, typologies and high-risk countries loaded from JSON files.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeBase {
    chunks: Vec<KnowledgeChunk>,
}

impl KnowledgeBase {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load every `*.json` file in `dir` (sorted by name).
    ///
    /// A missing directory yields an empty base. Files that fail to parse are
    /// skipped with a warning.
    pub fn load_dir(dir: &Path) -> Result<Self, RetrievalError> {
        if !dir.exists() {
            tracing::debug!(dir = %dir.display(), "Knowledge directory absent, starting empty");
            return Ok(Self::empty());
        }

        let entries = std::fs::read_dir(dir).map_err(|e| RetrievalError::Io {
            path: dir.display().to_string(),
            reason: e.to_string(),
        })?;

        let mut paths: Vec<_> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        let mut base = Self::empty();
        for path in paths {
            let source = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let raw = match std::fs::read_to_string(&path) {
                Ok(raw) => raw,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable knowledge file");
                    continue;
                }
            };
            match base.add_json(&source, &raw) {
                Ok(added) => {
                    tracing::debug!(source = %source, chunks = added, "Knowledge file loaded")
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping malformed knowledge file")
                }
            }
        }

        tracing::info!(dir = %dir.display(), chunks = base.len(), "Knowledge base loaded");
        Ok(base)
    }

    /// Chunk one JSON document. Returns the number of chunks added.
    pub fn add_json(&mut self, source: &str, raw: &str) -> Result<usize, RetrievalError> {
        let file: KnowledgeFile = serde_json::from_str(raw)
            .map_err(|e| RetrievalError::InvalidResponse(format!("{source}: {e}")))?;
        let before = self.chunks.len();

        for reg in file.regulations {
            self.push(
                source,
                format!(
                    "Regulation: {}\nRequirements: {}\nRisk Indicators: {}",
                    reg.name,
                    reg.requirements.join(" "),
                    reg.risk_indicators.join(" ")
                ),
            );
        }
        for typology in file.typologies {
            self.push(
                source,
                format!(
                    "Typology: {}\nDescription: {}\nIndicators: {}",
                    typology.name,
                    typology.description,
                    typology.indicators.join(" ")
                ),
            );
        }
        for country in file.high_risk_countries {
            self.push(
                source,
                format!(
                    "Country: {}\nRisk Level: {}\nRisk Factors: {}",
                    country.name,
                    country.risk_level,
                    country.risk_factors.join(" ")
                ),
            );
        }

        Ok(self.chunks.len() - before)
    }

    fn push(&mut self, source: &str, text: String) {
        self.chunks.push(KnowledgeChunk {
            source: source.to_string(),
            text,
            relevance: 0.0,
        });
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Up to `top_k` chunks sharing terms with `query`, best first.
    pub fn search(&self, query: &str, top_k: usize) -> Vec<KnowledgeChunk> {
        let query_terms = terms(query);
        if query_terms.is_empty() || top_k == 0 {
            return Vec::new();
        }

        let mut scored: Vec<KnowledgeChunk> = self
            .chunks
            .iter()
            .filter_map(|chunk| {
                let chunk_terms = terms(&chunk.text);
                let hits = query_terms.iter().filter(|t| chunk_terms.contains(*t)).count();
                (hits > 0).then(|| KnowledgeChunk {
                    relevance: hits as f32 / query_terms.len() as f32,
                    ..chunk.clone()
                })
            })
            .collect();

        // Stable sort keeps file order among equal scores.
        scored.sort_by(|a, b| b.relevance.total_cmp(&a.relevance));
        scored.truncate(top_k);
        scored
    }
}

/// Lower-cased alphanumeric words of three or more characters.
fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= 3)
        .map(str::to_lowercase)
        .collect()
}
