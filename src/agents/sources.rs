//! Lookup sources consulted by the researcher
//!
//! Each source implements [`LookupSource`]. The built-in sources simulate
//! network or database latency and return canned results.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::core::MeshResult;

/// Results returned by one source for one query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceResults {
    pub source: String,
    pub query: String,
    pub results: Vec<Value>,
}

/// A searchable source of information
#[async_trait]
pub trait LookupSource: Send + Sync {
    /// Name used in requests ("web", "knowledge", ...)
    fn name(&self) -> &str;

    /// Run `query`; `depth` is a hint ("quick", "medium", "deep")
    async fn lookup(&self, query: &str, depth: &str) -> MeshResult<SourceResults>;
}

/// Simulated delay of each step of a research run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulatedLatency {
    pub web: Duration,
    pub knowledge: Duration,
    pub data: Duration,
    /// Combining the per-source results
    pub synthesis: Duration,
    /// Running an `analyze` request
    pub analysis: Duration,
}

impl SimulatedLatency {
    /// No delays, for tests
    pub fn none() -> Self {
        Self {
            web: Duration::ZERO,
            knowledge: Duration::ZERO,
            data: Duration::ZERO,
            synthesis: Duration::ZERO,
            analysis: Duration::ZERO,
        }
    }
}

impl Default for SimulatedLatency {
    fn default() -> Self {
        Self {
            web: Duration::from_millis(1000),
            knowledge: Duration::from_millis(500),
            data: Duration::from_millis(300),
            synthesis: Duration::from_millis(500),
            analysis: Duration::from_millis(700),
        }
    }
}

pub(crate) async fn simulate(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

/// Simulated web search engine
#[derive(Debug, Clone)]
pub struct WebSource {
    pub latency: Duration,
}

#[async_trait]
impl LookupSource for WebSource {
    fn name(&self) -> &str {
        "web"
    }

    async fn lookup(&self, query: &str, _depth: &str) -> MeshResult<SourceResults> {
        simulate(self.latency).await;
        Ok(SourceResults {
            source: self.name().to_string(),
            query: query.to_string(),
            results: vec![
                json!({
                    "title": format!("Search Result 1 for {}", query),
                    "url": "https://example.com/1",
                    "snippet": format!("This is a search result about {}...", query),
                    "relevance": 0.9,
                }),
                json!({
                    "title": format!("Search Result 2 for {}", query),
                    "url": "https://example.com/2",
                    "snippet": format!("Another relevant result for {}...", query),
                    "relevance": 0.8,
                }),
            ],
        })
    }
}

/// Simulated internal knowledge base
#[derive(Debug, Clone)]
pub struct KnowledgeSource {
    pub latency: Duration,
}

#[async_trait]
impl LookupSource for KnowledgeSource {
    fn name(&self) -> &str {
        "knowledge"
    }

    async fn lookup(&self, query: &str, _depth: &str) -> MeshResult<SourceResults> {
        simulate(self.latency).await;
        Ok(SourceResults {
            source: self.name().to_string(),
            query: query.to_string(),
            results: vec![json!({
                "topic": query,
                "summary": format!("Knowledge base information about {}", query),
                "confidence": 0.85,
                "sources": ["internal_kb", "previous_research"],
            })],
        })
    }
}

/// Simulated structured data store
#[derive(Debug, Clone)]
pub struct DataSource {
    pub latency: Duration,
}

#[async_trait]
impl LookupSource for DataSource {
    fn name(&self) -> &str {
        "data"
    }

    async fn lookup(&self, query: &str, _depth: &str) -> MeshResult<SourceResults> {
        simulate(self.latency).await;
        Ok(SourceResults {
            source: self.name().to_string(),
            query: query.to_string(),
            results: vec![json!({
                "dataset": "research_data",
                "matches": 5,
                "relevance": 0.7,
                "sample": format!("Data sample related to {}", query),
            })],
        })
    }
}
