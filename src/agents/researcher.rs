//! ResearcherAgent - simulated multi-source research
//!
//! Intents:
//! - `research` - parallel lookups across several sources, progress and
//!   results written to the workspace, synthesized summary returned
//! - `search` - quick lookup on a single source
//! - `analyze` - `summary` or `trends` over supplied data

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use serde_json::{json, Map, Value};

use crate::core::{
    AnalysisKind, AnalyzeRequest, Content, MeshError, MeshResult, Message, ResearchRequest,
    SearchRequest,
};
use crate::runtime::{Agent, AgentInternals};

use super::sources::{
    simulate, DataSource, KnowledgeSource, LookupSource, SimulatedLatency, SourceResults,
    WebSource,
};

/// Role string used by the researcher
pub const RESEARCHER_ROLE: &str = "researcher";

/// Workspace key holding research progress for `topic`
pub fn research_status_key(topic: &str) -> String {
    format!("research_status_{}", topic)
}

/// Workspace key holding the final research result for `topic`
pub fn research_results_key(topic: &str) -> String {
    format!("research_results_{}", topic)
}

/// Agent answering research, search and analyze requests
pub struct ResearcherAgent {
    sources: BTreeMap<String, Arc<dyn LookupSource>>,
    latency: SimulatedLatency,
}

impl ResearcherAgent {
    /// Researcher with the built-in sources and realistic delays
    pub fn new() -> Self {
        Self::with_latency(SimulatedLatency::default())
    }

    /// Researcher with the built-in sources and the given delays
    pub fn with_latency(latency: SimulatedLatency) -> Self {
        let mut agent = Self {
            sources: BTreeMap::new(),
            latency,
        };
        agent.register_source(Arc::new(WebSource { latency: latency.web }));
        agent.register_source(Arc::new(KnowledgeSource {
            latency: latency.knowledge,
        }));
        agent.register_source(Arc::new(DataSource { latency: latency.data }));
        agent
    }

    /// Add (or replace) a lookup source
    pub fn with_source(mut self, source: Arc<dyn LookupSource>) -> Self {
        self.register_source(source);
        self
    }

    fn register_source(&mut self, source: Arc<dyn LookupSource>) {
        self.sources.insert(source.name().to_string(), source);
    }

    /// Names of the registered sources
    pub fn source_names(&self) -> Vec<String> {
        self.sources.keys().cloned().collect()
    }

    // =========================================================================
    // research
    // =========================================================================

    async fn research(&self, request: ResearchRequest, internals: &AgentInternals) -> MeshResult<Value> {
        let topic = request.topic.trim().to_string();
        if topic.is_empty() {
            return Err(MeshError::processing("No research topic provided"));
        }

        tracing::info!(topic = %topic, sources = ?request.sources, depth = %request.depth, "Starting research");
        internals.think(format!("Researching {} across {}", topic, request.sources.join(", ")));

        let status_key = research_status_key(&topic);
        internals
            .update_workspace(
                &status_key,
                json!({
                    "status": "in_progress",
                    "topic": topic,
                    "sources": request.sources,
                    "started": Utc::now(),
                }),
            )
            .await?;

        let mut lookups = Vec::new();
        let mut skipped = Vec::new();
        for name in &request.sources {
            match self.sources.get(name) {
                Some(source) => lookups.push((name.clone(), source.clone())),
                None => {
                    tracing::warn!(source = %name, "Skipping unknown research source");
                    skipped.push(name.clone());
                }
            }
        }

        let started = std::time::Instant::now();
        let outcomes = join_all(lookups.iter().map(|(name, source)| {
            let topic = topic.as_str();
            let depth = request.depth.as_str();
            async move { (name.clone(), source.lookup(topic, depth).await) }
        }))
        .await;
        internals.report_performance(json!({
            "operation": "research_lookups",
            "topic": topic,
            "sources": lookups.len(),
            "elapsed_ms": started.elapsed().as_millis() as u64,
        }));

        let mut results: BTreeMap<String, MeshResult<SourceResults>> = BTreeMap::new();
        for (name, outcome) in outcomes {
            if let Err(e) = &outcome {
                tracing::error!(source = %name, error = %e, "Research lookup failed");
            }
            results.insert(name, outcome);
        }

        let synthesis = self.synthesize(&topic, results, skipped).await;

        internals
            .update_workspace(&research_results_key(&topic), synthesis.clone())
            .await?;
        internals
            .update_workspace(
                &status_key,
                json!({
                    "status": "completed",
                    "topic": topic,
                    "sources": request.sources,
                    "finished": Utc::now(),
                }),
            )
            .await?;

        tracing::info!(topic = %topic, "Research completed");
        Ok(synthesis)
    }

    async fn synthesize(
        &self,
        topic: &str,
        results: BTreeMap<String, MeshResult<SourceResults>>,
        skipped: Vec<String>,
    ) -> Value {
        simulate(self.latency.synthesis).await;

        let mut sources_used = Vec::new();
        let mut total_results = 0;
        let mut detailed = Map::new();
        for (name, outcome) in results {
            let detail = match outcome {
                Ok(found) => {
                    sources_used.push(name.clone());
                    total_results += found.results.len();
                    serde_json::to_value(found).unwrap_or(Value::Null)
                }
                Err(e) => json!({ "error": e.to_string() }),
            };
            detailed.insert(name, detail);
        }

        let follow_up = sources_used.first().map(String::as_str).unwrap_or("web");
        json!({
            "topic": topic,
            "summary": format!("Research synthesis for {}", topic),
            "sources_used": sources_used,
            "unknown_sources": skipped,
            "total_results": total_results,
            "detailed_results": detailed,
            "confidence": 0.8,
            "recommendations": [
                format!("Based on research, {} shows promising results", topic),
                format!("Further investigation recommended in {}", follow_up),
            ],
        })
    }

    // =========================================================================
    // search
    // =========================================================================

    async fn search(&self, request: SearchRequest) -> MeshResult<Value> {
        let query = request.query.trim();
        if query.is_empty() {
            return Err(MeshError::processing("No search query provided"));
        }
        let source = self
            .sources
            .get(&request.source)
            .ok_or_else(|| MeshError::UnknownSource(request.source.clone()))?;

        let found = source.lookup(query, "quick").await?;
        Ok(json!({
            "query": query,
            "source": request.source,
            "result": found,
        }))
    }

    // =========================================================================
    // analyze
    // =========================================================================

    async fn analyze(&self, request: AnalyzeRequest) -> MeshResult<Value> {
        if is_blank(&request.data) {
            return Err(MeshError::processing("No data provided for analysis"));
        }

        simulate(self.latency.analysis).await;

        Ok(match request.kind {
            AnalysisKind::Summary => {
                let rendered = match &request.data {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                let head: String = rendered.chars().take(100).collect();
                json!({
                    "summary": format!("Data summary: {}...", head),
                    "type": json_type_name(&request.data),
                    "analysis": "summary_complete",
                })
            }
            AnalysisKind::Trends => json!({
                "trends": ["trend_1", "trend_2"],
                "analysis": "trends_identified",
                "confidence": 0.75,
            }),
        })
    }
}

impl Default for ResearcherAgent {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ResearcherAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResearcherAgent")
            .field("sources", &self.source_names())
            .field("latency", &self.latency)
            .finish()
    }
}

#[async_trait]
impl Agent for ResearcherAgent {
    fn role(&self) -> &str {
        RESEARCHER_ROLE
    }

    async fn process(
        &self,
        message: &Message,
        internals: &AgentInternals,
    ) -> MeshResult<Option<Content>> {
        let result = match message.intent.as_str() {
            "research" => self.research(research_request(&message.content)?, internals).await?,
            "search" => self.search(search_request(&message.content)?).await?,
            "analyze" => self.analyze(analyze_request(&message.content)?).await?,
            other => return Err(MeshError::UnknownIntent(other.to_string())),
        };
        Ok(Some(Content::Result(result)))
    }
}

// ============================================================================
// Request extraction
// ============================================================================

fn research_request(content: &Content) -> MeshResult<ResearchRequest> {
    match content {
        Content::Research(request) => Ok(request.clone()),
        Content::Text(topic) => Ok(ResearchRequest::new(topic.clone())),
        Content::Json(value) => Ok(serde_json::from_value(value.clone())?),
        Content::Empty => Ok(ResearchRequest::new("")),
        other => Err(unexpected_payload("research", other)),
    }
}

fn search_request(content: &Content) -> MeshResult<SearchRequest> {
    match content {
        Content::Search(request) => Ok(request.clone()),
        Content::Text(query) => Ok(SearchRequest::new(query.clone())),
        Content::Json(value) => Ok(serde_json::from_value(value.clone())?),
        Content::Empty => Ok(SearchRequest::new("")),
        other => Err(unexpected_payload("search", other)),
    }
}

fn analyze_request(content: &Content) -> MeshResult<AnalyzeRequest> {
    match content {
        Content::Analyze(request) => Ok(request.clone()),
        Content::Text(text) => Ok(AnalyzeRequest::new(Value::String(text.clone()), AnalysisKind::Summary)),
        Content::Json(value) => {
            let kind = match value.get("type").and_then(Value::as_str).unwrap_or("summary") {
                "summary" => AnalysisKind::Summary,
                "trends" => AnalysisKind::Trends,
                other => {
                    return Err(MeshError::processing(format!("Unknown analysis type: {}", other)))
                }
            };
            let data = value.get("data").cloned().unwrap_or(Value::Null);
            Ok(AnalyzeRequest::new(data, kind))
        }
        Content::Empty => Ok(AnalyzeRequest::new(Value::Null, AnalysisKind::Summary)),
        other => Err(unexpected_payload("analyze", other)),
    }
}

fn unexpected_payload(intent: &str, content: &Content) -> MeshError {
    MeshError::processing(format!(
        "Unsupported payload for {}: {}",
        intent,
        content.preview(60)
    ))
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MessageBus;
    use crate::config::MeshConfig;
    use crate::workspace::Workspace;

    struct BrokenSource;

    #[async_trait]
    impl LookupSource for BrokenSource {
        fn name(&self) -> &str {
            "broken"
        }

        async fn lookup(&self, _q: &str, _d: &str) -> MeshResult<SourceResults> {
            Err(MeshError::processing("index offline"))
        }
    }

    async fn setup() -> (ResearcherAgent, AgentInternals) {
        let config = MeshConfig::default();
        let bus = MessageBus::new(&config);
        bus.start().await;
        let internals = AgentInternals::new("researcher", RESEARCHER_ROLE, bus, Workspace::new(&config));
        (ResearcherAgent::with_latency(SimulatedLatency::none()), internals)
    }

    fn request(intent: &str, content: Content) -> Message {
        Message::new("human", "researcher", "user", intent, content)
    }

    fn result_of(content: Option<Content>) -> Value {
        match content {
            Some(Content::Result(value)) => value,
            other => panic!("expected a result, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_research_writes_workspace() {
        let (agent, internals) = setup().await;
        let message = request(
            "research",
            Content::Research(
                ResearchRequest::new("rust async").with_sources(["web", "knowledge", "data"]),
            ),
        );

        let result = result_of(agent.process(&message, &internals).await.unwrap());
        assert_eq!(result["summary"], "Research synthesis for rust async");
        assert_eq!(result["total_results"], 4);
        assert_eq!(result["sources_used"], json!(["data", "knowledge", "web"]));
        assert_eq!(result["confidence"], 0.8);

        let stored = internals
            .read_workspace("research_results_rust async")
            .await
            .unwrap();
        assert_eq!(stored, result);
        let status = internals
            .read_workspace("research_status_rust async")
            .await
            .unwrap();
        assert_eq!(status["status"], "completed");

        let entry = internals
            .workspace()
            .get_with_metadata("research_status_rust async")
            .await
            .unwrap();
        assert_eq!(entry.metadata.previous_value.unwrap()["status"], "in_progress");
    }

    #[tokio::test]
    async fn test_research_isolates_source_failure() {
        let (agent, internals) = setup().await;
        let agent = agent.with_source(Arc::new(BrokenSource));
        let message = request(
            "research",
            Content::Research(ResearchRequest::new("outage").with_sources(["web", "broken", "nowhere"])),
        );

        let result = result_of(agent.process(&message, &internals).await.unwrap());
        assert_eq!(result["sources_used"], json!(["web"]));
        assert_eq!(result["total_results"], 2);
        assert!(result["detailed_results"]["broken"]["error"]
            .as_str()
            .unwrap()
            .contains("index offline"));
        assert_eq!(result["unknown_sources"], json!(["nowhere"]));
    }

    #[tokio::test]
    async fn test_research_requires_topic() {
        let (agent, internals) = setup().await;
        let err = agent
            .process(&request("research", Content::Empty), &internals)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("No research topic provided"));
    }

    #[tokio::test]
    async fn test_research_from_text() {
        let (agent, internals) = setup().await;
        let result = result_of(
            agent
                .process(&request("research", Content::text("tokio")), &internals)
                .await
                .unwrap(),
        );
        // Default sources are web and knowledge
        assert_eq!(result["total_results"], 3);
    }

    #[tokio::test]
    async fn test_search() {
        let (agent, internals) = setup().await;
        let message = request("search", Content::Search(SearchRequest::new("serde").on("knowledge")));

        let result = result_of(agent.process(&message, &internals).await.unwrap());
        assert_eq!(result["query"], "serde");
        assert_eq!(result["source"], "knowledge");
        assert_eq!(result["result"]["results"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_search_unknown_source() {
        let (agent, internals) = setup().await;
        let message = request("search", Content::Search(SearchRequest::new("x").on("library")));
        assert!(matches!(
            agent.process(&message, &internals).await,
            Err(MeshError::UnknownSource(s)) if s == "library"
        ));

        let empty = request("search", Content::Search(SearchRequest::new("  ")));
        assert!(agent.process(&empty, &internals).await.is_err());
    }

    #[tokio::test]
    async fn test_analyze_summary_and_trends() {
        let (agent, internals) = setup().await;

        let summary = result_of(
            agent
                .process(
                    &request("analyze", Content::Analyze(AnalyzeRequest::new(json!([1, 2, 3]), AnalysisKind::Summary))),
                    &internals,
                )
                .await
                .unwrap(),
        );
        assert_eq!(summary["summary"], "Data summary: [1,2,3]...");
        assert_eq!(summary["type"], "array");
        assert_eq!(summary["analysis"], "summary_complete");

        let trends = result_of(
            agent
                .process(
                    &request("analyze", Content::Json(json!({"data": {"x": 1}, "type": "trends"}))),
                    &internals,
                )
                .await
                .unwrap(),
        );
        assert_eq!(trends["trends"], json!(["trend_1", "trend_2"]));
        assert_eq!(trends["confidence"], 0.75);
    }

    #[tokio::test]
    async fn test_analyze_errors() {
        let (agent, internals) = setup().await;

        let unknown = request("analyze", Content::Json(json!({"data": [1], "type": "forecast"})));
        let err = agent.process(&unknown, &internals).await.unwrap_err();
        assert!(err.to_string().contains("Unknown analysis type: forecast"));

        let missing = request("analyze", Content::Json(json!({"type": "summary"})));
        let err = agent.process(&missing, &internals).await.unwrap_err();
        assert!(err.to_string().contains("No data provided for analysis"));
    }

    #[tokio::test]
    async fn test_unknown_intent() {
        let (agent, internals) = setup().await;
        assert!(matches!(
            agent.process(&request("dance", Content::Empty), &internals).await,
            Err(MeshError::UnknownIntent(i)) if i == "dance"
        ));
    }
}
