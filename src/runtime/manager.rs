//! AgentManager - supervises a set of agent runtimes

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::bus::MessageBus;
use crate::config::RuntimeConfig;
use crate::core::{MeshError, MeshResult};
use crate::monitor::{NoopMonitor, SharedMonitor};
use crate::workspace::Workspace;

use super::agent::Agent;
use super::runtime::{AgentRuntime, RuntimeStatus};

/// Registry of runtimes sharing one bus, workspace and monitor
#[derive(Clone)]
pub struct AgentManager {
    bus: MessageBus,
    workspace: Workspace,
    monitor: SharedMonitor,
    config: RuntimeConfig,
    /// Map of agent_id -> runtime
    runtimes: Arc<RwLock<HashMap<String, AgentRuntime>>>,
    /// Listen loops spawned by `start_all`
    loops: Arc<Mutex<HashMap<String, JoinHandle<()>>>>,
}

impl AgentManager {
    pub fn new(bus: MessageBus, workspace: Workspace, config: &RuntimeConfig) -> Self {
        Self {
            bus,
            workspace,
            monitor: Arc::new(NoopMonitor),
            config: config.clone(),
            runtimes: Arc::new(RwLock::new(HashMap::new())),
            loops: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Monitor handed to every runtime on initialize
    pub fn with_monitor(mut self, monitor: SharedMonitor) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Register an agent under `agent_id`
    pub async fn add(&self, agent_id: &str, agent: Arc<dyn Agent>) -> MeshResult<AgentRuntime> {
        let mut runtimes = self.runtimes.write().await;
        if runtimes.contains_key(agent_id) {
            return Err(MeshError::AgentAlreadyRegistered(agent_id.to_string()));
        }
        let runtime = AgentRuntime::new(agent_id, agent, &self.config);
        runtimes.insert(agent_id.to_string(), runtime.clone());
        tracing::info!(agent_id = %agent_id, role = %runtime.role(), "Agent registered");
        Ok(runtime)
    }

    /// Get a registered runtime
    pub async fn get(&self, agent_id: &str) -> Option<AgentRuntime> {
        self.runtimes.read().await.get(agent_id).cloned()
    }

    /// Ids of every registered agent, sorted
    pub async fn list(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.runtimes.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Stop (if needed) and unregister an agent
    pub async fn remove(&self, agent_id: &str) -> MeshResult<AgentRuntime> {
        let runtime = self
            .runtimes
            .write()
            .await
            .remove(agent_id)
            .ok_or_else(|| MeshError::AgentNotFound(agent_id.to_string()))?;

        if runtime.status().await.is_running() {
            runtime.stop().await?;
        }
        if let Some(handle) = self.loops.lock().await.remove(agent_id) {
            if let Err(e) = handle.await {
                tracing::error!(agent_id = %agent_id, error = %e, "Listen loop panicked");
            }
        }
        tracing::info!(agent_id = %agent_id, "Agent removed");
        Ok(runtime)
    }

    async fn all(&self) -> Vec<AgentRuntime> {
        self.runtimes.read().await.values().cloned().collect()
    }

    /// Bind every runtime to the shared bus, workspace and monitor
    pub async fn initialize_all(&self) -> Vec<(String, MeshResult<()>)> {
        let mut results = Vec::new();
        for runtime in self.all().await {
            let result = runtime
                .initialize(self.bus.clone(), self.workspace.clone(), self.monitor.clone())
                .await;
            results.push((runtime.agent_id().to_string(), result));
        }
        results
    }

    /// Spawn one listen loop per runtime
    pub async fn start_all(&self) -> Vec<(String, MeshResult<()>)> {
        let mut results = Vec::new();
        for runtime in self.all().await {
            let agent_id = runtime.agent_id().to_string();
            let result = match runtime.start().await {
                Ok(handle) => {
                    self.loops.lock().await.insert(agent_id.clone(), handle);
                    Ok(())
                }
                Err(e) => {
                    tracing::error!(agent_id = %agent_id, error = %e, "Failed to start agent");
                    Err(e)
                }
            };
            results.push((agent_id, result));
        }
        results
    }

    /// Stop every runtime concurrently, then wait for their listen loops
    ///
    /// One runtime failing to stop does not hold up the others.
    pub async fn stop_all(&self) -> Vec<(String, MeshResult<()>)> {
        let runtimes = self.all().await;
        let results = join_all(runtimes.iter().map(|runtime| async move {
            let result = runtime.stop().await;
            if let Err(e) = &result {
                tracing::error!(agent_id = %runtime.agent_id(), error = %e, "Failed to stop agent");
            }
            (runtime.agent_id().to_string(), result)
        }))
        .await;

        let loops: Vec<(String, JoinHandle<()>)> = self.loops.lock().await.drain().collect();
        for (agent_id, handle) in loops {
            if let Err(e) = handle.await {
                tracing::error!(agent_id = %agent_id, error = %e, "Listen loop panicked");
            }
        }

        results
    }

    /// Status snapshot of every runtime, keyed by agent id
    pub async fn status(&self) -> BTreeMap<String, RuntimeStatus> {
        let mut statuses = BTreeMap::new();
        for runtime in self.all().await {
            statuses.insert(runtime.agent_id().to_string(), runtime.status_snapshot().await);
        }
        statuses
    }
}

impl std::fmt::Debug for AgentManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentManager").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MeshConfig;
    use crate::core::{AgentStatus, Content, Message, BROADCAST};
    use crate::runtime::AgentInternals;
    use async_trait::async_trait;
    use std::time::Duration;

    struct NamedAgent(&'static str);

    #[async_trait]
    impl Agent for NamedAgent {
        fn role(&self) -> &str {
            self.0
        }

        async fn process(&self, _m: &Message, _i: &AgentInternals) -> MeshResult<Option<Content>> {
            Ok(Some(Content::text(self.0)))
        }
    }

    async fn manager() -> AgentManager {
        let config = MeshConfig::default();
        let bus = MessageBus::new(&config);
        bus.start().await;
        let runtime_config = RuntimeConfig::default().with_poll_interval(Duration::from_millis(5));
        AgentManager::new(bus, Workspace::new(&config), &runtime_config)
    }

    #[tokio::test]
    async fn test_duplicate_registration() {
        let manager = manager().await;
        manager.add("a", Arc::new(NamedAgent("alpha"))).await.unwrap();
        assert!(matches!(
            manager.add("a", Arc::new(NamedAgent("beta"))).await,
            Err(MeshError::AgentAlreadyRegistered(_))
        ));
        assert_eq!(manager.list().await, vec!["a"]);
    }

    #[tokio::test]
    async fn test_lifecycle_all() {
        let manager = manager().await;
        manager.add("a", Arc::new(NamedAgent("alpha"))).await.unwrap();
        manager.add("b", Arc::new(NamedAgent("beta"))).await.unwrap();

        assert!(manager.initialize_all().await.iter().all(|(_, r)| r.is_ok()));
        assert!(manager.start_all().await.iter().all(|(_, r)| r.is_ok()));

        let statuses = manager.status().await;
        assert_eq!(statuses.len(), 2);
        assert!(statuses.values().all(|s| s.status.is_running()));
        assert_eq!(statuses["b"].role, "beta");

        // Both agents were registered on initialize, so both get the broadcast
        manager
            .bus()
            .send(Message::new("human", BROADCAST, "user", "hello", Content::Empty))
            .await
            .unwrap();

        let replies = tokio::time::timeout(Duration::from_secs(2), async {
            let mut replies = Vec::new();
            while replies.len() < 2 {
                replies.extend(manager.bus().drain("human").await.unwrap());
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            replies
        })
        .await
        .unwrap();
        let mut senders: Vec<String> = replies.into_iter().map(|m| m.sender).collect();
        senders.sort();
        assert_eq!(senders, vec!["a", "b"]);

        let stopped = manager.stop_all().await;
        assert_eq!(stopped.len(), 2);
        assert!(stopped.iter().all(|(_, r)| r.is_ok()));
        assert!(manager
            .status()
            .await
            .values()
            .all(|s| s.status == AgentStatus::Stopped));
    }

    #[tokio::test]
    async fn test_stop_all_includes_idle_agents() {
        let manager = manager().await;
        manager.add("ok", Arc::new(NamedAgent("fine"))).await.unwrap();
        manager.add("never", Arc::new(NamedAgent("idle"))).await.unwrap();

        manager.initialize_all().await;
        let ok = manager.get("ok").await.unwrap();
        let handle = ok.start().await.unwrap();

        let results: BTreeMap<String, MeshResult<()>> = manager.stop_all().await.into_iter().collect();
        assert!(results["ok"].is_ok());
        assert!(results["never"].is_ok());
        handle.await.unwrap();

        assert_eq!(ok.status().await, AgentStatus::Stopped);
    }

    #[tokio::test]
    async fn test_remove() {
        let manager = manager().await;
        manager.add("a", Arc::new(NamedAgent("alpha"))).await.unwrap();
        manager.initialize_all().await;
        manager.start_all().await;

        let removed = manager.remove("a").await.unwrap();
        assert_eq!(removed.status().await, AgentStatus::Stopped);
        assert!(manager.get("a").await.is_none());
        assert!(matches!(
            manager.remove("a").await,
            Err(MeshError::AgentNotFound(_))
        ));
    }
}
