//! AgentRuntime - Drives one agent's lifecycle
//!
//! The `AgentRuntime` is responsible for:
//! - Binding the agent to the bus and workspace (`initialize`)
//! - Polling the bus for the agent's identity and handling each drained
//!   message in its own tracked task
//! - Sending responses (or error results) back to senders
//! - Mirroring every status transition into the workspace and the monitor
//! - Stopping without cancelling in-flight handlers

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::join_all;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::bus::MessageBus;
use crate::config::RuntimeConfig;
use crate::core::{AgentStatus, Content, MeshError, MeshResult, Message, RESPONSE_INTENT};
use crate::monitor::SharedMonitor;
use crate::workspace::Workspace;

use super::agent::Agent;
use super::internals::AgentInternals;

/// Serializable status snapshot of one runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeStatus {
    pub agent_id: String,
    pub role: String,
    pub status: AgentStatus,
    /// Handlers currently running
    pub active_tasks: usize,
}

struct RuntimeInner {
    agent_id: String,
    agent: Arc<dyn Agent>,
    config: RuntimeConfig,
    status: RwLock<AgentStatus>,
    internals: RwLock<Option<AgentInternals>>,
    tasks: TaskTracker,
    /// Cancelled by `stop`; replaced on every start
    run: RwLock<CancellationToken>,
    /// Held while draining and spawning so `stop` never races a new batch
    gate: Mutex<()>,
}

/// Runtime for one agent
///
/// Cheap to clone; clones share status and tasks.
#[derive(Clone)]
pub struct AgentRuntime {
    inner: Arc<RuntimeInner>,
}

impl AgentRuntime {
    /// Create an idle runtime; call [`initialize`](Self::initialize) before starting
    pub fn new(agent_id: impl Into<String>, agent: Arc<dyn Agent>, config: &RuntimeConfig) -> Self {
        Self {
            inner: Arc::new(RuntimeInner {
                agent_id: agent_id.into(),
                agent,
                config: config.clone(),
                status: RwLock::new(AgentStatus::Idle),
                internals: RwLock::new(None),
                tasks: TaskTracker::new(),
                run: RwLock::new(CancellationToken::new()),
                gate: Mutex::new(()),
            }),
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.inner.agent_id
    }

    pub fn role(&self) -> &str {
        self.inner.agent.role()
    }

    /// Current status
    pub async fn status(&self) -> AgentStatus {
        *self.inner.status.read().await
    }

    /// Status snapshot
    pub async fn status_snapshot(&self) -> RuntimeStatus {
        RuntimeStatus {
            agent_id: self.inner.agent_id.clone(),
            role: self.role().to_string(),
            status: self.status().await,
            active_tasks: self.inner.tasks.len(),
        }
    }

    /// The bound collaborators, if initialized
    pub async fn internals(&self) -> Option<AgentInternals> {
        self.inner.internals.read().await.clone()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Bind the bus, workspace and monitor
    ///
    /// A stopped runtime returns to `idle` here and may be started again.
    pub async fn initialize(
        &self,
        bus: MessageBus,
        workspace: Workspace,
        monitor: SharedMonitor,
    ) -> MeshResult<()> {
        let mut status = self.inner.status.write().await;
        match *status {
            AgentStatus::Idle => {}
            AgentStatus::Stopped => *status = status.transition(AgentStatus::Idle)?,
            _ => return Err(MeshError::AgentAlreadyRunning(self.inner.agent_id.clone())),
        }

        bus.register(&self.inner.agent_id).await;
        let internals = AgentInternals::new(&self.inner.agent_id, self.role(), bus, workspace)
            .with_monitor(monitor);
        *self.inner.internals.write().await = Some(internals.clone());

        internals.report_status(AgentStatus::Idle, None).await;
        drop(status);
        tracing::info!(agent_id = %self.inner.agent_id, role = %self.role(), "Agent initialized");
        Ok(())
    }

    /// Switch to `listening` and spawn the listen loop
    pub async fn start(&self) -> MeshResult<JoinHandle<()>> {
        let (internals, run) = self.begin_listening().await?;
        let runtime = self.clone();
        Ok(tokio::spawn(async move {
            runtime.listen_loop(internals, run).await;
        }))
    }

    /// Switch to `listening` and run the listen loop on the current task
    ///
    /// Returns once the runtime has been stopped.
    pub async fn listen(&self) -> MeshResult<()> {
        let (internals, run) = self.begin_listening().await?;
        self.listen_loop(internals, run).await;
        Ok(())
    }

    async fn begin_listening(&self) -> MeshResult<(AgentInternals, CancellationToken)> {
        let internals = self
            .internals()
            .await
            .ok_or_else(|| MeshError::NotInitialized(self.inner.agent_id.clone()))?;

        let mut status = self.inner.status.write().await;
        if status.is_running() {
            return Err(MeshError::AgentAlreadyRunning(self.inner.agent_id.clone()));
        }
        *status = status.transition(AgentStatus::Listening)?;
        let run = CancellationToken::new();
        *self.inner.run.write().await = run.clone();
        internals.report_status(AgentStatus::Listening, None).await;
        Ok((internals, run))
    }

    /// Stop listening and wait for every in-flight handler to finish
    ///
    /// The current listen loop is cancelled here and never touches the status
    /// again, even if its task is still winding down when the runtime restarts.
    pub async fn stop(&self) -> MeshResult<()> {
        {
            let mut status = self.inner.status.write().await;
            if status.is_terminal() {
                return Ok(());
            }
            *status = status.transition(AgentStatus::Stopping)?;
            self.inner.run.read().await.cancel();
            self.mirror_status(AgentStatus::Stopping, None).await;
        }
        tracing::info!(agent_id = %self.inner.agent_id, active_tasks = self.inner.tasks.len(), "Agent stopping");

        {
            let _gate = self.inner.gate.lock().await;
            self.inner.tasks.close();
            self.inner.tasks.wait().await;
            self.inner.tasks.reopen();
        }

        self.set_status(AgentStatus::Stopped, None).await?;
        tracing::info!(agent_id = %self.inner.agent_id, "Agent stopped");
        Ok(())
    }

    // =========================================================================
    // Status transitions
    // =========================================================================

    // Mirroring happens under the status lock so the recorded sequence matches
    // the order transitions were applied in.

    async fn set_status(&self, next: AgentStatus, detail: Option<String>) -> MeshResult<()> {
        let mut status = self.inner.status.write().await;
        *status = status.transition(next)?;
        self.mirror_status(next, detail).await;
        Ok(())
    }

    /// Move `from -> to` only if the runtime is still in `from` and `run` is live
    async fn transition_if(
        &self,
        run: &CancellationToken,
        from: AgentStatus,
        to: AgentStatus,
        detail: Option<String>,
    ) -> bool {
        let mut status = self.inner.status.write().await;
        if run.is_cancelled() || *status != from || !status.can_transition_to(to) {
            return false;
        }
        *status = to;
        self.mirror_status(to, detail).await;
        true
    }

    async fn mirror_status(&self, status: AgentStatus, detail: Option<String>) {
        if let Some(internals) = self.internals().await {
            internals.report_status(status, detail).await;
        }
    }

    // =========================================================================
    // Listen loop
    // =========================================================================

    async fn listen_loop(&self, internals: AgentInternals, run: CancellationToken) {
        let agent_id = self.inner.agent_id.clone();
        tracing::info!(agent_id = %agent_id, "Agent listening");

        loop {
            let batch = {
                let _gate = self.inner.gate.lock().await;
                if run.is_cancelled() || self.status().await != AgentStatus::Listening {
                    break;
                }

                match internals.bus().drain(&agent_id).await {
                    Ok(messages) if messages.is_empty() => None,
                    Ok(messages) => {
                        self.transition_if(
                            &run,
                            AgentStatus::Listening,
                            AgentStatus::Processing,
                            Some(format!("{} message(s)", messages.len())),
                        )
                        .await;
                        let handles: Vec<_> = messages
                            .into_iter()
                            .map(|message| {
                                self.inner.tasks.spawn(handle_message(
                                    self.inner.agent.clone(),
                                    internals.clone(),
                                    message,
                                ))
                            })
                            .collect();
                        Some(handles)
                    }
                    Err(e) => {
                        tracing::error!(agent_id = %agent_id, error = %e, "Failed to drain messages");
                        internals.report_error(e.to_string());
                        self.transition_if(
                            &run,
                            AgentStatus::Listening,
                            AgentStatus::Error,
                            Some(e.to_string()),
                        )
                        .await;
                        None
                    }
                }
            };

            if let Some(handles) = batch {
                for joined in join_all(handles).await {
                    if let Err(e) = joined {
                        tracing::error!(agent_id = %agent_id, error = %e, "Message handler task failed");
                    }
                }
                self.transition_if(&run, AgentStatus::Processing, AgentStatus::Listening, None)
                    .await;
            }

            let backing_off = self.status().await == AgentStatus::Error;
            let delay = if backing_off {
                self.inner.config.error_backoff()
            } else {
                self.inner.config.poll_interval()
            };
            tokio::select! {
                _ = run.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
            if backing_off {
                self.transition_if(&run, AgentStatus::Error, AgentStatus::Listening, None)
                    .await;
            }
        }

        tracing::debug!(agent_id = %agent_id, "Listen loop exited");
    }
}

/// Handle one message; never fails
async fn handle_message(agent: Arc<dyn Agent>, internals: AgentInternals, message: Message) {
    let message_id = message.id_str().to_string();
    internals.report_incoming(&message);
    internals.report_task(&message_id, "started", json!({ "intent": message.intent }));

    let outcome = AssertUnwindSafe(agent.process(&message, &internals))
        .catch_unwind()
        .await
        .unwrap_or_else(|_| Err(MeshError::processing("message handler panicked")));

    // Responses are never answered, so two agents cannot bounce replies forever
    let answerable = message.intent != RESPONSE_INTENT;

    let reply = match outcome {
        Ok(Some(content)) if !content.is_empty() => {
            internals.report_task(&message_id, "completed", json!({ "response": true }));
            Some(content)
        }
        Ok(_) => {
            internals.report_task(&message_id, "completed", json!({ "response": false }));
            None
        }
        Err(e) => {
            tracing::error!(
                agent_id = %internals.agent_id(),
                message_id = %message_id,
                intent = %message.intent,
                error = %e,
                "Message processing failed"
            );
            internals.report_error(e.to_string());
            internals.report_task(&message_id, "failed", json!({ "error": e.to_string() }));
            Some(Content::error(&e))
        }
    };

    if let Some(content) = reply {
        if !answerable {
            tracing::debug!(message_id = %message_id, "Not replying to a response");
            return;
        }
        if let Err(e) = internals.reply(&message, content).await {
            tracing::warn!(agent_id = %internals.agent_id(), message_id = %message_id, error = %e, "Failed to send response");
        }
    }
}

impl std::fmt::Debug for AgentRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRuntime")
            .field("agent_id", &self.inner.agent_id)
            .finish()
    }
}
