use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use chatflow_core::{ChatModel, LlmParams, Message, Tool, Value};
use chatflow_graph::{
    ExecutionConfig, GraphContext, GraphInterrupt, GraphState, RunOutcome,
};

use crate::builder::DynamicGraphBuilder;
use crate::cache::GraphCache;
use crate::error::EngineError;
use crate::handlers::{HandlerDeps, HandlerRegistry};
use crate::model::NodeExecutionRecord;
use crate::state::{ChatState, StateManager};
use crate::store::{ExecutionStore, GraphStore, HistoryStore};
use crate::tracker::ExecutionTracker;

#[derive(Clone, Debug)]
pub struct EngineOptions {
    /// Attempts per user request, covering build failures and run timeouts.
    pub max_retries: usize,
    /// Wall-clock budget for one graph run.
    pub run_timeout: Duration,
    /// Step ceiling for one graph run.
    pub recursion_limit: usize,
    /// Base delay between retries after a build failure; grows linearly
    /// with the attempt number.
    pub build_retry_delay: Duration,
    /// Flat delay between retries after a run timeout.
    pub timeout_retry_delay: Duration,
    /// Parameter baseline merged under each LLM node's own configuration.
    pub llm_defaults: LlmParams,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            run_timeout: Duration::from_secs(300),
            recursion_limit: 100,
            build_retry_delay: Duration::from_secs(1),
            timeout_retry_delay: Duration::from_secs(5),
            llm_defaults: LlmParams::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    Failed,
    Interrupted,
}

/// Outcome of one `execute_graph` or `resume_graph` call.
pub struct ExecutionResult {
    pub execution_id: Uuid,
    /// Assistant and tool messages produced by the run.
    pub messages: Vec<Message>,
    pub node_executions: Vec<NodeExecutionRecord>,
    pub status: RunStatus,
    pub error: Option<String>,
    /// Attempts consumed, including the successful one.
    pub attempts: usize,
    /// Present only when the run paused for external input.
    pub pending: Option<PendingInterrupt>,
}

/// A paused run waiting for an external answer. Feed it back through
/// `ExecutionEngine::resume_graph` to continue from the interrupting node.
pub struct PendingInterrupt {
    graph_name: String,
    interrupt: GraphInterrupt<ChatState>,
}

impl PendingInterrupt {
    pub fn node_id(&self) -> &str {
        &self.interrupt.node
    }

    pub fn payload(&self) -> &Value {
        &self.interrupt.payload
    }

    pub fn execution_id(&self) -> Uuid {
        self.interrupt.state.data.execution_id
    }
}

/// Front door of the crate: loads the stored workflow definition, compiles
/// it (through the cache), runs it against the session history, and records
/// the audit trail.
pub struct ExecutionEngine {
    builder: DynamicGraphBuilder,
    state: StateManager,
    tracker: Arc<ExecutionTracker>,
    cache: Arc<GraphCache>,
    options: EngineOptions,
}

impl ExecutionEngine {
    pub fn new(
        graph_store: Arc<dyn GraphStore>,
        history_store: Arc<dyn HistoryStore>,
        execution_store: Arc<dyn ExecutionStore>,
        llm: Arc<dyn ChatModel>,
        tools: Vec<Arc<dyn Tool>>,
        options: EngineOptions,
    ) -> Self {
        let tracker = Arc::new(ExecutionTracker::new(execution_store));
        let deps = HandlerDeps::new(
            Arc::clone(&graph_store),
            tools,
            Arc::clone(&tracker),
            llm,
            options.llm_defaults.clone(),
        );
        let registry = Arc::new(HandlerRegistry::new(deps));
        let cache = Arc::new(GraphCache::default());
        Self {
            builder: DynamicGraphBuilder::new(graph_store, registry, Arc::clone(&cache)),
            state: StateManager::new(history_store),
            tracker,
            cache,
            options,
        }
    }

    /// Compiled-graph cache, exposed for invalidation when the stored
    /// definition changes out of band.
    pub fn cache(&self) -> &GraphCache {
        &self.cache
    }

    /// Runs one user message through the stored workflow. Build failures
    /// and run timeouts are retried up to `max_retries`; node failures are
    /// not, since repeating them would repeat their side effects.
    pub async fn execute_graph(
        &self,
        chat_id: Option<String>,
        session_id: &str,
        input_message: &str,
        graph_name: &str,
    ) -> ExecutionResult {
        let execution = self
            .tracker
            .start_execution(
                chat_id.clone(),
                session_id,
                serde_json::json!({ "graph": graph_name }),
            )
            .await;
        let execution_id = execution.id;

        let mut attempt = 0usize;
        let mut last_error: Option<EngineError> = None;
        while attempt < self.options.max_retries {
            attempt += 1;

            let flow = match self.builder.build(graph_name).await {
                Ok(flow) => flow,
                Err(err) => {
                    tracing::warn!(%graph_name, attempt, error = %err, "graph build failed");
                    let retryable = err.is_retryable();
                    last_error = Some(err);
                    if !retryable {
                        break;
                    }
                    if attempt < self.options.max_retries {
                        tokio::time::sleep(self.options.build_retry_delay * attempt as u32).await;
                    }
                    continue;
                }
            };
            self.tracker
                .record_warnings(execution_id, &flow.warnings)
                .await;

            let initial = match self
                .state
                .create_initial_state(input_message, execution_id, session_id, chat_id.clone())
                .await
            {
                Ok(state) => state,
                Err(err) => {
                    tracing::warn!(%session_id, attempt, error = %err, "failed to load session state");
                    last_error = Some(err);
                    if attempt < self.options.max_retries {
                        tokio::time::sleep(self.options.build_retry_delay * attempt as u32).await;
                    }
                    continue;
                }
            };

            let config = ExecutionConfig::with_max_steps(self.options.recursion_limit);
            let context = GraphContext::new(session_id);
            let run = tokio::time::timeout(
                self.options.run_timeout,
                flow.graph.invoke(GraphState::new(initial), &config, &context),
            )
            .await;

            match run {
                Err(_) => {
                    tracing::warn!(%execution_id, attempt, "graph run timed out");
                    last_error = Some(EngineError::RunTimeout(self.options.run_timeout));
                    if attempt < self.options.max_retries {
                        tokio::time::sleep(self.options.timeout_retry_delay).await;
                    }
                }
                Ok(Err(err)) => {
                    last_error = Some(EngineError::Graph(err));
                    break;
                }
                Ok(Ok(RunOutcome::Complete(state))) => {
                    return self.finish(execution_id, state.data, attempt).await;
                }
                Ok(Ok(RunOutcome::Interrupted(interrupt))) => {
                    return self
                        .pause(execution_id, graph_name, interrupt, attempt)
                        .await;
                }
            }
        }

        let error = last_error
            .map(|err| err.to_string())
            .unwrap_or_else(|| "graph execution failed".to_string());
        self.tracker.fail_execution(execution_id, &error).await;
        ExecutionResult {
            execution_id,
            messages: Vec::new(),
            node_executions: self.tracker.get_node_executions(execution_id).await,
            status: RunStatus::Failed,
            error: Some(error),
            attempts: attempt,
            pending: None,
        }
    }

    /// Continues a paused run with the external answer. Uses the cached
    /// compiled graph; the run re-enters the node that interrupted.
    pub async fn resume_graph(&self, pending: PendingInterrupt, answer: Value) -> ExecutionResult {
        let execution_id = pending.execution_id();
        let session_id = pending.interrupt.state.data.session_id.clone();

        let flow = match self.builder.build(&pending.graph_name).await {
            Ok(flow) => flow,
            Err(err) => {
                let error = err.to_string();
                self.tracker.fail_execution(execution_id, &error).await;
                return ExecutionResult {
                    execution_id,
                    messages: Vec::new(),
                    node_executions: self.tracker.get_node_executions(execution_id).await,
                    status: RunStatus::Failed,
                    error: Some(error),
                    attempts: 1,
                    pending: None,
                };
            }
        };

        self.tracker.resume_execution(execution_id).await;
        let config = ExecutionConfig::with_max_steps(self.options.recursion_limit);
        let context = GraphContext::new(&session_id);
        let run = tokio::time::timeout(
            self.options.run_timeout,
            flow.graph
                .resume(pending.interrupt, answer, &config, &context),
        )
        .await;

        match run {
            Ok(Ok(RunOutcome::Complete(state))) => self.finish(execution_id, state.data, 1).await,
            Ok(Ok(RunOutcome::Interrupted(interrupt))) => {
                self.pause(execution_id, &pending.graph_name, interrupt, 1)
                    .await
            }
            Ok(Err(err)) => {
                let error = EngineError::Graph(err).to_string();
                self.tracker.fail_execution(execution_id, &error).await;
                ExecutionResult {
                    execution_id,
                    messages: Vec::new(),
                    node_executions: self.tracker.get_node_executions(execution_id).await,
                    status: RunStatus::Failed,
                    error: Some(error),
                    attempts: 1,
                    pending: None,
                }
            }
            Err(_) => {
                let error = EngineError::RunTimeout(self.options.run_timeout).to_string();
                self.tracker.fail_execution(execution_id, &error).await;
                ExecutionResult {
                    execution_id,
                    messages: Vec::new(),
                    node_executions: self.tracker.get_node_executions(execution_id).await,
                    status: RunStatus::Failed,
                    error: Some(error),
                    attempts: 1,
                    pending: None,
                }
            }
        }
    }

    async fn finish(
        &self,
        execution_id: Uuid,
        state: ChatState,
        attempts: usize,
    ) -> ExecutionResult {
        if let Err(err) = self.state.save_history(&state).await {
            tracing::warn!(%execution_id, error = %err, "failed to persist conversation history");
        }
        let messages = self.state.result_messages(&state);
        let node_executions = self.tracker.get_node_executions(execution_id).await;

        // A node may record a failure in state and let the graph finish
        // gracefully; that still counts as a failed execution.
        if let Some(error) = state.error_message {
            self.tracker.fail_execution(execution_id, &error).await;
            return ExecutionResult {
                execution_id,
                messages,
                node_executions,
                status: RunStatus::Failed,
                error: Some(error),
                attempts,
                pending: None,
            };
        }

        self.tracker.complete_execution(execution_id).await;
        ExecutionResult {
            execution_id,
            messages,
            node_executions,
            status: RunStatus::Completed,
            error: None,
            attempts,
            pending: None,
        }
    }

    async fn pause(
        &self,
        execution_id: Uuid,
        graph_name: &str,
        interrupt: GraphInterrupt<ChatState>,
        attempts: usize,
    ) -> ExecutionResult {
        self.tracker.interrupt_execution(execution_id).await;
        let messages = self.state.result_messages(&interrupt.state.data);
        ExecutionResult {
            execution_id,
            messages,
            node_executions: self.tracker.get_node_executions(execution_id).await,
            status: RunStatus::Interrupted,
            error: None,
            attempts,
            pending: Some(PendingInterrupt {
                graph_name: graph_name.to_string(),
                interrupt,
            }),
        }
    }
}
