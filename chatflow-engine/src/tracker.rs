use std::sync::Arc;

use uuid::Uuid;

use chatflow_core::Value;

use crate::model::{ExecutionStatus, GraphExecution, NodeExecutionRecord, NodeRunStatus};
use crate::store::{ExecutionStore, ExecutionUpdate, NodeExecutionUpdate};

/// Records execution and node-execution audit rows. Every write is
/// best-effort: a store failure is logged and swallowed so telemetry can
/// never abort a run.
pub struct ExecutionTracker {
    store: Arc<dyn ExecutionStore>,
}

impl ExecutionTracker {
    pub fn new(store: Arc<dyn ExecutionStore>) -> Self {
        Self { store }
    }

    /// Creates the execution row. The id is generated locally so the run
    /// can proceed even when the store write fails.
    pub async fn start_execution(
        &self,
        chat_id: Option<String>,
        session_id: &str,
        metadata: Value,
    ) -> GraphExecution {
        let execution = GraphExecution::started(chat_id, session_id, metadata);
        if let Err(err) = self.store.create_execution(&execution).await {
            tracing::warn!(execution_id = %execution.id, error = %err, "failed to record execution start");
        } else {
            tracing::info!(execution_id = %execution.id, %session_id, "started graph execution");
        }
        execution
    }

    pub async fn complete_execution(&self, id: Uuid) {
        self.update(
            id,
            ExecutionUpdate {
                status: Some(ExecutionStatus::Completed),
                completed: true,
                ..ExecutionUpdate::default()
            },
        )
        .await;
        tracing::info!(execution_id = %id, "completed graph execution");
    }

    pub async fn fail_execution(&self, id: Uuid, error: &str) {
        self.update(
            id,
            ExecutionUpdate {
                status: Some(ExecutionStatus::Failed),
                error: Some(error.to_string()),
                completed: true,
                ..ExecutionUpdate::default()
            },
        )
        .await;
        tracing::warn!(execution_id = %id, %error, "failed graph execution");
    }

    pub async fn interrupt_execution(&self, id: Uuid) {
        self.update(
            id,
            ExecutionUpdate {
                status: Some(ExecutionStatus::Interrupted),
                ..ExecutionUpdate::default()
            },
        )
        .await;
    }

    pub async fn resume_execution(&self, id: Uuid) {
        self.update(
            id,
            ExecutionUpdate {
                status: Some(ExecutionStatus::Running),
                ..ExecutionUpdate::default()
            },
        )
        .await;
    }

    /// Attaches build-time validation warnings to the execution row.
    pub async fn record_warnings(&self, id: Uuid, warnings: &[String]) {
        if warnings.is_empty() {
            return;
        }
        self.update(
            id,
            ExecutionUpdate {
                metadata: Some(serde_json::json!({ "validation_warnings": warnings })),
                ..ExecutionUpdate::default()
            },
        )
        .await;
    }

    pub async fn node_running(
        &self,
        execution_id: Uuid,
        node_id: &str,
        input: Option<Value>,
    ) -> Option<Uuid> {
        let record = NodeExecutionRecord::running(execution_id, node_id, input);
        match self.store.create_node_execution(&record).await {
            Ok(()) => Some(record.id),
            Err(err) => {
                tracing::warn!(%node_id, error = %err, "failed to record node execution");
                None
            }
        }
    }

    pub async fn node_completed(
        &self,
        record_id: Option<Uuid>,
        output: Option<Value>,
        input_tokens: u64,
        output_tokens: u64,
    ) {
        let Some(id) = record_id else { return };
        let update = NodeExecutionUpdate {
            status: Some(NodeRunStatus::Completed),
            output,
            input_tokens: Some(input_tokens),
            output_tokens: Some(output_tokens),
            completed: true,
            ..NodeExecutionUpdate::default()
        };
        if let Err(err) = self.store.update_node_execution(id, update).await {
            tracing::warn!(record_id = %id, error = %err, "failed to record node completion");
        }
    }

    pub async fn node_failed(&self, record_id: Option<Uuid>, error: &str) {
        let Some(id) = record_id else { return };
        let update = NodeExecutionUpdate {
            status: Some(NodeRunStatus::Failed),
            error: Some(error.to_string()),
            completed: true,
            ..NodeExecutionUpdate::default()
        };
        if let Err(err) = self.store.update_node_execution(id, update).await {
            tracing::warn!(record_id = %id, error = %err, "failed to record node failure");
        }
    }

    pub async fn get_node_executions(&self, execution_id: Uuid) -> Vec<NodeExecutionRecord> {
        match self.store.get_node_executions(execution_id).await {
            Ok(records) => records,
            Err(err) => {
                tracing::warn!(%execution_id, error = %err, "failed to load node executions");
                Vec::new()
            }
        }
    }

    async fn update(&self, id: Uuid, update: ExecutionUpdate) {
        if let Err(err) = self.store.update_execution(id, update).await {
            tracing::warn!(execution_id = %id, error = %err, "failed to update execution");
        }
    }
}
