use std::sync::Arc;

use serde::Serialize;

use crate::db::DatabaseProxy;
use crate::engine::persistence::ProgressPersistence;
use crate::engine::store::{ProgressStore, SequentialAdvance};
use crate::engine::types::{
    CompletionPolicy, GateDecision, ItemAccess, ProgressRecord, MODULE_CATALOG,
};
use crate::engine::{aggregate, gate, sequential};

/// Dashboard summary derived from the learner's completed-module set.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSummary {
    pub completed_modules: Vec<String>,
    pub percent_complete: u8,
    pub active_module_count: usize,
    pub current_module_index: usize,
}

/// Full per-module state for the module detail view.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleView {
    pub module_id: String,
    pub policy: CompletionPolicy,
    pub completed: bool,
    pub expanded_items: Vec<i64>,
    pub last_completed_index: i64,
    pub all_items_touched: bool,
    pub items: Vec<ItemAccess>,
}

/// The module progress and gating engine. Holds the per-session progress
/// store; runs with or without a database attached (memory-only when none).
pub struct ProgressEngine {
    store: ProgressStore,
}

impl ProgressEngine {
    pub fn new(db_proxy: Option<Arc<DatabaseProxy>>) -> Self {
        let persistence = db_proxy.map(|proxy| Arc::new(ProgressPersistence::new(proxy)));
        Self {
            store: ProgressStore::new(persistence),
        }
    }

    pub fn store(&self) -> &ProgressStore {
        &self.store
    }

    pub async fn summary(&self, user_id: &str) -> ProgressSummary {
        self.store.load(user_id).await;
        let completed = self.store.completed_modules(user_id).await;

        ProgressSummary {
            completed_modules: MODULE_CATALOG
                .iter()
                .filter(|module_id| completed.contains(**module_id))
                .map(|module_id| module_id.to_string())
                .collect(),
            percent_complete: aggregate::percent_complete(&MODULE_CATALOG, &completed),
            active_module_count: aggregate::active_module_count(&MODULE_CATALOG, &completed),
            current_module_index: aggregate::current_module_index(&completed),
        }
    }

    /// Gate check for navigation into a protected module. Ensures the
    /// learner's completed set is loaded first, so callers see a settled
    /// allow/deny rather than a pending flash.
    pub async fn check_gate(
        &self,
        user_id: Option<&str>,
        role: &str,
        required: Option<&str>,
    ) -> GateDecision {
        let state = match (user_id, required) {
            (Some(user_id), Some(required)) => {
                self.store.load(user_id).await;
                Some(self.store.get_module_state(user_id, required).await)
            }
            _ => None,
        };

        gate::evaluate(user_id, role, required, state.as_ref())
    }

    pub async fn module_view(
        &self,
        user_id: &str,
        module_id: &str,
        item_count: usize,
    ) -> ModuleView {
        self.store.load_module(user_id, module_id).await;
        let record = self.store.get_module_state(user_id, module_id).await;
        let offsets = self.store.resume_offsets(user_id, module_id).await;
        Self::build_view(module_id, &record, item_count, &offsets)
    }

    pub async fn mark_item_expanded(
        &self,
        user_id: &str,
        module_id: &str,
        item_index: i64,
        item_count: usize,
    ) -> ProgressRecord {
        self.store.load_module(user_id, module_id).await;
        self.store
            .mark_item_expanded(user_id, module_id, item_index, item_count)
            .await
    }

    pub async fn handle_item_ended(
        &self,
        user_id: &str,
        module_id: &str,
        item_index: i64,
        item_count: usize,
    ) -> SequentialAdvance {
        self.store.load_module(user_id, module_id).await;
        self.store
            .advance_sequential(user_id, module_id, item_index, item_count)
            .await
    }

    pub async fn set_completed(
        &self,
        user_id: &str,
        module_id: &str,
        value: bool,
    ) -> ProgressRecord {
        self.store.set_completed(user_id, module_id, value).await
    }

    pub async fn set_resume_offset(
        &self,
        user_id: &str,
        module_id: &str,
        item_index: i64,
        position: f64,
    ) {
        self.store
            .set_resume_offset(user_id, module_id, item_index, position)
            .await
    }

    fn build_view(
        module_id: &str,
        record: &ProgressRecord,
        item_count: usize,
        offsets: &std::collections::HashMap<i64, f64>,
    ) -> ModuleView {
        let last_completed =
            sequential::clamp_last_completed(record.last_completed_index, item_count);

        ModuleView {
            module_id: module_id.to_string(),
            policy: CompletionPolicy::for_module(module_id),
            completed: record.completed,
            expanded_items: record.expanded_items.iter().copied().collect(),
            last_completed_index: last_completed,
            all_items_touched: record.all_items_touched(item_count),
            items: sequential::access_list(item_count, record.last_completed_index, offsets),
        }
    }
}
