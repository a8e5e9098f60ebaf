//! Single source of truth for the current learners' progress records, kept
//! consistent with the persistence layer. Mutations apply to memory first
//! and are persisted asynchronously through a per-(user, module) worker
//! that applies writes in the order the mutations took effect.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot, RwLock};

use crate::engine::persistence::{ProgressPersistence, ProgressUpdate};
use crate::engine::sequential;
use crate::engine::types::{CompletionPolicy, ProgressRecord};

const WRITE_RETRY_DELAY: Duration = Duration::from_millis(200);
const MAX_CACHED_USERS: usize = 512;

struct UserProgress {
    loaded: bool,
    last_seen: Instant,
    modules: HashMap<String, ProgressRecord>,
    /// Modules mutated this session. A confirmed read never overwrites
    /// state the session has already changed.
    dirty_modules: HashSet<String>,
    fully_loaded_modules: HashSet<String>,
    resume: HashMap<String, HashMap<i64, f64>>,
}

impl Default for UserProgress {
    fn default() -> Self {
        Self {
            loaded: false,
            last_seen: Instant::now(),
            modules: HashMap::new(),
            dirty_modules: HashSet::new(),
            fully_loaded_modules: HashSet::new(),
            resume: HashMap::new(),
        }
    }
}

/// Result of feeding an end-of-playback event into the store.
#[derive(Debug, Clone)]
pub struct SequentialAdvance {
    pub record: ProgressRecord,
    pub advanced: bool,
    /// True exactly once, when the final item's completion flips the module.
    pub completed_now: bool,
}

enum WriteJob {
    Progress(ProgressUpdate),
    Resume { item_index: i64, position: f64 },
    /// Acknowledged once every job enqueued before it has been applied.
    Flush(oneshot::Sender<()>),
}

pub struct ProgressStore {
    persistence: Option<Arc<ProgressPersistence>>,
    users: RwLock<HashMap<String, UserProgress>>,
    write_queues: std::sync::Mutex<HashMap<(String, String), mpsc::UnboundedSender<WriteJob>>>,
}

impl ProgressStore {
    pub fn new(persistence: Option<Arc<ProgressPersistence>>) -> Self {
        Self {
            persistence,
            users: RwLock::new(HashMap::new()),
            write_queues: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Fetch the completed-module set for a learner. Idempotent; a failed
    /// read leaves the learner with zero-value defaults rather than blocking.
    pub async fn load(&self, user_id: &str) {
        if self.is_loaded(user_id).await {
            return;
        }

        let completed = match &self.persistence {
            Some(persistence) => self
                .list_completed_with_retry(persistence, user_id)
                .await
                .unwrap_or_default(),
            None => Vec::new(),
        };

        let mut users = self.users.write().await;
        let user = users.entry(user_id.to_string()).or_default();
        user.last_seen = Instant::now();
        for module_id in completed {
            if user.dirty_modules.contains(&module_id) {
                continue;
            }
            user.modules.entry(module_id).or_default().completed = true;
        }
        user.loaded = true;
        self.evict_stale_users(&mut users, user_id);
    }

    /// Lazily fetch the full record (expanded items, sequential frontier,
    /// resume offsets) for the module currently being viewed. Pending
    /// writes for the module are flushed first, and a module mutated this
    /// session keeps its in-memory state over the fetched row.
    pub async fn load_module(&self, user_id: &str, module_id: &str) {
        {
            let users = self.users.read().await;
            if users
                .get(user_id)
                .is_some_and(|user| user.fully_loaded_modules.contains(module_id))
            {
                return;
            }
        }

        let Some(persistence) = &self.persistence else {
            let mut users = self.users.write().await;
            let user = users.entry(user_id.to_string()).or_default();
            user.last_seen = Instant::now();
            user.fully_loaded_modules.insert(module_id.to_string());
            self.evict_stale_users(&mut users, user_id);
            return;
        };

        self.flush_writes(user_id, module_id).await;

        let record = self
            .read_record_with_retry(persistence, user_id, module_id)
            .await;
        let offsets = self
            .read_offsets_with_retry(persistence, user_id, module_id)
            .await;

        let mut users = self.users.write().await;
        let user = users.entry(user_id.to_string()).or_default();
        user.last_seen = Instant::now();

        let merged = reconcile(
            user.modules.get(module_id),
            user.dirty_modules.contains(module_id),
            record,
        );
        user.modules.insert(module_id.to_string(), merged);

        let known = user.resume.entry(module_id.to_string()).or_default();
        for (item_index, position) in offsets {
            known.entry(item_index).or_insert(position);
        }

        user.fully_loaded_modules.insert(module_id.to_string());
        self.evict_stale_users(&mut users, user_id);
    }

    pub async fn is_loaded(&self, user_id: &str) -> bool {
        let users = self.users.read().await;
        users.get(user_id).is_some_and(|user| user.loaded)
    }

    /// Cached record, or the zero-value record if none exists yet.
    pub async fn get_module_state(&self, user_id: &str, module_id: &str) -> ProgressRecord {
        let users = self.users.read().await;
        users
            .get(user_id)
            .and_then(|user| user.modules.get(module_id))
            .cloned()
            .unwrap_or_default()
    }

    pub async fn completed_modules(&self, user_id: &str) -> HashSet<String> {
        let users = self.users.read().await;
        users
            .get(user_id)
            .map(|user| {
                user.modules
                    .iter()
                    .filter(|(_, record)| record.completed)
                    .map(|(module_id, _)| module_id.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub async fn resume_offsets(&self, user_id: &str, module_id: &str) -> HashMap<i64, f64> {
        let users = self.users.read().await;
        users
            .get(user_id)
            .and_then(|user| user.resume.get(module_id))
            .cloned()
            .unwrap_or_default()
    }

    /// Number of learners currently cached in memory.
    pub async fn cached_users(&self) -> usize {
        self.users.read().await.len()
    }

    /// Record that the learner opened an item. Idempotent; out-of-range
    /// indices are ignored. May flip the module to completed when its
    /// policy is all-items-touched.
    pub async fn mark_item_expanded(
        &self,
        user_id: &str,
        module_id: &str,
        item_index: i64,
        item_count: usize,
    ) -> ProgressRecord {
        let mut users = self.users.write().await;
        let user = users.entry(user_id.to_string()).or_default();
        user.last_seen = Instant::now();
        let record = user.modules.entry(module_id.to_string()).or_default();

        if item_index < 0 || item_index >= item_count as i64 {
            return record.clone();
        }

        let inserted = record.expanded_items.insert(item_index);
        let mut completed_changed = false;
        if CompletionPolicy::for_module(module_id) == CompletionPolicy::AllItemsTouched
            && !record.completed
            && record.all_items_touched(item_count)
        {
            record.completed = true;
            completed_changed = true;
        }
        let snapshot = record.clone();

        if inserted || completed_changed {
            user.dirty_modules.insert(module_id.to_string());
            self.enqueue_write(
                user_id,
                module_id,
                WriteJob::Progress(ProgressUpdate {
                    completed: snapshot.completed.then_some(true),
                    expanded_items: Some(snapshot.expanded_items.iter().copied().collect()),
                    last_completed_index: None,
                }),
            );
        }

        snapshot
    }

    /// Apply an end-of-playback event for `item_index`. The frontier only
    /// moves on a strict in-order advance; replays and skip-ahead finishes
    /// leave it untouched. Completing the final item flips the module once.
    pub async fn advance_sequential(
        &self,
        user_id: &str,
        module_id: &str,
        item_index: i64,
        item_count: usize,
    ) -> SequentialAdvance {
        let mut users = self.users.write().await;
        let user = users.entry(user_id.to_string()).or_default();
        user.last_seen = Instant::now();
        let record = user.modules.entry(module_id.to_string()).or_default();

        let frontier = sequential::clamp_last_completed(record.last_completed_index, item_count);
        let advanced = item_index >= 0
            && (item_index as usize) < item_count
            && sequential::should_advance(item_index, frontier);

        let mut completed_now = false;
        if advanced {
            record.last_completed_index = item_index;
            if CompletionPolicy::for_module(module_id) == CompletionPolicy::SequentialPlayThrough
                && record.last_completed_index == item_count as i64 - 1
                && !record.completed
            {
                record.completed = true;
                completed_now = true;
            }
        }
        let snapshot = record.clone();

        if advanced {
            user.dirty_modules.insert(module_id.to_string());
            self.enqueue_write(
                user_id,
                module_id,
                WriteJob::Progress(ProgressUpdate {
                    completed: completed_now.then_some(true),
                    expanded_items: None,
                    last_completed_index: Some(snapshot.last_completed_index),
                }),
            );
        }

        SequentialAdvance {
            record: snapshot,
            advanced,
            completed_now,
        }
    }

    /// Explicit completion override. Deliberately skips any prerequisite or
    /// policy validation; this is the support/admin escape hatch and also
    /// the reversal path for mark-incomplete.
    pub async fn set_completed(
        &self,
        user_id: &str,
        module_id: &str,
        value: bool,
    ) -> ProgressRecord {
        let mut users = self.users.write().await;
        let user = users.entry(user_id.to_string()).or_default();
        user.last_seen = Instant::now();
        let record = user.modules.entry(module_id.to_string()).or_default();
        record.completed = value;
        let snapshot = record.clone();

        user.dirty_modules.insert(module_id.to_string());
        self.enqueue_write(
            user_id,
            module_id,
            WriteJob::Progress(ProgressUpdate {
                completed: Some(value),
                expanded_items: None,
                last_completed_index: None,
            }),
        );

        snapshot
    }

    pub async fn set_resume_offset(
        &self,
        user_id: &str,
        module_id: &str,
        item_index: i64,
        position: f64,
    ) {
        let mut users = self.users.write().await;
        let user = users.entry(user_id.to_string()).or_default();
        user.last_seen = Instant::now();
        user.resume
            .entry(module_id.to_string())
            .or_default()
            .insert(item_index, position);

        self.enqueue_write(
            user_id,
            module_id,
            WriteJob::Resume {
                item_index,
                position,
            },
        );
    }

    /// Hand a write to the per-key worker. Callers enqueue while holding
    /// the state lock, so queue order matches the order the mutations took
    /// effect in memory; the worker drains it FIFO.
    fn enqueue_write(&self, user_id: &str, module_id: &str, job: WriteJob) {
        let Some(persistence) = &self.persistence else {
            return;
        };

        let mut queues = self.queues();
        let sender = queues
            .entry((user_id.to_string(), module_id.to_string()))
            .or_insert_with(|| {
                spawn_writer(
                    Arc::clone(persistence),
                    user_id.to_string(),
                    module_id.to_string(),
                )
            });

        if sender.send(job).is_err() {
            tracing::error!(user_id, module_id, "write worker gone, dropping update");
        }
    }

    /// Wait until every write enqueued so far for this key has been applied
    /// (or dropped after its retry).
    async fn flush_writes(&self, user_id: &str, module_id: &str) {
        let ack = {
            let queues = self.queues();
            queues
                .get(&(user_id.to_string(), module_id.to_string()))
                .map(|sender| {
                    let (ack_tx, ack_rx) = oneshot::channel();
                    let _ = sender.send(WriteJob::Flush(ack_tx));
                    ack_rx
                })
        };

        if let Some(ack) = ack {
            let _ = ack.await;
        }
    }

    fn queues(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<(String, String), mpsc::UnboundedSender<WriteJob>>>
    {
        match self.write_queues.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Drop the least recently seen learners once the cache is over its cap.
    /// Closing a worker's channel lets it drain its remaining jobs and exit.
    fn evict_stale_users(&self, users: &mut HashMap<String, UserProgress>, keep: &str) {
        while users.len() > MAX_CACHED_USERS {
            let stalest = users
                .iter()
                .filter(|(user_id, _)| user_id.as_str() != keep)
                .min_by_key(|(_, user)| user.last_seen)
                .map(|(user_id, _)| user_id.clone());

            let Some(stalest) = stalest else { break };
            users.remove(&stalest);
            self.queues().retain(|(user_id, _), _| user_id != &stalest);
        }
    }

    async fn read_record_with_retry(
        &self,
        persistence: &Arc<ProgressPersistence>,
        user_id: &str,
        module_id: &str,
    ) -> ProgressRecord {
        match persistence.read_progress(user_id, module_id).await {
            Ok(record) => record.unwrap_or_default(),
            Err(first) => {
                tracing::warn!(error = %first, user_id, module_id, "progress read failed, retrying");
                match persistence.read_progress(user_id, module_id).await {
                    Ok(record) => record.unwrap_or_default(),
                    Err(second) => {
                        tracing::error!(error = %second, user_id, module_id, "progress read failed, using defaults");
                        ProgressRecord::default()
                    }
                }
            }
        }
    }

    async fn read_offsets_with_retry(
        &self,
        persistence: &Arc<ProgressPersistence>,
        user_id: &str,
        module_id: &str,
    ) -> Vec<(i64, f64)> {
        match persistence.read_resume_offsets(user_id, module_id).await {
            Ok(offsets) => offsets,
            Err(first) => {
                tracing::warn!(error = %first, user_id, module_id, "resume offsets read failed, retrying");
                match persistence.read_resume_offsets(user_id, module_id).await {
                    Ok(offsets) => offsets,
                    Err(second) => {
                        tracing::error!(error = %second, user_id, module_id, "resume offsets read failed, using defaults");
                        Vec::new()
                    }
                }
            }
        }
    }

    async fn list_completed_with_retry(
        &self,
        persistence: &Arc<ProgressPersistence>,
        user_id: &str,
    ) -> Option<Vec<String>> {
        match persistence.list_completed(user_id).await {
            Ok(completed) => Some(completed),
            Err(first) => {
                tracing::warn!(error = %first, user_id, "completed modules read failed, retrying");
                match persistence.list_completed(user_id).await {
                    Ok(completed) => Some(completed),
                    Err(second) => {
                        tracing::error!(error = %second, user_id, "completed modules read failed, using defaults");
                        None
                    }
                }
            }
        }
    }
}

/// Pick between the cached record and a freshly fetched row. A module the
/// session has mutated keeps its in-memory fields (the row can be at most
/// as fresh as the last flushed write); item history still merges
/// additively. A clean module takes the fetched row, which is fresher than
/// anything cached so far.
fn reconcile(
    cached: Option<&ProgressRecord>,
    mutated: bool,
    fetched: ProgressRecord,
) -> ProgressRecord {
    match cached {
        Some(cached) if mutated => {
            let mut merged = cached.clone();
            merged
                .expanded_items
                .extend(fetched.expanded_items.iter().copied());
            merged.last_completed_index = merged
                .last_completed_index
                .max(fetched.last_completed_index);
            merged
        }
        _ => fetched,
    }
}

fn spawn_writer(
    persistence: Arc<ProgressPersistence>,
    user_id: String,
    module_id: String,
) -> mpsc::UnboundedSender<WriteJob> {
    let (tx, mut rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Some(job) = rx.recv().await {
            match job {
                WriteJob::Progress(update) => {
                    persist_progress(&persistence, &user_id, &module_id, &update).await;
                }
                WriteJob::Resume {
                    item_index,
                    position,
                } => {
                    persist_resume(&persistence, &user_id, &module_id, item_index, position).await;
                }
                WriteJob::Flush(ack) => {
                    let _ = ack.send(());
                }
            }
        }
    });

    tx
}

async fn persist_progress(
    persistence: &ProgressPersistence,
    user_id: &str,
    module_id: &str,
    update: &ProgressUpdate,
) {
    if let Err(first) = persistence.upsert_progress(user_id, module_id, update).await {
        tracing::warn!(error = %first, user_id, module_id, "progress upsert failed, retrying");
        tokio::time::sleep(WRITE_RETRY_DELAY).await;
        if let Err(second) = persistence.upsert_progress(user_id, module_id, update).await {
            tracing::error!(error = %second, user_id, module_id, "progress upsert dropped after retry");
        }
    }
}

async fn persist_resume(
    persistence: &ProgressPersistence,
    user_id: &str,
    module_id: &str,
    item_index: i64,
    position: f64,
) {
    if let Err(first) = persistence
        .upsert_resume_offset(user_id, module_id, item_index, position)
        .await
    {
        tracing::warn!(error = %first, user_id, module_id, item_index, "resume offset upsert failed, retrying");
        tokio::time::sleep(WRITE_RETRY_DELAY).await;
        if let Err(second) = persistence
            .upsert_resume_offset(user_id, module_id, item_index, position)
            .await
        {
            tracing::error!(error = %second, user_id, module_id, item_index, "resume offset upsert dropped after retry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ProgressStore {
        ProgressStore::new(None)
    }

    #[tokio::test]
    async fn test_zero_value_record_for_untouched_module() {
        let store = store();
        let record = store.get_module_state("u1", "module1").await;
        assert!(!record.completed);
        assert!(record.expanded_items.is_empty());
        assert_eq!(record.last_completed_index, -1);
    }

    #[tokio::test]
    async fn test_load_marks_session_loaded() {
        let store = store();
        assert!(!store.is_loaded("u1").await);
        store.load("u1").await;
        assert!(store.is_loaded("u1").await);
    }

    #[tokio::test]
    async fn test_expand_completion_is_order_independent() {
        let store = store();
        for index in [0, 2, 1, 5, 4] {
            let record = store.mark_item_expanded("u1", "module1", index, 6).await;
            assert!(!record.completed);
        }
        let record = store.mark_item_expanded("u1", "module1", 3, 6).await;
        assert!(record.completed);
        assert!(record.all_items_touched(6));
    }

    #[tokio::test]
    async fn test_expand_is_idempotent() {
        let store = store();
        store.mark_item_expanded("u1", "module1", 0, 6).await;
        let record = store.mark_item_expanded("u1", "module1", 0, 6).await;
        assert_eq!(record.expanded_items.len(), 1);
        assert!(!record.completed);
    }

    #[tokio::test]
    async fn test_expand_ignores_out_of_range_index() {
        let store = store();
        let record = store.mark_item_expanded("u1", "module1", 7, 3).await;
        assert!(record.expanded_items.is_empty());

        let record = store.mark_item_expanded("u1", "module1", -1, 3).await;
        assert!(record.expanded_items.is_empty());

        // The boundary item still counts.
        let record = store.mark_item_expanded("u1", "module1", 2, 3).await;
        assert_eq!(record.expanded_items.len(), 1);
    }

    #[tokio::test]
    async fn test_expand_never_completes_sequential_module() {
        let store = store();
        for index in 0..4 {
            store.mark_item_expanded("u1", "module2", index, 4).await;
        }
        let record = store.get_module_state("u1", "module2").await;
        assert!(!record.completed);
    }

    #[tokio::test]
    async fn test_expand_never_completes_explicit_module() {
        let store = store();
        for index in 0..3 {
            store.mark_item_expanded("u1", "prayers", index, 3).await;
        }
        let record = store.get_module_state("u1", "prayers").await;
        assert!(!record.completed);
    }

    #[tokio::test]
    async fn test_in_order_advance_moves_frontier() {
        let store = store();
        let result = store.advance_sequential("u1", "module2", 0, 4).await;
        assert!(result.advanced);
        assert_eq!(result.record.last_completed_index, 0);

        let result = store.advance_sequential("u1", "module2", 1, 4).await;
        assert!(result.advanced);
        assert_eq!(result.record.last_completed_index, 1);
    }

    #[tokio::test]
    async fn test_out_of_order_advance_is_ignored() {
        let store = store();
        store.advance_sequential("u1", "module2", 0, 4).await;
        store.advance_sequential("u1", "module2", 1, 4).await;

        // Replay of an earlier item.
        let result = store.advance_sequential("u1", "module2", 0, 4).await;
        assert!(!result.advanced);
        assert_eq!(result.record.last_completed_index, 1);

        // Skip-ahead finish.
        let result = store.advance_sequential("u1", "module2", 3, 4).await;
        assert!(!result.advanced);
        assert_eq!(result.record.last_completed_index, 1);
    }

    #[tokio::test]
    async fn test_final_item_completes_module_once() {
        let store = store();
        for index in 0..2 {
            let result = store.advance_sequential("u1", "module2", index, 3).await;
            assert!(!result.completed_now);
        }

        let result = store.advance_sequential("u1", "module2", 2, 3).await;
        assert!(result.advanced);
        assert!(result.completed_now);
        assert!(result.record.completed);

        // Duplicate ended event for the last item.
        let result = store.advance_sequential("u1", "module2", 2, 3).await;
        assert!(!result.advanced);
        assert!(!result.completed_now);
        assert!(result.record.completed);
    }

    #[tokio::test]
    async fn test_out_of_range_index_does_not_advance() {
        let store = store();
        let result = store.advance_sequential("u1", "module2", 5, 3).await;
        assert!(!result.advanced);
        assert_eq!(result.record.last_completed_index, -1);

        let result = store.advance_sequential("u1", "module2", -1, 3).await;
        assert!(!result.advanced);
    }

    #[tokio::test]
    async fn test_explicit_override_and_reversal() {
        let store = store();
        let record = store.set_completed("u1", "module3", true).await;
        assert!(record.completed);

        // Reversal stays supported even though the UI may not expose it.
        let record = store.set_completed("u1", "module3", false).await;
        assert!(!record.completed);
    }

    #[tokio::test]
    async fn test_resume_offsets_round_trip_in_memory() {
        let store = store();
        store.set_resume_offset("u1", "module2", 2, 17.5).await;
        let offsets = store.resume_offsets("u1", "module2").await;
        assert_eq!(offsets.get(&2), Some(&17.5));
    }

    #[tokio::test]
    async fn test_load_does_not_clear_session_reversal() {
        let store = store();
        store.set_completed("u1", "module2", true).await;
        store.set_completed("u1", "module2", false).await;
        store.load("u1").await;

        let record = store.get_module_state("u1", "module2").await;
        assert!(!record.completed);
    }

    #[tokio::test]
    async fn test_load_module_keeps_session_state() {
        let store = store();
        store.set_completed("u1", "module2", true).await;
        store.load_module("u1", "module2").await;

        let record = store.get_module_state("u1", "module2").await;
        assert!(record.completed);
    }

    #[tokio::test]
    async fn test_flush_without_queue_returns_immediately() {
        let store = store();
        store.flush_writes("u1", "module2").await;
    }

    #[tokio::test]
    async fn test_user_cache_is_bounded() {
        let store = store();
        for n in 0..MAX_CACHED_USERS + 5 {
            store.load(&format!("user-{n}")).await;
        }
        assert_eq!(store.cached_users().await, MAX_CACHED_USERS);

        // The most recent learner survives the eviction sweep.
        let last = format!("user-{}", MAX_CACHED_USERS + 4);
        assert!(store.is_loaded(&last).await);
    }

    #[test]
    fn test_reconcile_keeps_mutated_record() {
        let cached = ProgressRecord {
            completed: true,
            expanded_items: [0, 1].into_iter().collect(),
            last_completed_index: 1,
        };
        let fetched = ProgressRecord {
            completed: false,
            expanded_items: [2].into_iter().collect(),
            last_completed_index: 0,
        };

        let merged = reconcile(Some(&cached), true, fetched);
        assert!(merged.completed);
        assert_eq!(merged.expanded_items.len(), 3);
        assert_eq!(merged.last_completed_index, 1);
    }

    #[test]
    fn test_reconcile_keeps_mutated_reversal() {
        // A reversal this session survives a stale row reading true.
        let cached = ProgressRecord::default();
        let fetched = ProgressRecord {
            completed: true,
            ..ProgressRecord::default()
        };

        let merged = reconcile(Some(&cached), true, fetched);
        assert!(!merged.completed);
    }

    #[test]
    fn test_reconcile_prefers_fetched_when_clean() {
        let cached = ProgressRecord {
            completed: true,
            ..ProgressRecord::default()
        };
        let fetched = ProgressRecord {
            completed: true,
            expanded_items: [0, 1, 2].into_iter().collect(),
            last_completed_index: 2,
        };

        let merged = reconcile(Some(&cached), false, fetched.clone());
        assert_eq!(merged.expanded_items, fetched.expanded_items);
        assert_eq!(merged.last_completed_index, 2);

        let merged = reconcile(None, false, fetched);
        assert_eq!(merged.last_completed_index, 2);
    }
}
