//! Shared wiring for service-level task tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::coordination::{
    Cache, DEFAULT_CACHE_TTL, LockManager,
    adapters::memory::InMemoryKeyValueStore,
    ports::{KeyValueStore, KeyValueStoreError, KeyValueStoreResult},
};
use crate::queue::{adapters::memory::InMemoryJobQueue, domain::JobPayload};
use crate::task::{
    adapters::memory::InMemoryTaskRepository,
    domain::{Task, TaskId, TaskListQuery, TaskPage, TaskStats},
    ports::{BatchEdit, TaskEdit, TaskRepository, TaskRepositoryResult, TaskRevision},
    services::{TaskCommandService, TaskQueryService},
};
use crate::test_support::ManualClock;
use async_trait::async_trait;
use rstest::fixture;
use tokio::sync::{Notify, oneshot};

pub type TestStore = InMemoryKeyValueStore<ManualClock>;
pub type TestQueue = InMemoryJobQueue<ManualClock>;
pub type TestCommands<R = InMemoryTaskRepository> =
    TaskCommandService<R, TestStore, TestQueue, ManualClock>;
pub type TestQueries<R = InMemoryTaskRepository> = TaskQueryService<R, TestStore>;

/// Fully wired services over in-memory adapters sharing one clock.
pub struct Services<R = InMemoryTaskRepository>
where
    R: TaskRepository,
{
    pub clock: ManualClock,
    pub store: Arc<TestStore>,
    pub repository: Arc<R>,
    pub cache: Arc<Cache<TestStore>>,
    pub queue: Arc<TestQueue>,
    pub commands: Arc<TestCommands<R>>,
    pub queries: TestQueries<R>,
}

impl<R> Services<R>
where
    R: TaskRepository,
{
    pub fn over(repository: Arc<R>) -> Self {
        let clock = ManualClock::default();
        let shared_clock = Arc::new(clock.clone());
        let store = Arc::new(TestStore::with_clock(Arc::clone(&shared_clock)));
        let cache = Arc::new(Cache::new(Arc::clone(&store), DEFAULT_CACHE_TTL));
        let locks = Arc::new(LockManager::new(Arc::clone(&store), Arc::clone(&shared_clock)));
        let queue = Arc::new(TestQueue::with_clock(Arc::clone(&shared_clock)));
        let commands = Arc::new(TaskCommandService::new(
            Arc::clone(&repository),
            Arc::clone(&locks),
            Arc::clone(&cache),
            Arc::clone(&queue),
            shared_clock,
        ));
        let queries = TaskQueryService::new(Arc::clone(&repository), Arc::clone(&cache));
        Self {
            clock,
            store,
            repository,
            cache,
            queue,
            commands,
            queries,
        }
    }

    /// Waits until no lock entry remains for `id`.
    pub async fn wait_for_unlock(&self, id: TaskId) {
        let key = LockManager::<TestStore, ManualClock>::key_for("task", id);
        for _ in 0..200 {
            if !self.store.exists(&key).await.expect("exists") {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        panic!("lock for task {id} was never released");
    }

    /// Returns whether a live lock entry exists for `id`.
    pub async fn is_locked(&self, id: TaskId) -> bool {
        let key = LockManager::<TestStore, ManualClock>::key_for("task", id);
        self.store.exists(&key).await.expect("exists")
    }

    /// Payloads currently waiting in the queue, in enqueue order.
    pub fn queued(&self) -> Vec<JobPayload> {
        self.queue
            .snapshot()
            .expect("queue snapshot")
            .into_iter()
            .map(|job| job.payload().clone())
            .collect()
    }
}

#[fixture]
pub fn services() -> Services {
    Services::over(Arc::new(InMemoryTaskRepository::new()))
}

/// Repository whose `modify` can be held open to widen race windows.
///
/// Each held call parks on its own channel, so callers are admitted one at
/// a time in arrival order.
#[derive(Default)]
pub struct GatedRepository {
    inner: InMemoryTaskRepository,
    gate_updates: AtomicBool,
    waiting: Mutex<VecDeque<oneshot::Sender<()>>>,
    pub entered: Notify,
}

impl GatedRepository {
    /// Makes subsequent modifications signal `entered` and park.
    pub fn close_gate(&self) {
        self.gate_updates.store(true, Ordering::SeqCst);
    }

    /// Lets later modifications through without parking.
    pub fn open_gate(&self) {
        self.gate_updates.store(false, Ordering::SeqCst);
    }

    /// Lets the oldest parked modification continue.
    pub fn admit_next(&self) {
        let next = self.waiting.lock().expect("gate queue").pop_front();
        if let Some(sender) = next {
            sender.send(()).ok();
        }
    }
}

#[async_trait]
impl TaskRepository for GatedRepository {
    async fn store(&self, task: &Task) -> TaskRepositoryResult<()> {
        self.inner.store(task).await
    }

    async fn modify(&self, id: TaskId, edit: TaskEdit) -> TaskRepositoryResult<TaskRevision> {
        if self.gate_updates.load(Ordering::SeqCst) {
            let (sender, receiver) = oneshot::channel();
            self.waiting.lock().expect("gate queue").push_back(sender);
            self.entered.notify_one();
            receiver.await.ok();
        }
        self.inner.modify(id, edit).await
    }

    async fn modify_many(
        &self,
        ids: &[TaskId],
        edit: BatchEdit,
    ) -> TaskRepositoryResult<Vec<Task>> {
        self.inner.modify_many(ids, edit).await
    }

    async fn remove(&self, id: TaskId) -> TaskRepositoryResult<()> {
        self.inner.remove(id).await
    }

    async fn remove_many(&self, ids: &[TaskId]) -> TaskRepositoryResult<Vec<TaskId>> {
        self.inner.remove_many(ids).await
    }

    async fn find_by_id(&self, id: TaskId) -> TaskRepositoryResult<Option<Task>> {
        self.inner.find_by_id(id).await
    }

    async fn find_by_ids(&self, ids: &[TaskId]) -> TaskRepositoryResult<Vec<Task>> {
        self.inner.find_by_ids(ids).await
    }

    async fn list(&self, query: &TaskListQuery) -> TaskRepositoryResult<TaskPage> {
        self.inner.list(query).await
    }

    async fn stats(&self) -> TaskRepositoryResult<TaskStats> {
        self.inner.stats().await
    }
}

/// Key-value store whose plain deletes can be made to fail.
///
/// Compare-and-delete keeps working, so locks still release while cache
/// invalidation breaks.
pub struct FlakyDeleteStore {
    inner: TestStore,
    fail_deletes: AtomicBool,
}

impl FlakyDeleteStore {
    pub fn over_clock(clock: Arc<ManualClock>) -> Self {
        Self {
            inner: TestStore::with_clock(clock),
            fail_deletes: AtomicBool::new(false),
        }
    }

    pub fn fail_cache_deletes(&self) {
        self.fail_deletes.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl KeyValueStore for FlakyDeleteStore {
    async fn get(&self, key: &str) -> KeyValueStoreResult<Option<String>> {
        self.inner.get(key).await
    }

    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<std::time::Duration>,
    ) -> KeyValueStoreResult<()> {
        self.inner.set(key, value, ttl).await
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: std::time::Duration,
    ) -> KeyValueStoreResult<bool> {
        self.inner.set_if_absent(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> KeyValueStoreResult<bool> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(KeyValueStoreError::backend(std::io::Error::other(
                "store unavailable",
            )));
        }
        self.inner.delete(key).await
    }

    async fn exists(&self, key: &str) -> KeyValueStoreResult<bool> {
        self.inner.exists(key).await
    }

    async fn increment(&self, key: &str) -> KeyValueStoreResult<i64> {
        self.inner.increment(key).await
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> KeyValueStoreResult<bool> {
        self.inner.compare_and_delete(key, expected).await
    }

    async fn flush_all(&self) -> KeyValueStoreResult<()> {
        self.inner.flush_all().await
    }
}
