//! Shared fixtures for the worker integration tests
//!
//! - [`Harness`]: a delivery loop wired to in-memory queue, object store and
//!   loader, with handles kept for inspection
//! - [`TestPostgres`]: a throwaway PostgreSQL container with the schema applied
//!   (Docker required)

#![allow(dead_code)]

use anyhow::{Context, Result};
use etl_common::types::WorkNotification;
use etl_worker::delivery::DeliveryLoop;
use etl_worker::fetcher::ObjectFetcher;
use etl_worker::loader::{Loader, MemoryLoader, PgLoader};
use etl_worker::queue::{MemoryQueue, WorkQueue};
use etl_worker::retry::RetryPolicy;
use etl_worker::storage::MemoryObjectStore;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use testcontainers::core::IntoContainerPort;
use testcontainers::runners::AsyncRunner;
use testcontainers::ContainerAsync;
use testcontainers_modules::postgres::Postgres;

pub const BUCKET: &str = "etl-bucket";
pub const WAIT: Duration = Duration::from_secs(10);
pub const VISIBILITY: Duration = Duration::from_secs(30);

pub const SAMPLE_OBJECT: &str = r#"[
    {"id": 1, "name": "Apple", "price": 100},
    {"id": 2, "name": "Banana", "price": 50}
]"#;

// ============================================================================
// In-memory harness
// ============================================================================

pub type MemoryDelivery<L> = DeliveryLoop<Arc<MemoryQueue>, Arc<MemoryObjectStore>, Arc<L>>;

pub struct Harness<L = MemoryLoader> {
    pub queue: Arc<MemoryQueue>,
    pub store: Arc<MemoryObjectStore>,
    pub loader: Arc<L>,
    pub delivery: MemoryDelivery<L>,
}

impl Harness<MemoryLoader> {
    pub fn new() -> Self {
        Self::build(MemoryQueue::new(), MemoryLoader::new(), RetryPolicy::default())
    }

    pub fn with_dead_letter_queue() -> Self {
        Self::build(
            MemoryQueue::with_dead_letter_queue(),
            MemoryLoader::new(),
            RetryPolicy::default(),
        )
    }
}

impl<L: Loader + 'static> Harness<L> {
    pub fn build(queue: MemoryQueue, loader: L, policy: RetryPolicy) -> Self {
        let queue = Arc::new(queue);
        let store = Arc::new(MemoryObjectStore::new());
        let loader = Arc::new(loader);
        let delivery = DeliveryLoop::new(
            queue.clone(),
            ObjectFetcher::new(store.clone()),
            loader.clone(),
            policy,
            WAIT,
            VISIBILITY,
        );

        Self {
            queue,
            store,
            loader,
            delivery,
        }
    }

    /// Store `body` under `key` and enqueue its notification.
    pub async fn publish(&self, key: &str, body: &str) {
        self.store.put(BUCKET, key, body);
        self.notify(key).await;
    }

    pub async fn notify(&self, key: &str) {
        let body = WorkNotification::new(BUCKET, key)
            .to_json()
            .expect("Failed to encode notification");
        self.queue.send(&body).await.expect("Failed to send");
    }
}

// ============================================================================
// PostgreSQL container
// ============================================================================

pub struct TestPostgres {
    _container: ContainerAsync<Postgres>,
    loader: PgLoader,
}

impl TestPostgres {
    /// Start a container and apply `migrations/`.
    pub async fn start() -> Result<Self> {
        let container = Postgres::default()
            .start()
            .await
            .context("Failed to start PostgreSQL container")?;

        let host = container.get_host().await.context("Failed to get container host")?;
        let port = container
            .get_host_port_ipv4(5432.tcp())
            .await
            .context("Failed to get container port")?;

        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&format!("postgresql://postgres:postgres@{}:{}/postgres", host, port))
            .await
            .context("Failed to connect to PostgreSQL")?;

        sqlx::migrate!("../../migrations")
            .run(&pool)
            .await
            .context("Failed to run migrations")?;

        Ok(Self {
            _container: container,
            loader: PgLoader::from_pool(pool),
        })
    }

    pub fn loader(&self) -> PgLoader {
        self.loader.clone()
    }
}
