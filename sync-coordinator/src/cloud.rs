//! Cloud store client contract.
//!
//! The cloud is the fourth transport: durable, slow, always
//! eventually correct. The coordinator pushes every outgoing message
//! into it and periodically pulls what other devices pushed. This
//! crate only defines the contract; the real backend lives with the
//! application.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use sync_types::WireMessage;

/// Cloud store errors.
///
/// All of them are expected-and-survivable: the coordinator logs and
/// retries on the next cycle, it never gives up on the cloud leg.
#[derive(Debug, Error)]
pub enum CloudError {
    /// The backend could not be reached.
    #[error("cloud unreachable: {0}")]
    Unreachable(String),

    /// The backend rejected the operation.
    #[error("cloud backend error: {0}")]
    Backend(String),
}

/// Opaque pull position. `CloudCursor::start()` reads from the
/// beginning; every pull returns the cursor to resume from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct CloudCursor(pub u64);

impl CloudCursor {
    /// The position before the first record.
    pub fn start() -> Self {
        Self(0)
    }
}

/// Contract to the durable, eventually-consistent store.
///
/// Both calls may take seconds to low minutes; the coordinator never
/// awaits them on its coordination loop's critical path beyond the
/// periodic pull.
#[async_trait]
pub trait CloudStore: Send + Sync {
    /// Append a message to the user's account scope.
    async fn push(&self, message: &WireMessage) -> Result<(), CloudError>;

    /// Fetch messages appended after `since`, plus the next cursor.
    async fn pull(&self, since: CloudCursor)
        -> Result<(Vec<WireMessage>, CloudCursor), CloudError>;
}

/// In-memory cloud store for testing.
///
/// Behaves like the real thing minus the latency: append-only log,
/// cursor is the log index. Failures can be forced per call.
#[derive(Debug, Default)]
pub struct MockCloudStore {
    inner: Arc<Mutex<MockCloudStoreInner>>,
}

#[derive(Debug, Default)]
struct MockCloudStoreInner {
    log: Vec<WireMessage>,
    fail_next_push: Option<String>,
    fail_next_pull: Option<String>,
}

impl MockCloudStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything pushed so far, in order.
    pub fn pushed(&self) -> Vec<WireMessage> {
        self.inner.lock().unwrap().log.clone()
    }

    /// Seed a message as if another device had pushed it.
    pub fn seed(&self, message: WireMessage) {
        self.inner.lock().unwrap().log.push(message);
    }

    /// Cause the next `push()` to fail with the given error.
    pub fn fail_next_push(&self, error: &str) {
        self.inner.lock().unwrap().fail_next_push = Some(error.to_string());
    }

    /// Cause the next `pull()` to fail with the given error.
    pub fn fail_next_pull(&self, error: &str) {
        self.inner.lock().unwrap().fail_next_pull = Some(error.to_string());
    }
}

impl Clone for MockCloudStore {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl CloudStore for MockCloudStore {
    async fn push(&self, message: &WireMessage) -> Result<(), CloudError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(error) = inner.fail_next_push.take() {
            return Err(CloudError::Unreachable(error));
        }
        inner.log.push(message.clone());
        Ok(())
    }

    async fn pull(
        &self,
        since: CloudCursor,
    ) -> Result<(Vec<WireMessage>, CloudCursor), CloudError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(error) = inner.fail_next_pull.take() {
            return Err(CloudError::Unreachable(error));
        }
        let from = (since.0 as usize).min(inner.log.len());
        let records = inner.log[from..].to_vec();
        Ok((records, CloudCursor(inner.log.len() as u64)))
    }
}
