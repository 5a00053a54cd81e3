//! Test doubles shared by the unit tests.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::auth::cache::{AuthCache, CacheError, MemoryAuthCache};
use crate::forge::ForgeBackend;

/// Serve `app` on an ephemeral localhost port.
pub async fn spawn_server(app: axum::Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

// ---------------------------------------------------------------------------
// Forge stub
// ---------------------------------------------------------------------------

/// Forge backend answering every probe with a fixed status, counting calls.
#[derive(Default)]
pub struct StubForge {
    status: AtomicU16,
    fail: AtomicBool,
    calls: AtomicUsize,
}

impl StubForge {
    pub fn with_status(code: u16) -> Arc<Self> {
        let stub = Self::default();
        stub.status.store(code, Ordering::SeqCst);
        Arc::new(stub)
    }

    /// Every probe fails before a response is received.
    pub fn unreachable() -> Arc<Self> {
        let stub = Self::default();
        stub.fail.store(true, Ordering::SeqCst);
        Arc::new(stub)
    }

    pub fn set_status(&self, code: u16) {
        self.status.store(code, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ForgeBackend for StubForge {
    async fn probe_commit(
        &self,
        _token: &str,
        _owner: &str,
        _repo: &str,
        _commit: &str,
    ) -> anyhow::Result<StatusCode> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // Let concurrent callers interleave between lookup and write.
        tokio::time::sleep(Duration::from_millis(5)).await;
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("connection refused");
        }
        Ok(StatusCode::from_u16(self.status.load(Ordering::SeqCst))?)
    }

    async fn check_reachable(&self) -> anyhow::Result<StatusCode> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("connection refused");
        }
        Ok(StatusCode::OK)
    }
}

// ---------------------------------------------------------------------------
// Counting cache
// ---------------------------------------------------------------------------

/// In-memory cache that counts accesses and can be told to fail.
pub struct CountingCache {
    inner: MemoryAuthCache,
    gets: AtomicUsize,
    sets: AtomicUsize,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl CountingCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryAuthCache::new(1_000),
            gets: AtomicUsize::new(0),
            sets: AtomicUsize::new(0),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
        })
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn sets(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl AuthCache for CountingCache {
    async fn get(&self, key: &[u8]) -> Result<Option<String>, CacheError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(CacheError::Backend("read refused".into()));
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &[u8], value: &str, ttl: Duration) -> Result<(), CacheError> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CacheError::Backend("write refused".into()));
        }
        self.inner.set(key, value, ttl).await
    }

    async fn ping(&self) -> Result<(), CacheError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(CacheError::Backend("ping refused".into()));
        }
        Ok(())
    }
}
