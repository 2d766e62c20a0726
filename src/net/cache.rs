//! Read-only submission cache backed by Redis.
//!
//! Lookup is `HGET <submission-id> submission_data`. The client never fails a
//! run: an unreachable backend at startup disables it for the rest of the run,
//! and per-lookup failures read as a miss.

use crate::asset::{Submission, SubmissionId};
use crate::config::CacheSettings;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Hash field holding the serialized submission.
pub const SUBMISSION_FIELD: &str = "submission_data";

/// Backend failures. Absorbed by [`CacheClient`].
#[derive(Debug, Error)]
pub enum CacheError {
    /// Connection settings are unusable.
    #[error("cache misconfigured: {0}")]
    Misconfigured(String),
    /// Connect, command or timeout failure.
    #[error("cache backend error: {0}")]
    Backend(String),
}

fn map_redis_err(err: redis::RedisError) -> CacheError {
    CacheError::Backend(err.to_string())
}

/// Minimal key-value surface the cache client needs.
pub trait CacheBackend: Send + Sync + fmt::Debug + 'static {
    /// Round-trips the backend.
    fn ping(&self) -> Result<(), CacheError>;
    /// Reads one hash field; `None` when the key or field is absent.
    fn hget(&self, key: &str, field: &str) -> Result<Option<String>, CacheError>;
}

/// Synchronous Redis backend with bounded connect and I/O timeouts.
#[derive(Debug)]
pub struct RedisBackend {
    client: redis::Client,
    timeout: Duration,
}

impl RedisBackend {
    /// Opens a client for `url`; no connection is made yet.
    pub fn open(url: &str, timeout: Duration) -> Result<Self, CacheError> {
        let client =
            redis::Client::open(url).map_err(|e| CacheError::Misconfigured(e.to_string()))?;
        Ok(Self {
            client,
            timeout: timeout.max(Duration::from_millis(1)),
        })
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&mut redis::Connection) -> redis::RedisResult<T>,
    ) -> Result<T, CacheError> {
        let mut conn = self
            .client
            .get_connection_with_timeout(self.timeout)
            .map_err(map_redis_err)?;
        conn.set_read_timeout(Some(self.timeout)).map_err(map_redis_err)?;
        conn.set_write_timeout(Some(self.timeout)).map_err(map_redis_err)?;
        f(&mut conn).map_err(map_redis_err)
    }
}

impl CacheBackend for RedisBackend {
    fn ping(&self) -> Result<(), CacheError> {
        self.with_conn(|c| redis::cmd("PING").query::<String>(c))?;
        Ok(())
    }

    fn hget(&self, key: &str, field: &str) -> Result<Option<String>, CacheError> {
        self.with_conn(|c| redis::cmd("HGET").arg(key).arg(field).query(c))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CachedValue {
    Many(Vec<serde_json::Value>),
    One(serde_json::Value),
}

/// Decodes a cached value: one submission object or an array of them.
///
/// Array members that are not submissions are dropped. An empty array is a
/// hit with no submissions; otherwise the value only fails when it is not
/// JSON at all or holds no submission.
pub fn decode_cached(raw: &str) -> Option<Vec<Submission>> {
    let values = match serde_json::from_str::<CachedValue>(raw).ok()? {
        CachedValue::Many(values) if values.is_empty() => return Some(Vec::new()),
        CachedValue::Many(values) => values,
        CachedValue::One(value) => vec![value],
    };
    let submissions = values
        .into_iter()
        .filter_map(|value| {
            let bytes = serde_json::to_vec(&value).ok()?;
            Submission::from_historical_slice(&bytes).ok()
        })
        .collect::<Vec<_>>();
    if submissions.is_empty() {
        None
    } else {
        Some(submissions)
    }
}

/// Cache client that degrades to "always absent".
#[derive(Debug, Clone)]
pub struct CacheClient {
    backend: Option<Arc<dyn CacheBackend>>,
}

impl CacheClient {
    /// A client that reports every lookup as absent.
    pub fn disabled() -> Self {
        Self { backend: None }
    }

    /// Wraps `backend` after a startup ping; a failed ping disables the client.
    pub fn from_backend(backend: Arc<dyn CacheBackend>) -> Self {
        match backend.ping() {
            Ok(()) => {
                tracing::info!("cache backend reachable");
                Self {
                    backend: Some(backend),
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "cache unavailable, continuing without cache");
                Self::disabled()
            }
        }
    }

    /// Connects to Redis with the configured settings, degrading on failure.
    pub async fn connect(settings: &CacheSettings, timeout: Duration) -> Self {
        let url = settings.url();
        let joined = tokio::task::spawn_blocking(move || {
            RedisBackend::open(&url, timeout)
                .map(|backend| Self::from_backend(Arc::new(backend)))
        })
        .await;
        match joined {
            Ok(Ok(client)) => client,
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "cache unavailable, continuing without cache");
                Self::disabled()
            }
            Err(err) => {
                tracing::warn!(error = %err, "cache connect task failed, continuing without cache");
                Self::disabled()
            }
        }
    }

    /// True when lookups reach a backend.
    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    /// Cached submissions for `id`, or `None` on miss or any failure.
    pub async fn lookup(&self, id: &SubmissionId) -> Option<Vec<Submission>> {
        let backend = self.backend.clone()?;
        let key = id.as_str().to_string();
        let fetched = tokio::task::spawn_blocking(move || backend.hget(&key, SUBMISSION_FIELD)).await;
        let raw = match fetched {
            Ok(Ok(Some(raw))) if !raw.trim().is_empty() => raw,
            Ok(Ok(_)) => {
                tracing::debug!(submission_id = %id, "cache miss");
                return None;
            }
            Ok(Err(err)) => {
                tracing::warn!(submission_id = %id, error = %err, "cache lookup failed");
                return None;
            }
            Err(err) => {
                tracing::warn!(submission_id = %id, error = %err, "cache lookup task failed");
                return None;
            }
        };
        let decoded = decode_cached(&raw);
        if decoded.is_none() {
            tracing::warn!(submission_id = %id, "undecodable cache value, treating as miss");
        }
        decoded
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// In-memory backend keyed by submission id.
    #[derive(Debug, Default)]
    pub(crate) struct MemoryBackend {
        values: Mutex<HashMap<String, String>>,
        pub(crate) down: bool,
        pub(crate) lookups: AtomicUsize,
    }

    impl MemoryBackend {
        pub(crate) fn with(entries: &[(&str, &str)]) -> Self {
            let backend = Self::default();
            {
                let mut values = backend.values.lock().unwrap();
                for (key, value) in entries {
                    values.insert(key.to_string(), value.to_string());
                }
            }
            backend
        }
    }

    impl CacheBackend for MemoryBackend {
        fn ping(&self) -> Result<(), CacheError> {
            if self.down {
                Err(CacheError::Backend("connection refused".to_string()))
            } else {
                Ok(())
            }
        }

        fn hget(&self, key: &str, field: &str) -> Result<Option<String>, CacheError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            assert_eq!(field, SUBMISSION_FIELD);
            Ok(self.values.lock().unwrap().get(key).cloned())
        }
    }

    const ONE: &str =
        r#"{"userAddress":"0xw","tokens":[{"token_metadata":{"chain":"base","contract":"0x1"}}]}"#;

    #[tokio::test]
    async fn hit_decodes_single_object() {
        let client = CacheClient::from_backend(Arc::new(MemoryBackend::with(&[("7", ONE)])));
        let hit = client.lookup(&SubmissionId::new("7")).await.unwrap();
        assert_eq!(hit.len(), 1);
        assert_eq!(hit[0].tokens[0].contract(), "0x1");
    }

    #[tokio::test]
    async fn hit_decodes_array_form() {
        let array = format!("[{ONE},{{\"tokens\":[]}}]");
        let client = CacheClient::from_backend(Arc::new(MemoryBackend::with(&[("7", array.as_str())])));
        assert_eq!(client.lookup(&SubmissionId::new("7")).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn empty_cached_array_is_a_hit() {
        let backend = Arc::new(MemoryBackend::with(&[("7", "[]"), ("8", "[1, \"x\"]")]));
        let client = CacheClient::from_backend(backend);
        assert_eq!(client.lookup(&SubmissionId::new("7")).await, Some(Vec::new()));
        assert!(client.lookup(&SubmissionId::new("8")).await.is_none());
    }

    #[tokio::test]
    async fn miss_and_garbage_read_as_absent() {
        let client = CacheClient::from_backend(Arc::new(MemoryBackend::with(&[
            ("bad", "not json"),
            ("blank", "  "),
        ])));
        assert!(client.lookup(&SubmissionId::new("missing")).await.is_none());
        assert!(client.lookup(&SubmissionId::new("bad")).await.is_none());
        assert!(client.lookup(&SubmissionId::new("blank")).await.is_none());
    }

    #[tokio::test]
    async fn failed_ping_disables_client_for_the_run() {
        let backend = Arc::new(MemoryBackend {
            down: true,
            ..MemoryBackend::with(&[("7", ONE)])
        });
        let client = CacheClient::from_backend(backend.clone());
        assert!(!client.is_enabled());
        assert!(client.lookup(&SubmissionId::new("7")).await.is_none());
        assert_eq!(backend.lookups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unreachable_redis_degrades() {
        let settings = CacheSettings {
            host: "127.0.0.1".to_string(),
            port: 1,
            password: None,
        };
        let client = CacheClient::connect(&settings, Duration::from_millis(200)).await;
        assert!(!client.is_enabled());
    }

    #[test]
    fn redis_backend_surfaces_connection_errors() {
        let backend = RedisBackend::open("redis://127.0.0.1:1/", Duration::from_millis(200)).unwrap();
        assert!(matches!(backend.ping(), Err(CacheError::Backend(_))));
        assert!(matches!(
            backend.hget("7", SUBMISSION_FIELD),
            Err(CacheError::Backend(_))
        ));
        assert!(matches!(
            RedisBackend::open("not a url", Duration::from_millis(200)),
            Err(CacheError::Misconfigured(_))
        ));
    }
}
