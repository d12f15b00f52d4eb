//! Cached remote config source: system prompt, VIP directory, business list.
//!
//! Single-writer cache (the refresher) with readers observing a snapshot
//! pointer, per the concurrency model in the gateway specification.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::clock::SharedClock;

/// A caller recognized by last-10-digit phone match.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct VipRecord {
    pub name: String,
    pub phone: String,
    pub relationship: Option<String>,
    pub voice_override: Option<String>,
    pub persona_notes: Option<String>,
    pub vibe: Option<String>,
}

/// A business directory entry (rendered into the instruction document).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct BusinessRecord {
    pub name: String,
    pub notes: Option<String>,
}

/// The full remote config payload.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub system_prompt: String,
    pub vips: Vec<VipRecord>,
    pub businesses: Vec<BusinessRecord>,
}

impl RemoteConfig {
    /// The minimal fallback served when no cached value exists and the fetch
    /// fails. Never exposed as an error to callers.
    fn fallback(assistant_name: &str) -> Self {
        Self {
            system_prompt: format!("You are {assistant_name}."),
            vips: Vec::new(),
            businesses: Vec::new(),
        }
    }

    /// Find a VIP by last-10-digit phone match.
    pub fn find_vip_by_last10(&self, last10: &str) -> Option<&VipRecord> {
        if last10.is_empty() {
            return None;
        }
        self.vips
            .iter()
            .find(|v| crate::instructions::normalize_last10(&v.phone) == last10)
    }
}

struct CacheEntry {
    value: Arc<RemoteConfig>,
    fetched_at_ms: i64,
}

/// HTTP source for the remote config, abstracted so tests can inject a mock
/// fetcher without a real network dependency.
#[async_trait::async_trait]
pub trait ConfigSource: Send + Sync {
    async fn fetch(&self) -> anyhow::Result<RemoteConfig>;
}

/// Fetches `{ system_prompt, vips[], businesses[] }` over HTTP GET with a
/// cache-busting query parameter and a `no-store` cache-control hint.
pub struct HttpConfigSource {
    client: reqwest::Client,
    url: String,
}

impl HttpConfigSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait::async_trait]
impl ConfigSource for HttpConfigSource {
    async fn fetch(&self) -> anyhow::Result<RemoteConfig> {
        let buster = uuid::Uuid::new_v4();
        let sep = if self.url.contains('?') { '&' } else { '?' };
        let url = format!("{}{sep}cb={buster}", self.url);
        let resp = self
            .client
            .get(url)
            .header("Cache-Control", "no-store")
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json::<RemoteConfig>().await?)
    }
}

/// In-process singleton cache over a [`ConfigSource`], with TTL and a
/// `force_fresh` bypass. Fetch failures never propagate: the last cached
/// value (or a minimal fallback) is served instead.
pub struct ConfigProvider {
    source: Box<dyn ConfigSource>,
    ttl_ms: i64,
    clock: SharedClock,
    assistant_name: String,
    cache: Mutex<Option<CacheEntry>>,
}

impl ConfigProvider {
    pub fn new(
        source: Box<dyn ConfigSource>,
        ttl_ms: u64,
        clock: SharedClock,
        assistant_name: impl Into<String>,
    ) -> Self {
        Self {
            source,
            ttl_ms: ttl_ms as i64,
            clock,
            assistant_name: assistant_name.into(),
            cache: Mutex::new(None),
        }
    }

    /// Return a config snapshot, refreshing from the source if the cache is
    /// stale (or if `force_fresh` is set). Never errors: on fetch failure,
    /// serves the last cached value, or a minimal fallback if none exists.
    pub async fn get(&self, force_fresh: bool) -> Arc<RemoteConfig> {
        let now = self.clock.now_ms();
        {
            let cache = self.cache.lock().expect("config cache mutex poisoned");
            if !force_fresh {
                if let Some(entry) = cache.as_ref() {
                    if now - entry.fetched_at_ms < self.ttl_ms {
                        return entry.value.clone();
                    }
                }
            }
        }

        match self.source.fetch().await {
            Ok(fresh) => {
                let value = Arc::new(fresh);
                let mut cache = self.cache.lock().expect("config cache mutex poisoned");
                *cache = Some(CacheEntry {
                    value: value.clone(),
                    fetched_at_ms: now,
                });
                value
            }
            Err(err) => {
                tracing::warn!(error = %err, "config provider fetch failed, serving cache/fallback");
                let cache = self.cache.lock().expect("config cache mutex poisoned");
                match cache.as_ref() {
                    Some(entry) => entry.value.clone(),
                    None => Arc::new(RemoteConfig::fallback(&self.assistant_name)),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::clock::FakeClock;

    struct CountingSource {
        calls: AtomicUsize,
        fail: std::sync::atomic::AtomicBool,
    }

    #[async_trait::async_trait]
    impl ConfigSource for CountingSource {
        async fn fetch(&self) -> anyhow::Result<RemoteConfig> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("source down");
            }
            Ok(RemoteConfig {
                system_prompt: "hello".into(),
                vips: vec![],
                businesses: vec![],
            })
        }
    }

    #[tokio::test]
    async fn caches_within_ttl() {
        let clock = FakeClock::new(0);
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            fail: std::sync::atomic::AtomicBool::new(false),
        });

        struct Wrapper(Arc<CountingSource>);
        #[async_trait::async_trait]
        impl ConfigSource for Wrapper {
            async fn fetch(&self) -> anyhow::Result<RemoteConfig> {
                self.0.fetch().await
            }
        }

        let provider = ConfigProvider::new(
            Box::new(Wrapper(source.clone())),
            20_000,
            Arc::new(clock.clone()),
            "Trinity",
        );

        provider.get(false).await;
        provider.get(false).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        clock.advance(21_000);
        provider.get(false).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn serves_fallback_on_first_fetch_failure() {
        let clock = FakeClock::new(0);
        let source = CountingSource {
            calls: AtomicUsize::new(0),
            fail: std::sync::atomic::AtomicBool::new(true),
        };
        let provider =
            ConfigProvider::new(Box::new(source), 20_000, Arc::new(clock), "Trinity");
        let cfg = provider.get(false).await;
        assert_eq!(cfg.system_prompt, "You are Trinity.");
    }
}
