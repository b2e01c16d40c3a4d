//! Scene Context Analyzer (SPEC_FULL.md §4.6): queries the host, caches with a TTL,
//! and computes derived proportions. Grounded on the teacher's
//! `tokio::sync::RwLock`-guarded caches in `core/session.rs::SessionManager`.

use super::context::{SceneContext, SceneMode};
use super::host::HostClient;
use crate::proportions::ProportionInfo;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

struct CacheEntry {
    context: SceneContext,
    fetched_at: Instant,
}

pub struct SceneContextAnalyzer {
    host: Arc<dyn HostClient>,
    ttl: Duration,
    enabled: bool,
    cache: RwLock<Option<CacheEntry>>,
}

impl SceneContextAnalyzer {
    pub fn new(host: Arc<dyn HostClient>, ttl_seconds: f64, cache_enabled: bool) -> Self {
        Self {
            host,
            ttl: Duration::from_secs_f64(ttl_seconds.max(0.0)),
            enabled: cache_enabled,
            cache: RwLock::new(None),
        }
    }

    /// Returns the cached context if still fresh, otherwise re-queries the host. On
    /// host error, returns the minimal context (§4.6) rather than failing.
    pub async fn analyze(&self) -> SceneContext {
        if self.enabled {
            if let Some(entry) = self.cache.read().await.as_ref() {
                if entry.fetched_at.elapsed() < self.ttl {
                    return entry.context.clone();
                }
            }
        }
        let context = self.fetch_fresh().await;
        if self.enabled {
            let mut guard = self.cache.write().await;
            *guard = Some(CacheEntry {
                context: context.clone(),
                fetched_at: Instant::now(),
            });
        }
        context
    }

    async fn fetch_fresh(&self) -> SceneContext {
        match self.host.query_scene().await {
            Ok(snapshot) => {
                let mode = snapshot
                    .mode
                    .as_deref()
                    .and_then(SceneMode::parse)
                    .unwrap_or_default();
                let proportions = snapshot
                    .active_object
                    .as_ref()
                    .and_then(|name| snapshot.objects.iter().find(|o| &o.name == name))
                    .map(|o| ProportionInfo::from_dimensions(o.dimensions.0, o.dimensions.1, o.dimensions.2));
                SceneContext {
                    mode,
                    active_object: snapshot.active_object,
                    selected_objects: snapshot.selected_objects,
                    objects: snapshot.objects,
                    topology: snapshot.topology,
                    proportions,
                    materials: snapshot.materials,
                    modifiers: snapshot.modifiers,
                    timestamp: chrono::Utc::now(),
                }
            }
            Err(_) => SceneContext::minimal(),
        }
    }

    /// Invalidates the cache so the next `analyze` re-queries the host.
    pub async fn invalidate(&self) {
        let mut guard = self.cache.write().await;
        *guard = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RouterError;
    use crate::scene::context::{ObjectInfo, TopologyInfo};
    use crate::scene::host::RawSceneSnapshot;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHost {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl HostClient for CountingHost {
        async fn query_scene(&self) -> Result<RawSceneSnapshot, RouterError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(RouterError::external_unavailable("down"));
            }
            Ok(RawSceneSnapshot {
                mode: Some("EDIT".to_string()),
                active_object: Some("Cube".to_string()),
                selected_objects: vec!["Cube".to_string()],
                objects: vec![ObjectInfo {
                    name: "Cube".to_string(),
                    type_name: "MESH".to_string(),
                    location: (0.0, 0.0, 0.0),
                    dimensions: (2.0, 2.0, 2.0),
                    selected: true,
                    active: true,
                }],
                topology: Some(TopologyInfo::default()),
                materials: vec![],
                modifiers: vec![],
            })
        }
    }

    #[tokio::test]
    async fn caches_within_ttl_and_refetches_after() {
        let host = Arc::new(CountingHost { calls: AtomicUsize::new(0), fail: false });
        let analyzer = SceneContextAnalyzer::new(host.clone(), 60.0, true);
        let _ = analyzer.analyze().await;
        let _ = analyzer.analyze().await;
        assert_eq!(host.calls.load(Ordering::SeqCst), 1);

        analyzer.invalidate().await;
        let _ = analyzer.analyze().await;
        assert_eq!(host.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn host_error_yields_minimal_context() {
        let host = Arc::new(CountingHost { calls: AtomicUsize::new(0), fail: true });
        let analyzer = SceneContextAnalyzer::new(host, 60.0, true);
        let ctx = analyzer.analyze().await;
        assert_eq!(ctx.mode, SceneMode::Object);
        assert!(ctx.objects.is_empty());
    }
}
