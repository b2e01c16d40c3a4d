//! The narrow external-collaborator trait the Analyzer consumes (SPEC_FULL.md §6a).
//! Grounded on `mcp/client.rs::MCPClient`: one trait, one read-only call, plus a
//! `Null`-style fallback implementation.

use super::context::{ObjectInfo, TopologyInfo};
use crate::error::RouterError;
use async_trait::async_trait;

/// Raw data returned by a single host query, before proportion derivation.
#[derive(Clone, Debug, Default)]
pub struct RawSceneSnapshot {
    pub mode: Option<String>,
    pub active_object: Option<String>,
    pub selected_objects: Vec<String>,
    pub objects: Vec<ObjectInfo>,
    pub topology: Option<TopologyInfo>,
    pub materials: Vec<String>,
    pub modifiers: Vec<String>,
}

#[async_trait]
pub trait HostClient: Send + Sync {
    async fn query_scene(&self) -> Result<RawSceneSnapshot, RouterError>;
}

/// No host wired up: the Analyzer falls back to the minimal context on every call,
/// matching the degraded-capability behavior of §4.6/§7 for an unavailable host.
pub struct NullHostClient;

#[async_trait]
impl HostClient for NullHostClient {
    async fn query_scene(&self) -> Result<RawSceneSnapshot, RouterError> {
        Err(RouterError::external_unavailable("no host client configured"))
    }
}

