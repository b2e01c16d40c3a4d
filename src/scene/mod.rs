pub mod analyzer;
pub mod context;
pub mod host;

pub use analyzer::SceneContextAnalyzer;
pub use context::{ObjectInfo, SceneContext, SceneMode, TopologyInfo};
pub use host::{HostClient, NullHostClient, RawSceneSnapshot};
