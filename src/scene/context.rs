//! Scene Context data model (SPEC_FULL.md §3).

use crate::proportions::ProportionInfo;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SceneMode {
    #[default]
    Object,
    Edit,
    Sculpt,
    VertexPaint,
    WeightPaint,
    TexturePaint,
    Pose,
}

impl SceneMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SceneMode::Object => "OBJECT",
            SceneMode::Edit => "EDIT",
            SceneMode::Sculpt => "SCULPT",
            SceneMode::VertexPaint => "VERTEX_PAINT",
            SceneMode::WeightPaint => "WEIGHT_PAINT",
            SceneMode::TexturePaint => "TEXTURE_PAINT",
            SceneMode::Pose => "POSE",
        }
    }

    pub fn parse(s: &str) -> Option<SceneMode> {
        match s {
            "OBJECT" => Some(SceneMode::Object),
            "EDIT" => Some(SceneMode::Edit),
            "SCULPT" => Some(SceneMode::Sculpt),
            "VERTEX_PAINT" => Some(SceneMode::VertexPaint),
            "WEIGHT_PAINT" => Some(SceneMode::WeightPaint),
            "TEXTURE_PAINT" => Some(SceneMode::TexturePaint),
            "POSE" => Some(SceneMode::Pose),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ObjectInfo {
    pub name: String,
    pub type_name: String,
    pub location: (f64, f64, f64),
    pub dimensions: (f64, f64, f64),
    pub selected: bool,
    pub active: bool,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TopologyInfo {
    pub vertices: u64,
    pub edges: u64,
    pub faces: u64,
    pub triangles: u64,
    pub selected_verts: u64,
    pub selected_edges: u64,
    pub selected_faces: u64,
}

impl TopologyInfo {
    pub fn has_selection(&self) -> bool {
        self.selected_verts > 0 || self.selected_edges > 0 || self.selected_faces > 0
    }
}

#[derive(Clone, Debug)]
pub struct SceneContext {
    pub mode: SceneMode,
    pub active_object: Option<String>,
    pub selected_objects: Vec<String>,
    pub objects: Vec<ObjectInfo>,
    pub topology: Option<TopologyInfo>,
    pub proportions: Option<ProportionInfo>,
    pub materials: Vec<String>,
    pub modifiers: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl SceneContext {
    /// The minimal context returned by the Analyzer on host error (§4.6): OBJECT
    /// mode, no selection, empty collections.
    pub fn minimal() -> Self {
        Self {
            mode: SceneMode::Object,
            active_object: None,
            selected_objects: Vec::new(),
            objects: Vec::new(),
            topology: None,
            proportions: None,
            materials: Vec::new(),
            modifiers: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn has_selection(&self) -> bool {
        !self.selected_objects.is_empty()
            || self.topology.as_ref().map(|t| t.has_selection()).unwrap_or(false)
    }

    pub fn active_object_info(&self) -> Option<&ObjectInfo> {
        self.active_object
            .as_ref()
            .and_then(|name| self.objects.iter().find(|o| &o.name == name))
    }
}
