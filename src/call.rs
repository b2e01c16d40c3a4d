//! Call records (SPEC_FULL.md §3): the shapes that flow through the pipeline from
//! interception to emission. Grounded on `mcp/tools.rs::ToolCall`, generalized with
//! the provenance fields the Router's correction/override/expansion/firewall stages
//! attach as a call passes through them.

use crate::value::ValueMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who originated an intercepted call (§3): the LLM adapter for a fresh tool call, or
/// the Router itself for a call it is replaying (e.g. a pending-workflow execution).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallSource {
    Llm,
    Router,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InterceptedCall {
    pub tool_name: String,
    pub params: ValueMap,
    pub source: CallSource,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

impl InterceptedCall {
    /// A call as received from the LLM adapter (§4.13 stage 1's default path).
    pub fn new(tool_name: impl Into<String>, params: ValueMap) -> Self {
        Self {
            tool_name: tool_name.into(),
            params,
            source: CallSource::Llm,
            timestamp: Utc::now(),
            prompt: None,
            session_id: None,
        }
    }

    pub fn with_prompt(mut self, prompt: Option<&str>) -> Self {
        self.prompt = prompt.map(str::to_string);
        self
    }

    pub fn with_session_id(mut self, session_id: Option<&str>) -> Self {
        self.session_id = session_id.map(str::to_string);
        self
    }

    /// A call the Router itself replays rather than the LLM adapter issuing directly
    /// (e.g. `execute_pending_workflow`'s synthetic entry point, §3 `source=router`).
    pub fn from_router(tool_name: impl Into<String>, params: ValueMap) -> Self {
        Self {
            tool_name: tool_name.into(),
            params,
            source: CallSource::Router,
            timestamp: Utc::now(),
            prompt: None,
            session_id: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CorrectedCall {
    pub tool_name: String,
    pub params: ValueMap,
    #[serde(default)]
    pub corrections_applied: Vec<String>,
    #[serde(default)]
    pub original_tool_name: Option<String>,
    #[serde(default)]
    pub original_params: Option<ValueMap>,
    #[serde(default)]
    pub is_injected: bool,
}

impl CorrectedCall {
    pub fn from_intercepted(call: &InterceptedCall) -> Self {
        Self {
            tool_name: call.tool_name.clone(),
            params: call.params.clone(),
            corrections_applied: Vec::new(),
            original_tool_name: None,
            original_params: None,
            is_injected: false,
        }
    }

    pub fn new(tool_name: impl Into<String>, params: ValueMap) -> Self {
        Self {
            tool_name: tool_name.into(),
            params,
            corrections_applied: Vec::new(),
            original_tool_name: None,
            original_params: None,
            is_injected: false,
        }
    }

    pub fn injected(tool_name: impl Into<String>, params: ValueMap) -> Self {
        Self {
            tool_name: tool_name.into(),
            params,
            corrections_applied: Vec::new(),
            original_tool_name: None,
            original_params: None,
            is_injected: true,
        }
    }

    pub fn record_correction(&mut self, note: impl Into<String>) {
        self.corrections_applied.push(note.into());
    }

    /// The final `{tool, params}` shape handed back to the LLM adapter (§6).
    pub fn emit(&self) -> EmittedCall {
        EmittedCall {
            tool: self.tool_name.clone(),
            params: self.params.clone(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EmittedCall {
    pub tool: String,
    pub params: ValueMap,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corrected_call_tracks_provenance_when_injected() {
        let call = CorrectedCall::injected("system_set_mode", ValueMap::new());
        assert!(call.is_injected);
        assert!(call.original_tool_name.is_none());
    }

    #[test]
    fn from_intercepted_preserves_name_and_params() {
        let mut params = ValueMap::new();
        params.insert("offset".to_string(), crate::value::Value::Number(1.0));
        let intercepted = InterceptedCall::new("mesh_bevel", params.clone());
        let corrected = CorrectedCall::from_intercepted(&intercepted);
        assert_eq!(corrected.tool_name, "mesh_bevel");
        assert_eq!(corrected.params, params);
        assert!(!corrected.is_injected);
    }
}
