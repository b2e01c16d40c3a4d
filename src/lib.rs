//! Decision pipeline that turns high-level LLM tool calls into validated,
//! context-aware low-level tool call sequences for a 3D-modeling back end.
//! Entry point: [`Supervisor`].

pub mod call;
pub mod config;
pub mod correction;
pub mod ensemble;
pub mod error;
pub mod eval;
pub mod firewall;
pub mod override_engine;
pub mod pattern;
pub mod proportions;
pub mod scene;
pub mod supervisor;
pub mod telemetry;
pub mod tools;
pub mod value;
pub mod workflow;

pub use call::{CorrectedCall, EmittedCall, InterceptedCall};
pub use config::RouterConfig;
pub use error::{ErrorKind, RouterError, RouterResult};
pub use supervisor::{GoalOutcome, Supervisor};
pub use value::{Value, ValueMap};
