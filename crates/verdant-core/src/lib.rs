//! # Verdant Core Library
//!
//! Focus-driven forest simulation. Sustained attention grows a forest of
//! trees; sustained distraction lights wildfires that spread through it;
//! recovered focus puts them out and lets burnt trees heal.
//!
//! The library follows a CLI-first layout: every operation is reachable
//! through [`FocusEngine`] or the message-style [`commands`] surface, and
//! the `verdant` binary is a thin layer over the same calls.
//!
//! ## Architecture
//!
//! - **Storage**: [`SharedStateStore`] of camelCase JSON documents over
//!   SQLite (or memory), with compare-and-swap updates; TOML [`Config`]
//! - **Focus**: activity monitoring, URL classification and focus scoring,
//!   with an optional OpenAI-compatible analyzer
//! - **Session**: the session state machine and score smoothing
//! - **Forest**: growth and wildfire engines, pure functions over
//!   [`ForestState`]
//! - **Engine / Runtime**: orchestration and the periodic timer loops
//!
//! ## Key Components
//!
//! - [`FocusEngine`]: one tick of scoring, growth and fire at a time
//! - [`Monitor`]: scoring, wildfire and idle-check loops
//! - [`Command`] / [`CommandResponse`]: request/response surface for UIs

pub mod commands;
pub mod engine;
pub mod error;
pub mod events;
pub mod focus;
pub mod forest;
pub mod runtime;
pub mod session;
pub mod storage;

pub use commands::{dispatch, dispatch_json, Command, CommandResponse};
pub use engine::{ApiCheck, FocusEngine};
pub use error::{ConfigError, CoreError, ScoringError, StoreError};
pub use events::Event;
pub use focus::{ApiConfig, FocusMetrics, FocusScorer, Provider};
pub use forest::{ForestGrowthEngine, ForestState, Tree, TreeStatus, WildfireEngine};
pub use runtime::Monitor;
pub use session::{Session, SessionManager, SessionPhase};
pub use storage::{Config, Database, SharedStateStore};
