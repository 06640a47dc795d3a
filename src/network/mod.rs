//! Network Layer
//!
//! Async plumbing around the simulation. Nothing here touches game state
//! directly; it all flows through channels into the session task.

pub mod session;
pub mod results;

pub use session::{MatchSession, SessionConfig, SessionError, SessionHandle, SessionId};
pub use results::{spawn_results_task, JsonLinesSink, LogSink, ResultsSink, SinkError};
