//! Managed-runtime bridge for FlushGuard
//!
//! Implements the core's `MethodChannel` over an in-process engine thread.
//!
//! # Architecture
//!
//! The managed runtime owns named method handlers. The host side only holds
//! channel handles:
//! - `RuntimeEngine` spawns the engine thread and owns the handler registry
//! - `EngineChannel` queues calls to the engine; replies come back through
//!   the caller's callback, on the engine thread
//! - Stopping the engine answers calls already queued, then drops the
//!   callbacks of calls sent afterwards, which requesters observe as an
//!   unanswered call and fall back from

pub mod channel;
pub mod engine;
pub mod handlers;

pub use channel::EngineChannel;
pub use engine::{Handler, RuntimeEngine};
pub use handlers::{flush_handler, flush_handler_with};
