//! Callable tools for the agent loop.
//!
//! Submodules:
//! - `file_search`: content and filename search implementations
//! - `registry`: introspectable schemas + validated dispatch

pub mod file_search;
pub mod registry;

pub use registry::ToolRegistry;
