//! CLI command implementations
//!
//! Commands are organized by task:
//! - `core` - Shared utilities (config, CSV loading, pipeline construction)
//! - `predict` - Forecast only
//! - `optimize` - Forecast plus agent explanation and actions, optional email
//! - `serve` - Web server command
//! - `health` - Agent backend check
//! - `prompts` - Prompt library management commands

pub mod core;
pub mod health;
pub mod optimize;
pub mod predict;
pub mod prompts;
pub mod serve;

// Re-export command functions for main.rs
pub use core::*;
pub use health::*;
pub use optimize::*;
pub use predict::*;
pub use prompts::*;
pub use serve::*;
