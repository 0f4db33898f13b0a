// SPDX-License-Identifier: MIT

//! nodeflow-rs: run node-graph flows built in a visual editor
//!
//! - `flow`: graph model, node behaviors and the execution engine
//! - `adapters`: clients for LLMs, local models, messaging and plain HTTP
//! - `server`: axum surface for saved flows and webhook triggers

pub mod adapters;
pub mod config;
pub mod error;
pub mod flow;
pub mod server;

pub use config::Settings;
pub use error::{AdapterError, FlowError, Result};
