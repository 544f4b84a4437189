//! # Automation Agent
//!
//! An HTTP service that turns free-text task descriptions into one of a fixed
//! set of file, database and network operations.
//!
//! This library provides:
//! - An HTTP API (`POST /run`, `GET /read`) for task submission and result retrieval
//! - A registry of typed tasks, each with an argument schema and an implementation
//! - A classifier that lets an OpenAI-compatible model pick the task via tool calling
//!
//! ## Architecture
//!
//! Every request follows one straight chain:
//! 1. Receive the task text via the API
//! 2. Ask the model to pick exactly one registered task and fill in its arguments
//! 3. Look the task up, decode the arguments against its schema, confine paths to the data root
//! 4. Run the task and report its outcome
//!
//! ## Example
//!
//! ```rust,ignore
//! use automation_agent::{config::Config, dispatch::Dispatcher};
//!
//! let config = Config::from_env()?;
//! let dispatcher = Dispatcher::from_config(&config)?;
//! let outcome = dispatcher.run("Sort /data/contacts.json by last name").await?;
//! ```

pub mod api;
pub mod config;
pub mod dispatch;
pub mod llm;
pub mod tools;

mod text;

pub use config::Config;
