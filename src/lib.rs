//! # daybook
//!
//! Core of a single-user to-do list: tasks with a name, description, done
//! flag and due date, stored locally and observed through live queries.
//!
//! ## Architecture
//!
//! ```text
//!   UI action ──▶ TaskService ──▶ writer queue ──▶ TaskStore (SQLite)
//!                     ▲                                  │ commit
//!                     └──────── LiveQuery snapshots ◀────┘
//! ```
//!
//! ## Modules
//! - `task`: the persisted record
//! - `date`: local-midnight normalization and day ranges
//! - `store`: `TaskStore` backends and the live query registry
//! - `service`: draft fields, single writer, error sink
//! - `selection`: bulk selection over the displayed list
//! - `form`: input validation done before calling the service
//! - `config`: environment configuration

pub mod config;
pub mod date;
pub mod form;
pub mod selection;
pub mod service;
pub mod store;
pub mod task;

pub use config::Config;
pub use service::TaskService;
pub use store::{LiveQuery, TaskStore};
pub use task::Task;
