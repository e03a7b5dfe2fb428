//! Trellis Core
//!
//! This crate provides the core runtime for the Trellis reactive UI framework.
//! It implements:
//!
//! - Reactive proxies over records, arrays, sets and maps
//! - Effects, computed values and watchers with automatic dependency tracking
//! - A deduplicating job queue flushed on an explicit microtask queue
//! - A keyed tree reconciler driving an abstract host backend
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Proxies, effects, computed values, watchers and refs
//! - `schedule`: Job and microtask queues
//! - `render`: Node trees, the backend contract and the reconciler
//! - `config`: Runtime tunables
//!
//! # Example
//!
//! ```rust,ignore
//! use trellis_core::reactive::{Runtime, Target};
//!
//! let rt = Runtime::new();
//! let state = rt.reactive(Target::record([("count", 0)]));
//!
//! let s = state.clone();
//! let doubled = rt.computed(move || s.get("count").as_f64().unwrap_or_default() * 2.0);
//!
//! let d = doubled.clone();
//! rt.effect(move || println!("doubled: {}", d.get()));
//!
//! state.set("count", 5);
//! // Effect automatically runs, prints: "doubled: 10"
//! ```

pub mod config;
pub mod error;
pub mod reactive;
pub mod render;
pub mod schedule;

pub use config::RuntimeConfig;
pub use error::{ConfigError, ReconcileError, Result};
pub use reactive::Runtime;
