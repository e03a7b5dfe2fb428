//! Rendering
//!
//! This module reconciles render trees against a host surface.
//!
//! A render pass builds a [`Node`] tree; the [`Renderer`] diffs it against
//! the tree it rendered last and applies the minimal set of edits it can find
//! through a [`Backend`]. Wrapping a render pass in an effect re-renders
//! whenever the reactive data it read changes.
//!
//! [`MemoryBackend`] is an in-memory host used by tests and benchmarks.

mod backend;
mod memory;
mod node;
mod renderer;

pub use backend::Backend;
pub use memory::{HostId, HostKind, HostNode, HostOp, MemoryBackend};
pub use node::{Children, Component, Node, NodeKey, NodeKind};
pub use renderer::Renderer;
