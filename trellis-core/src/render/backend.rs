//! The host backend contract.

use std::fmt;
use std::hash::Hash;

use crate::reactive::Value;

/// Operations the renderer needs from the surface it renders onto.
///
/// A handle names one realized host node: an element, a text node or a
/// comment. The backend decides what props mean (attributes, properties,
/// event listeners); the renderer only reports changes.
pub trait Backend {
    type Handle: Clone + Eq + Hash + fmt::Debug;

    fn create_element(&mut self, tag: &str) -> Self::Handle;

    fn create_text(&mut self, content: &str) -> Self::Handle;

    fn create_comment(&mut self, content: &str) -> Self::Handle;

    /// Insert `handle` into `container` before `anchor`, or at the end when
    /// there is no anchor. A handle that already has a parent is moved.
    fn insert(&mut self, handle: &Self::Handle, container: &Self::Handle, anchor: Option<&Self::Handle>);

    /// Set the content of a text or comment node, or replace the children of
    /// an element with text.
    fn set_text(&mut self, handle: &Self::Handle, content: &str);

    /// Reconcile one prop. `new` is `None` when the prop is removed.
    fn patch_prop(&mut self, handle: &Self::Handle, key: &str, old: Option<&Value>, new: Option<&Value>);

    fn parent_of(&self, handle: &Self::Handle) -> Option<Self::Handle>;

    fn remove_child(&mut self, parent: &Self::Handle, handle: &Self::Handle);

    fn next_sibling(&self, handle: &Self::Handle) -> Option<Self::Handle>;

    fn first_child(&self, container: &Self::Handle) -> Option<Self::Handle>;
}
