//! Tree Reconciler
//!
//! The renderer diffs a new [`Node`] tree against the tree it rendered last
//! into the same container and applies the difference through a [`Backend`].
//!
//! # Matching
//!
//! Two nodes are the same type when they are the same variant and, for
//! elements, share the tag, or, for components, share the render function.
//! A node replacing one of a different type unmounts the old one and mounts
//! in its place.
//!
//! # Keyed Children
//!
//! Sibling lists are reconciled with a single forward pass. Each new child
//! looks for an old sibling with the same key. The pass remembers the largest
//! old index matched so far; a match found at a smaller old index has fallen
//! behind and is moved right after its new predecessor. Unmatched children
//! are mounted at their position and old children nobody matched are
//! unmounted at the end.
//!
//! The pass is not move-minimal: moving the last child to the front moves
//! every other child instead. A child without a key never matches, so
//! unkeyed lists are rebuilt.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::debug;

use super::backend::Backend;
use super::node::{Children, Component, Node, NodeKey, NodeKind};
use crate::error::{ReconcileError, Result};
use crate::reactive::Value;

enum MountedChildren<H> {
    None,
    Text(String),
    Nodes(Vec<Mounted<H>>),
}

enum MountedKind<H> {
    Element {
        tag: Arc<str>,
        handle: H,
        props: IndexMap<String, Value>,
        children: MountedChildren<H>,
    },
    Text {
        handle: H,
        content: String,
    },
    Comment {
        handle: H,
        content: String,
    },
    Fragment(Vec<Mounted<H>>),
    Component {
        component: Component,
        subtree: Box<Mounted<H>>,
    },
}

/// A node as it was last rendered, paired with its host handles.
struct Mounted<H> {
    kind: MountedKind<H>,
    key: Option<NodeKey>,
}

impl<H: Clone> Mounted<H> {
    fn same_type(&self, node: &Node) -> bool {
        match (&self.kind, &node.kind) {
            (MountedKind::Element { tag, .. }, NodeKind::Element { tag: next, .. }) => tag == next,
            (MountedKind::Text { .. }, NodeKind::Text(_))
            | (MountedKind::Comment { .. }, NodeKind::Comment(_))
            | (MountedKind::Fragment(_), NodeKind::Fragment(_)) => true,
            (MountedKind::Component { component, .. }, NodeKind::Component(next)) => component.ptr_eq(next),
            _ => false,
        }
    }

    /// Top-level host handles, in document order. Fragments and components
    /// contribute the handles of their contents.
    fn host_handles(&self, out: &mut Vec<H>) {
        match &self.kind {
            MountedKind::Element { handle, .. }
            | MountedKind::Text { handle, .. }
            | MountedKind::Comment { handle, .. } => out.push(handle.clone()),
            MountedKind::Fragment(children) => {
                for child in children {
                    child.host_handles(out);
                }
            }
            MountedKind::Component { subtree, .. } => subtree.host_handles(out),
        }
    }

    fn first_handle(&self) -> Option<H> {
        match &self.kind {
            MountedKind::Element { handle, .. }
            | MountedKind::Text { handle, .. }
            | MountedKind::Comment { handle, .. } => Some(handle.clone()),
            MountedKind::Fragment(children) => children.iter().find_map(Mounted::first_handle),
            MountedKind::Component { subtree, .. } => subtree.first_handle(),
        }
    }

    fn last_handle(&self) -> Option<H> {
        match &self.kind {
            MountedKind::Element { handle, .. }
            | MountedKind::Text { handle, .. }
            | MountedKind::Comment { handle, .. } => Some(handle.clone()),
            MountedKind::Fragment(children) => children.iter().rev().find_map(Mounted::last_handle),
            MountedKind::Component { subtree, .. } => subtree.last_handle(),
        }
    }
}

/// Where a sibling list starts.
enum Front<H> {
    /// At the container's first child: the list is all of its children.
    FirstChild,
    /// Before the given handle (or at the end): the list is a fragment.
    Before(Option<H>),
}

/// Renders node trees into containers of a [`Backend`].
///
/// # Example
///
/// ```rust,ignore
/// let mut host = MemoryBackend::new();
/// let root = host.create_root();
/// let mut renderer = Renderer::new(host);
///
/// renderer.render(Some(Node::element("p").with_text("hello")), &root)?;
/// assert_eq!(renderer.backend().inner_html(root), "<p>hello</p>");
/// ```
pub struct Renderer<B: Backend> {
    backend: B,
    roots: HashMap<B::Handle, Mounted<B::Handle>>,
}

impl<B: Backend> Renderer<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            roots: HashMap::new(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn into_backend(self) -> B {
        self.backend
    }

    /// Whether a tree is currently rendered into `container`.
    pub fn is_mounted(&self, container: &B::Handle) -> bool {
        self.roots.contains_key(container)
    }

    /// Top-level host handles of the tree rendered into `container`.
    pub fn host_handles(&self, container: &B::Handle) -> Vec<B::Handle> {
        let mut out = Vec::new();
        if let Some(root) = self.roots.get(container) {
            root.host_handles(&mut out);
        }
        out
    }

    /// Render `node` into `container`, patching the previous tree. `None`
    /// unmounts the previous tree.
    ///
    /// On error the container is left unmanaged: the record of the previous
    /// tree is dropped, whatever host nodes were already changed stay as they
    /// are, and the next render mounts from scratch.
    pub fn render(&mut self, node: Option<Node>, container: &B::Handle) -> Result<()> {
        let old = self.roots.remove(container);
        match node {
            Some(node) => {
                let mounted = self.patch(old, node, container, None)?;
                self.roots.insert(container.clone(), mounted);
            }
            None => {
                if let Some(old) = old {
                    self.unmount(old)?;
                }
            }
        }
        Ok(())
    }

    fn patch(
        &mut self,
        old: Option<Mounted<B::Handle>>,
        node: Node,
        container: &B::Handle,
        anchor: Option<B::Handle>,
    ) -> Result<Mounted<B::Handle>> {
        let mut anchor = anchor;
        let old = match old {
            Some(old) if !old.same_type(&node) => {
                // The replacement takes the old node's place; an old node
                // without handles keeps the caller's anchor.
                if let Some(last) = old.last_handle() {
                    anchor = self.backend.next_sibling(&last);
                }
                self.unmount(old)?;
                None
            }
            other => other,
        };

        let Node { kind, key } = node;
        let kind = match (kind, old.map(|m| m.kind)) {
            (
                NodeKind::Element {
                    tag,
                    props,
                    children,
                },
                Some(MountedKind::Element {
                    handle,
                    props: old_props,
                    children: old_children,
                    ..
                }),
            ) => self.patch_element(tag, handle, old_props, props, old_children, children)?,
            (
                NodeKind::Element {
                    tag,
                    props,
                    children,
                },
                _,
            ) => self.mount_element(tag, props, children, container, anchor.as_ref())?,

            (NodeKind::Text(content), Some(MountedKind::Text { handle, content: old })) => {
                if content != old {
                    self.backend.set_text(&handle, &content);
                }
                MountedKind::Text { handle, content }
            }
            (NodeKind::Text(content), _) => {
                let handle = self.backend.create_text(&content);
                self.backend.insert(&handle, container, anchor.as_ref());
                MountedKind::Text { handle, content }
            }

            (NodeKind::Comment(content), Some(MountedKind::Comment { handle, content: old })) => {
                if content != old {
                    self.backend.set_text(&handle, &content);
                }
                MountedKind::Comment { handle, content }
            }
            (NodeKind::Comment(content), _) => {
                let handle = self.backend.create_comment(&content);
                self.backend.insert(&handle, container, anchor.as_ref());
                MountedKind::Comment { handle, content }
            }

            (NodeKind::Fragment(children), Some(MountedKind::Fragment(old_children))) => {
                let front = old_children
                    .iter()
                    .find_map(Mounted::first_handle)
                    .or(anchor);
                let children = self.patch_keyed(old_children, children, container, Front::Before(front))?;
                MountedKind::Fragment(children)
            }
            (NodeKind::Fragment(children), _) => {
                let mut mounted = Vec::with_capacity(children.len());
                for child in children {
                    mounted.push(self.patch(None, child, container, anchor.clone())?);
                }
                MountedKind::Fragment(mounted)
            }

            (NodeKind::Component(component), Some(MountedKind::Component { subtree, .. })) => {
                let next = component.render();
                let subtree = self.patch(Some(*subtree), next, container, anchor)?;
                MountedKind::Component {
                    component,
                    subtree: Box::new(subtree),
                }
            }
            (NodeKind::Component(component), _) => {
                let next = component.render();
                let subtree = self.patch(None, next, container, anchor)?;
                debug!(component = component.name(), "mounted component");
                MountedKind::Component {
                    component,
                    subtree: Box::new(subtree),
                }
            }
        };

        Ok(Mounted { kind, key })
    }

    fn mount_element(
        &mut self,
        tag: Arc<str>,
        props: IndexMap<String, Value>,
        children: Children,
        container: &B::Handle,
        anchor: Option<&B::Handle>,
    ) -> Result<MountedKind<B::Handle>> {
        let handle = self.backend.create_element(&tag);

        let children = match children {
            Children::None => MountedChildren::None,
            Children::Text(text) => {
                self.backend.set_text(&handle, &text);
                MountedChildren::Text(text)
            }
            Children::Nodes(nodes) => {
                let mut mounted = Vec::with_capacity(nodes.len());
                for node in nodes {
                    mounted.push(self.patch(None, node, &handle, None)?);
                }
                MountedChildren::Nodes(mounted)
            }
        };

        for (key, value) in &props {
            self.backend.patch_prop(&handle, key, None, Some(value));
        }

        self.backend.insert(&handle, container, anchor);
        debug!(tag = %tag, handle = ?handle, "mounted element");

        Ok(MountedKind::Element {
            tag,
            handle,
            props,
            children,
        })
    }

    fn patch_element(
        &mut self,
        tag: Arc<str>,
        handle: B::Handle,
        old_props: IndexMap<String, Value>,
        props: IndexMap<String, Value>,
        old_children: MountedChildren<B::Handle>,
        children: Children,
    ) -> Result<MountedKind<B::Handle>> {
        for (key, value) in &props {
            let previous = old_props.get(key);
            if previous != Some(value) {
                self.backend.patch_prop(&handle, key, previous, Some(value));
            }
        }
        for (key, value) in &old_props {
            if !props.contains_key(key) {
                self.backend.patch_prop(&handle, key, Some(value), None);
            }
        }

        let children = self.patch_children(old_children, children, &handle)?;

        Ok(MountedKind::Element {
            tag,
            handle,
            props,
            children,
        })
    }

    fn patch_children(
        &mut self,
        old: MountedChildren<B::Handle>,
        new: Children,
        container: &B::Handle,
    ) -> Result<MountedChildren<B::Handle>> {
        let children = match (old, new) {
            (MountedChildren::Nodes(old), Children::Nodes(new)) => {
                MountedChildren::Nodes(self.patch_keyed(old, new, container, Front::FirstChild)?)
            }
            (old, Children::Nodes(new)) => {
                if let MountedChildren::Text(_) = old {
                    self.backend.set_text(container, "");
                }
                let mut mounted = Vec::with_capacity(new.len());
                for node in new {
                    mounted.push(self.patch(None, node, container, None)?);
                }
                MountedChildren::Nodes(mounted)
            }
            (old, Children::Text(text)) => {
                match old {
                    MountedChildren::Text(previous) if previous == text => {}
                    MountedChildren::Nodes(nodes) => {
                        for node in nodes {
                            self.unmount(node)?;
                        }
                        self.backend.set_text(container, &text);
                    }
                    _ => self.backend.set_text(container, &text),
                }
                MountedChildren::Text(text)
            }
            (old, Children::None) => {
                match old {
                    MountedChildren::Nodes(nodes) => {
                        for node in nodes {
                            self.unmount(node)?;
                        }
                    }
                    MountedChildren::Text(_) => self.backend.set_text(container, ""),
                    MountedChildren::None => {}
                }
                MountedChildren::None
            }
        };
        Ok(children)
    }

    fn patch_keyed(
        &mut self,
        old: Vec<Mounted<B::Handle>>,
        new: Vec<Node>,
        container: &B::Handle,
        front: Front<B::Handle>,
    ) -> Result<Vec<Mounted<B::Handle>>> {
        let mut old: Vec<Option<Mounted<B::Handle>>> = old.into_iter().map(Some).collect();
        let mut mounted: Vec<Mounted<B::Handle>> = Vec::with_capacity(new.len());
        let mut last_index = 0;

        for node in new {
            let matched = node.key.as_ref().and_then(|key| {
                old.iter()
                    .position(|slot| slot.as_ref().and_then(|o| o.key.as_ref()) == Some(key))
            });

            match matched {
                Some(index) => {
                    let previous = old[index].take();
                    let anchor = self.anchor_after(&mounted, container, &front);
                    let current = self.patch(previous, node, container, anchor.clone())?;
                    if index < last_index {
                        self.move_before(&current, container, anchor);
                    } else {
                        last_index = index;
                    }
                    mounted.push(current);
                }
                None => {
                    let anchor = self.anchor_after(&mounted, container, &front);
                    mounted.push(self.patch(None, node, container, anchor)?);
                }
            }
        }

        for stale in old.into_iter().flatten() {
            self.unmount(stale)?;
        }

        Ok(mounted)
    }

    /// The handle a node following `placed` must be inserted before.
    fn anchor_after(
        &self,
        placed: &[Mounted<B::Handle>],
        container: &B::Handle,
        front: &Front<B::Handle>,
    ) -> Option<B::Handle> {
        match placed.iter().rev().find_map(Mounted::last_handle) {
            Some(last) => self.backend.next_sibling(&last),
            None => match front {
                Front::FirstChild => self.backend.first_child(container),
                Front::Before(anchor) => anchor.clone(),
            },
        }
    }

    fn move_before(&mut self, node: &Mounted<B::Handle>, container: &B::Handle, anchor: Option<B::Handle>) {
        let mut handles = Vec::new();
        node.host_handles(&mut handles);
        if anchor.is_some() && handles.first() == anchor.as_ref() {
            return;
        }

        for handle in &handles {
            self.backend.insert(handle, container, anchor.as_ref());
        }
        debug!(handles = ?handles, anchor = ?anchor, "moved node");
    }

    fn unmount(&mut self, node: Mounted<B::Handle>) -> Result<()> {
        match node.kind {
            MountedKind::Element {
                tag,
                handle,
                props,
                children,
            } => {
                self.release_element(&handle, props, children);
                self.detach(&handle, "element")?;
                debug!(tag = %tag, handle = ?handle, "unmounted element");
            }
            MountedKind::Text { handle, .. } => self.detach(&handle, "text")?,
            MountedKind::Comment { handle, .. } => self.detach(&handle, "comment")?,
            MountedKind::Fragment(children) => {
                for child in children {
                    self.unmount(child)?;
                }
            }
            MountedKind::Component { component, subtree } => {
                self.unmount(*subtree)?;
                debug!(component = component.name(), "unmounted component");
            }
        }
        Ok(())
    }

    /// Unbind the props of a subtree leaving the host tree with its parent.
    fn release(&mut self, node: Mounted<B::Handle>) {
        match node.kind {
            MountedKind::Element {
                handle,
                props,
                children,
                ..
            } => self.release_element(&handle, props, children),
            MountedKind::Fragment(children) => {
                for child in children {
                    self.release(child);
                }
            }
            MountedKind::Component { subtree, .. } => self.release(*subtree),
            MountedKind::Text { .. } | MountedKind::Comment { .. } => {}
        }
    }

    fn release_element(
        &mut self,
        handle: &B::Handle,
        props: IndexMap<String, Value>,
        children: MountedChildren<B::Handle>,
    ) {
        for (key, value) in &props {
            self.backend.patch_prop(handle, key, Some(value), None);
        }
        if let MountedChildren::Nodes(children) = children {
            for child in children {
                self.release(child);
            }
        }
    }

    fn detach(&mut self, handle: &B::Handle, kind: &'static str) -> Result<()> {
        let parent = self
            .backend
            .parent_of(handle)
            .ok_or(ReconcileError::NotMounted { kind })?;
        self.backend.remove_child(&parent, handle);
        Ok(())
    }
}
