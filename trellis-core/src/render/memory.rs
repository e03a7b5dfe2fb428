//! In-memory backend.
//!
//! [`MemoryBackend`] keeps host nodes in an arena and records every operation
//! the renderer performs, so tests can assert on the exact edit sequence as
//! well as on the resulting tree.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::warn;

use super::backend::Backend;
use crate::reactive::{Callback, Value};

/// Handle of a node in a [`MemoryBackend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostId(u32);

impl HostId {
    pub fn raw(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HostKind {
    Element {
        tag: Arc<str>,
        props: IndexMap<String, Value>,
    },
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone)]
pub struct HostNode {
    pub kind: HostKind,
    parent: Option<HostId>,
    children: Vec<HostId>,
}

impl HostNode {
    fn new(kind: HostKind) -> Self {
        Self {
            kind,
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn parent(&self) -> Option<HostId> {
        self.parent
    }
}

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq)]
pub enum HostOp {
    CreateElement { id: HostId, tag: String },
    CreateText { id: HostId, content: String },
    CreateComment { id: HostId, content: String },
    Insert {
        id: HostId,
        parent: HostId,
        anchor: Option<HostId>,
    },
    SetText { id: HostId, content: String },
    PatchProp {
        id: HostId,
        key: String,
        value: Option<Value>,
    },
    Remove { id: HostId, parent: HostId },
}

impl HostOp {
    /// The node the operation acts on.
    pub fn target(&self) -> HostId {
        match self {
            HostOp::CreateElement { id, .. }
            | HostOp::CreateText { id, .. }
            | HostOp::CreateComment { id, .. }
            | HostOp::Insert { id, .. }
            | HostOp::SetText { id, .. }
            | HostOp::PatchProp { id, .. }
            | HostOp::Remove { id, .. } => *id,
        }
    }
}

/// Arena-backed host tree with an operation log.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    nodes: Vec<HostNode>,
    ops: Vec<HostOp>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a detached container element. Not recorded in the log.
    pub fn create_root(&mut self) -> HostId {
        self.alloc(HostKind::Element {
            tag: Arc::from("root"),
            props: IndexMap::new(),
        })
    }

    pub fn node(&self, id: HostId) -> Option<&HostNode> {
        self.nodes.get(id.0 as usize)
    }

    pub fn children(&self, id: HostId) -> &[HostId] {
        self.node(id).map(|n| n.children.as_slice()).unwrap_or_default()
    }

    /// Every recorded operation, oldest first.
    pub fn ops(&self) -> &[HostOp] {
        &self.ops
    }

    /// Drain the operation log.
    pub fn take_ops(&mut self) -> Vec<HostOp> {
        std::mem::take(&mut self.ops)
    }

    /// The event handler stored under prop `key`, if it is a function.
    pub fn listener(&self, id: HostId, key: &str) -> Option<&Callback> {
        match &self.node(id)?.kind {
            HostKind::Element { props, .. } => props.get(key)?.as_callback(),
            _ => None,
        }
    }

    /// Concatenated text of every descendant text node.
    pub fn text_content(&self, id: HostId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    /// Markup of the children of `id`.
    pub fn inner_html(&self, id: HostId) -> String {
        let mut out = String::new();
        for child in self.children(id) {
            self.write_markup(*child, &mut out);
        }
        out
    }

    /// Markup of `id` itself.
    pub fn serialize(&self, id: HostId) -> String {
        let mut out = String::new();
        self.write_markup(id, &mut out);
        out
    }

    fn alloc(&mut self, kind: HostKind) -> HostId {
        let id = HostId(self.nodes.len() as u32);
        self.nodes.push(HostNode::new(kind));
        id
    }

    fn node_mut(&mut self, id: HostId) -> &mut HostNode {
        match self.nodes.get_mut(id.0 as usize) {
            Some(node) => node,
            None => panic!("unknown host node {id}"),
        }
    }

    fn detach(&mut self, id: HostId) {
        if let Some(parent) = self.node_mut(id).parent.take() {
            self.node_mut(parent).children.retain(|c| *c != id);
        }
    }

    fn collect_text(&self, id: HostId, out: &mut String) {
        let Some(node) = self.node(id) else { return };
        match &node.kind {
            HostKind::Text(text) => out.push_str(text),
            HostKind::Comment(_) => {}
            HostKind::Element { .. } => {
                for child in &node.children {
                    self.collect_text(*child, out);
                }
            }
        }
    }

    fn write_markup(&self, id: HostId, out: &mut String) {
        let Some(node) = self.node(id) else { return };
        match &node.kind {
            HostKind::Text(text) => out.push_str(&escape(text)),
            HostKind::Comment(text) => {
                out.push_str("<!--");
                out.push_str(text);
                out.push_str("-->");
            }
            HostKind::Element { tag, props } => {
                out.push('<');
                out.push_str(tag);
                for (key, value) in props {
                    match value {
                        Value::Function(_) | Value::Undefined | Value::Null | Value::Bool(false) => {}
                        Value::Bool(true) => {
                            out.push(' ');
                            out.push_str(key);
                        }
                        other => {
                            out.push_str(&format!(" {key}=\"{}\"", escape(&other.to_string())));
                        }
                    }
                }
                out.push('>');
                for child in &node.children {
                    self.write_markup(*child, out);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
        }
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

impl Backend for MemoryBackend {
    type Handle = HostId;

    fn create_element(&mut self, tag: &str) -> HostId {
        let id = self.alloc(HostKind::Element {
            tag: Arc::from(tag),
            props: IndexMap::new(),
        });
        self.ops.push(HostOp::CreateElement {
            id,
            tag: tag.to_owned(),
        });
        id
    }

    fn create_text(&mut self, content: &str) -> HostId {
        let id = self.alloc(HostKind::Text(content.to_owned()));
        self.ops.push(HostOp::CreateText {
            id,
            content: content.to_owned(),
        });
        id
    }

    fn create_comment(&mut self, content: &str) -> HostId {
        let id = self.alloc(HostKind::Comment(content.to_owned()));
        self.ops.push(HostOp::CreateComment {
            id,
            content: content.to_owned(),
        });
        id
    }

    fn insert(&mut self, handle: &HostId, container: &HostId, anchor: Option<&HostId>) {
        let (id, parent) = (*handle, *container);
        self.detach(id);

        let siblings = &self.node_mut(parent).children;
        let position = match anchor {
            Some(anchor) => match siblings.iter().position(|c| c == anchor) {
                Some(index) => index,
                None => {
                    warn!(node = %id, anchor = %anchor, "anchor is not a child of the container, appending");
                    siblings.len()
                }
            },
            None => siblings.len(),
        };

        self.node_mut(parent).children.insert(position, id);
        self.node_mut(id).parent = Some(parent);
        self.ops.push(HostOp::Insert {
            id,
            parent,
            anchor: anchor.copied(),
        });
    }

    fn set_text(&mut self, handle: &HostId, content: &str) {
        let id = *handle;
        let is_element = match &mut self.node_mut(id).kind {
            HostKind::Text(text) | HostKind::Comment(text) => {
                *text = content.to_owned();
                false
            }
            HostKind::Element { .. } => true,
        };

        if is_element {
            for child in std::mem::take(&mut self.node_mut(id).children) {
                self.node_mut(child).parent = None;
            }
            if !content.is_empty() {
                let text = self.alloc(HostKind::Text(content.to_owned()));
                self.node_mut(text).parent = Some(id);
                self.node_mut(id).children.push(text);
            }
        }

        self.ops.push(HostOp::SetText {
            id,
            content: content.to_owned(),
        });
    }

    fn patch_prop(&mut self, handle: &HostId, key: &str, _old: Option<&Value>, new: Option<&Value>) {
        let id = *handle;
        match &mut self.node_mut(id).kind {
            HostKind::Element { props, .. } => match new {
                Some(value) => {
                    props.insert(key.to_owned(), value.clone());
                }
                None => {
                    props.shift_remove(key);
                }
            },
            _ => panic!("props can only be set on elements (node {id})"),
        }
        self.ops.push(HostOp::PatchProp {
            id,
            key: key.to_owned(),
            value: new.cloned(),
        });
    }

    fn parent_of(&self, handle: &HostId) -> Option<HostId> {
        self.node(*handle)?.parent
    }

    fn remove_child(&mut self, parent: &HostId, handle: &HostId) {
        let (id, parent) = (*handle, *parent);
        self.node_mut(parent).children.retain(|c| *c != id);
        self.node_mut(id).parent = None;
        self.ops.push(HostOp::Remove { id, parent });
    }

    fn next_sibling(&self, handle: &HostId) -> Option<HostId> {
        let parent = self.node(*handle)?.parent?;
        let siblings = self.children(parent);
        let index = siblings.iter().position(|c| c == handle)?;
        siblings.get(index + 1).copied()
    }

    fn first_child(&self, container: &HostId) -> Option<HostId> {
        self.children(*container).first().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_respects_anchors_and_moves() {
        let mut host = MemoryBackend::new();
        let root = host.create_root();
        let a = host.create_text("a");
        let b = host.create_text("b");
        let c = host.create_text("c");

        host.insert(&a, &root, None);
        host.insert(&c, &root, None);
        host.insert(&b, &root, Some(&c));
        assert_eq!(host.children(root), &[a, b, c]);

        // Re-inserting moves instead of duplicating.
        host.insert(&c, &root, Some(&a));
        assert_eq!(host.children(root), &[c, a, b]);
        assert_eq!(host.next_sibling(&a), Some(b));
        assert_eq!(host.next_sibling(&b), None);
    }

    #[test]
    fn set_text_on_elements_replaces_children() {
        let mut host = MemoryBackend::new();
        let root = host.create_root();
        let div = host.create_element("div");
        let span = host.create_element("span");
        host.insert(&div, &root, None);
        host.insert(&span, &div, None);

        host.set_text(&div, "hello");
        assert_eq!(host.parent_of(&span), None);
        assert_eq!(host.inner_html(root), "<div>hello</div>");
    }

    #[test]
    fn serializer_renders_props_and_skips_listeners() {
        let mut host = MemoryBackend::new();
        let root = host.create_root();
        let button = host.create_element("button");
        let handler = Callback::new(|_| Value::Undefined);
        host.patch_prop(&button, "class", None, Some(&Value::from("primary")));
        host.patch_prop(&button, "disabled", None, Some(&Value::from(true)));
        host.patch_prop(&button, "onClick", None, Some(&Value::Function(handler.clone())));
        host.insert(&button, &root, None);

        assert_eq!(
            host.inner_html(root),
            "<button class=\"primary\" disabled></button>"
        );
        assert_eq!(host.listener(button, "onClick"), Some(&handler));
        assert_eq!(host.listener(button, "class"), None);
    }

    #[test]
    fn root_creation_is_not_logged() {
        let mut host = MemoryBackend::new();
        let root = host.create_root();
        let text = host.create_text("x");
        host.insert(&text, &root, None);
        host.remove_child(&root, &text);

        assert_eq!(
            host.take_ops(),
            vec![
                HostOp::CreateText {
                    id: text,
                    content: "x".into()
                },
                HostOp::Insert {
                    id: text,
                    parent: root,
                    anchor: None
                },
                HostOp::Remove { id: text, parent: root },
            ]
        );
        assert!(host.ops().is_empty());
    }
}
