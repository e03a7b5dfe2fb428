//! Render Nodes
//!
//! This module defines the tree handed to the [`Renderer`](super::Renderer).
//! A node describes what should be on screen; it holds no host handles. The
//! renderer keeps its own mounted copy of the last tree it rendered.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::reactive::Value;

/// Identity of a node among its siblings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeKey {
    Int(i64),
    Str(Arc<str>),
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKey::Int(n) => write!(f, "{n}"),
            NodeKey::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for NodeKey {
    fn from(n: i64) -> Self {
        NodeKey::Int(n)
    }
}

impl From<i32> for NodeKey {
    fn from(n: i32) -> Self {
        NodeKey::Int(n.into())
    }
}

impl From<usize> for NodeKey {
    fn from(n: usize) -> Self {
        NodeKey::Int(n as i64)
    }
}

impl From<&str> for NodeKey {
    fn from(s: &str) -> Self {
        NodeKey::Str(Arc::from(s))
    }
}

impl From<String> for NodeKey {
    fn from(s: String) -> Self {
        NodeKey::Str(Arc::from(s))
    }
}

type RenderFn = dyn Fn() -> Node + Send + Sync;

/// A render function producing a subtree.
///
/// Two components are the same type only if they share the render function,
/// so clone a component instead of rebuilding it from the same closure.
#[derive(Clone)]
pub struct Component {
    name: Arc<str>,
    render: Arc<RenderFn>,
}

impl Component {
    pub fn new<F>(name: impl Into<Arc<str>>, render: F) -> Self
    where
        F: Fn() -> Node + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            render: Arc::new(render),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Produce the component's subtree.
    pub fn render(&self) -> Node {
        (self.render)()
    }

    /// Whether both handles share a render function.
    pub fn ptr_eq(&self, other: &Component) -> bool {
        Arc::ptr_eq(&self.render, &other.render)
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Component").field(&self.name).finish()
    }
}

/// Children of an element.
#[derive(Debug, Clone, Default)]
pub enum Children {
    #[default]
    None,
    /// Text content set directly on the element.
    Text(String),
    Nodes(Vec<Node>),
}

/// The variant of a node.
#[derive(Debug, Clone)]
pub enum NodeKind {
    Element {
        tag: Arc<str>,
        props: IndexMap<String, Value>,
        children: Children,
    },
    Text(String),
    Comment(String),
    /// Children rendered straight into the parent, with no host node of their
    /// own.
    Fragment(Vec<Node>),
    Component(Component),
}

impl NodeKind {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            NodeKind::Element { .. } => "element",
            NodeKind::Text(_) => "text",
            NodeKind::Comment(_) => "comment",
            NodeKind::Fragment(_) => "fragment",
            NodeKind::Component(_) => "component",
        }
    }
}

/// A node of a render tree.
///
/// # Example
///
/// ```rust,ignore
/// let list = Node::element("ul").with_children(
///     items.iter().map(|item| {
///         Node::element("li")
///             .with_key(item.id)
///             .with_text(item.label.clone())
///     }),
/// );
/// ```
#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    /// Sibling identity for keyed reconciliation. A node without a key never
    /// matches an old node.
    pub key: Option<NodeKey>,
}

impl Node {
    fn from_kind(kind: NodeKind) -> Self {
        Self { kind, key: None }
    }

    pub fn element(tag: impl Into<Arc<str>>) -> Self {
        Self::from_kind(NodeKind::Element {
            tag: tag.into(),
            props: IndexMap::new(),
            children: Children::None,
        })
    }

    pub fn text(content: impl Into<String>) -> Self {
        Self::from_kind(NodeKind::Text(content.into()))
    }

    pub fn comment(content: impl Into<String>) -> Self {
        Self::from_kind(NodeKind::Comment(content.into()))
    }

    pub fn fragment(children: impl IntoIterator<Item = Node>) -> Self {
        Self::from_kind(NodeKind::Fragment(children.into_iter().collect()))
    }

    pub fn component(component: &Component) -> Self {
        Self::from_kind(NodeKind::Component(component.clone()))
    }

    pub fn with_key(mut self, key: impl Into<NodeKey>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Set a prop. Panics unless the node is an element.
    pub fn with_prop(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.element_mut("with_prop").0.insert(name.into(), value.into());
        self
    }

    /// Append a child node. Replaces text children.
    pub fn with_child(mut self, child: Node) -> Self {
        let children = self.element_mut("with_child").1;
        match children {
            Children::Nodes(nodes) => nodes.push(child),
            other => *other = Children::Nodes(vec![child]),
        }
        self
    }

    /// Replace the children with `children`.
    pub fn with_children(mut self, children: impl IntoIterator<Item = Node>) -> Self {
        *self.element_mut("with_children").1 = Children::Nodes(children.into_iter().collect());
        self
    }

    /// Replace the children with text content.
    pub fn with_text(mut self, content: impl Into<String>) -> Self {
        *self.element_mut("with_text").1 = Children::Text(content.into());
        self
    }

    fn element_mut(&mut self, op: &str) -> (&mut IndexMap<String, Value>, &mut Children) {
        match &mut self.kind {
            NodeKind::Element {
                props, children, ..
            } => (props, children),
            other => panic!("`{op}` requires an element node, found {}", other.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_fill_elements() {
        let node = Node::element("div")
            .with_key(1)
            .with_prop("id", "main")
            .with_child(Node::text("a"))
            .with_child(Node::text("b"));

        assert_eq!(node.key, Some(NodeKey::Int(1)));
        let NodeKind::Element { tag, props, children } = &node.kind else {
            panic!("expected an element");
        };
        assert_eq!(&**tag, "div");
        assert_eq!(props.get("id"), Some(&Value::from("main")));
        assert!(matches!(children, Children::Nodes(nodes) if nodes.len() == 2));
    }

    #[test]
    fn components_compare_by_render_function() {
        let a = Component::new("a", || Node::text("a"));
        let same = a.clone();
        let other = Component::new("a", || Node::text("a"));

        assert!(a.ptr_eq(&same));
        assert!(!a.ptr_eq(&other));
    }

    #[test]
    #[should_panic(expected = "requires an element node")]
    fn props_on_text_nodes_panic() {
        let _ = Node::text("x").with_prop("id", 1);
    }
}
