//! Node Model
//!
//! A render tree is built from four kinds of [`Node`]:
//!
//! - **Literals**: strings, numbers, booleans, null and absent values. They
//!   are fully resolved and render directly to text.
//! - **Elements**: frozen component instances. An element is evaluated at
//!   most once per render path, and exactly once when memoized.
//! - **Arrays**: ordered children rendered concurrently and recombined.
//! - **Indirect nodes**: opaque host values that point at the node they
//!   represent inside this tree.
//!
//! # Identity
//!
//! Elements are immutable once created. Their identity is the shared
//! allocation behind them, which makes reference equality a stable key for
//! memoization and for locating elements in partially rendered frames.

mod element;
mod indirect;

pub use element::{Component, Element, ElementId, ElementProps, Tag, TagId};
pub use indirect::IndirectNode;

pub(crate) use element::Evaluate;

use std::fmt;

/// A fully resolved leaf value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Literal {
    /// No value at all. Renders as empty text.
    #[default]
    Absent,

    /// An explicit null. Renders as empty text.
    Null,

    /// A boolean. Renders as empty text so conditionals can be inlined.
    Bool(bool),

    /// A number, rendered in its shortest textual form.
    Number(f64),

    /// A string, rendered verbatim.
    Text(String),
}

impl Literal {
    /// The text this literal contributes to a frame.
    pub fn to_text(&self) -> String {
        match self {
            Literal::Absent | Literal::Null | Literal::Bool(_) => String::new(),
            Literal::Number(n) if n.is_infinite() => {
                if n.is_sign_positive() {
                    "Infinity".to_string()
                } else {
                    "-Infinity".to_string()
                }
            }
            Literal::Number(n) => number_text(*n),
            Literal::Text(text) => text.clone(),
        }
    }
}

/// Shortest round-trip form; exponent notation outside `[1e-6, 1e21)`.
fn number_text(n: f64) -> String {
    if n == 0.0 {
        return "0".to_string();
    }
    if (1e-6..1e21).contains(&n.abs()) {
        return n.to_string();
    }
    let formatted = format!("{n:e}");
    match formatted.split_once('e') {
        Some((mantissa, exponent)) if !exponent.starts_with('-') => {
            format!("{mantissa}e+{exponent}")
        }
        _ => formatted,
    }
}

/// A node in the render tree.
#[derive(Clone)]
pub enum Node {
    /// A leaf value.
    Literal(Literal),

    /// A component instance.
    Element(Element),

    /// Positional children, rendered concurrently.
    Array(Vec<Node>),

    /// A host value standing in for another node.
    Indirect(IndirectNode),
}

impl Node {
    /// The empty node.
    pub fn empty() -> Self {
        Node::Literal(Literal::Absent)
    }

    /// A text node.
    pub fn text(text: impl Into<String>) -> Self {
        Node::Literal(Literal::Text(text.into()))
    }

    /// An array node from any sequence of nodes.
    pub fn array<I, N>(children: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<Node>,
    {
        Node::Array(children.into_iter().map(Into::into).collect())
    }

    /// The element behind this node, looking through indirection.
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(element) => Some(element),
            Node::Indirect(indirect) => indirect.target().as_element(),
            Node::Literal(_) | Node::Array(_) => None,
        }
    }
}

impl Default for Node {
    fn default() -> Self {
        Node::empty()
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&crate::debug::debug_node(self))
    }
}

impl From<Literal> for Node {
    fn from(literal: Literal) -> Self {
        Node::Literal(literal)
    }
}

impl From<&str> for Node {
    fn from(text: &str) -> Self {
        Node::text(text)
    }
}

impl From<String> for Node {
    fn from(text: String) -> Self {
        Node::text(text)
    }
}

impl From<bool> for Node {
    fn from(value: bool) -> Self {
        Node::Literal(Literal::Bool(value))
    }
}

impl From<()> for Node {
    fn from(_: ()) -> Self {
        Node::empty()
    }
}

macro_rules! number_into_node {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Node {
                fn from(value: $ty) -> Self {
                    Node::Literal(Literal::Number(value as f64))
                }
            }
        )*
    };
}

number_into_node!(i32, i64, u32, u64, usize, f32, f64);

impl From<Element> for Node {
    fn from(element: Element) -> Self {
        Node::Element(element)
    }
}

impl From<IndirectNode> for Node {
    fn from(indirect: IndirectNode) -> Self {
        Node::Indirect(indirect)
    }
}

impl From<Vec<Node>> for Node {
    fn from(children: Vec<Node>) -> Self {
        Node::Array(children)
    }
}

impl<T: Into<Node>> From<Option<T>> for Node {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or_default()
    }
}
