//! Debug printing of node trees in a JSX-like notation.

use std::fmt;

use crate::node::{Element, Literal, Node};

/// Print `node` as a single-line JSX-like tree.
///
/// ```text
/// <>"Hello, " <Greet props={Greeting { name: "world" }} /> 42</>
/// ```
pub fn debug_node(node: &Node) -> String {
    JsxNode(node).to_string()
}

/// Formats a node in JSX-like notation.
struct JsxNode<'a>(&'a Node);

impl fmt::Display for JsxNode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Node::Literal(literal) => write_literal(f, literal),
            Node::Element(element) => write_element(f, element),
            Node::Array(children) => {
                f.write_str("<>")?;
                for (index, child) in children.iter().enumerate() {
                    if index > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{}", JsxNode(child))?;
                }
                f.write_str("</>")
            }
            Node::Indirect(indirect) => {
                write!(f, "<Indirect>{}</Indirect>", JsxNode(indirect.target()))
            }
        }
    }
}

fn write_literal(f: &mut fmt::Formatter<'_>, literal: &Literal) -> fmt::Result {
    match literal {
        Literal::Absent => f.write_str("undefined"),
        Literal::Null => f.write_str("null"),
        Literal::Bool(value) => write!(f, "{value}"),
        Literal::Number(_) => f.write_str(&literal.to_text()),
        Literal::Text(text) => write!(f, "{text:?}"),
    }
}

fn write_element(f: &mut fmt::Formatter<'_>, element: &Element) -> fmt::Result {
    write!(f, "<{}", element.tag().name())?;
    if let Some(memo) = element.memo_id() {
        write!(f, " memo={memo}")?;
    }
    let props = format!("{:?}", element.props_debug());
    if props != "()" {
        write!(f, " props={{{props}}}")?;
    }
    f.write_str(" />")
}
