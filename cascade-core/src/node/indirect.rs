//! Indirect Nodes
//!
//! Lets a foreign tree representation embed nodes from this one without
//! depending on it: the host value is carried opaquely and the evaluator
//! renders the node it points at.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use super::Node;

/// An opaque host value paired with the node it represents.
///
/// The host value is read-only to the evaluator.
#[derive(Clone)]
pub struct IndirectNode {
    host: Arc<dyn Any + Send + Sync>,
    target: Arc<Node>,
}

impl IndirectNode {
    pub fn new<H>(host: H, target: impl Into<Node>) -> Self
    where
        H: Any + Send + Sync,
    {
        Self {
            host: Arc::new(host),
            target: Arc::new(target.into()),
        }
    }

    /// The host value, if it is of type `H`.
    pub fn host<H: Any>(&self) -> Option<&H> {
        self.host.downcast_ref::<H>()
    }

    /// The node rendered in place of the host value.
    pub fn target(&self) -> &Node {
        &self.target
    }

    /// The same host value pointing at a different node.
    pub(crate) fn with_target(&self, target: Node) -> Self {
        Self {
            host: Arc::clone(&self.host),
            target: Arc::new(target),
        }
    }

    /// Whether two indirections share the same host value.
    pub fn same_host(&self, other: &IndirectNode) -> bool {
        Arc::ptr_eq(&self.host, &other.host)
    }
}

impl fmt::Debug for IndirectNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndirectNode")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}
