//! Render Context
//!
//! The context is threaded explicitly through every evaluation. It carries:
//!
//! - context-slot values, pushed by provider elements and visible to the
//!   whole subtree below them;
//! - the options of the render in progress;
//! - the tracer and the span that encloses the current element.
//!
//! # Copy-on-write
//!
//! Contexts are cheap to clone. Binding a slot value copies the value map
//! once and shares it with every descendant, so siblings never observe each
//! other's bindings.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;

use super::engine;
use super::options::RenderOptions;
use super::{Render, StepStream};
use crate::node::{Component, Element, ElementId, Node, Tag};
use crate::trace::{SpanId, TracePolicy, TraceSettings, Tracer};

/// Unique identifier for a context slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(u64);

impl SlotId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

type SlotValues = IndexMap<SlotId, Arc<dyn Any + Send + Sync>>;

/// The component currently being evaluated.
#[derive(Clone)]
struct ElementScope {
    id: ElementId,
    component: Tag,
}

/// The environment threaded through a render.
#[derive(Clone)]
pub struct RenderContext {
    values: Arc<SlotValues>,
    options: Arc<RenderOptions>,
    tracing: Option<Arc<TraceSettings>>,
    parent_span: Option<SpanId>,
    scope: Option<ElementScope>,
}

impl RenderContext {
    /// A root context with no tracer.
    pub fn new() -> Self {
        Self {
            values: Arc::new(SlotValues::new()),
            options: Arc::new(RenderOptions::default()),
            tracing: None,
            parent_span: None,
            scope: None,
        }
    }

    pub fn builder() -> RenderContextBuilder {
        RenderContextBuilder::default()
    }

    /// Render `node` with default options, keeping this context's slot
    /// values and tracer.
    pub fn render(&self, node: impl Into<Node>) -> Render {
        self.render_with(node, RenderOptions::default())
    }

    /// Render `node` with explicit options.
    pub fn render_with(&self, node: impl Into<Node>, options: RenderOptions) -> Render {
        let ctx = self.with_options(options.clone());
        Render::new(engine::render_node(node.into(), ctx), &options)
    }

    /// Render `node` with this context's stop predicate, for components
    /// that pass their children through.
    pub fn render_inherited(&self, node: impl Into<Node>) -> Render {
        let options = self.options.inherited();
        self.render_with(node, options)
    }

    pub(crate) fn steps(&self, node: Node) -> StepStream {
        engine::render_node(node, self.clone())
    }

    /// The value bound to `slot` by the nearest enclosing provider, or the
    /// slot's default.
    pub fn get_context_value<T>(&self, slot: &ContextSlot<T>) -> Arc<T>
    where
        T: Any + Send + Sync,
    {
        self.values
            .get(&slot.id)
            .cloned()
            .and_then(|value| value.downcast::<T>().ok())
            .unwrap_or_else(|| Arc::clone(&slot.default))
    }

    /// A child context with `value` bound to `slot`.
    pub fn with_context_value<T>(&self, slot: &ContextSlot<T>, value: T) -> Self
    where
        T: Any + Send + Sync,
    {
        self.with_slot(slot.id, Arc::new(value))
    }

    fn with_slot(&self, slot: SlotId, value: Arc<dyn Any + Send + Sync>) -> Self {
        let mut values = (*self.values).clone();
        values.insert(slot, value);
        Self {
            values: Arc::new(values),
            ..self.clone()
        }
    }

    /// Whether the caller consumes this render as textual deltas.
    pub fn is_append_only_render(&self) -> bool {
        self.options.is_append_only()
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    /// A logger tagged with the component being evaluated.
    pub fn logger(&self) -> Logger {
        Logger {
            component: self.scope.as_ref().map(|scope| scope.component.clone()),
            element: self.scope.as_ref().map(|scope| scope.id),
        }
    }

    pub(crate) fn with_options(&self, options: RenderOptions) -> Self {
        Self {
            options: Arc::new(options),
            ..self.clone()
        }
    }

    pub(crate) fn tracing(&self) -> Option<&TraceSettings> {
        self.tracing.as_deref()
    }

    pub(crate) fn parent_span(&self) -> Option<SpanId> {
        self.parent_span
    }

    pub(crate) fn with_parent_span(&self, span: SpanId) -> Self {
        Self {
            parent_span: Some(span),
            ..self.clone()
        }
    }

    /// The context handed to `element`'s evaluation function.
    pub(crate) fn enter_element(&self, element: &Element) -> Self {
        Self {
            scope: Some(ElementScope {
                id: element.id(),
                component: element.tag().clone(),
            }),
            ..self.clone()
        }
    }
}

impl Default for RenderContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RenderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderContext")
            .field("slots", &self.values.len())
            .field("options", &self.options)
            .field("traced", &self.tracing.is_some())
            .field("parent_span", &self.parent_span)
            .finish()
    }
}

/// Builds a root [`RenderContext`].
#[derive(Default)]
pub struct RenderContextBuilder {
    tracer: Option<Arc<dyn Tracer>>,
    policy: Option<TracePolicy>,
}

impl RenderContextBuilder {
    /// Open a span for every traced element evaluation.
    pub fn tracer<T: Tracer + 'static>(mut self, tracer: T) -> Self {
        self.tracer = Some(Arc::new(tracer));
        self
    }

    /// Choose which elements get their own span. Defaults to all of them.
    pub fn policy<F>(mut self, policy: F) -> Self
    where
        F: Fn(&Element) -> bool + Send + Sync + 'static,
    {
        self.policy = Some(Arc::new(policy));
        self
    }

    pub fn build(self) -> RenderContext {
        let tracing = self.tracer.map(|tracer| {
            Arc::new(TraceSettings::new(tracer, self.policy))
        });
        RenderContext {
            tracing,
            ..RenderContext::new()
        }
    }
}

/// Props of a context provider element.
struct ProviderProps<T> {
    slot: SlotId,
    value: Arc<T>,
    children: Node,
}

impl<T: fmt::Debug> fmt::Debug for ProviderProps<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("value", &self.value)
            .field("children", &self.children)
            .finish()
    }
}

/// A typed context slot.
///
/// Values are bound with [`ContextSlot::provide`] and read with
/// [`RenderContext::get_context_value`].
pub struct ContextSlot<T> {
    id: SlotId,
    default: Arc<T>,
    provider: Component<ProviderProps<T>>,
}

impl<T> Clone for ContextSlot<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            default: Arc::clone(&self.default),
            provider: self.provider.clone(),
        }
    }
}

/// Create a new context slot with a default value.
pub fn create_context_slot<T>(default: T) -> ContextSlot<T>
where
    T: fmt::Debug + Send + Sync + 'static,
{
    let provider = Component::new(
        "ContextProvider",
        |props: &ProviderProps<T>, ctx: &RenderContext| {
            let value: Arc<dyn Any + Send + Sync> = props.value.clone();
            Ok(ctx
                .with_slot(props.slot, value)
                .render_inherited(props.children.clone()))
        },
    );
    ContextSlot {
        id: SlotId::new(),
        default: Arc::new(default),
        provider,
    }
}

impl<T> ContextSlot<T>
where
    T: fmt::Debug + Send + Sync + 'static,
{
    /// A provider element binding `value` for everything under `children`.
    pub fn provide(&self, value: T, children: impl Into<Node>) -> Node {
        Node::Element(self.provider.element(ProviderProps {
            slot: self.id,
            value: Arc::new(value),
            children: children.into(),
        }))
    }

    /// The tag shared by this slot's provider elements.
    pub fn provider_tag(&self) -> &Tag {
        self.provider.tag()
    }

    pub fn default_value(&self) -> &T {
        &self.default
    }
}

/// Component-scoped logging through `tracing`.
#[derive(Debug, Clone)]
pub struct Logger {
    component: Option<Tag>,
    element: Option<ElementId>,
}

impl Logger {
    fn component(&self) -> &str {
        self.component.as_ref().map_or("<root>", |tag| tag.name())
    }

    pub fn trace(&self, message: impl fmt::Display) {
        tracing::trace!(component = self.component(), element = ?self.element, "{message}");
    }

    pub fn debug(&self, message: impl fmt::Display) {
        tracing::debug!(component = self.component(), element = ?self.element, "{message}");
    }

    pub fn info(&self, message: impl fmt::Display) {
        tracing::info!(component = self.component(), element = ?self.element, "{message}");
    }

    pub fn warn(&self, message: impl fmt::Display) {
        tracing::warn!(component = self.component(), element = ?self.element, "{message}");
    }

    pub fn error(&self, message: impl fmt::Display) {
        tracing::error!(component = self.component(), element = ?self.element, "{message}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Theme(&'static str);

    #[test]
    fn missing_binding_reads_the_default() {
        let slot = create_context_slot(Theme("light"));
        let ctx = RenderContext::new();
        assert_eq!(*ctx.get_context_value(&slot), Theme("light"));
    }

    #[test]
    fn bindings_are_copy_on_write() {
        let slot = create_context_slot(Theme("light"));
        let root = RenderContext::new();
        let dark = root.with_context_value(&slot, Theme("dark"));

        assert_eq!(*dark.get_context_value(&slot), Theme("dark"));
        assert_eq!(*root.get_context_value(&slot), Theme("light"));
    }

    #[test]
    fn slots_are_independent() {
        let first = create_context_slot(1u32);
        let second = create_context_slot(2u32);
        let ctx = RenderContext::new().with_context_value(&first, 10);

        assert_eq!(*ctx.get_context_value(&first), 10);
        assert_eq!(*ctx.get_context_value(&second), 2);
    }

    #[test]
    fn entering_an_element_scopes_the_logger() {
        let tag = Tag::new("Scoped");
        let element = Element::new(tag, (), |_ctx: &RenderContext| Ok(""));
        let logger = RenderContext::new().enter_element(&element).logger();
        assert_eq!(logger.component(), "Scoped");
        assert_eq!(logger.element, Some(element.id()));
    }

    #[tokio::test]
    async fn provider_binds_for_its_subtree_only() {
        let slot = create_context_slot("default");
        let reader_slot = slot.clone();
        let reader = Component::new("Reader", move |_: &(), ctx: &RenderContext| {
            Ok(ctx.get_context_value(&reader_slot).to_string())
        });

        let tree = Node::array([
            reader.element(()).into(),
            Node::text("|"),
            slot.provide("inner", reader.element(())),
        ]);

        let frame = RenderContext::new()
            .render(tree)
            .await
            .expect("render should succeed");
        assert_eq!(frame.text(), "default|inner");
    }
}
