//! Elements and Components
//!
//! A [`Component`] is a named evaluation function. Calling
//! [`Component::element`] freezes a set of parameters into an [`Element`]:
//! an immutable record of `{ tag, props, evaluate }` shared behind an `Arc`.

use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::Result;
use crate::memo::{MemoCell, MemoId};
use crate::render::{RenderContext, Renderable};

/// The type-erased evaluation function stored on an element.
pub(crate) type Evaluate = Arc<dyn Fn(&RenderContext) -> Result<Renderable> + Send + Sync>;

/// Unique identifier for a component type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TagId(u64);

impl TagId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// The identity of a component type.
///
/// Two tags are equal only if they were produced by the same
/// [`Tag::new`] call, regardless of their names.
#[derive(Clone)]
pub struct Tag {
    id: TagId,
    name: Arc<str>,
}

impl Tag {
    /// Create a new, distinct tag.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            id: TagId::new(),
            name: name.into(),
        }
    }

    pub fn id(&self) -> TagId {
        self.id
    }

    /// The display name of the component.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl PartialEq for Tag {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Tag {}

impl Hash for Tag {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.id.0)
    }
}

/// Unique identifier for an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(u64);

impl ElementId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Parameters frozen into an element.
///
/// Implemented for every `Debug + Send + Sync + 'static` type.
pub trait ElementProps: Any + fmt::Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;
}

impl<T> ElementProps for T
where
    T: Any + fmt::Debug + Send + Sync,
{
    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct ElementInner {
    id: ElementId,
    tag: Tag,
    props: Arc<dyn ElementProps>,
    evaluate: Evaluate,
    memo: Option<Arc<MemoCell>>,
}

/// A frozen component instance.
///
/// Cloning an element is cheap and preserves its identity.
#[derive(Clone)]
pub struct Element {
    inner: Arc<ElementInner>,
}

impl Element {
    /// Build an element from a tag, its parameters and an evaluation
    /// function.
    pub fn new<P, F, R>(tag: Tag, props: P, evaluate: F) -> Self
    where
        P: fmt::Debug + Send + Sync + 'static,
        F: Fn(&RenderContext) -> Result<R> + Send + Sync + 'static,
        R: Into<Renderable>,
    {
        let evaluate: Evaluate = Arc::new(move |ctx: &RenderContext| -> Result<Renderable> {
            evaluate(ctx).map(Into::into)
        });
        Self::from_parts(tag, Arc::new(props), evaluate, None)
    }

    fn from_parts(
        tag: Tag,
        props: Arc<dyn ElementProps>,
        evaluate: Evaluate,
        memo: Option<Arc<MemoCell>>,
    ) -> Self {
        Self {
            inner: Arc::new(ElementInner {
                id: ElementId::new(),
                tag,
                props,
                evaluate,
                memo,
            }),
        }
    }

    pub fn id(&self) -> ElementId {
        self.inner.id
    }

    pub fn tag(&self) -> &Tag {
        &self.inner.tag
    }

    /// Whether this element is an instance of the given component.
    pub fn is(&self, tag: &Tag) -> bool {
        self.inner.tag == *tag
    }

    /// The element's parameters, if they are of type `P`.
    pub fn props<P: Any>(&self) -> Option<&P> {
        let props: &dyn ElementProps = &*self.inner.props;
        props.as_any().downcast_ref::<P>()
    }

    pub(crate) fn props_debug(&self) -> &dyn ElementProps {
        &*self.inner.props
    }

    /// Whether two handles refer to the same element.
    pub fn ptr_eq(&self, other: &Element) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// The memo id, if this element was produced by [`crate::memo`].
    pub fn memo_id(&self) -> Option<MemoId> {
        self.inner.memo.as_ref().map(|cell| cell.id())
    }

    pub(crate) fn memo_cell(&self) -> Option<&Arc<MemoCell>> {
        self.inner.memo.as_ref()
    }

    /// A new element sharing this one's tag, props and evaluation function,
    /// attached to a fresh memo cell.
    pub(crate) fn memoized(&self) -> Element {
        Self::from_parts(
            self.inner.tag.clone(),
            Arc::clone(&self.inner.props),
            Arc::clone(&self.inner.evaluate),
            Some(Arc::new(MemoCell::new())),
        )
    }

    pub(crate) fn evaluate(&self, ctx: &RenderContext) -> Result<Renderable> {
        (self.inner.evaluate)(ctx)
    }
}

impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Element {}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element")
            .field("id", &self.inner.id)
            .field("tag", &self.inner.tag)
            .field("props", &self.inner.props)
            .field("memo_id", &self.memo_id())
            .finish()
    }
}

type ComponentFn<P> = Arc<dyn Fn(&P, &RenderContext) -> Result<Renderable> + Send + Sync>;

/// A reusable component definition.
///
/// # Example
///
/// ```rust,ignore
/// let greet = Component::new("Greet", |name: &String, _ctx| Ok(format!("Hello, {name}!")));
/// let node = greet.element("world".to_string());
/// ```
pub struct Component<P> {
    tag: Tag,
    func: ComponentFn<P>,
}

impl<P> Clone for Component<P> {
    fn clone(&self) -> Self {
        Self {
            tag: self.tag.clone(),
            func: Arc::clone(&self.func),
        }
    }
}

impl<P> Component<P>
where
    P: fmt::Debug + Send + Sync + 'static,
{
    /// Define a component. Every call creates a distinct [`Tag`].
    pub fn new<F, R>(name: impl Into<Arc<str>>, func: F) -> Self
    where
        F: Fn(&P, &RenderContext) -> Result<R> + Send + Sync + 'static,
        R: Into<Renderable>,
    {
        let func: ComponentFn<P> =
            Arc::new(move |props: &P, ctx: &RenderContext| -> Result<Renderable> {
                func(props, ctx).map(Into::into)
            });
        Self {
            tag: Tag::new(name),
            func,
        }
    }

    pub fn tag(&self) -> &Tag {
        &self.tag
    }

    /// Freeze `props` into a new element of this component.
    pub fn element(&self, props: P) -> Element {
        let props = Arc::new(props);
        let captured = Arc::clone(&props);
        let func = Arc::clone(&self.func);
        let evaluate: Evaluate = Arc::new(move |ctx: &RenderContext| func(&captured, ctx));
        Element::from_parts(self.tag.clone(), props, evaluate, None)
    }
}

impl<P> fmt::Debug for Component<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component").field("tag", &self.tag).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Greeting {
        name: String,
    }

    fn greet() -> Component<Greeting> {
        Component::new("Greet", |props: &Greeting, _ctx: &RenderContext| {
            Ok(format!("Hello, {}!", props.name))
        })
    }

    #[test]
    fn tags_compare_by_identity() {
        let a = Tag::new("Same");
        let b = Tag::new("Same");
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn elements_share_component_tag() {
        let component = greet();
        let first = component.element(Greeting { name: "a".into() });
        let second = component.element(Greeting { name: "b".into() });

        assert!(first.is(component.tag()));
        assert!(second.is(component.tag()));
        assert_ne!(first.id(), second.id());
        assert!(!first.ptr_eq(&second));
        assert!(first.ptr_eq(&first.clone()));
    }

    #[test]
    fn props_downcast_to_their_type() {
        let element = greet().element(Greeting { name: "x".into() });
        assert_eq!(element.props::<Greeting>().map(|p| p.name.as_str()), Some("x"));
        assert!(element.props::<String>().is_none());
    }

    #[test]
    fn memoized_copy_has_new_identity_and_memo_id() {
        let element = greet().element(Greeting { name: "x".into() });
        assert!(element.memo_id().is_none());

        let memoized = element.memoized();
        assert!(memoized.memo_id().is_some());
        assert!(!memoized.ptr_eq(&element));
        assert_eq!(memoized.tag(), element.tag());
    }
}
