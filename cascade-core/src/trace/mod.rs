//! Render Tracing
//!
//! Opens one span per traced element evaluation. Spans nest the same way
//! elements do: a child element's span is parented to the span of the
//! element that produced it.
//!
//! # Span lifecycle
//!
//! - A span opens when its element is first polled, never at element
//!   construction.
//! - It closes exactly once: with the terminal frame's text, with the
//!   error that ended the evaluation, or as abandoned when the render is
//!   dropped first.
//! - On error, the element's descendants are torn down before its own span
//!   closes, so no descendant span outlives an ancestor that reported the
//!   failure.
//!
//! # Memoized elements
//!
//! The first evaluation of a memoized element gets an `owner` span with the
//! usual subtree beneath it. Every other consumer gets a single `link` span
//! pointing at the owner's span.
//!
//! Two tracers ship with the crate: [`RecordingTracer`] keeps every span in
//! memory for inspection and [`TracingTracer`] forwards spans to the
//! `tracing` ecosystem.

mod bridge;
mod recording;

pub use bridge::TracingTracer;
pub use recording::{RecordingTracer, SpanRecord};

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_stream::stream;
use futures_util::StreamExt;

use crate::error::{RenderError, Result};
use crate::memo::MemoId;
use crate::node::Element;
use crate::render::engine::{self, boxed};
use crate::render::{Frame, RenderContext, Step, StepStream};

/// Unique identifier for a span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpanId(u64);

impl SpanId {
    /// Allocate a fresh, process-unique span id.
    pub fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a span was closed.
#[derive(Debug, Clone, PartialEq)]
pub enum SpanStatus {
    /// The element finished; `output` is its terminal frame as text.
    Ok { output: String },

    /// The element failed.
    Error { error: RenderError },

    /// The render was dropped before the element finished.
    Abandoned,
}

impl SpanStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, SpanStatus::Ok { .. })
    }

    fn from_outcome(outcome: &Result<Frame>) -> Self {
        match outcome {
            Ok(frame) => SpanStatus::Ok {
                output: frame.to_string(),
            },
            Err(error) => SpanStatus::Error {
                error: error.clone(),
            },
        }
    }
}

/// What a tracer is told when a span starts.
#[derive(Debug, Clone, Copy)]
pub struct SpanRequest<'a> {
    /// The element being evaluated.
    pub element: &'a Element,

    /// The span of the nearest traced ancestor.
    pub parent: Option<SpanId>,

    /// For memo followers: the span of the evaluation they joined.
    pub link: Option<SpanId>,
}

/// An open span.
pub trait Span: Send {
    fn id(&self) -> SpanId;

    fn set_attribute(&mut self, key: &str, value: String);

    /// Close the span. Called exactly once.
    fn end(self: Box<Self>, status: SpanStatus);
}

/// A sink for render spans.
pub trait Tracer: Send + Sync {
    fn start_span(&self, request: SpanRequest<'_>) -> Box<dyn Span>;
}

/// Decides which elements get their own span.
pub type TracePolicy = Arc<dyn Fn(&Element) -> bool + Send + Sync>;

/// The tracer and policy of a root context.
#[derive(Clone)]
pub(crate) struct TraceSettings {
    tracer: Arc<dyn Tracer>,
    policy: Option<TracePolicy>,
}

impl TraceSettings {
    pub(crate) fn new(tracer: Arc<dyn Tracer>, policy: Option<TracePolicy>) -> Self {
        Self { tracer, policy }
    }

    fn should_trace(&self, element: &Element) -> bool {
        self.policy.as_ref().map_or(true, |policy| policy(element))
    }
}

/// Why a span is being opened.
#[derive(Debug, Clone, Copy)]
pub(crate) enum SpanKind {
    Plain,
    MemoOwner(MemoId),
    MemoLink {
        memo: MemoId,
        owner: Option<SpanId>,
    },
}

/// Closes its span exactly once; as abandoned if dropped while open.
pub(crate) struct SpanGuard {
    id: SpanId,
    span: Option<Box<dyn Span>>,
}

impl SpanGuard {
    pub(crate) fn id(&self) -> SpanId {
        self.id
    }

    pub(crate) fn close(&mut self, status: SpanStatus) {
        if let Some(span) = self.span.take() {
            span.end(status);
        }
    }

    pub(crate) fn close_with(&mut self, outcome: &Result<Frame>) {
        self.close(SpanStatus::from_outcome(outcome));
    }
}

impl Drop for SpanGuard {
    fn drop(&mut self) {
        if let Some(span) = self.span.take() {
            tracing::trace!(span = %self.id, "closing abandoned span");
            span.end(SpanStatus::Abandoned);
        }
    }
}

/// Open a span for `element` if the context is traced and the policy
/// selects it.
pub(crate) fn open_span(
    ctx: &RenderContext,
    element: &Element,
    kind: SpanKind,
) -> Option<SpanGuard> {
    let settings = ctx.tracing()?;
    if !settings.should_trace(element) {
        return None;
    }

    let link = match kind {
        SpanKind::MemoLink { owner, .. } => owner,
        SpanKind::Plain | SpanKind::MemoOwner(_) => None,
    };
    let mut span = settings.tracer.start_span(SpanRequest {
        element,
        parent: ctx.parent_span(),
        link,
    });
    span.set_attribute("component", element.tag().name().to_string());
    span.set_attribute("element.id", element.id().to_string());
    match kind {
        SpanKind::Plain => {}
        SpanKind::MemoOwner(memo) => {
            span.set_attribute("memo.id", memo.to_string());
            span.set_attribute("memo.role", "owner".to_string());
        }
        SpanKind::MemoLink { memo, .. } => {
            span.set_attribute("memo.id", memo.to_string());
            span.set_attribute("memo.role", "link".to_string());
        }
    }

    Some(SpanGuard {
        id: span.id(),
        span: Some(span),
    })
}

/// Evaluate `element` inside its own span, when traced.
pub(crate) fn traced(element: Element, ctx: RenderContext) -> StepStream {
    if ctx.tracing().is_none() {
        return engine::evaluate(element, ctx);
    }
    boxed(stream! {
        let mut steps = match open_span(&ctx, &element, SpanKind::Plain) {
            Some(guard) => {
                let inner = ctx.with_parent_span(guard.id());
                guarded(engine::evaluate(element, inner), guard)
            }
            None => engine::evaluate(element, ctx),
        };
        while let Some(step) = steps.next().await {
            yield step;
        }
    })
}

/// Pass `steps` through, closing `guard` with the outcome.
pub(crate) fn guarded(mut steps: StepStream, mut guard: SpanGuard) -> StepStream {
    boxed(stream! {
        loop {
            match steps.next().await {
                Some(Ok(Step::Partial(frame))) => yield Ok(Step::Partial(frame)),
                Some(Ok(Step::Done(frame))) => {
                    let outcome = Ok(frame);
                    guard.close_with(&outcome);
                    yield outcome.map(Step::Done);
                    break;
                }
                Some(Err(error)) => {
                    drop(steps);
                    let outcome = Err(error);
                    guard.close_with(&outcome);
                    yield outcome.map(Step::Done);
                    break;
                }
                None => {
                    drop(steps);
                    let outcome = Err(RenderError::internal(
                        "element ended without a terminal frame",
                    ));
                    guard.close_with(&outcome);
                    yield outcome.map(Step::Done);
                    break;
                }
            }
        }
    })
}
