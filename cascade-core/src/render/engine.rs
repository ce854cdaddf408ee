//! Render Engine
//!
//! The recursive procedure behind every render.
//!
//! # Algorithm
//!
//! - A literal renders to a single terminal frame holding its text.
//! - An array renders all children concurrently and merges their frames
//!   (see [`super::merge`]).
//! - An indirect node renders its target.
//! - An element matching the stop predicate is returned unexpanded.
//! - Any other element goes through the decorator chain: memoized elements
//!   subscribe to their shared evaluation, everything else is wrapped in a
//!   span (when traced) and evaluated exactly once.
//!
//! Evaluating an element yields a [`Renderable`]:
//!
//! - a node is rendered recursively;
//! - a deferred value is awaited, then its result is rendered;
//! - a coroutine is driven event by event. Every progress value is
//!   rendered to completion, surfacing its frames as the element's frames,
//!   and the returned value becomes the terminal frame.
//!
//! Consecutive identical frames are never emitted.

use async_stream::try_stream;
use futures_util::stream::{self, Stream};
use futures_util::StreamExt;

use super::context::RenderContext;
use super::frame::Frame;
use super::merge::ArrayMerge;
use super::renderable::{EventStream, Renderable, StreamEvent};
use super::{Step, StepStream};
use crate::error::{RenderError, Result};
use crate::node::{Element, Node};
use crate::{memo, trace};

/// Box a step stream, pinning down its item type for inference.
pub(crate) fn boxed<S>(steps: S) -> StepStream
where
    S: Stream<Item = Result<Step>> + Send + 'static,
{
    Box::pin(steps)
}

/// A stream holding only a terminal frame.
pub(crate) fn done(frame: Frame) -> StepStream {
    stream::once(async move { Ok(Step::Done(frame)) }).boxed()
}

/// Render any node to a stream of steps.
pub(crate) fn render_node(node: Node, ctx: RenderContext) -> StepStream {
    match node {
        Node::Literal(literal) => done(Frame::from_text(literal.to_text()).with_append_only(true)),
        Node::Array(mut children) => match children.len() {
            0 => done(Frame::empty().with_append_only(true)),
            1 => render_node(children.remove(0), ctx),
            _ => {
                let streams = children
                    .into_iter()
                    .map(|child| render_node(child, ctx.clone()))
                    .collect();
                ArrayMerge::new(streams).boxed()
            }
        },
        Node::Element(element) => render_element(element, ctx),
        Node::Indirect(indirect) => render_node(indirect.target().clone(), ctx),
    }
}

fn render_element(element: Element, ctx: RenderContext) -> StepStream {
    if ctx.options().should_stop(&element) {
        tracing::trace!(
            component = element.tag().name(),
            element = %element.id(),
            "stop predicate matched"
        );
        return done(Frame::from_element(element));
    }
    match element.memo_cell().cloned() {
        Some(cell) => memo::subscribe(cell, element, ctx),
        None => trace::traced(element, ctx),
    }
}

/// Invoke `element`'s evaluation function on first poll and render what
/// it returns.
pub(crate) fn evaluate(element: Element, ctx: RenderContext) -> StepStream {
    boxed(try_stream! {
        let scope = ctx.enter_element(&element);
        tracing::trace!(component = element.tag().name(), element = %element.id(), "evaluating");
        let renderable = element.evaluate(&scope)?;
        let mut steps = render_renderable(renderable, scope);
        while let Some(step) = steps.next().await {
            yield step?;
        }
    })
}

pub(crate) fn render_renderable(renderable: Renderable, ctx: RenderContext) -> StepStream {
    match renderable {
        Renderable::Node(node) => render_node(node, ctx),
        Renderable::Render(render) => render.into_steps(),
        Renderable::Deferred(future) => boxed(try_stream! {
            let resolved = future.await?;
            let mut steps = render_renderable(resolved, ctx);
            while let Some(step) = steps.next().await {
                yield step?;
            }
        }),
        Renderable::Stream(events) => render_events(events, ctx),
    }
}

/// Drive a coroutine.
///
/// Before the append-only marker every progress value replaces the
/// element's output. After it, progress values are appended to the output
/// committed so far and the frames are flagged append-only.
fn render_events(mut events: EventStream, ctx: RenderContext) -> StepStream {
    boxed(try_stream! {
        let mut append_only = false;
        let mut current = Frame::empty();

        while let Some(event) = events.next().await {
            let (renderable, terminal) = match event? {
                StreamEvent::Emit(value) => (value, false),
                StreamEvent::Return(value) => (value, true),
                StreamEvent::AppendOnly(initial) => {
                    if !append_only {
                        append_only = true;
                        tracing::trace!(
                            committed_len = current.text().len(),
                            "stream switched to append-only"
                        );
                    }
                    match initial {
                        Some(value) => (value, false),
                        None => continue,
                    }
                }
            };

            let base = if append_only { current.clone() } else { Frame::empty() };
            let mut first = true;
            let mut finished = None;
            let mut steps = render_renderable(renderable, ctx.clone());
            while let Some(step) = steps.next().await {
                let (frame, is_done) = match step? {
                    Step::Partial(frame) => (frame, false),
                    Step::Done(frame) => (frame, true),
                };
                let extends = append_only && (first || frame.is_append_only());
                first = false;
                let combined = base.joined(&frame).with_append_only(extends);
                if is_done {
                    finished = Some(combined);
                    break;
                }
                if combined != current {
                    current = combined.clone();
                    yield Step::Partial(combined);
                }
            }

            let frame = match finished {
                Some(frame) => frame,
                None => Err(RenderError::internal(
                    "progress value ended without a terminal frame",
                ))?,
            };
            if terminal {
                yield Step::Done(frame);
                return;
            }
            if frame != current {
                current = frame.clone();
                yield Step::Partial(frame);
            }
        }

        yield Step::Done(current.clone().with_append_only(append_only));
    })
}
