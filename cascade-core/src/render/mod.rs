//! Rendering
//!
//! Turns a [`Node`] into an ordered sequence of [`Frame`]s, each a more
//! complete materialization of the tree than the last, ending in a
//! terminal frame.
//!
//! # Shape of a render
//!
//! Internally every node renders to a stream of steps: zero or more
//! partial frames followed by exactly one terminal frame, or an error. The
//! public [`Render`] handle exposes the partial frames as a [`Stream`] and
//! keeps the terminal frame for [`Render::final_frame`]; awaiting a
//! `Render` directly drives it to completion and returns the terminal
//! frame.
//!
//! ```rust,ignore
//! let mut render = render(tree, RenderOptions::new());
//! while let Some(frame) = render.next().await {
//!     println!("progress: {}", frame?);
//! }
//! println!("final: {}", render.final_frame().unwrap());
//! ```
//!
//! # Laziness and cancellation
//!
//! Nothing is evaluated until the render is polled. Dropping a render tears
//! down every coroutine below it; spans of elements that were still running
//! are closed as abandoned.

mod context;
pub(crate) mod engine;
mod frame;
mod merge;
mod options;
mod renderable;

pub use context::{
    create_context_slot, ContextSlot, Logger, RenderContext, RenderContextBuilder, SlotId,
};
pub use frame::{Frame, FrameItem};
pub use options::{FrameMap, RenderOptions, StopPredicate};
pub use renderable::{EventStream, Renderable, StreamEvent, StreamSender};

use std::fmt;
use std::future::IntoFuture;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use futures_util::future::BoxFuture;
use futures_util::stream::{self, BoxStream, Stream};
use futures_util::{FutureExt, StreamExt};

use crate::error::{RenderError, Result};
use crate::node::Node;

/// One step of an internal render stream.
#[derive(Debug, Clone)]
pub(crate) enum Step {
    Partial(Frame),
    Done(Frame),
}

impl Step {
    pub(crate) fn map_frame(self, map: impl FnOnce(Frame) -> Frame) -> Self {
        match self {
            Step::Partial(frame) => Step::Partial(map(frame)),
            Step::Done(frame) => Step::Done(map(frame)),
        }
    }
}

/// Partial frames followed by exactly one `Done`, or an error.
pub(crate) type StepStream = BoxStream<'static, Result<Step>>;

/// Render `node` under a fresh root context.
pub fn render(node: impl Into<Node>, options: RenderOptions) -> Render {
    RenderContext::new().render_with(node, options)
}

/// An in-flight render.
pub struct Render {
    steps: Option<StepStream>,
    map: Option<FrameMap>,
    append_only: bool,
    last: Option<Frame>,
    in_sync: bool,
    terminal: Option<Frame>,
}

impl Render {
    pub(crate) fn new(steps: StepStream, options: &RenderOptions) -> Self {
        Self {
            steps: Some(steps),
            map: options.frame_map().cloned(),
            append_only: options.is_append_only(),
            last: None,
            in_sync: true,
            terminal: None,
        }
    }

    /// The terminal frame, once the stream of partial frames has ended.
    pub fn final_frame(&self) -> Option<&Frame> {
        self.terminal.as_ref()
    }

    /// Whether the render has stopped, successfully or not.
    pub fn is_finished(&self) -> bool {
        self.steps.is_none()
    }

    /// The remaining steps, for embedding this render inside another.
    pub(crate) fn into_steps(self) -> StepStream {
        let Render {
            steps,
            map,
            terminal,
            ..
        } = self;
        let steps = match (steps, terminal) {
            (Some(steps), _) => steps,
            (None, Some(frame)) => stream::once(async move { Ok(Step::Done(frame)) }).boxed(),
            (None, None) => stream::once(async {
                Err(RenderError::internal("render was already consumed"))
            })
            .boxed(),
        };
        match map {
            Some(map) => steps
                .map(move |step| step.map(|step| step.map_frame(|frame| map(frame))))
                .boxed(),
            None => steps,
        }
    }

    fn apply_map(&self, frame: Frame) -> Frame {
        match &self.map {
            Some(map) => map(frame),
            None => frame,
        }
    }

    /// Whether a partial frame may be delivered in an append-only render.
    ///
    /// Frames are delivered only while every delivered frame extends the
    /// one before it; after a withheld frame, later flagged frames no
    /// longer extend what the caller has seen.
    fn admit_append_only(&mut self, frame: &Frame) -> bool {
        let admitted = frame.is_append_only() && (self.last.is_none() || self.in_sync);
        if !admitted && self.last.is_some() {
            self.in_sync = false;
        }
        admitted
    }
}

impl Stream for Render {
    type Item = Result<Frame>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            let Some(steps) = this.steps.as_mut() else {
                return Poll::Ready(None);
            };
            match ready!(steps.poll_next_unpin(cx)) {
                Some(Ok(Step::Partial(frame))) => {
                    let frame = this.apply_map(frame);
                    if this.last.as_ref() == Some(&frame) {
                        continue;
                    }
                    if this.append_only && !this.admit_append_only(&frame) {
                        tracing::trace!(
                            text_len = frame.text().len(),
                            "withholding frame from append-only render"
                        );
                        continue;
                    }
                    this.last = Some(frame.clone());
                    return Poll::Ready(Some(Ok(frame)));
                }
                Some(Ok(Step::Done(frame))) => {
                    this.terminal = Some(this.apply_map(frame));
                    this.steps = None;
                    return Poll::Ready(None);
                }
                Some(Err(error)) => {
                    this.steps = None;
                    return Poll::Ready(Some(Err(error)));
                }
                None => {
                    this.steps = None;
                    tracing::warn!("render stream ended without a terminal frame");
                    return Poll::Ready(Some(Err(RenderError::internal(
                        "render stream ended without a terminal frame",
                    ))));
                }
            }
        }
    }
}

impl IntoFuture for Render {
    type Output = Result<Frame>;
    type IntoFuture = BoxFuture<'static, Result<Frame>>;

    fn into_future(mut self) -> Self::IntoFuture {
        async move {
            while let Some(frame) = self.next().await {
                frame?;
            }
            self.terminal
                .take()
                .ok_or_else(|| RenderError::internal("render finished without a terminal frame"))
        }
        .boxed()
    }
}

impl fmt::Debug for Render {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Render")
            .field("finished", &self.is_finished())
            .field("append_only", &self.append_only)
            .field("last", &self.last)
            .field("terminal", &self.terminal)
            .finish()
    }
}
