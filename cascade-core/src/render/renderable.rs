//! Renderables
//!
//! What a component hands back to the renderer. There are three shapes:
//!
//! - a [`Node`], rendered immediately;
//! - a deferred value, awaited and then rendered;
//! - a stream of [`StreamEvent`]s, the coroutine form. Each yielded value
//!   is rendered as a progress frame and the returned value becomes the
//!   element's terminal frame.
//!
//! A component may also return an in-flight [`Render`] of another node, in
//! which case that render's frames become its own.
//!
//! # Channel-based coroutines
//!
//! [`Renderable::stream`] turns an async producer into a coroutine. The
//! producer pushes progress through a [`StreamSender`] backed by a channel
//! with capacity one, so every `emit(..).await` suspends until the renderer
//! has pulled the previous value. The producer future is polled inline by
//! the render that consumes it; dropping the render drops the producer.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::future::BoxFuture;
use futures_util::stream::{BoxStream, Stream};
use futures_util::{FutureExt, StreamExt};
use tokio::sync::mpsc;

use super::frame::Frame;
use super::Render;
use crate::error::{RenderError, Result};
use crate::node::{Element, IndirectNode, Literal, Node};

/// A coroutine message.
pub enum StreamEvent {
    /// A progress value.
    Emit(Renderable),

    /// Switch the rest of the stream to append-only mode, optionally
    /// appending an initial value.
    AppendOnly(Option<Renderable>),

    /// The terminal value.
    Return(Renderable),
}

impl fmt::Debug for StreamEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamEvent::Emit(value) => f.debug_tuple("Emit").field(value).finish(),
            StreamEvent::AppendOnly(initial) => f.debug_tuple("AppendOnly").field(initial).finish(),
            StreamEvent::Return(value) => f.debug_tuple("Return").field(value).finish(),
        }
    }
}

/// The stream form of a coroutine component.
pub type EventStream = BoxStream<'static, Result<StreamEvent>>;

/// The result of evaluating a component.
pub enum Renderable {
    /// A node to render.
    Node(Node),

    /// A value that resolves later.
    Deferred(BoxFuture<'static, Result<Renderable>>),

    /// A coroutine of progress values and a terminal value.
    Stream(EventStream),

    /// An in-flight render of another node.
    Render(Render),
}

impl Renderable {
    /// A deferred renderable from any future.
    pub fn deferred<F, R>(future: F) -> Self
    where
        F: Future<Output = Result<R>> + Send + 'static,
        R: Into<Renderable>,
    {
        Renderable::Deferred(future.map(|result| result.map(Into::into)).boxed())
    }

    /// A coroutine driven by an async producer.
    ///
    /// The producer receives a [`StreamSender`] for progress values; the
    /// value it returns is the coroutine's terminal value.
    ///
    /// ```rust,ignore
    /// Renderable::stream(|tx| async move {
    ///     tx.emit("5").await?;
    ///     tx.emit("4").await?;
    ///     tx.append_only().await?;
    ///     tx.emit("3").await?;
    ///     Ok("LIFTOFF")
    /// })
    /// ```
    pub fn stream<F, Fut, R>(producer: F) -> Self
    where
        F: FnOnce(StreamSender) -> Fut,
        Fut: Future<Output = Result<R>> + Send + 'static,
        R: Into<Renderable>,
    {
        let (tx, rx) = mpsc::channel(1);
        let future = producer(StreamSender { tx });
        Renderable::Stream(
            ProducerStream {
                producer: Some(future.map(|result| result.map(Into::into)).boxed()),
                outcome: None,
                rx,
                finished: false,
            }
            .boxed(),
        )
    }

    /// A coroutine from a raw event stream.
    pub fn from_events<S>(events: S) -> Self
    where
        S: Stream<Item = Result<StreamEvent>> + Send + 'static,
    {
        Renderable::Stream(events.boxed())
    }
}

impl fmt::Debug for Renderable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Renderable::Node(node) => f.debug_tuple("Node").field(node).finish(),
            Renderable::Deferred(_) => f.write_str("Deferred(..)"),
            Renderable::Stream(_) => f.write_str("Stream(..)"),
            Renderable::Render(_) => f.write_str("Render(..)"),
        }
    }
}

impl From<Node> for Renderable {
    fn from(node: Node) -> Self {
        Renderable::Node(node)
    }
}

impl From<Element> for Renderable {
    fn from(element: Element) -> Self {
        Renderable::Node(Node::Element(element))
    }
}

impl From<IndirectNode> for Renderable {
    fn from(indirect: IndirectNode) -> Self {
        Renderable::Node(Node::Indirect(indirect))
    }
}

impl From<Literal> for Renderable {
    fn from(literal: Literal) -> Self {
        Renderable::Node(Node::Literal(literal))
    }
}

impl From<Vec<Node>> for Renderable {
    fn from(children: Vec<Node>) -> Self {
        Renderable::Node(Node::Array(children))
    }
}

impl From<&str> for Renderable {
    fn from(text: &str) -> Self {
        Renderable::Node(Node::text(text))
    }
}

impl From<String> for Renderable {
    fn from(text: String) -> Self {
        Renderable::Node(Node::text(text))
    }
}

impl From<Frame> for Renderable {
    fn from(frame: Frame) -> Self {
        Renderable::Node(frame.into_node())
    }
}

impl From<()> for Renderable {
    fn from(_: ()) -> Self {
        Renderable::Node(Node::empty())
    }
}

impl From<Render> for Renderable {
    fn from(render: Render) -> Self {
        Renderable::Render(render)
    }
}

/// The producer side of a channel-based coroutine.
pub struct StreamSender {
    tx: mpsc::Sender<StreamEvent>,
}

impl StreamSender {
    /// Yield a progress value. Suspends until the renderer takes it.
    pub async fn emit(&self, value: impl Into<Renderable>) -> Result<()> {
        self.send(StreamEvent::Emit(value.into())).await
    }

    /// Switch the rest of this coroutine to append-only mode.
    pub async fn append_only(&self) -> Result<()> {
        self.send(StreamEvent::AppendOnly(None)).await
    }

    /// Switch to append-only mode, starting with `initial`.
    pub async fn append_only_with(&self, initial: impl Into<Renderable>) -> Result<()> {
        self.send(StreamEvent::AppendOnly(Some(initial.into())))
            .await
    }

    async fn send(&self, event: StreamEvent) -> Result<()> {
        self.tx
            .send(event)
            .await
            .map_err(|_| RenderError::cancelled("the render consuming this stream was dropped"))
    }
}

/// Polls a producer future and its channel together.
///
/// Queued events are always delivered before the producer's result.
struct ProducerStream {
    producer: Option<BoxFuture<'static, Result<Renderable>>>,
    outcome: Option<Result<Renderable>>,
    rx: mpsc::Receiver<StreamEvent>,
    finished: bool,
}

impl Stream for ProducerStream {
    type Item = Result<StreamEvent>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }

        if let Some(producer) = this.producer.as_mut() {
            if let Poll::Ready(outcome) = producer.poll_unpin(cx) {
                this.producer = None;
                this.outcome = Some(outcome);
            }
        }

        if let Poll::Ready(Some(event)) = this.rx.poll_recv(cx) {
            return Poll::Ready(Some(Ok(event)));
        }

        if this.producer.is_some() {
            return Poll::Pending;
        }

        this.finished = true;
        match this.outcome.take() {
            Some(Ok(value)) => Poll::Ready(Some(Ok(StreamEvent::Return(value)))),
            Some(Err(error)) => Poll::Ready(Some(Err(error))),
            None => Poll::Ready(None),
        }
    }
}
