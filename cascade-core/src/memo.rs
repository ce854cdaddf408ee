//! Memoization
//!
//! A memoized element is evaluated at most once, no matter how many places
//! in the tree render it or how many renders are in flight.
//!
//! # How Memoization Works
//!
//! 1. [`memo`] walks a node and gives every element a fresh [`MemoCell`].
//!    The element keeps its tag and props but gets a new identity.
//!
//! 2. The first render to reach a memoized element becomes its owner: it
//!    spawns a task that evaluates the element. The owner receives every
//!    step over its own unbounded channel, and each step is also published
//!    into a `watch` channel.
//!
//! 3. Every later render is a follower: it subscribes to the `watch`
//!    channel. It first sees the latest published frame, then every distinct
//!    frame still current when it polls. A slow follower may skip frames
//!    that were superseded before it looked, never the terminal one.
//!
//! 4. Once the evaluation finishes, the channel holds the terminal result.
//!    Failures are cached just like frames.
//!
//! # Lifetime
//!
//! The evaluation outlives any single consumer: it keeps running while the
//! owner or at least one follower is attached. Once every consumer has been
//! dropped, the evaluation is torn down, its span is closed as abandoned and
//! a cancellation error becomes the cached result. The component is never
//! invoked again.
//!
//! The evaluation ignores the caller's stop predicate and frame map, so the
//! cached result never depends on how the first render was configured.
//!
//! # Tracing
//!
//! The owner's span is opened for the evaluation itself; its descendants
//! nest under it. Followers open a single span linked to the owner's span
//! and never produce a second subtree.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_stream::try_stream;
use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tracing::debug;

use crate::error::{RenderError, Result};
use crate::node::{Element, Node};
use crate::render::engine::{self, boxed};
use crate::render::{Frame, RenderContext, Step, StepStream};
use crate::trace::{self, SpanGuard, SpanId, SpanKind, SpanStatus};

/// Counter for generating unique memo IDs.
static MEMO_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique identifier for a memo cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemoId(u64);

impl MemoId {
    fn next() -> Self {
        Self(MEMO_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for MemoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a memoized evaluation has published so far.
#[derive(Debug, Clone)]
pub(crate) enum MemoSnapshot {
    /// Started, nothing produced yet.
    Pending,

    /// The latest partial frame.
    Partial(Frame),

    /// The terminal result.
    Done(Result<Frame>),
}

enum MemoSlot {
    Idle,
    Started {
        snapshots: Arc<watch::Sender<MemoSnapshot>>,
        owner_span: Option<SpanId>,
    },
}

enum Attachment {
    Owner(mpsc::UnboundedReceiver<Result<Step>>),
    Follower {
        rx: watch::Receiver<MemoSnapshot>,
        owner_span: Option<SpanId>,
    },
}

/// Shared evaluation state of one memoized element.
pub(crate) struct MemoCell {
    id: MemoId,
    slot: Mutex<MemoSlot>,
}

impl MemoCell {
    pub(crate) fn new() -> Self {
        Self {
            id: MemoId::next(),
            slot: Mutex::new(MemoSlot::Idle),
        }
    }

    pub(crate) fn id(&self) -> MemoId {
        self.id
    }

    /// Whether an evaluation has been started.
    pub(crate) fn is_started(&self) -> bool {
        matches!(*self.slot.lock(), MemoSlot::Started { .. })
    }

    /// Join the evaluation, starting it if nobody has yet.
    fn attach(&self, element: &Element, ctx: &RenderContext) -> Result<Attachment> {
        let mut slot = self.slot.lock();
        if let MemoSlot::Started {
            snapshots,
            owner_span,
        } = &*slot
        {
            debug!(
                memo = %self.id,
                component = element.tag().name(),
                "joining memoized evaluation"
            );
            return Ok(Attachment::Follower {
                rx: snapshots.subscribe(),
                owner_span: *owner_span,
            });
        }

        let runtime = Handle::try_current().map_err(|_| {
            RenderError::internal(format!(
                "memoized element <{}> must be rendered inside a tokio runtime",
                element.tag().name()
            ))
        })?;

        let guard = trace::open_span(ctx, element, SpanKind::MemoOwner(self.id));
        let owner_span = guard.as_ref().map(SpanGuard::id);
        let options = ctx.options().shared();
        let producer_ctx = match owner_span {
            Some(span) => ctx.with_options(options).with_parent_span(span),
            None => ctx.with_options(options),
        };

        let steps = engine::evaluate(element.clone(), producer_ctx);
        let (owner_tx, owner_rx) = mpsc::unbounded_channel();
        let (snapshots, _) = watch::channel(MemoSnapshot::Pending);
        let snapshots = Arc::new(snapshots);
        debug!(
            memo = %self.id,
            component = element.tag().name(),
            "starting memoized evaluation"
        );
        runtime.spawn(drive(
            self.id,
            steps,
            owner_tx,
            Arc::clone(&snapshots),
            guard,
        ));

        *slot = MemoSlot::Started {
            snapshots,
            owner_span,
        };
        Ok(Attachment::Owner(owner_rx))
    }
}

impl fmt::Debug for MemoCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoCell")
            .field("id", &self.id)
            .field("started", &self.is_started())
            .finish()
    }
}

/// Run a memoized evaluation, handing every step to the owner and
/// publishing it for followers.
///
/// Stops early once the owner and every follower are gone.
async fn drive(
    id: MemoId,
    mut steps: StepStream,
    owner: mpsc::UnboundedSender<Result<Step>>,
    snapshots: Arc<watch::Sender<MemoSnapshot>>,
    mut guard: Option<SpanGuard>,
) {
    let abandoned = async {
        owner.closed().await;
        snapshots.closed().await;
    };
    tokio::pin!(abandoned);

    let outcome = loop {
        tokio::select! {
            biased;
            step = steps.next() => match step {
                Some(Ok(Step::Partial(frame))) => {
                    // The owner may already be gone; followers still get the frame.
                    let _ = owner.send(Ok(Step::Partial(frame.clone())));
                    snapshots.send_replace(MemoSnapshot::Partial(frame));
                }
                Some(Ok(Step::Done(frame))) => break Some(Ok(frame)),
                Some(Err(error)) => break Some(Err(error)),
                None => {
                    break Some(Err(RenderError::internal(
                        "memoized evaluation ended without a terminal frame",
                    )))
                }
            },
            () = &mut abandoned => break None,
        }
    };
    drop(steps);

    let outcome = match outcome {
        Some(outcome) => {
            if let Some(guard) = guard.as_mut() {
                guard.close_with(&outcome);
            }
            debug!(memo = %id, ok = outcome.is_ok(), "memoized evaluation finished");
            outcome
        }
        None => {
            if let Some(guard) = guard.as_mut() {
                guard.close(SpanStatus::Abandoned);
            }
            debug!(memo = %id, "memoized evaluation abandoned by every consumer");
            Err(RenderError::cancelled(
                "memoized evaluation was abandoned by every consumer",
            ))
        }
    };
    let _ = owner.send(outcome.clone().map(Step::Done));
    snapshots.send_replace(MemoSnapshot::Done(outcome));
}

/// Render a memoized element by subscribing to its shared evaluation.
pub(crate) fn subscribe(cell: Arc<MemoCell>, element: Element, ctx: RenderContext) -> StepStream {
    boxed(try_stream! {
        let mut steps = match cell.attach(&element, &ctx)? {
            Attachment::Owner(rx) => owner_steps(rx),
            Attachment::Follower { rx, owner_span } => {
                let kind = SpanKind::MemoLink {
                    memo: cell.id(),
                    owner: owner_span,
                };
                match trace::open_span(&ctx, &element, kind) {
                    Some(guard) => trace::guarded(watch_steps(rx), guard),
                    None => watch_steps(rx),
                }
            }
        };
        while let Some(step) = steps.next().await {
            yield step?;
        }
    })
}

fn owner_steps(mut rx: mpsc::UnboundedReceiver<Result<Step>>) -> StepStream {
    boxed(try_stream! {
        while let Some(step) = rx.recv().await {
            let step = step?;
            let done = matches!(step, Step::Done(_));
            yield step;
            if done {
                return;
            }
        }
        Err::<(), _>(RenderError::internal("memoized evaluation stopped without a result"))?;
    })
}

fn watch_steps(mut rx: watch::Receiver<MemoSnapshot>) -> StepStream {
    boxed(try_stream! {
        let mut last: Option<Frame> = None;
        loop {
            let snapshot = rx.borrow_and_update().clone();
            match snapshot {
                MemoSnapshot::Pending => {}
                MemoSnapshot::Partial(frame) => {
                    if last.as_ref() != Some(&frame) {
                        last = Some(frame.clone());
                        yield Step::Partial(frame);
                    }
                }
                MemoSnapshot::Done(result) => {
                    yield Step::Done(result?);
                    return;
                }
            }
            if rx.changed().await.is_err() {
                Err::<(), _>(RenderError::internal(
                    "memoized evaluation stopped without a result",
                ))?;
            }
        }
    })
}

/// Memoize every element in `node`.
///
/// Literals are returned unchanged, arrays and indirect nodes are memoized
/// recursively, and elements that are already memoized keep their cell.
/// Each call creates new cells: memoizing the same element twice yields two
/// independent memoized elements.
pub fn memo(node: impl Into<Node>) -> Node {
    match node.into() {
        literal @ Node::Literal(_) => literal,
        Node::Array(children) => Node::Array(children.into_iter().map(memo).collect()),
        Node::Element(element) if element.memo_id().is_some() => Node::Element(element),
        Node::Element(element) => Node::Element(element.memoized()),
        Node::Indirect(indirect) => {
            let target = memo(indirect.target().clone());
            Node::Indirect(indirect.with_target(target))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::future::IntoFuture;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use futures_util::future::join;
    use futures_util::task::noop_waker;
    use futures_util::FutureExt;

    use super::*;
    use crate::error::ErrorKind;
    use crate::node::Component;
    use crate::render::{render, Render, RenderOptions, Renderable};
    use crate::trace::RecordingTracer;

    fn counted(counter: Arc<AtomicUsize>) -> Component<()> {
        Component::new("Counted", move |_: &(), _ctx: &RenderContext| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            Ok(if n == 0 { "PASS" } else { "FAIL" })
        })
    }

    fn countdown() -> Component<()> {
        Component::new("Countdown", |_: &(), _ctx: &RenderContext| {
            Ok(Renderable::stream(|tx| async move {
                tx.emit("5").await?;
                tx.emit("4").await?;
                tx.append_only().await?;
                tx.emit("3").await?;
                tx.emit("2").await?;
                tx.emit("1").await?;
                Ok("LIFTOFF")
            }))
        })
    }

    fn ticker() -> Component<()> {
        Component::new("Ticker", |_: &(), _ctx: &RenderContext| {
            Ok(Renderable::stream(|tx| async move {
                tx.emit("one").await?;
                tokio::time::sleep(Duration::from_millis(10)).await;
                tx.emit("two").await?;
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok("three")
            }))
        })
    }

    async fn frames_of(mut render: Render) -> (Vec<String>, String) {
        let mut frames = Vec::new();
        while let Some(frame) = render.next().await {
            frames.push(frame.unwrap().text());
        }
        (frames, render.final_frame().unwrap().text())
    }

    #[tokio::test]
    async fn memoized_element_evaluates_once_across_renders() {
        let counter = Arc::new(AtomicUsize::new(0));
        let node = memo(counted(Arc::clone(&counter)).element(()));

        let first = render(node.clone(), RenderOptions::new()).await.unwrap();
        let second = render(node.clone(), RenderOptions::new()).await.unwrap();

        assert_eq!(first.text(), "PASS");
        assert_eq!(second.text(), "PASS");
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn memoized_element_evaluates_once_within_a_tree() {
        let counter = Arc::new(AtomicUsize::new(0));
        let node = memo(counted(Arc::clone(&counter)).element(()));
        let tree = Node::array([node.clone(), Node::text(" "), node]);

        let frame = render(tree, RenderOptions::new()).await.unwrap();
        assert_eq!(frame.text(), "PASS PASS");
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_renders_share_one_evaluation() {
        let counter = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&counter);
        let slow = Component::new("Slow", move |_: &(), _ctx: &RenderContext| {
            inner.fetch_add(1, Ordering::SeqCst);
            Ok(Renderable::deferred(async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok("slow")
            }))
        });
        let node = memo(slow.element(()));

        let (a, b) = join(
            IntoFuture::into_future(render(node.clone(), RenderOptions::new())),
            IntoFuture::into_future(render(node, RenderOptions::new())),
        )
        .await;
        assert_eq!(a.unwrap().text(), "slow");
        assert_eq!(b.unwrap().text(), "slow");
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn owner_receives_every_frame_of_a_memoized_stream() {
        let node = memo(countdown().element(()));

        let (frames, terminal) = frames_of(render(node.clone(), RenderOptions::new())).await;
        assert_eq!(frames, vec!["5", "4", "43", "432", "4321"]);
        assert_eq!(terminal, "4321LIFTOFF");

        let (frames, terminal) = frames_of(render(node, RenderOptions::new())).await;
        assert!(frames.is_empty());
        assert_eq!(terminal, "4321LIFTOFF");
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_consumers_observe_every_distinct_value() {
        let node = memo(ticker().element(()));

        let (a, b) = join(
            frames_of(render(node.clone(), RenderOptions::new())),
            frames_of(render(node, RenderOptions::new())),
        )
        .await;
        assert_eq!(a, (vec!["one".to_string(), "two".to_string()], "three".to_string()));
        assert_eq!(a, b);
    }

    #[tokio::test(start_paused = true)]
    async fn late_subscriber_starts_from_the_latest_frame() {
        let node = memo(ticker().element(()));

        let mut first = render(node.clone(), RenderOptions::new());
        assert_eq!(first.next().await.unwrap().unwrap().text(), "one");
        tokio::time::sleep(Duration::from_millis(15)).await;

        let mut late = render(node, RenderOptions::new());
        assert_eq!(late.next().await.unwrap().unwrap().text(), "two");
        assert!(late.next().await.is_none());
        assert_eq!(late.final_frame().unwrap().text(), "three");

        let (frames, terminal) = frames_of(first).await;
        assert_eq!(frames, vec!["two"]);
        assert_eq!(terminal, "three");
    }

    #[tokio::test]
    async fn partial_render_does_not_change_the_cached_result() {
        let calls = Arc::new(AtomicUsize::new(0));
        let inner = counted(Arc::clone(&calls));
        let inner_tag = inner.tag().clone();
        let outer = Component::new("Outer", move |_: &(), _ctx: &RenderContext| {
            Ok(Node::array([Node::text("<"), inner.element(()).into(), Node::text(">")]))
        });
        let shared = memo(outer.element(()));

        let options = RenderOptions::new().stop_at([inner_tag]);
        let partial = render(shared.clone(), options).await.unwrap();
        let full = render(shared, RenderOptions::new()).await.unwrap();
        assert_eq!(partial.text(), "<PASS>");
        assert_eq!(full.text(), "<PASS>");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stopped_memo_element_is_not_started() {
        let calls = Arc::new(AtomicUsize::new(0));
        let component = counted(Arc::clone(&calls));
        let shared = memo(component.element(()));

        let options = RenderOptions::new().stop_at([component.tag().clone()]);
        let partial = render(shared.clone(), options).await.unwrap();
        assert_eq!(partial.to_string(), "<Counted />");
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let full = render(shared, RenderOptions::new()).await.unwrap();
        assert_eq!(full.text(), "PASS");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dropping_every_consumer_abandons_the_evaluation() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let stuck = Component::new("Stuck", move |_: &(), _ctx: &RenderContext| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Renderable::stream(|tx| async move {
                tx.emit("thinking").await?;
                std::future::pending::<()>().await;
                Ok("never")
            }))
        });
        let tracer = RecordingTracer::new();
        let ctx = RenderContext::builder().tracer(tracer.clone()).build();
        let node = memo(stuck.element(()));

        let mut first = ctx.render(node.clone());
        assert_eq!(first.next().await.unwrap().unwrap().text(), "thinking");
        drop(first);
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }

        assert!(tracer.open_spans().is_empty());
        let span = tracer.find("Stuck").unwrap();
        assert!(matches!(span.status, Some(SpanStatus::Abandoned)));

        let error = ctx.render(node).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Cancelled);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failures_are_cached() {
        let counter = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&counter);
        let failing = Component::new("Failing", move |_: &(), _ctx: &RenderContext| {
            inner.fetch_add(1, Ordering::SeqCst);
            Err::<Node, _>(RenderError::evaluation("quota exceeded"))
        });
        let node = memo(failing.element(()));

        let first = render(node.clone(), RenderOptions::new()).await.unwrap_err();
        let second = render(node, RenderOptions::new()).await.unwrap_err();
        assert_eq!(first, second);
        assert_eq!(first.kind(), ErrorKind::Evaluation);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn memo_is_structural() {
        let component = Component::new("Leaf", |_: &(), _ctx: &RenderContext| Ok("leaf"));
        let tree = Node::array([Node::text("x"), component.element(()).into()]);

        let memoized = memo(tree);
        let Node::Array(children) = &memoized else {
            panic!("expected an array");
        };
        assert!(matches!(&children[0], Node::Literal(_)));
        let element = children[1].as_element().unwrap();
        let id = element.memo_id().unwrap();

        let again = memo(element.clone());
        assert_eq!(again.as_element().unwrap().memo_id(), Some(id));
    }

    #[test]
    fn memoizing_twice_gives_independent_cells() {
        let component = Component::new("Leaf", |_: &(), _ctx: &RenderContext| Ok("leaf"));
        let element = component.element(());
        let a = memo(element.clone());
        let b = memo(element);
        assert_ne!(
            a.as_element().unwrap().memo_id(),
            b.as_element().unwrap().memo_id()
        );
    }

    #[test]
    fn rendering_outside_a_runtime_is_an_internal_error() {
        let component = Component::new("Leaf", |_: &(), _ctx: &RenderContext| Ok("leaf"));
        let node = memo(component.element(()));
        let mut future = IntoFuture::into_future(render(node, RenderOptions::new()));
        let waker = noop_waker();
        let mut cx = std::task::Context::from_waker(&waker);
        match future.poll_unpin(&mut cx) {
            std::task::Poll::Ready(result) => {
                assert_eq!(result.unwrap_err().kind(), ErrorKind::Internal)
            }
            std::task::Poll::Pending => panic!("render should fail without a runtime"),
        }
    }
}
