//! Error Boundaries
//!
//! An error boundary renders its child and, if anything below it fails,
//! substitutes a fallback instead of failing the whole render. Frames the
//! child produced before failing are kept; the fallback replaces them.

use std::fmt;
use std::sync::{Arc, OnceLock};

use async_stream::try_stream;
use futures_util::StreamExt;

use crate::error::{RenderError, Result};
use crate::node::{Component, Node, Tag};
use crate::render::engine::boxed;
use crate::render::{Render, RenderContext, Step, StepStream};

type Fallback = Arc<dyn Fn(&RenderError) -> Node + Send + Sync>;

struct BoundaryProps {
    child: Node,
    fallback: Fallback,
}

impl fmt::Debug for BoundaryProps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorBoundary")
            .field("child", &self.child)
            .finish_non_exhaustive()
    }
}

fn boundary() -> &'static Component<BoundaryProps> {
    static BOUNDARY: OnceLock<Component<BoundaryProps>> = OnceLock::new();
    BOUNDARY.get_or_init(|| {
        Component::new("ErrorBoundary", |props: &BoundaryProps, ctx: &RenderContext| {
            let steps = catch(
                ctx.steps(props.child.clone()),
                Arc::clone(&props.fallback),
                ctx.clone(),
            );
            Ok(Render::new(steps, &ctx.options().inherited()))
        })
    })
}

/// The tag shared by every error boundary element.
pub fn error_boundary_tag() -> &'static Tag {
    boundary().tag()
}

/// Render `child`, replacing it with `fallback(&error)` if it fails.
///
/// ```rust,ignore
/// let node = error_boundary(flaky.element(()), |error| {
///     Node::text(format!("[unavailable: {}]", error.message()))
/// });
/// ```
pub fn error_boundary<F>(child: impl Into<Node>, fallback: F) -> Node
where
    F: Fn(&RenderError) -> Node + Send + Sync + 'static,
{
    Node::Element(boundary().element(BoundaryProps {
        child: child.into(),
        fallback: Arc::new(fallback),
    }))
}

fn catch(mut steps: StepStream, fallback: Fallback, ctx: RenderContext) -> StepStream {
    boxed(try_stream! {
        loop {
            match steps.next().await {
                Some(Ok(Step::Partial(frame))) => yield Step::Partial(frame),
                Some(Ok(Step::Done(frame))) => {
                    yield Step::Done(frame);
                    return;
                }
                Some(Err(error)) => {
                    drop(steps);
                    ctx.logger().warn(format_args!("rendering fallback after error: {error}"));

                    // The fallback replaces whatever the child showed.
                    let mut first = true;
                    let mut recovered = ctx.steps(fallback(&error));
                    while let Some(step) = recovered.next().await {
                        let step = step?;
                        if first {
                            first = false;
                            yield step.map_frame(|frame| frame.with_append_only(false));
                        } else {
                            yield step;
                        }
                    }
                    return;
                }
                None => {
                    Err::<(), _>(RenderError::internal(
                        "boundary child ended without a terminal frame",
                    ))?;
                }
            }
        }
    })
}
