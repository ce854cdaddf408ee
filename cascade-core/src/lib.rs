//! Cascade Core
//!
//! An incremental evaluator for trees of components. A tree is rendered
//! frame by frame: every frame is a more complete materialization of the
//! tree than the one before it, and the last frame is the fully evaluated
//! output.
//!
//! It implements:
//!
//! - A node model of literals, arrays, indirect nodes and elements
//! - Synchronous, deferred and streaming components
//! - Concurrent rendering of array children with frame coalescing
//! - Partial rendering that stops at selected components
//! - Memoization that evaluates a component instance at most once
//! - Append-only frames, and suffix deltas derived from them
//! - Per-element tracing spans
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `node`: Components, elements and the other node kinds
//! - `render`: Frames, render options, the render context and the engine
//! - `memo`: Shared single evaluation of memoized elements
//! - `trace`: Span management and the bundled tracers
//! - `delta`: Append-only deltas and their wire encoding
//! - `boundary`: Error boundaries
//! - `debug`: JSX-like printing of node trees
//!
//! # Example
//!
//! ```rust,ignore
//! use cascade_core::{render, Component, Node, RenderContext, RenderOptions, Renderable};
//!
//! let countdown = Component::new("Countdown", |_: &(), _ctx: &RenderContext| {
//!     Ok(Renderable::stream(|tx| async move {
//!         tx.emit("5").await?;
//!         tx.emit("4").await?;
//!         tx.append_only().await?;
//!         tx.emit("3").await?;
//!         Ok("LIFTOFF")
//!     }))
//! });
//!
//! let mut frames = render(countdown.element(()), RenderOptions::new());
//! while let Some(frame) = frames.next().await {
//!     println!("{}", frame?);          // 5, 4, 43
//! }
//! println!("{}", frames.final_frame().unwrap()); // 43LIFTOFF
//! ```

pub mod boundary;
pub mod debug;
pub mod delta;
pub mod error;
pub mod memo;
pub mod node;
pub mod render;
pub mod trace;

pub use boundary::{error_boundary, error_boundary_tag};
pub use debug::debug_node;
pub use delta::{deltas, DeltaEncoder, DeltaError, FrameDelta};
pub use error::{ErrorKind, RenderError, Result};
pub use memo::{memo, MemoId};
pub use node::{Component, Element, ElementId, IndirectNode, Literal, Node, Tag};
pub use render::{
    create_context_slot, render, ContextSlot, Frame, FrameItem, Logger, Render, RenderContext,
    RenderOptions, Renderable, StreamEvent, StreamSender,
};
pub use trace::{
    RecordingTracer, Span, SpanId, SpanRecord, SpanRequest, SpanStatus, TracePolicy, Tracer,
    TracingTracer,
};
