//! Array Merging
//!
//! Renders the children of an array concurrently and concatenates their
//! latest frames in positional order.
//!
//! The first poll visits every child once. Children that finish right away
//! (literals, synchronous components) are folded in before any frame is
//! produced, so static content never shows up as a separate frame. From
//! then on every child update yields one merged frame, unless it leaves the
//! merged text unchanged. Children are polled round-robin, starting after
//! the child that produced the last update, so a busy child cannot starve
//! its siblings.
//!
//! A merged frame is flagged append-only only when it provably extends the
//! previous merged frame: every child that changed extended its own
//! output, and no child after the first changed one had produced any
//! content yet.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::stream::Stream;
use futures_util::StreamExt;

use super::frame::Frame;
use super::{Step, StepStream};
use crate::error::{RenderError, Result};

pub(crate) struct ArrayMerge {
    children: Vec<Option<StepStream>>,
    latest: Vec<Frame>,
    /// Each child's frame as of the last merged frame.
    emitted: Vec<Frame>,
    dirty: Vec<bool>,
    extends: Vec<bool>,
    /// Partial frames seen by the first poll, not merged yet.
    queued: VecDeque<(usize, Frame)>,
    cursor: usize,
    remaining: usize,
    last: Option<Frame>,
    primed: bool,
    finished: bool,
}

impl ArrayMerge {
    pub(crate) fn new(children: Vec<StepStream>) -> Self {
        let len = children.len();
        Self {
            children: children.into_iter().map(Some).collect(),
            latest: vec![Frame::empty(); len],
            emitted: vec![Frame::empty(); len],
            dirty: vec![false; len],
            extends: vec![true; len],
            queued: VecDeque::new(),
            cursor: 0,
            remaining: len,
            last: None,
            primed: false,
            finished: false,
        }
    }

    /// Record a child's new frame.
    fn update(&mut self, index: usize, frame: Frame, done: bool) {
        self.extends[index] &= frame.is_append_only();
        self.dirty[index] = true;
        self.latest[index] = frame;
        if done {
            self.children[index] = None;
            self.remaining -= 1;
        }
    }

    /// Poll every child once, folding in children that finish immediately.
    fn prime(&mut self, cx: &mut Context<'_>) -> Result<()> {
        self.primed = true;
        for index in 0..self.children.len() {
            let Some(child) = self.children[index].as_mut() else {
                continue;
            };
            match child.poll_next_unpin(cx) {
                Poll::Ready(Some(Ok(Step::Done(frame)))) => self.update(index, frame, true),
                Poll::Ready(Some(Ok(Step::Partial(frame)))) => {
                    self.queued.push_back((index, frame));
                }
                Poll::Ready(Some(Err(error))) => return Err(error),
                Poll::Ready(None) => return Err(missing_terminal()),
                Poll::Pending => {}
            }
        }
        Ok(())
    }

    /// The next update from any child, polling round-robin from the cursor.
    fn poll_update(&mut self, cx: &mut Context<'_>) -> Poll<Result<(usize, Step)>> {
        let len = self.children.len();
        for offset in 0..len {
            let index = (self.cursor + offset) % len;
            let Some(child) = self.children[index].as_mut() else {
                continue;
            };
            match child.poll_next_unpin(cx) {
                Poll::Ready(Some(Ok(step))) => {
                    self.cursor = (index + 1) % len;
                    return Poll::Ready(Ok((index, step)));
                }
                Poll::Ready(Some(Err(error))) => return Poll::Ready(Err(error)),
                Poll::Ready(None) => return Poll::Ready(Err(missing_terminal())),
                Poll::Pending => {}
            }
        }
        Poll::Pending
    }

    /// Merge the latest child frames and start a new round.
    fn take_frame(&mut self) -> Frame {
        let first_changed = self.dirty.iter().position(|dirty| *dirty);
        let extends = match first_changed {
            Some(first) => {
                let changed_extend = self
                    .dirty
                    .iter()
                    .zip(&self.extends)
                    .all(|(dirty, extends)| !dirty || *extends);
                changed_extend && self.emitted[first + 1..].iter().all(Frame::is_empty)
            }
            None => true,
        };

        self.emitted.clone_from(&self.latest);
        self.dirty.iter_mut().for_each(|dirty| *dirty = false);
        self.extends.iter_mut().for_each(|extends| *extends = true);

        Frame::concat(&self.latest).with_append_only(extends)
    }

    /// Stop every remaining child and surface `error`.
    fn fail(&mut self, error: RenderError) -> Poll<Option<Result<Step>>> {
        tracing::debug!(%error, pending = self.remaining, "array child failed, dropping siblings");
        self.children.clear();
        self.queued.clear();
        self.finished = true;
        Poll::Ready(Some(Err(error)))
    }
}

fn missing_terminal() -> RenderError {
    RenderError::internal("array child ended without a terminal frame")
}

impl Stream for ArrayMerge {
    type Item = Result<Step>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }
        if !this.primed {
            if let Err(error) = this.prime(cx) {
                return this.fail(error);
            }
        }

        loop {
            if this.remaining == 0 {
                this.finished = true;
                let frame = this.take_frame();
                return Poll::Ready(Some(Ok(Step::Done(frame))));
            }

            match this.queued.pop_front() {
                Some((index, frame)) => this.update(index, frame, false),
                None => match this.poll_update(cx) {
                    Poll::Ready(Ok((index, Step::Partial(frame)))) => {
                        this.update(index, frame, false)
                    }
                    Poll::Ready(Ok((index, Step::Done(frame)))) => this.update(index, frame, true),
                    Poll::Ready(Err(error)) => return this.fail(error),
                    Poll::Pending => return Poll::Pending,
                },
            }

            if this.remaining == 0 {
                continue;
            }
            let frame = this.take_frame();
            if this.last.as_ref() != Some(&frame) {
                this.last = Some(frame.clone());
                return Poll::Ready(Some(Ok(Step::Partial(frame))));
            }
        }
    }
}
