//! Render Options
//!
//! The caller-facing knobs of a render: a stop predicate for partial
//! rendering, a frame post-processor, and the append-only assertion.

use std::fmt;
use std::sync::Arc;

use super::frame::Frame;
use crate::node::{Element, Tag};

/// Decides whether an element is left unexpanded.
pub type StopPredicate = Arc<dyn Fn(&Element) -> bool + Send + Sync>;

/// Post-processes every frame delivered to the caller.
pub type FrameMap = Arc<dyn Fn(Frame) -> Frame + Send + Sync>;

/// Options for a single render.
#[derive(Clone, Default)]
pub struct RenderOptions {
    stop: Option<StopPredicate>,
    map: Option<FrameMap>,
    append_only: bool,
}

impl RenderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Leave elements matching `predicate` unexpanded.
    pub fn stop<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Element) -> bool + Send + Sync + 'static,
    {
        self.stop = Some(Arc::new(predicate));
        self
    }

    /// Leave every instance of the given components unexpanded.
    pub fn stop_at<I>(self, tags: I) -> Self
    where
        I: IntoIterator<Item = Tag>,
    {
        let tags: Vec<Tag> = tags.into_iter().collect();
        self.stop(move |element| tags.iter().any(|tag| element.is(tag)))
    }

    /// Transform every frame before it reaches the caller.
    pub fn map<F>(mut self, map: F) -> Self
    where
        F: Fn(Frame) -> Frame + Send + Sync + 'static,
    {
        self.map = Some(Arc::new(map));
        self
    }

    /// Assert that the caller consumes frames as textual deltas only.
    pub fn append_only(mut self, append_only: bool) -> Self {
        self.append_only = append_only;
        self
    }

    pub fn should_stop(&self, element: &Element) -> bool {
        self.stop.as_ref().is_some_and(|stop| stop(element))
    }

    pub fn is_append_only(&self) -> bool {
        self.append_only
    }

    pub(crate) fn frame_map(&self) -> Option<&FrameMap> {
        self.map.as_ref()
    }

    /// These options without the frame map; nested renders inherit the
    /// stop predicate but only the outermost caller maps frames.
    pub(crate) fn inherited(&self) -> Self {
        Self {
            stop: self.stop.clone(),
            map: None,
            append_only: self.append_only,
        }
    }

    /// Only the append-only flag. Shared evaluations must not depend on
    /// one caller's stop predicate or frame map.
    pub(crate) fn shared(&self) -> Self {
        Self {
            stop: None,
            map: None,
            append_only: self.append_only,
        }
    }
}

impl fmt::Debug for RenderOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderOptions")
            .field("stop", &self.stop.is_some())
            .field("map", &self.map.is_some())
            .field("append_only", &self.append_only)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::RenderContext;

    #[test]
    fn stop_at_matches_by_tag_identity() {
        let route = Tag::new("Route");
        let lookalike = Tag::new("Route");
        let options = RenderOptions::new().stop_at([route.clone()]);

        let stopped = Element::new(route, (), |_ctx: &RenderContext| Ok(""));
        let expanded = Element::new(lookalike, (), |_ctx: &RenderContext| Ok(""));

        assert!(options.should_stop(&stopped));
        assert!(!options.should_stop(&expanded));
        assert!(!RenderOptions::new().should_stop(&stopped));
    }

    #[test]
    fn inherited_options_drop_the_map() {
        let options = RenderOptions::new()
            .map(|frame| frame)
            .append_only(true);
        let inherited = options.inherited();
        assert!(inherited.frame_map().is_none());
        assert!(inherited.is_append_only());
    }

    #[test]
    fn shared_options_keep_only_the_append_only_flag() {
        let route = Tag::new("Route");
        let stopped = Element::new(route.clone(), (), |_ctx: &RenderContext| Ok(""));
        let options = RenderOptions::new()
            .stop_at([route])
            .map(|frame| frame)
            .append_only(true);

        let shared = options.shared();
        assert!(!shared.should_stop(&stopped));
        assert!(shared.frame_map().is_none());
        assert!(shared.is_append_only());
    }
}
