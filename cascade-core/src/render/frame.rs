//! Frames
//!
//! A [`Frame`] is one snapshot of a render: an ordered list of finished
//! text and elements left unexpanded by a stop predicate. Adjacent text is
//! always merged and empty text is never stored, so two frames that print
//! the same are structurally equal.
//!
//! Frames also carry the append-only flag: when set, the frame extends the
//! frame delivered before it in the same sequence. Consumers use the flag
//! to send suffix deltas without diffing.

use std::fmt;

use smallvec::SmallVec;

use crate::node::{Element, Node};

/// One entry of a frame.
#[derive(Debug, Clone)]
pub enum FrameItem {
    /// Finished text.
    Text(String),

    /// An element that was not expanded.
    Element(Element),
}

impl PartialEq for FrameItem {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FrameItem::Text(a), FrameItem::Text(b)) => a == b,
            (FrameItem::Element(a), FrameItem::Element(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

/// A snapshot of partially rendered output.
#[derive(Clone, Default)]
pub struct Frame {
    items: SmallVec<[FrameItem; 2]>,
    append_only: bool,
}

impl Frame {
    pub fn empty() -> Self {
        Self::default()
    }

    /// A frame holding only `text`.
    pub fn from_text(text: impl AsRef<str>) -> Self {
        let mut frame = Self::empty();
        frame.push_text(text.as_ref());
        frame
    }

    /// A frame holding one unexpanded element.
    pub fn from_element(element: Element) -> Self {
        let mut frame = Self::empty();
        frame.push_element(element);
        frame
    }

    /// Concatenate frames in order.
    pub fn concat<'a, I>(frames: I) -> Self
    where
        I: IntoIterator<Item = &'a Frame>,
    {
        let mut out = Self::empty();
        for frame in frames {
            out.extend(frame);
        }
        out
    }

    /// `self` followed by `other`.
    pub fn joined(&self, other: &Frame) -> Self {
        let mut out = self.clone();
        out.extend(other);
        out
    }

    pub fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(FrameItem::Text(last)) = self.items.last_mut() {
            last.push_str(text);
        } else {
            self.items.push(FrameItem::Text(text.to_string()));
        }
    }

    pub fn push_element(&mut self, element: Element) {
        self.items.push(FrameItem::Element(element));
    }

    /// Append every item of `other`.
    pub fn extend(&mut self, other: &Frame) {
        for item in &other.items {
            match item {
                FrameItem::Text(text) => self.push_text(text),
                FrameItem::Element(element) => self.push_element(element.clone()),
            }
        }
    }

    pub fn items(&self) -> &[FrameItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The frame's text, skipping unexpanded elements.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for item in &self.items {
            if let FrameItem::Text(text) = item {
                out.push_str(text);
            }
        }
        out
    }

    /// Whether the frame contains no unexpanded elements.
    pub fn is_complete(&self) -> bool {
        self.items
            .iter()
            .all(|item| matches!(item, FrameItem::Text(_)))
    }

    /// The unexpanded elements, in order.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.items.iter().filter_map(|item| match item {
            FrameItem::Element(element) => Some(element),
            FrameItem::Text(_) => None,
        })
    }

    /// The unexpanded elements matching `predicate`.
    pub fn find<P>(&self, mut predicate: P) -> Vec<Element>
    where
        P: FnMut(&Element) -> bool,
    {
        self.elements()
            .filter(|element| predicate(element))
            .cloned()
            .collect()
    }

    /// Substitute unexpanded elements with already rendered frames.
    ///
    /// `replacement` is called for every unexpanded element; returning
    /// `Some(frame)` splices that frame in its place, `None` keeps the
    /// element. The resulting frame is never flagged append-only.
    pub fn replace_elements<F>(&self, mut replacement: F) -> Frame
    where
        F: FnMut(&Element) -> Option<Frame>,
    {
        let mut out = Frame::empty();
        for item in &self.items {
            match item {
                FrameItem::Text(text) => out.push_text(text),
                FrameItem::Element(element) => match replacement(element) {
                    Some(frame) => out.extend(&frame),
                    None => out.push_element(element.clone()),
                },
            }
        }
        out
    }

    /// The frame as a node, so unexpanded elements can be rendered further.
    pub fn into_node(self) -> Node {
        let mut children: Vec<Node> = self
            .items
            .into_iter()
            .map(|item| match item {
                FrameItem::Text(text) => Node::text(text),
                FrameItem::Element(element) => Node::Element(element),
            })
            .collect();
        match children.len() {
            0 => Node::empty(),
            1 => children.remove(0),
            _ => Node::Array(children),
        }
    }

    /// Whether this frame extends the previous frame of its sequence.
    pub fn is_append_only(&self) -> bool {
        self.append_only
    }

    pub fn with_append_only(mut self, append_only: bool) -> Self {
        self.append_only = append_only;
        self
    }
}

impl PartialEq for Frame {
    fn eq(&self, other: &Self) -> bool {
        self.items == other.items
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for item in &self.items {
            match item {
                FrameItem::Text(text) => f.write_str(text)?,
                FrameItem::Element(element) => write!(f, "<{} />", element.tag().name())?,
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("items", &self.items.as_slice())
            .field("append_only", &self.append_only)
            .finish()
    }
}

impl From<&str> for Frame {
    fn from(text: &str) -> Self {
        Frame::from_text(text)
    }
}
