//! Append-only Deltas
//!
//! Consumers that forward a render over the wire rarely want whole frames.
//! A frame flagged append-only extends the frame delivered before it, so
//! only its new suffix needs to be sent; any other frame replaces what the
//! consumer has.
//!
//! [`DeltaEncoder`] makes that decision from the flag alone, and
//! [`deltas`] applies it to a whole [`Render`]. Deltas serialize to JSON or
//! MessagePack.

use async_stream::try_stream;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{RenderError, Result};
use crate::render::{Frame, Render};

/// One wire update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FrameDelta {
    /// Discard the current text and show `text` instead.
    Replace { text: String },

    /// Append `text` to the current text.
    Append { text: String },

    /// The render finished; the current text is final.
    Done,
}

/// Errors while encoding or decoding deltas.
#[derive(Debug, Error)]
pub enum DeltaError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("MessagePack encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("MessagePack decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

/// Turns a sequence of frames into deltas.
#[derive(Debug, Default)]
pub struct DeltaEncoder {
    sent: Option<String>,
}

impl DeltaEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The delta bringing the consumer from the last encoded frame to
    /// `frame`, or `None` when nothing changed.
    ///
    /// A flagged frame whose text does not start with the text already
    /// sent is encoded as a replacement.
    pub fn encode(&mut self, frame: &Frame) -> Option<FrameDelta> {
        let text = frame.text();
        let sent = self.sent.as_deref().unwrap_or_default();

        let delta = if frame.is_append_only() && text.starts_with(sent) {
            let suffix = &text[sent.len()..];
            if suffix.is_empty() && self.sent.is_some() {
                return None;
            }
            FrameDelta::Append {
                text: suffix.to_string(),
            }
        } else {
            if self.sent.as_deref() == Some(text.as_str()) {
                return None;
            }
            FrameDelta::Replace { text: text.clone() }
        };

        self.sent = Some(text);
        Some(delta)
    }

    /// The text the consumer holds after every delta so far.
    pub fn text(&self) -> &str {
        self.sent.as_deref().unwrap_or_default()
    }
}

/// Deltas for every intermediate frame of `render`, then its terminal
/// frame, then [`FrameDelta::Done`].
pub fn deltas(mut render: Render) -> BoxStream<'static, Result<FrameDelta>> {
    Box::pin(try_stream! {
        let mut encoder = DeltaEncoder::new();
        while let Some(frame) = render.next().await {
            if let Some(delta) = encoder.encode(&frame?) {
                yield delta;
            }
        }
        let terminal = render
            .final_frame()
            .cloned()
            .ok_or_else(|| RenderError::internal("render finished without a terminal frame"))?;
        if let Some(delta) = encoder.encode(&terminal) {
            yield delta;
        }
        tracing::trace!(len = encoder.text().len(), "delta stream finished");
        yield FrameDelta::Done;
    })
}

/// Apply `delta` to `text`. Returns `false` for [`FrameDelta::Done`].
pub fn apply_delta(text: &mut String, delta: &FrameDelta) -> bool {
    match delta {
        FrameDelta::Replace { text: replacement } => {
            text.clone_from(replacement);
            true
        }
        FrameDelta::Append { text: suffix } => {
            text.push_str(suffix);
            true
        }
        FrameDelta::Done => false,
    }
}

pub fn to_json(delta: &FrameDelta) -> Result<String, DeltaError> {
    Ok(serde_json::to_string(delta)?)
}

pub fn from_json(json: &str) -> Result<FrameDelta, DeltaError> {
    Ok(serde_json::from_str(json)?)
}

pub fn to_msgpack(delta: &FrameDelta) -> Result<Vec<u8>, DeltaError> {
    Ok(rmp_serde::to_vec_named(delta)?)
}

pub fn from_msgpack(bytes: &[u8]) -> Result<FrameDelta, DeltaError> {
    Ok(rmp_serde::from_slice(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Component;
    use crate::render::{render, RenderContext, RenderOptions, Renderable};

    #[test]
    fn flagged_frames_become_appends() {
        let mut encoder = DeltaEncoder::new();
        assert_eq!(
            encoder.encode(&Frame::from_text("ab")),
            Some(FrameDelta::Replace { text: "ab".into() })
        );
        assert_eq!(
            encoder.encode(&Frame::from_text("abc").with_append_only(true)),
            Some(FrameDelta::Append { text: "c".into() })
        );
        assert_eq!(encoder.encode(&Frame::from_text("abc").with_append_only(true)), None);
        assert_eq!(
            encoder.encode(&Frame::from_text("x")),
            Some(FrameDelta::Replace { text: "x".into() })
        );
        assert_eq!(encoder.text(), "x");
    }

    #[test]
    fn flagged_frame_that_does_not_extend_falls_back_to_replace() {
        let mut encoder = DeltaEncoder::new();
        encoder.encode(&Frame::from_text("héllo"));
        assert_eq!(
            encoder.encode(&Frame::from_text("hello world").with_append_only(true)),
            Some(FrameDelta::Replace { text: "hello world".into() })
        );
    }

    #[test]
    fn wire_formats_decode_to_the_same_delta() {
        let delta = FrameDelta::Append { text: "3".into() };
        let json = to_json(&delta).unwrap();
        assert_eq!(json, r#"{"type":"append","text":"3"}"#);
        assert_eq!(from_json(&json).unwrap(), delta);

        let bytes = to_msgpack(&FrameDelta::Done).unwrap();
        assert_eq!(from_msgpack(&bytes).unwrap(), FrameDelta::Done);
        assert!(matches!(from_json("{"), Err(DeltaError::Json(_))));
    }

    #[tokio::test]
    async fn countdown_deltas_reassemble_the_final_text() {
        let countdown = Component::new("Countdown", |_: &(), _ctx: &RenderContext| {
            Ok(Renderable::stream(|tx| async move {
                tx.emit("5").await?;
                tx.emit("4").await?;
                tx.append_only().await?;
                tx.emit("3").await?;
                tx.emit("2").await?;
                tx.emit("1").await?;
                Ok("LIFTOFF")
            }))
        });

        let collected: Vec<FrameDelta> = deltas(render(countdown.element(()), RenderOptions::new()))
            .map(|delta| delta.unwrap())
            .collect()
            .await;

        assert_eq!(
            collected,
            vec![
                FrameDelta::Replace { text: "5".into() },
                FrameDelta::Replace { text: "4".into() },
                FrameDelta::Append { text: "3".into() },
                FrameDelta::Append { text: "2".into() },
                FrameDelta::Append { text: "1".into() },
                FrameDelta::Append { text: "LIFTOFF".into() },
                FrameDelta::Done,
            ]
        );

        let mut text = String::new();
        for delta in &collected {
            apply_delta(&mut text, delta);
        }
        assert_eq!(text, "4321LIFTOFF");
    }
}
