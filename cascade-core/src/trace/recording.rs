//! In-memory span recorder.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;

use super::{Span, SpanId, SpanRequest, SpanStatus, Tracer};

/// One recorded span.
#[derive(Debug, Clone, PartialEq)]
pub struct SpanRecord {
    pub id: SpanId,
    pub parent: Option<SpanId>,
    pub link: Option<SpanId>,
    /// The component name of the traced element.
    pub name: String,
    pub attributes: IndexMap<String, String>,
    /// `None` while the span is open.
    pub status: Option<SpanStatus>,
    /// How many times the span was ended. Anything but one is a bug.
    pub close_count: usize,
}

impl SpanRecord {
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn is_open(&self) -> bool {
        self.status.is_none()
    }
}

type Arena = Arc<Mutex<IndexMap<SpanId, SpanRecord>>>;

/// A tracer that keeps every span in memory, in start order.
///
/// Clones share the same recording.
#[derive(Debug, Clone, Default)]
pub struct RecordingTracer {
    spans: Arena,
}

impl RecordingTracer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every span recorded so far.
    pub fn spans(&self) -> Vec<SpanRecord> {
        self.spans.lock().values().cloned().collect()
    }

    pub fn span(&self, id: SpanId) -> Option<SpanRecord> {
        self.spans.lock().get(&id).cloned()
    }

    /// The first span recorded for the named component.
    pub fn find(&self, name: &str) -> Option<SpanRecord> {
        self.spans
            .lock()
            .values()
            .find(|span| span.name == name)
            .cloned()
    }

    pub fn children(&self, parent: SpanId) -> Vec<SpanRecord> {
        self.spans
            .lock()
            .values()
            .filter(|span| span.parent == Some(parent))
            .cloned()
            .collect()
    }

    /// Spans that have not been closed.
    pub fn open_spans(&self) -> Vec<SpanRecord> {
        self.spans
            .lock()
            .values()
            .filter(|span| span.is_open())
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.spans.lock().clear();
    }
}

impl Tracer for RecordingTracer {
    fn start_span(&self, request: SpanRequest<'_>) -> Box<dyn Span> {
        let id = SpanId::next();
        self.spans.lock().insert(
            id,
            SpanRecord {
                id,
                parent: request.parent,
                link: request.link,
                name: request.element.tag().name().to_string(),
                attributes: IndexMap::new(),
                status: None,
                close_count: 0,
            },
        );
        Box::new(RecordedSpan {
            id,
            spans: Arc::clone(&self.spans),
        })
    }
}

struct RecordedSpan {
    id: SpanId,
    spans: Arena,
}

impl Span for RecordedSpan {
    fn id(&self) -> SpanId {
        self.id
    }

    fn set_attribute(&mut self, key: &str, value: String) {
        if let Some(record) = self.spans.lock().get_mut(&self.id) {
            record.attributes.insert(key.to_string(), value);
        }
    }

    fn end(self: Box<Self>, status: SpanStatus) {
        if let Some(record) = self.spans.lock().get_mut(&self.id) {
            record.close_count += 1;
            record.status = Some(status);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Component;
    use crate::render::RenderContext;

    #[test]
    fn records_requests_and_closings() {
        let tracer = RecordingTracer::new();
        let element = Component::new("Probe", |_: &(), _ctx: &RenderContext| Ok("")).element(());

        let mut root = tracer.start_span(SpanRequest {
            element: &element,
            parent: None,
            link: None,
        });
        root.set_attribute("component", "Probe".to_string());
        let child = tracer.start_span(SpanRequest {
            element: &element,
            parent: Some(root.id()),
            link: None,
        });
        let root_id = root.id();

        assert_eq!(tracer.open_spans().len(), 2);
        child.end(SpanStatus::Abandoned);
        root.end(SpanStatus::Ok {
            output: String::new(),
        });

        assert!(tracer.open_spans().is_empty());
        assert_eq!(tracer.children(root_id).len(), 1);
        assert_eq!(tracer.span(root_id).unwrap().attribute("component"), Some("Probe"));
        assert_eq!(tracer.spans()[1].status, Some(SpanStatus::Abandoned));

        tracer.clear();
        assert!(tracer.spans().is_empty());
    }
}
