//! Per-execution log capture.
//!
//! The scheduler wraps every execution in a span carrying a `job_id`
//! field. `JobLogLayer` watches for events inside such spans and copies
//! their formatted lines into a per-job buffer, capped at 1,000 lines.
//! When the execution finishes, the buffer drains into the
//! job_executions row.

use chrono::Utc;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex};
use tracing::field::{Field, Visit};
use tracing::span;
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// Cap on captured lines per execution.
const MAX_CAPTURED_LINES: usize = 1_000;

/// Shared buffers, keyed by job id. One buffer exists only while its
/// execution is in flight.
#[derive(Clone, Default)]
pub struct LogCaptureRegistry {
    inner: Arc<Mutex<HashMap<String, Vec<String>>>>,
}

impl LogCaptureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a capture buffer for a job execution.
    pub fn begin(&self, job_id: &str) {
        if let Ok(mut buffers) = self.inner.lock() {
            buffers.insert(job_id.to_string(), Vec::new());
        }
    }

    /// Append a line if a buffer is open for this job.
    pub fn append(&self, job_id: &str, line: String) {
        if let Ok(mut buffers) = self.inner.lock() {
            if let Some(buffer) = buffers.get_mut(job_id) {
                if buffer.len() < MAX_CAPTURED_LINES {
                    buffer.push(line);
                }
            }
        }
    }

    /// Close the buffer and return everything captured.
    pub fn end(&self, job_id: &str) -> Vec<String> {
        self.inner
            .lock()
            .ok()
            .and_then(|mut buffers| buffers.remove(job_id))
            .unwrap_or_default()
    }
}

/// Span extension marking which job a span belongs to.
struct JobIdTag(String);

/// Tracing layer that mirrors events under `job_id` spans into the
/// capture registry. Install once at logging init.
pub struct JobLogLayer {
    registry: LogCaptureRegistry,
}

impl JobLogLayer {
    pub fn new(registry: LogCaptureRegistry) -> Self {
        Self { registry }
    }
}

impl<S> Layer<S> for JobLogLayer
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        let mut visitor = JobIdVisitor::default();
        attrs.record(&mut visitor);

        if let Some(job_id) = visitor.job_id {
            if let Some(span) = ctx.span(id) {
                span.extensions_mut().insert(JobIdTag(job_id));
            }
        }
    }

    fn on_event(&self, event: &tracing::Event<'_>, ctx: Context<'_, S>) {
        let Some(scope) = ctx.event_scope(event) else {
            return;
        };

        // Innermost enclosing span tagged with a job id wins.
        let job_id = scope.into_iter().find_map(|span| {
            span.extensions()
                .get::<JobIdTag>()
                .map(|tag| tag.0.clone())
        });
        let Some(job_id) = job_id else {
            return;
        };

        let mut visitor = EventVisitor::default();
        event.record(&mut visitor);

        let line = format!(
            "{} {:>5} {}: {}",
            Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ"),
            event.metadata().level(),
            event.metadata().target(),
            visitor.rendered(),
        );
        self.registry.append(&job_id, line);
    }
}

#[derive(Default)]
struct JobIdVisitor {
    job_id: Option<String>,
}

impl Visit for JobIdVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "job_id" {
            self.job_id = Some(value.to_string());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "job_id" {
            self.job_id = Some(format!("{value:?}").trim_matches('"').to_string());
        }
    }
}

#[derive(Default)]
struct EventVisitor {
    message: String,
    fields: String,
}

impl EventVisitor {
    fn rendered(&self) -> String {
        if self.fields.is_empty() {
            self.message.clone()
        } else if self.message.is_empty() {
            self.fields.clone()
        } else {
            format!("{} {}", self.message, self.fields)
        }
    }
}

impl Visit for EventVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            let _ = write!(self.fields, "{}={} ", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            let _ = write!(self.fields, "{}={:?} ", field.name(), value);
        }
    }
}
