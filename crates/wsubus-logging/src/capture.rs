//! In-memory capture of tracing events for test assertions.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::level_filters::LevelFilter;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;

/// A captured tracing event.
#[derive(Clone, Debug)]
pub struct CapturedEvent {
    /// Level.
    pub level: Level,
    /// Target module.
    pub target: String,
    /// Formatted message.
    pub message: String,
    /// Other fields as `(name, value)` pairs.
    pub fields: Vec<(String, String)>,
}

/// Shared store of captured events.
#[derive(Clone, Default)]
pub struct CapturedLogs {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl CapturedLogs {
    /// All captured events.
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.events.lock().clone()
    }

    /// Whether any event at `level` contains `message_contains`.
    pub fn has_event(&self, level: Level, message_contains: &str) -> bool {
        self.events
            .lock()
            .iter()
            .any(|e| e.level == level && e.message.contains(message_contains))
    }

    /// Whether any event contains `message_contains`.
    pub fn has_message(&self, message_contains: &str) -> bool {
        self.events
            .lock()
            .iter()
            .any(|e| e.message.contains(message_contains))
    }

    /// Count events at `level`.
    pub fn count_at_level(&self, level: Level) -> usize {
        self.events.lock().iter().filter(|e| e.level == level).count()
    }

    /// Drop everything captured so far.
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

struct CaptureLayer {
    logs: CapturedLogs,
}

#[derive(Default)]
struct FieldVisitor {
    message: String,
    fields: Vec<(String, String)>,
}

impl tracing::field::Visit for FieldVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        let val = format!("{value:?}");
        if field.name() == "message" {
            self.message = val;
        } else {
            self.fields.push((field.name().to_owned(), val));
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            value.clone_into(&mut self.message);
        } else {
            self.fields.push((field.name().to_owned(), value.to_owned()));
        }
    }
}

impl<S> Layer<S> for CaptureLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        self.logs.events.lock().push(CapturedEvent {
            level: *metadata.level(),
            target: metadata.target().to_owned(),
            message: visitor.message,
            fields: visitor.fields,
        });
    }
}

/// Install a capturing subscriber for the current thread.
///
/// Keep the returned guard alive for the duration of the test. Use a
/// current-thread runtime when capturing from async code so every task
/// runs on the capturing thread.
pub fn capture_logs() -> (CapturedLogs, tracing::subscriber::DefaultGuard) {
    let logs = CapturedLogs::default();
    let layer = CaptureLayer { logs: logs.clone() };

    let subscriber = tracing_subscriber::registry()
        .with(layer)
        .with(LevelFilter::TRACE);

    let guard = subscriber.set_default();
    (logs, guard)
}
