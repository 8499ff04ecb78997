//! Custom tracing layer for JSONL output.
//!
//! This layer produces machine-parseable JSONL logs on stderr while
//! keeping stdout clean for command payloads.

use std::io::{self, Write};
use std::sync::Mutex;

use chrono::Utc;
use tracing::span::{Attributes, Id};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

use super::mask_contact;

/// Storage for span context data.
#[derive(Debug, Clone, Default)]
struct SpanContext {
    run_id: Option<String>,
    actor: Option<String>,
    host_id: Option<String>,
    stage: Option<String>,
    escalation_id: Option<String>,
}

/// A visitor that extracts field values from tracing events.
struct JsonFieldVisitor {
    fields: serde_json::Map<String, serde_json::Value>,
    message: Option<String>,
}

impl JsonFieldVisitor {
    fn new() -> Self {
        JsonFieldVisitor {
            fields: serde_json::Map::new(),
            message: None,
        }
    }

    fn insert_text(&mut self, name: &str, value: String) {
        if name == "message" {
            self.message = Some(value);
            return;
        }
        let value = if is_contact_field(name) {
            mask_contact(&value)
        } else {
            value
        };
        self.fields
            .insert(name.to_string(), serde_json::Value::String(value));
    }
}

impl tracing::field::Visit for JsonFieldVisitor {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.insert_text(field.name(), value.to_string());
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.insert_text(field.name(), format!("{:?}", value));
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.fields.insert(
            field.name().to_string(),
            serde_json::Value::Number(value.into()),
        );
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.fields.insert(
            field.name().to_string(),
            serde_json::Value::Number(serde_json::Number::from(value)),
        );
    }

    fn record_f64(&mut self, field: &tracing::field::Field, value: f64) {
        if let Some(n) = serde_json::Number::from_f64(value) {
            self.fields
                .insert(field.name().to_string(), serde_json::Value::Number(n));
        }
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.fields
            .insert(field.name().to_string(), serde_json::Value::Bool(value));
    }
}

/// Fields that carry reporter phone numbers or e-mail addresses.
fn is_contact_field(name: &str) -> bool {
    matches!(name, "contact" | "contact_info" | "phone" | "email")
}

/// A visitor for extracting span context.
struct SpanContextVisitor {
    context: SpanContext,
}

impl SpanContextVisitor {
    fn new() -> Self {
        SpanContextVisitor {
            context: SpanContext::default(),
        }
    }

    fn set(&mut self, name: &str, value: String) {
        match name {
            "run_id" => self.context.run_id = Some(value),
            "actor" => self.context.actor = Some(value),
            "host_id" => self.context.host_id = Some(value),
            "stage" => self.context.stage = Some(value),
            "escalation_id" => self.context.escalation_id = Some(value),
            _ => {}
        }
    }
}

impl tracing::field::Visit for SpanContextVisitor {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.set(field.name(), value.to_string());
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.set(field.name(), format!("{:?}", value));
    }
}

/// JSONL tracing layer that outputs to stderr.
pub struct JsonlLayer<W = io::Stderr> {
    writer: Mutex<W>,
}

impl JsonlLayer<io::Stderr> {
    /// Create a new JSONL layer writing to stderr.
    pub fn stderr() -> Self {
        JsonlLayer {
            writer: Mutex::new(io::stderr()),
        }
    }
}

impl<W: Write> JsonlLayer<W> {
    /// Create a new JSONL layer with a custom writer.
    pub fn new(writer: W) -> Self {
        JsonlLayer {
            writer: Mutex::new(writer),
        }
    }
}

impl<S, W> Layer<S> for JsonlLayer<W>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: Write + 'static,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let mut visitor = SpanContextVisitor::new();
        attrs.record(&mut visitor);

        if let Some(span) = ctx.span(id) {
            span.extensions_mut().insert(visitor.context);
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let ts = Utc::now();

        // Innermost span wins for each correlation field
        let mut merged = SpanContext::default();
        if let Some(scope) = ctx.event_scope(event) {
            for span in scope {
                if let Some(span_ctx) = span.extensions().get::<SpanContext>() {
                    if merged.run_id.is_none() {
                        merged.run_id.clone_from(&span_ctx.run_id);
                    }
                    if merged.actor.is_none() {
                        merged.actor.clone_from(&span_ctx.actor);
                    }
                    if merged.host_id.is_none() {
                        merged.host_id.clone_from(&span_ctx.host_id);
                    }
                    if merged.stage.is_none() {
                        merged.stage.clone_from(&span_ctx.stage);
                    }
                    if merged.escalation_id.is_none() {
                        merged.escalation_id.clone_from(&span_ctx.escalation_id);
                    }
                }
            }
        }

        let mut visitor = JsonFieldVisitor::new();
        event.record(&mut visitor);

        // Event-level correlation fields override span context
        for key in ["run_id", "actor", "host_id", "stage", "escalation_id"] {
            if let Some(serde_json::Value::String(v)) = visitor.fields.remove(key) {
                match key {
                    "run_id" => merged.run_id = Some(v),
                    "actor" => merged.actor = Some(v),
                    "host_id" => merged.host_id = Some(v),
                    "stage" => merged.stage = Some(v),
                    _ => merged.escalation_id = Some(v),
                }
            }
        }

        let level = event.metadata().level().as_str().to_ascii_lowercase();
        let mut obj = serde_json::Map::new();

        obj.insert("ts".to_string(), serde_json::json!(ts.to_rfc3339()));
        obj.insert("level".to_string(), serde_json::json!(level));
        obj.insert(
            "event".to_string(),
            serde_json::json!(event.metadata().target()),
        );

        if let Some(id) = merged.run_id {
            obj.insert("run_id".to_string(), serde_json::json!(id));
        }
        if let Some(actor) = merged.actor {
            obj.insert("actor".to_string(), serde_json::json!(actor));
        }
        if let Some(id) = merged.host_id {
            obj.insert("host_id".to_string(), serde_json::json!(id));
        }
        if let Some(s) = merged.stage {
            obj.insert("stage".to_string(), serde_json::json!(s));
        }
        if let Some(id) = merged.escalation_id {
            obj.insert("escalation_id".to_string(), serde_json::json!(id));
        }
        if let Some(msg) = visitor.message {
            obj.insert("message".to_string(), serde_json::json!(msg));
        }

        if !visitor.fields.is_empty() {
            obj.insert(
                "fields".to_string(),
                serde_json::Value::Object(visitor.fields),
            );
        }

        let json = serde_json::to_string(&serde_json::Value::Object(obj)).unwrap_or_default();
        if let Ok(mut writer) = self.writer.lock() {
            let _ = writeln!(writer, "{}", json);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tracing_subscriber::layer::SubscriberExt;

    fn make_buffer_layer() -> (Arc<Mutex<Vec<u8>>>, impl Layer<tracing_subscriber::Registry>) {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        struct BufWriter(Arc<Mutex<Vec<u8>>>);
        impl Write for BufWriter {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                self.0.lock().unwrap().write(buf)
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }
        let layer = JsonlLayer::new(BufWriter(buffer.clone()));
        (buffer, layer)
    }

    fn captured(buffer: &Arc<Mutex<Vec<u8>>>) -> serde_json::Value {
        let output = buffer.lock().unwrap();
        let json_str = String::from_utf8_lossy(&output);
        serde_json::from_str(json_str.trim()).expect("valid JSON line")
    }

    #[test]
    fn test_jsonl_layer_output() {
        let (buffer, layer) = make_buffer_layer();
        let subscriber = tracing_subscriber::registry().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "test.event", message = "test message");
        });

        let parsed = captured(&buffer);
        assert_eq!(parsed["level"], "info");
        assert_eq!(parsed["message"], "test message");
        assert_eq!(parsed["event"], "test.event");
        assert!(parsed["ts"].is_string());
    }

    #[test]
    fn layer_records_extra_fields() {
        let (buffer, layer) = make_buffer_layer();
        let subscriber = tracing_subscriber::registry().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(target: "breach.detected", elapsed_hours = 8.0, urgent = true, message = "hi");
        });

        let parsed = captured(&buffer);
        assert_eq!(parsed["level"], "warn");
        assert_eq!(parsed["fields"]["elapsed_hours"], 8.0);
        assert_eq!(parsed["fields"]["urgent"], true);
    }

    #[test]
    fn layer_masks_contact_fields() {
        let (buffer, layer) = make_buffer_layer();
        let subscriber = tracing_subscriber::registry().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "report.created", contact_info = "+2348030000000", message = "ok");
        });

        let parsed = captured(&buffer);
        let masked = parsed["fields"]["contact_info"].as_str().unwrap();
        assert!(masked.starts_with("contact:"));
        assert!(!masked.contains("8030000000"));
    }

    #[test]
    fn layer_hoists_correlation_fields() {
        let (buffer, layer) = make_buffer_layer();
        let subscriber = tracing_subscriber::registry().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            let span = tracing::info_span!("cmd", run_id = "run-abc", actor = "u-1");
            let _enter = span.enter();
            tracing::info!(target: "rca.submitted", escalation_id = "e-9", message = "done");
        });

        let parsed = captured(&buffer);
        assert_eq!(parsed["run_id"], "run-abc");
        assert_eq!(parsed["actor"], "u-1");
        assert_eq!(parsed["escalation_id"], "e-9");
        assert!(parsed.get("fields").is_none());
    }

    #[test]
    fn layer_stamps_run_context_on_events() {
        let (buffer, layer) = make_buffer_layer();
        let subscriber = tracing_subscriber::registry().with(layer);
        let ctx = crate::logging::LogContext::new("run-0123456789ab", "host-abcd1234")
            .with_actor("u-fn-1");

        tracing::subscriber::with_default(subscriber, || {
            let _run = ctx.span().entered();
            tracing::info!(target: "escalation.created", message = "opened");
        });

        let parsed = captured(&buffer);
        assert_eq!(parsed["run_id"], "run-0123456789ab");
        assert_eq!(parsed["host_id"], "host-abcd1234");
        assert_eq!(parsed["actor"], "u-fn-1");
    }
}
