//! A `tracing_subscriber::Layer` that forwards `WARN`/`ERROR` (and
//! optionally `INFO`) records onto the Event Bus as [`HubEvent::Log`]
//! events, so SSE subscribers see them without tailing the log file
//! (spec §10.1, §4.5).

use crate::event::{HubEvent, LogLevel, LogPayload};
use crate::event_bus::EventSender;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

/// Mirrors every `tracing` event at or above its configured level onto the
/// bus. Installed alongside the file-writing `fmt` layer; producers never
/// know this layer exists, they just call `tracing::warn!`/`error!` as
/// usual.
pub struct BusLogLayer {
    sender: EventSender,
    include_info: bool,
}

impl BusLogLayer {
    pub fn new(sender: EventSender, include_info: bool) -> Self {
        Self {
            sender,
            include_info,
        }
    }
}

impl<S: Subscriber> Layer<S> for BusLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let level = match *event.metadata().level() {
            Level::ERROR => LogLevel::Error,
            Level::WARN => LogLevel::Warn,
            Level::INFO if self.include_info => LogLevel::Info,
            _ => return,
        };

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let message = visitor
            .message
            .unwrap_or_else(|| event.metadata().target().to_string());

        self.sender.emit(HubEvent::Log(LogPayload {
            level,
            code: event.metadata().target().to_string(),
            message,
            data: visitor.fields,
        }));
    }
}

struct FieldVisitor {
    message: Option<String>,
    fields: serde_json::Value,
}

impl Default for FieldVisitor {
    fn default() -> Self {
        Self {
            message: None,
            fields: serde_json::json!({}),
        }
    }
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{value:?}"));
            return;
        }
        if let Some(map) = self.fields.as_object_mut() {
            map.insert(field.name().to_string(), serde_json::Value::String(format!("{value:?}")));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
            return;
        }
        if let Some(map) = self.fields.as_object_mut() {
            map.insert(field.name().to_string(), serde_json::Value::String(value.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_bus::EventBus;
    use tracing_subscriber::prelude::*;

    #[tokio::test]
    async fn warn_and_error_reach_the_bus_but_debug_does_not() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let layer = BusLogLayer::new(bus.sender(), false);

        let _guard = tracing_subscriber::registry().with(layer).set_default();
        tracing::debug!("ignored");
        tracing::warn!(code = "test", "something is off");
        tracing::error!("boom");

        let first = rx.recv().await.unwrap();
        assert!(matches!(
            first.event,
            HubEvent::Log(LogPayload { level: LogLevel::Warn, .. })
        ));
        let second = rx.recv().await.unwrap();
        assert!(matches!(
            second.event,
            HubEvent::Log(LogPayload { level: LogLevel::Error, .. })
        ));
    }

    #[tokio::test]
    async fn info_is_forwarded_only_when_enabled() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let layer = BusLogLayer::new(bus.sender(), true);

        let _guard = tracing_subscriber::registry().with(layer).set_default();
        tracing::info!("hub is ready");

        let envelope = rx.recv().await.unwrap();
        assert!(matches!(
            envelope.event,
            HubEvent::Log(LogPayload { level: LogLevel::Info, .. })
        ));
    }
}
