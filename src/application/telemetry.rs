//! Best-effort event fan-out plus push-based cycle/order counters.
//!
//! Publish/subscribe over a [`tokio::sync::broadcast`] channel, so a slow
//! or absent subscriber never blocks the trading cycle, paired with
//! `prometheus` counters pushed on the same events.

use crate::domain::cycle_report::CycleReport;
use crate::domain::trading::order::OrderSide;
use prometheus::{HistogramVec, IntCounterVec, Opts, Registry};
use rust_decimal::Decimal;
use tokio::sync::broadcast;
use tracing::debug;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub enum TelemetryEvent {
    SessionStarted,
    SessionEnded,
    CycleCompleted(CycleReport),
    OrderPlaced {
        side: OrderSide,
        symbol: String,
        quantity: u64,
        price: Decimal,
        accepted: bool,
    },
    Error { kind: String, message: String },
}

/// Publishes [`TelemetryEvent`]s to any subscriber and mirrors the same
/// activity into `prometheus` counters. Publication never blocks and never
/// fails the caller: a `send` with no receivers, or a lagging receiver, is
/// logged at `debug!` and otherwise ignored.
pub struct TelemetryHub {
    sender: broadcast::Sender<TelemetryEvent>,
    cycles_total: IntCounterVec,
    orders_total: IntCounterVec,
    errors_total: IntCounterVec,
    cycle_duration_seconds: HistogramVec,
    _registry: Registry,
}

impl TelemetryHub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        let registry = Registry::new();

        let cycles_total = IntCounterVec::new(
            Opts::new("kis_cycles_total", "Total trading cycles completed"),
            &["account_type"],
        )
        .expect("valid metric");
        let orders_total = IntCounterVec::new(
            Opts::new("kis_orders_total", "Total orders placed"),
            &["side", "accepted"],
        )
        .expect("valid metric");
        let errors_total = IntCounterVec::new(
            Opts::new("kis_telemetry_errors_total", "Total errors reported by kind"),
            &["kind"],
        )
        .expect("valid metric");
        let cycle_duration_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new("kis_cycle_duration_seconds", "Cycle wall-clock duration"),
            &["account_type"],
        )
        .expect("valid metric");

        registry.register(Box::new(cycles_total.clone())).expect("register cycles_total");
        registry.register(Box::new(orders_total.clone())).expect("register orders_total");
        registry.register(Box::new(errors_total.clone())).expect("register errors_total");
        registry
            .register(Box::new(cycle_duration_seconds.clone()))
            .expect("register cycle_duration_seconds");

        Self {
            sender,
            cycles_total,
            orders_total,
            errors_total,
            cycle_duration_seconds,
            _registry: registry,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TelemetryEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: TelemetryEvent) {
        match &event {
            TelemetryEvent::CycleCompleted(_) => {
                self.cycles_total.with_label_values(&["session"]).inc();
            }
            TelemetryEvent::OrderPlaced { side, accepted, .. } => {
                let side_label = side.to_string();
                let accepted_label = if *accepted { "true" } else { "false" };
                self.orders_total
                    .with_label_values(&[&side_label, accepted_label])
                    .inc();
            }
            TelemetryEvent::Error { kind, .. } => {
                self.errors_total.with_label_values(&[kind]).inc();
            }
            TelemetryEvent::SessionStarted | TelemetryEvent::SessionEnded => {}
        }

        if self.sender.send(event).is_err() {
            debug!("telemetry event published with no active subscribers");
        }
    }

    pub fn observe_cycle_duration(&self, account_type: &str, seconds: f64) {
        self.cycle_duration_seconds
            .with_label_values(&[account_type])
            .observe(seconds);
    }
}

impl Default for TelemetryHub {
    fn default() -> Self {
        Self::new()
    }
}
