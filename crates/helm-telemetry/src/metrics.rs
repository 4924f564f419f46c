//! Prometheus metrics for the execution core.
//!
//! Covers fills, ledger transitions, order flow, strategy faults and
//! trade results, labelled by instrument.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()`. A failure means duplicate metric
//! names, which only happens during static initialization.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, Encoder,
    GaugeVec, HistogramVec, TextEncoder,
};

use crate::error::{TelemetryError, TelemetryResult};

/// Fills applied to a ledger.
pub static FILLS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "helm_fills_total",
        "Total fills applied to the position ledger",
        &["instrument", "purpose"]
    )
    .unwrap()
});

/// Ledger transitions.
/// Labels: transition (opened/increased/reduced/closed)
pub static TRANSITIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "helm_transitions_total",
        "Total position lifecycle transitions",
        &["instrument", "transition"]
    )
    .unwrap()
});

/// Orders emitted to the venue.
pub static ORDERS_SUBMITTED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "helm_orders_submitted_total",
        "Total orders submitted",
        &["instrument", "purpose", "order_type"]
    )
    .unwrap()
});

/// Cancel requests emitted to the venue.
pub static CANCELS_REQUESTED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "helm_cancels_requested_total",
        "Total cancel requests",
        &["instrument"]
    )
    .unwrap()
});

/// Intents refused at build time.
pub static INTENTS_REJECTED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "helm_intents_rejected_total",
        "Total intents rejected during validation",
        &["instrument", "purpose"]
    )
    .unwrap()
});

/// Errors returned by strategy hooks.
pub static STRATEGY_FAULTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "helm_strategy_faults_total",
        "Total strategy callback faults",
        &["instrument", "hook"]
    )
    .unwrap()
});

/// Closed trades by the purpose of the closing order.
pub static TRADES_CLOSED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "helm_trades_closed_total",
        "Total closed trades",
        &["instrument", "close_purpose"]
    )
    .unwrap()
});

/// Net PnL per closed trade.
pub static TRADE_PNL: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "helm_trade_pnl",
        "Net PnL of closed trades",
        &["instrument"],
        vec![-1000.0, -100.0, -10.0, -1.0, 0.0, 1.0, 10.0, 100.0, 1000.0]
    )
    .unwrap()
});

/// Signed open quantity.
pub static POSITION_QUANTITY: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "helm_position_quantity",
        "Signed open quantity (positive long, negative short)",
        &["instrument"]
    )
    .unwrap()
});

/// Metrics facade.
pub struct Metrics;

impl Metrics {
    /// Record a fill applied to the ledger.
    pub fn fill_applied(instrument: &str, purpose: &str) {
        FILLS_TOTAL.with_label_values(&[instrument, purpose]).inc();
    }

    /// Record a ledger transition.
    pub fn transition(instrument: &str, transition: &str) {
        TRANSITIONS_TOTAL
            .with_label_values(&[instrument, transition])
            .inc();
    }

    pub fn order_submitted(instrument: &str, purpose: &str, order_type: &str) {
        ORDERS_SUBMITTED_TOTAL
            .with_label_values(&[instrument, purpose, order_type])
            .inc();
    }

    pub fn cancel_requested(instrument: &str) {
        CANCELS_REQUESTED_TOTAL.with_label_values(&[instrument]).inc();
    }

    pub fn intent_rejected(instrument: &str, purpose: &str) {
        INTENTS_REJECTED_TOTAL
            .with_label_values(&[instrument, purpose])
            .inc();
    }

    /// Record a strategy hook returning an error.
    pub fn strategy_fault(instrument: &str, hook: &str) {
        STRATEGY_FAULTS_TOTAL
            .with_label_values(&[instrument, hook])
            .inc();
    }

    /// Record a closed trade and its net PnL.
    pub fn trade_closed(instrument: &str, close_purpose: &str, net_pnl: f64) {
        TRADES_CLOSED_TOTAL
            .with_label_values(&[instrument, close_purpose])
            .inc();
        TRADE_PNL.with_label_values(&[instrument]).observe(net_pnl);
    }

    pub fn position_quantity(instrument: &str, signed_quantity: f64) {
        POSITION_QUANTITY
            .with_label_values(&[instrument])
            .set(signed_quantity);
    }

    /// Render the default registry in the Prometheus text format.
    pub fn gather_text() -> TelemetryResult<String> {
        let encoder = TextEncoder::new();
        let families = prometheus::gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&families, &mut buffer)
            .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| TelemetryError::Metrics(e.to_string()))
    }
}
