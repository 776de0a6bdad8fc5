//! Prometheus metrics for reservations, purchases and background sweeps.
//!
//! Metric names are prefixed with `raffle_`. Offering ids are only used as a
//! label on the drift gauge, which is bounded by the number of open offerings.
//!
//! # Example
//!
//! ```rust,no_run
//! use raffle_runtime::metrics::MetricsServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! // Metrics available at http://localhost:9090/metrics
//! # Ok(())
//! # }
//! ```

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use raffle_core::{OfferingId, ReservationStatus};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics server.
///
/// Exposes metrics on an HTTP endpoint for Prometheus scraping.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Install the recorder and spawn the HTTP listener on the current runtime.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built (e.g. the address cannot
    /// be bound) or a different recorder is already installed.
    ///
    /// # Note
    ///
    /// Must be called from within a Tokio runtime. In production, call once.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        let (recorder, exporter) = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?
            .with_http_listener(self.addr)
            .build()
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        let handle = recorder.handle();
        metrics::set_global_recorder(recorder).map_err(|_| {
            MetricsError::Install("a metrics recorder is already installed".to_string())
        })?;
        // Descriptions reach only the recorder installed at the time.
        register_metrics();

        tokio::spawn(async move {
            // `ExporterError` implements neither `Debug` nor `Display`.
            if exporter.await.is_err() {
                tracing::error!("Metrics exporter stopped with an error");
            }
        });

        self.handle = Some(handle);
        tracing::info!(addr = %self.addr, "Metrics server started - available at http://{}/metrics", self.addr);
        Ok(())
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if server hasn't been started.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
pub fn register_metrics() {
    // Reservations
    describe_counter!(
        "raffle_reservations_created_total",
        "Reservations created (inventory held and row persisted)"
    );
    describe_counter!(
        "raffle_reservations_rejected_total",
        "Reservation requests denied, by reason"
    );
    describe_counter!(
        "raffle_reservation_transitions_total",
        "Reservations leaving the pending state, by target status"
    );
    describe_histogram!(
        "raffle_reservation_create_duration_seconds",
        "Time taken to create a reservation"
    );

    // Purchases
    describe_counter!("raffle_tickets_issued_total", "Tickets issued at confirmation");
    describe_counter!(
        "raffle_payment_signals_duplicate_total",
        "Payment signals for reservations already in a terminal state"
    );
    describe_histogram!(
        "raffle_purchase_confirm_duration_seconds",
        "Time taken to confirm a paid reservation"
    );

    // Ledger
    describe_counter!(
        "raffle_ledger_retries_total",
        "Transient ledger or store failures that were retried"
    );
    describe_counter!(
        "raffle_ledger_retries_exhausted_total",
        "Operations that failed after exhausting retries"
    );
    describe_counter!(
        "raffle_inventory_leaked_total",
        "Holds that could not be released or committed and need reconciliation"
    );

    // Reaper
    describe_counter!("raffle_reaper_sweeps_total", "Reaper sweeps completed");
    describe_counter!("raffle_reaper_expired_total", "Reservations expired by the reaper");
    describe_counter!(
        "raffle_reaper_failures_total",
        "Rows the reaper failed to process"
    );
    describe_histogram!(
        "raffle_reaper_sweep_duration_seconds",
        "Time taken by one reaper sweep"
    );

    // Reconciler
    describe_counter!(
        "raffle_reconciler_repairs_total",
        "Stranded ledger holds settled by the reconciler, by action"
    );
    describe_gauge!(
        "raffle_inventory_drift",
        "Ledger available minus durable-store available, per offering"
    );

    // Promotions
    describe_counter!(
        "raffle_promotion_usages_total",
        "Promotion applications, by outcome"
    );
}

/// Metrics recorder for the reservation services.
pub struct ReservationMetrics;

impl ReservationMetrics {
    /// Record a created reservation.
    pub fn record_created(duration: Duration) {
        counter!("raffle_reservations_created_total").increment(1);
        histogram!("raffle_reservation_create_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a denied reservation request.
    pub fn record_rejected(reason: &'static str) {
        counter!("raffle_reservations_rejected_total", "reason" => reason).increment(1);
    }

    /// Record a pending → terminal transition.
    pub fn record_transition(to: ReservationStatus) {
        counter!("raffle_reservation_transitions_total", "to" => to.as_str()).increment(1);
    }

    /// Record a confirmation and the tickets it issued.
    pub fn record_confirmed(tickets: usize, duration: Duration) {
        Self::record_transition(ReservationStatus::Confirmed);
        counter!("raffle_tickets_issued_total").increment(tickets as u64);
        histogram!("raffle_purchase_confirm_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a payment signal that arrived after the reservation settled.
    pub fn record_duplicate_signal() {
        counter!("raffle_payment_signals_duplicate_total").increment(1);
    }

    /// Record a retried operation.
    pub fn record_retry(operation: &'static str) {
        counter!("raffle_ledger_retries_total", "operation" => operation).increment(1);
    }

    /// Record an operation that exhausted its retries.
    pub fn record_retry_exhausted(operation: &'static str) {
        counter!("raffle_ledger_retries_exhausted_total", "operation" => operation).increment(1);
    }

    /// Record a hold the ledger could not settle.
    pub fn record_leak(operation: &'static str) {
        counter!("raffle_inventory_leaked_total", "operation" => operation).increment(1);
    }

    /// Record a promotion application outcome.
    pub fn record_promotion(outcome: &'static str) {
        counter!("raffle_promotion_usages_total", "outcome" => outcome).increment(1);
    }
}

/// Metrics recorder for the background sweeps.
pub struct SweepMetrics;

impl SweepMetrics {
    /// Record a finished reaper sweep.
    pub fn record_reap(expired: u64, failed: u64, duration: Duration) {
        counter!("raffle_reaper_sweeps_total").increment(1);
        counter!("raffle_reaper_expired_total").increment(expired);
        counter!("raffle_reaper_failures_total").increment(failed);
        histogram!("raffle_reaper_sweep_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record stranded holds the reconciler committed or released.
    pub fn record_repair(action: &'static str, holds: u32) {
        counter!("raffle_reconciler_repairs_total", "action" => action).increment(u64::from(holds));
    }

    /// Record ledger/store drift for an offering.
    #[allow(clippy::cast_precision_loss)]
    pub fn record_drift(offering_id: OfferingId, drift: i64) {
        gauge!("raffle_inventory_drift", "offering" => offering_id.to_string()).set(drift as f64);
    }
}
