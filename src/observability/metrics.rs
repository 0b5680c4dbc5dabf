use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry,
    TextEncoder,
};

use crate::models::driver::Driver;
use crate::models::order::OrderStatus;

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub operations_total: IntCounterVec,
    pub operation_latency_seconds: HistogramVec,
    pub order_transitions_total: IntCounterVec,
    pub driver_queue_length: IntGaugeVec,
    pub earnings_records_total: IntCounter,
    pub payouts_total: IntCounter,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let operations_total = IntCounterVec::new(
            Opts::new(
                "dispatch_operations_total",
                "Dispatch and lifecycle operations by outcome",
            ),
            &["operation", "outcome"],
        )
        .expect("valid dispatch_operations_total metric");

        let operation_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "dispatch_operation_latency_seconds",
                "Latency of dispatch and lifecycle operations in seconds",
            ),
            &["operation", "outcome"],
        )
        .expect("valid dispatch_operation_latency_seconds metric");

        let order_transitions_total = IntCounterVec::new(
            Opts::new("order_transitions_total", "Order status transitions by target"),
            &["to"],
        )
        .expect("valid order_transitions_total metric");

        let driver_queue_length = IntGaugeVec::new(
            Opts::new("driver_queue_length", "Orders waiting in each driver queue"),
            &["driver_id"],
        )
        .expect("valid driver_queue_length metric");

        let earnings_records_total =
            IntCounter::new("earnings_records_total", "Earnings records created")
                .expect("valid earnings_records_total metric");

        let payouts_total = IntCounter::new("payouts_total", "Earnings records marked as paid")
            .expect("valid payouts_total metric");

        registry
            .register(Box::new(operations_total.clone()))
            .expect("register dispatch_operations_total");
        registry
            .register(Box::new(operation_latency_seconds.clone()))
            .expect("register dispatch_operation_latency_seconds");
        registry
            .register(Box::new(order_transitions_total.clone()))
            .expect("register order_transitions_total");
        registry
            .register(Box::new(driver_queue_length.clone()))
            .expect("register driver_queue_length");
        registry
            .register(Box::new(earnings_records_total.clone()))
            .expect("register earnings_records_total");
        registry
            .register(Box::new(payouts_total.clone()))
            .expect("register payouts_total");

        Self {
            registry,
            operations_total,
            operation_latency_seconds,
            order_transitions_total,
            driver_queue_length,
            earnings_records_total,
            payouts_total,
        }
    }

    pub fn observe_operation(&self, operation: &str, elapsed_seconds: f64, succeeded: bool) {
        let outcome = if succeeded { "success" } else { "error" };
        self.operation_latency_seconds
            .with_label_values(&[operation, outcome])
            .observe(elapsed_seconds);
        self.operations_total
            .with_label_values(&[operation, outcome])
            .inc();
    }

    pub fn record_transition(&self, to: OrderStatus) {
        self.order_transitions_total
            .with_label_values(&[to.as_str()])
            .inc();
    }

    pub fn record_queue(&self, driver: &Driver) {
        self.driver_queue_length
            .with_label_values(&[&driver.id.to_string()])
            .set(driver.queue.len() as i64);
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}
