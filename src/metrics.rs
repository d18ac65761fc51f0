use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

/// Business counters, registered on a registry owned by the app state.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub registrations: IntCounterVec,
    pub orders_created: IntCounter,
    pub code_requests: IntCounterVec,
    pub payments_created: IntCounter,
    pub payment_callbacks: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("kiz".to_string()), None)?;

        let registrations = IntCounterVec::new(
            Opts::new("registrations_total", "User registrations by result"),
            &["result"],
        )?;
        let orders_created = IntCounter::new("orders_created_total", "Orders persisted")?;
        let code_requests = IntCounterVec::new(
            Opts::new("code_requests_total", "Code retrieval attempts by outcome"),
            &["outcome"],
        )?;
        let payments_created = IntCounter::new("payments_created_total", "Payments opened")?;
        let payment_callbacks = IntCounterVec::new(
            Opts::new("payment_callbacks_total", "Gateway callbacks by outcome"),
            &["outcome"],
        )?;

        registry.register(Box::new(registrations.clone()))?;
        registry.register(Box::new(orders_created.clone()))?;
        registry.register(Box::new(code_requests.clone()))?;
        registry.register(Box::new(payments_created.clone()))?;
        registry.register(Box::new(payment_callbacks.clone()))?;

        Ok(Self {
            registry,
            registrations,
            orders_created,
            code_requests,
            payments_created,
            payment_callbacks,
        })
    }

    pub fn code_request_outcome(&self, outcome: &str) {
        self.code_requests.with_label_values(&[outcome]).inc();
    }

    pub fn callback_outcome(&self, outcome: &str) {
        self.payment_callbacks.with_label_values(&[outcome]).inc();
    }

    /// Prometheus text exposition format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_counters() {
        let metrics = Metrics::new().unwrap();
        metrics.orders_created.inc();
        metrics.callback_outcome("completed");

        let text = metrics.render().unwrap();
        assert!(text.contains("kiz_orders_created_total 1"));
        assert!(text.contains(r#"kiz_payment_callbacks_total{outcome="completed"} 1"#));
    }

    #[test]
    fn test_instances_are_independent() {
        let a = Metrics::new().unwrap();
        let b = Metrics::new().unwrap();
        a.payments_created.inc();
        assert_eq!(b.payments_created.get(), 0);
    }
}
