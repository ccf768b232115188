//! Metrics collection and export module

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::time::Instant;

/// Global metrics registry
pub struct Metrics {
    registry: Registry,

    // Quote client
    pub quote_requests_total: IntCounter,
    pub quote_failures_total: IntCounterVec,
    pub quote_aborted_total: IntCounter,

    // Chain paths
    pub evm_failures_total: IntCounterVec,
    pub solana_assemblies_total: IntCounterVec,
    pub solana_send_failures_total: IntCounterVec,

    // Histograms
    pub quote_latency: Histogram,
    pub assembly_latency: Histogram,
}

impl Metrics {
    /// Create new metrics instance
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let quote_requests_total = IntCounter::with_opts(Opts::new(
            "quote_requests_total",
            "Quote requests sent to the routing service",
        ))?;

        let quote_failures_total = IntCounterVec::new(
            Opts::new("quote_failures_total", "Quote requests that yielded no trade"),
            &["kind"],
        )?;

        let quote_aborted_total = IntCounter::with_opts(Opts::new(
            "quote_aborted_total",
            "Quote requests superseded or cancelled by the caller",
        ))?;

        let evm_failures_total = IntCounterVec::new(
            Opts::new("evm_failures_total", "Reported EVM gas estimation and send failures"),
            &["stage", "tag"],
        )?;

        let solana_assemblies_total = IntCounterVec::new(
            Opts::new("solana_assemblies_total", "Solana bundle assembly outcomes"),
            &["outcome"],
        )?;

        let solana_send_failures_total = IntCounterVec::new(
            Opts::new("solana_send_failures_total", "Solana bundle send failures by stage"),
            &["stage"],
        )?;

        let quote_latency = Histogram::with_opts(
            HistogramOpts::new("quote_latency_seconds", "Routing service round trip")
                .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0, 10.0]),
        )?;

        let assembly_latency = Histogram::with_opts(
            HistogramOpts::new("assembly_latency_seconds", "Solana bundle assembly latency")
                .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0]),
        )?;

        // Register all metrics
        registry.register(Box::new(quote_requests_total.clone()))?;
        registry.register(Box::new(quote_failures_total.clone()))?;
        registry.register(Box::new(quote_aborted_total.clone()))?;
        registry.register(Box::new(evm_failures_total.clone()))?;
        registry.register(Box::new(solana_assemblies_total.clone()))?;
        registry.register(Box::new(solana_send_failures_total.clone()))?;
        registry.register(Box::new(quote_latency.clone()))?;
        registry.register(Box::new(assembly_latency.clone()))?;

        Ok(Self {
            registry,
            quote_requests_total,
            quote_failures_total,
            quote_aborted_total,
            evm_failures_total,
            solana_assemblies_total,
            solana_send_failures_total,
            quote_latency,
            assembly_latency,
        })
    }

    /// Get the registry for exporting
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn quote_failed(&self, kind: &str) {
        self.quote_failures_total.with_label_values(&[kind]).inc();
    }

    pub fn evm_failed(&self, stage: &str, tag: &str) {
        self.evm_failures_total.with_label_values(&[stage, tag]).inc();
    }

    pub fn assembly(&self, outcome: &str) {
        self.solana_assemblies_total.with_label_values(&[outcome]).inc();
    }

    pub fn send_failed(&self, stage: &str) {
        self.solana_send_failures_total.with_label_values(&[stage]).inc();
    }

    /// Prometheus text exposition of every registered metric
    pub fn gather_text(&self) -> anyhow::Result<String> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        Ok(String::from_utf8(buf)?)
    }
}

/// Global metrics instance
pub fn metrics() -> &'static Metrics {
    static METRICS: once_cell::sync::Lazy<Metrics> =
        once_cell::sync::Lazy::new(|| Metrics::new().expect("Failed to initialize metrics"));
    &METRICS
}

/// Timer helper for measuring operation duration
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn observe_duration(&self, histogram: &Histogram) {
        histogram.observe(self.elapsed_secs());
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
