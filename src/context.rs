/*
 * Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: context.rs
 *
 * The ambient stack shared by every reconcile tick: a Kubernetes client, an
 * HTTP client for metric queries, the Prometheus registry this operator
 * exposes about itself, and a small diagnostics block the health server
 * reads. Grounded in the `Context`/`State`/`Diagnostics`/`Metrics` split used
 * by operators built on `kube-runtime`'s `Controller`, where `State` lives
 * for the process lifetime and hands out a fresh `Context` per controller
 * run.
 *
 * SPDX-License-Identifier: Apache-2.0
 */

use chrono::{DateTime, Utc};
use kube::runtime::events::Reporter;
use kube::Client;
use prometheus::{CounterVec, GaugeVec, Opts, Registry};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Gauges/counters this operator exports about the canaries it is driving.
#[derive(Clone)]
pub struct Metrics {
    /// Current traffic weight routed to the canary, per object.
    pub current_canary_weight: GaugeVec,
    /// Last observed value of the gating metric, per object.
    pub current_canary_metric_value: GaugeVec,
    /// Total reconcile invocations, labeled by outcome.
    pub reconcile_total: CounterVec,
}

impl Default for Metrics {
    fn default() -> Self {
        Metrics {
            current_canary_weight: GaugeVec::new(
                Opts::new(
                    "kharon_current_canary_weight",
                    "Traffic weight currently routed to the canary",
                ),
                &["namespace", "canary", "target"],
            )
            .unwrap(),
            current_canary_metric_value: GaugeVec::new(
                Opts::new(
                    "kharon_current_canary_metric_value",
                    "Last observed value of the gating metric",
                ),
                &["namespace", "canary", "target"],
            )
            .unwrap(),
            reconcile_total: CounterVec::new(
                Opts::new(
                    "kharon_reconcile_total",
                    "Reconcile invocations, labeled by outcome",
                ),
                &["namespace", "canary", "outcome"],
            )
            .unwrap(),
        }
    }
}

impl Metrics {
    /// Registers every collector with `registry`, consuming and returning
    /// `self` so call sites can chain off `Metrics::default().register(...)`.
    pub fn register(self, registry: &Registry) -> prometheus::Result<Self> {
        registry.register(Box::new(self.current_canary_weight.clone()))?;
        registry.register(Box::new(self.current_canary_metric_value.clone()))?;
        registry.register(Box::new(self.reconcile_total.clone()))?;
        Ok(self)
    }

    pub fn record_weight(&self, namespace: &str, canary: &str, target: &str, weight: i64) {
        self.current_canary_weight
            .with_label_values(&[namespace, canary, target])
            .set(weight as f64);
    }

    pub fn record_metric_value(&self, namespace: &str, canary: &str, target: &str, value: f64) {
        self.current_canary_metric_value
            .with_label_values(&[namespace, canary, target])
            .set(value);
    }

    pub fn count_reconciliation(&self, namespace: &str, canary: &str, outcome: &str) {
        self.reconcile_total
            .with_label_values(&[namespace, canary, outcome])
            .inc();
    }
}

/// Health-server-visible view of the controller's liveness.
#[derive(Clone)]
pub struct Diagnostics {
    pub last_event: DateTime<Utc>,
    pub reporter: Reporter,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self {
            last_event: Utc::now(),
            reporter: "kharon-operator".into(),
        }
    }
}

/// Everything a single `reconcile` invocation needs.
pub struct Context {
    pub client: Client,
    pub http: reqwest::Client,
    pub metrics: Metrics,
    pub diagnostics: Arc<RwLock<Diagnostics>>,
}

/// Process-lifetime state. Owns the Prometheus registry and hands out a
/// fresh `Context` for the controller to run with.
#[derive(Clone)]
pub struct State {
    diagnostics: Arc<RwLock<Diagnostics>>,
    registry: prometheus::Registry,
}

impl Default for State {
    fn default() -> Self {
        Self {
            diagnostics: Arc::new(RwLock::new(Diagnostics::default())),
            registry: prometheus::Registry::default(),
        }
    }
}

impl State {
    pub fn metrics(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.registry.gather()
    }

    pub async fn diagnostics(&self) -> Diagnostics {
        self.diagnostics.read().await.clone()
    }

    pub fn create_context(&self, client: Client) -> Arc<Context> {
        let metrics = Metrics::default()
            .register(&self.registry)
            .expect("metrics are only ever registered once per process");

        let timeout_secs: u64 = std::env::var("CANARY_METRIC_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10);

        Arc::new(Context {
            client,
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                .build()
                .expect("the HTTP client config is static and valid"),
            metrics,
            diagnostics: self.diagnostics.clone(),
        })
    }
}
