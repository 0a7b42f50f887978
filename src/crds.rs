/*
 * Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: crds.rs
 *
 * This file defines the Rust data structures that correspond to the `Canary`
 * Custom Resource Definition. By using the `kube::CustomResource` derive
 * macro, we get a strongly-typed representation of the custom API, enabling
 * safe and idiomatic interaction with the Kubernetes API server.
 *
 * Architecture:
 * - `CanarySpec` is the user-authored desired state; `CanaryStatus` is
 *   managed exclusively by the controller.
 * - `serde` attributes map idiomatic Rust `snake_case` field names to the
 *   `camelCase` field names the API server and existing tooling expect.
 * - `schemars` generates the OpenAPI v3 schema embedded in the CRD manifest.
 *
 * SPDX-License-Identifier: Apache-2.0
 */

use chrono::{DateTime, Utc};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A pointer to a Deployment, DeploymentConfig, ... that the canary promotes towards.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
pub struct TargetRef {
    #[serde(rename = "apiVersion", default)]
    pub api_version: String,
    pub kind: String,
    pub name: String,
}

impl TargetRef {
    pub fn is_empty(&self) -> bool {
        self.kind.is_empty() && self.name.is_empty()
    }
}

/// A released version of the target, recorded once it has served as primary.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
pub struct Release {
    pub id: String,
    pub name: String,
    #[serde(rename = "ref")]
    pub target_ref: TargetRef,
}

/// Comparison operator used to decide whether a metric sample is healthy.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Gt,
    Ge,
    Lt,
    Le,
}

/// The single metric that gates canary progression.
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema)]
pub struct Metric {
    #[serde(default)]
    pub name: String,
    pub threshold: f64,
    /// Seconds between metric evaluations.
    pub interval: i64,
    #[serde(rename = "prometheusQuery")]
    pub prometheus_query: String,
    pub operator: Operator,
}

/// Parameters governing how a canary is analyzed and progressed.
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema)]
pub struct CanaryAnalysis {
    #[serde(rename = "metricsServer")]
    pub metrics_server: String,
    /// Seconds between progression steps.
    pub interval: i64,
    /// Number of consecutive failed checks tolerated before rollback.
    pub threshold: i64,
    #[serde(rename = "maxWeight")]
    pub max_weight: i64,
    #[serde(rename = "stepWeight")]
    pub step_weight: i64,
    pub metric: Metric,
}

impl CanaryAnalysis {
    /// True when the analysis block carries no meaningful configuration.
    pub fn is_zero(&self) -> bool {
        self.metrics_server.is_empty()
            && self.interval == 0
            && self.threshold == 0
            && self.max_weight == 0
            && self.step_weight == 0
    }
}

/// The routing backend implementation the canary should drive.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum CanaryType {
    Native,
    Istio,
}

/// Desired state for a `Canary` object.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "kharon.io",
    version = "v1alpha1",
    kind = "Canary",
    namespaced,
    status = "CanaryStatus",
    printcolumn = r#"{"name":"Weight", "type":"integer", "jsonPath":".status.canaryWeight"}"#,
    printcolumn = r#"{"name":"Status", "type":"string", "jsonPath":".status.reconcileStatus.status"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#,
    shortname = "canary"
)]
pub struct CanarySpec {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub initialized: bool,
    #[serde(rename = "type")]
    pub type_: CanaryType,
    #[serde(rename = "serviceName")]
    pub service_name: String,
    #[serde(rename = "targetRef")]
    pub target_ref: TargetRef,
    #[serde(rename = "targetRefSelector", default)]
    pub target_ref_selector: BTreeMap<String, String>,
    #[serde(rename = "targetRefContainerName", default)]
    pub target_ref_container_name: String,
    #[serde(rename = "targetRefContainerPort", default = "default_int_or_string")]
    pub target_ref_container_port: IntOrString,
    #[serde(rename = "targetRefContainerProtocol", default)]
    pub target_ref_container_protocol: String,
    #[serde(rename = "canaryAnalysis")]
    pub canary_analysis: CanaryAnalysis,
}

fn default_int_or_string() -> IntOrString {
    IntOrString::String(String::new())
}

impl CanarySpec {
    /// An unset `targetRefContainerPort` serializes as an empty string or zero.
    pub fn container_port_is_empty(&self) -> bool {
        match &self.target_ref_container_port {
            IntOrString::Int(i) => *i == 0,
            IntOrString::String(s) => s.is_empty(),
        }
    }
}

/// Tag identifying the last action the engine performed for this object.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema, Default)]
pub enum LastAction {
    #[default]
    NoAction,
    CreatePrimaryRelease,
    ProgressCanaryRelease,
    EndCanaryRelease,
    RollbackRelease,
    RequeueEvent,
}

/// Coarse pass/fail status of the most recent reconcile.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum ReconcileStatusValue {
    True,
    False,
}

/// Standardized reconcile outcome, written on every terminal branch of a tick.
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema)]
pub struct ReconcileStatus {
    pub status: ReconcileStatusValue,
    #[serde(rename = "lastUpdate")]
    pub last_update: DateTime<Utc>,
    #[serde(default)]
    pub reason: String,
}

impl Default for ReconcileStatus {
    fn default() -> Self {
        Self {
            status: ReconcileStatusValue::True,
            last_update: DateTime::<Utc>::UNIX_EPOCH,
            reason: String::new(),
        }
    }
}

/// The reason a `Promoted` condition carries, mirroring the lifecycle of a single canary.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum Reason {
    Initialized,
    Waiting,
    Progressing,
    Finalising,
    Succeeded,
    Failed,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum ConditionType {
    Promoted,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema)]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: ConditionType,
    pub status: ConditionStatus,
    #[serde(rename = "lastTransitionTime")]
    pub last_transition_time: DateTime<Utc>,
    pub reason: Reason,
    #[serde(default)]
    pub message: String,
}

/// Observed state of a `Canary` object, written exclusively by the controller.
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema)]
pub struct CanaryStatus {
    #[serde(rename = "isCanaryRunning", default)]
    pub is_canary_running: bool,
    #[serde(rename = "canaryWeight", default)]
    pub canary_weight: i64,
    #[serde(rename = "canaryMetricValue", default)]
    pub canary_metric_value: f64,
    #[serde(rename = "failedChecks", default)]
    pub failed_checks: i64,
    #[serde(default)]
    pub iterations: i64,
    #[serde(rename = "lastStepTime")]
    pub last_step_time: Option<DateTime<Utc>>,
    #[serde(rename = "lastAction", default)]
    pub last_action: LastAction,
    #[serde(rename = "reconcileStatus", default)]
    pub reconcile_status: ReconcileStatus,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(rename = "releaseHistory", default)]
    pub release_history: Vec<Release>,
}

impl Default for CanaryStatus {
    fn default() -> Self {
        Self {
            is_canary_running: false,
            canary_weight: 0,
            canary_metric_value: 0.0,
            failed_checks: 0,
            iterations: 0,
            last_step_time: None,
            last_action: LastAction::NoAction,
            reconcile_status: ReconcileStatus::default(),
            conditions: Vec::new(),
            release_history: Vec::new(),
        }
    }
}

impl CanaryStatus {
    pub fn primary(&self) -> Option<&Release> {
        self.release_history.last()
    }

    /// True iff the last recorded outcome was the "rolled back" failure that
    /// drives the rollback-reentry protocol (spec.4.5, step 5).
    pub fn is_rollback_reentry(&self) -> bool {
        matches!(self.reconcile_status.status, ReconcileStatusValue::False)
            && self.reconcile_status.reason == ROLLED_BACK_REASON
    }
}

pub const ROLLED_BACK_REASON: &str = "rolled back";
