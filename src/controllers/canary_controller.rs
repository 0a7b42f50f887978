/*
 * Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: canary_controller.rs
 *
 * The reconcile engine (spec.4.5): the per-tick decision function and the
 * async wiring around it (validate -> resolve target -> initialize ->
 * rollback reentry -> act -> write status -> requeue).
 *
 * The decision tree's last four steps (rollback reentry, create-primary,
 * steady state, canary-in-progress) are expressed as the pure function
 * `decide_action`, taking only `(spec, status, now)` — independent of the
 * `kube` API, so it is exercised directly by `#[test]`s below without a
 * test cluster. Everything upstream of it (validity, target resolution,
 * initialization) needs the API and lives in `reconcile`.
 *
 * Deletion is handled by Kubernetes' own cascade garbage collection via
 * owner references (spec.5 "Lifecycles"); this engine registers no
 * finalizer.
 *
 * SPDX-License-Identifier: Apache-2.0
 */

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use kube::api::{Api, Patch, PatchParams};
use kube::runtime::controller::Action as RequeueAction;
use kube::runtime::events::{Event, EventType, Recorder};
use kube::{Client, ResourceExt};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::context::Context;
use crate::crds::{Canary, CanaryStatus, LastAction, Release, ReconcileStatus, ReconcileStatusValue, ROLLED_BACK_REASON};
use crate::error::Error;
use crate::metric;
use crate::routing;
use crate::target::{self, ResolvedTarget};
use crate::validate;

const FIELD_MANAGER: &str = "kharon-operator";

/// The outcome of the pure decision tree (spec.4.5 steps 5-8).
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Rollback reentry already completed; nothing left to do this tick.
    RollbackReentryNoop,
    /// Rollback reentry: `spec.targetRef` must be rewritten to the prior release.
    RollbackReentryRewrite,
    CreatePrimaryRelease,
    /// Steady state: the declared target is already the running primary.
    NoAction,
    RollbackRelease,
    /// The canary-gating interval hasn't elapsed yet; sleep.
    Wait { after_secs: i64 },
    ProgressCanaryRelease,
    EndCanaryRelease,
}

/// Implements spec.4.5 steps 5-8. The caller is responsible for having
/// already run the metric evaluation for this tick (if step 8 is reached on
/// a prior call) and folded its outcome into `status.failedChecks`/
/// `status.canaryMetricValue` before calling this again to get the final
/// verdict — this function does no I/O of its own.
pub fn decide_action(spec: &crate::crds::CanarySpec, status: &CanaryStatus, now: DateTime<Utc>) -> Action {
    if status.is_rollback_reentry() {
        return match status.primary() {
            Some(last) if last.target_ref == spec.target_ref => Action::RollbackReentryNoop,
            _ => Action::RollbackReentryRewrite,
        };
    }

    let primary = match status.primary() {
        None => return Action::CreatePrimaryRelease,
        Some(p) => p,
    };

    if primary.target_ref == spec.target_ref {
        return Action::NoAction;
    }

    if status.failed_checks > spec.canary_analysis.threshold {
        return Action::RollbackRelease;
    }

    if let Some(last_step) = status.last_step_time {
        let elapsed = now.signed_duration_since(last_step);
        let interval = ChronoDuration::seconds(spec.canary_analysis.interval.max(0));
        if elapsed <= interval {
            return Action::Wait {
                after_secs: spec.canary_analysis.metric.interval.max(1),
            };
        }
    }

    if status.canary_weight < 100 {
        Action::ProgressCanaryRelease
    } else {
        Action::EndCanaryRelease
    }
}

/// Implements spec.4.6/spec.4.2's dispatch-on-kind for fetching the
/// referenced workload (it never switches on the kind name beyond this).
async fn resolve_target(
    client: &Client,
    namespace: &str,
    target_ref: &crate::crds::TargetRef,
) -> Result<ResolvedTarget, Error> {
    match target_ref.kind.as_str() {
        "Deployment" => {
            let api: Api<k8s_openapi::api::apps::v1::Deployment> = Api::namespaced(client.clone(), namespace);
            let obj = api
                .get(&target_ref.name)
                .await
                .map_err(|e| Error::TargetResolution(format!("Deployment '{}': {e}", target_ref.name)))?;
            Ok(ResolvedTarget::Deployment(obj))
        }
        "DeploymentConfig" => {
            let api: Api<crate::target::DeploymentConfig> = Api::namespaced(client.clone(), namespace);
            let obj = api
                .get(&target_ref.name)
                .await
                .map_err(|e| Error::TargetResolution(format!("DeploymentConfig '{}': {e}", target_ref.name)))?;
            Ok(ResolvedTarget::DeploymentConfig(obj))
        }
        other => Err(Error::TargetResolution(format!("unsupported targetRef.kind '{other}'"))),
    }
}

pub async fn reconcile(canary: Arc<Canary>, ctx: Arc<Context>) -> Result<RequeueAction, Error> {
    let ns = canary.namespace().ok_or(Error::MissingNamespace)?;
    let name = canary.name_any();
    let api: Api<Canary> = Api::namespaced(ctx.client.clone(), &ns);

    ctx.diagnostics.write().await.last_event = Utc::now();

    if !canary.spec.enabled {
        info!(canary = %name, namespace = %ns, "canary is disabled, ignoring");
        return Ok(RequeueAction::await_change());
    }

    if let Err(e) = validate::validate(&canary.spec) {
        return manage_error(&api, &ctx, &canary, e).await;
    }

    let target = match resolve_target(&ctx.client, &ns, &canary.spec.target_ref).await {
        Ok(t) => t,
        Err(e) => return manage_error(&api, &ctx, &canary, e).await,
    };

    let mut spec = canary.spec.clone();
    match target::fill_defaults(&mut spec, &target) {
        Ok(target::InitOutcome::JustInitialized) => {
            info!(canary = %name, namespace = %ns, "initialized targetRef defaults");
            persist_spec(&api, &name, &spec).await?;
            return Ok(RequeueAction::await_change());
        }
        Ok(target::InitOutcome::AlreadyInitialized) => {}
        Err(e) => return manage_error(&api, &ctx, &canary, e).await,
    }

    let mut status = canary.status.clone().unwrap_or_default();
    let now = Utc::now();

    // Rollback reentry is resolved before any metric evaluation since it
    // never reaches step 8 (spec.4.5 step 5).
    if status.is_rollback_reentry() {
        return match decide_action(&spec, &status, now) {
            Action::RollbackReentryNoop => manage_success(&api, &ctx, &canary, LastAction::NoAction, &status, 0).await,
            Action::RollbackReentryRewrite => {
                let previous = status.primary().expect("rollback reentry implies history").clone();
                spec.target_ref = previous.target_ref;
                persist_spec(&api, &name, &spec).await?;
                emit_event(
                    &ctx.client,
                    &canary,
                    EventType::Normal,
                    "CanaryRollback",
                    "rolled spec.targetRef back to the last known-good release",
                )
                .await?;
                Ok(RequeueAction::await_change())
            }
            _ => unreachable!("rollback reentry only yields the two variants above"),
        };
    }

    // Steps 6/7 don't need the metric; step 8 (primary exists, a different
    // target is declared) always evaluates it before the threshold/interval
    // checks, per spec.4.5.
    let needs_metric = status
        .primary()
        .is_some_and(|primary| primary.target_ref != spec.target_ref);

    if needs_metric {
        let query_ctx = metric::QueryContext {
            namespace: &ns,
            name: &name,
            target_ref_name: &spec.target_ref.name,
            target_ref_kind: &spec.target_ref.kind,
            service_name: &spec.service_name,
        };
        match metric::evaluate(&ctx.http, &spec.canary_analysis, &query_ctx).await {
            Ok(eval) => {
                status.canary_metric_value = eval.value;
                if !eval.healthy {
                    status.failed_checks += 1;
                }
                ctx.metrics
                    .record_metric_value(&ns, &name, &spec.target_ref.name, eval.value);
            }
            Err(e) => {
                // Metric errors are soft (spec.7): log, keep the previous
                // value, and let the tick continue without touching
                // failedChecks.
                warn!(canary = %name, namespace = %ns, error = %e, "metric evaluation failed, continuing with last value");
            }
        }
    }

    let action = decide_action(&spec, &status, now);
    match action {
        Action::NoAction => manage_success(&api, &ctx, &canary, LastAction::NoAction, &status, 0).await,
        Action::CreatePrimaryRelease => {
            create_primary_release(&api, &ctx, &canary, &spec, &mut status).await
        }
        Action::ProgressCanaryRelease => {
            progress_canary_release(&api, &ctx, &canary, &spec, &mut status).await
        }
        Action::EndCanaryRelease => end_canary_release(&api, &ctx, &canary, &spec, &mut status).await,
        Action::RollbackRelease => rollback_release(&api, &ctx, &canary, &spec, &mut status).await,
        Action::Wait { after_secs } => {
            manage_success(&api, &ctx, &canary, LastAction::RequeueEvent, &status, after_secs).await
        }
        Action::RollbackReentryNoop | Action::RollbackReentryRewrite => {
            unreachable!("handled above before metric evaluation")
        }
    }
}

async fn create_primary_release(
    api: &Api<Canary>,
    ctx: &Arc<Context>,
    canary: &Canary,
    spec: &crate::crds::CanarySpec,
    status: &mut CanaryStatus,
) -> Result<RequeueAction, Error> {
    let ns = canary.namespace().ok_or(Error::MissingNamespace)?;
    let owner = routing::owner_reference_for(canary);

    routing::ensure_backend_service(&ctx.client, &ns, spec, owner.clone()).await?;

    let primary = Release {
        id: spec.target_ref.name.clone(),
        name: spec.target_ref.name.clone(),
        target_ref: spec.target_ref.clone(),
    };
    routing::ensure_routing(&ctx.client, &ns, spec, owner, &primary, 100, None).await?;

    status.is_canary_running = false;
    status.canary_weight = 0;
    status.iterations = 0;
    status.release_history.push(primary);

    ctx.metrics.record_weight(&ns, &canary.name_any(), &spec.target_ref.name, 0);

    emit_event(
        &ctx.client,
        canary,
        EventType::Normal,
        "CreatePrimaryRelease",
        &format!("created primary release '{}'", spec.target_ref.name),
    )
    .await?;

    manage_success(
        api,
        ctx,
        canary,
        LastAction::CreatePrimaryRelease,
        status,
        spec.canary_analysis.interval,
    )
    .await
}

async fn progress_canary_release(
    api: &Api<Canary>,
    ctx: &Arc<Context>,
    canary: &Canary,
    spec: &crate::crds::CanarySpec,
    status: &mut CanaryStatus,
) -> Result<RequeueAction, Error> {
    if status.canary_weight >= 100 {
        return manage_error(
            api,
            ctx,
            canary,
            Error::Precondition("ProgressCanaryRelease requires canaryWeight < 100".into()),
        )
        .await;
    }

    let ns = canary.namespace().ok_or(Error::MissingNamespace)?;
    let name = canary.name_any();
    let primary_release = status
        .primary()
        .ok_or_else(|| Error::Precondition("ProgressCanaryRelease requires release history".into()))?
        .clone();

    routing::get_routing(&ctx.client, &ns, &spec.service_name).await?;

    let stepped = status.canary_weight + spec.canary_analysis.step_weight;
    let new_weight = if stepped >= spec.canary_analysis.max_weight { 100 } else { stepped };

    let canary_release = Release {
        id: spec.target_ref.name.clone(),
        name: spec.target_ref.name.clone(),
        target_ref: spec.target_ref.clone(),
    };

    let owner = routing::owner_reference_for(canary);
    routing::ensure_routing(
        &ctx.client,
        &ns,
        spec,
        owner,
        &primary_release,
        100 - new_weight as i32,
        Some(&canary_release),
    )
    .await?;

    status.is_canary_running = true;
    status.canary_weight = new_weight;
    status.iterations += 1;
    status.last_step_time = Some(Utc::now());

    ctx.metrics.record_weight(&ns, &name, &spec.target_ref.name, new_weight);

    emit_event(
        &ctx.client,
        canary,
        EventType::Normal,
        "ProgressCanaryRelease",
        &format!("advanced canary weight to {new_weight}"),
    )
    .await?;

    manage_success(
        api,
        ctx,
        canary,
        LastAction::ProgressCanaryRelease,
        status,
        spec.canary_analysis.metric.interval,
    )
    .await
}

async fn end_canary_release(
    api: &Api<Canary>,
    ctx: &Arc<Context>,
    canary: &Canary,
    spec: &crate::crds::CanarySpec,
    status: &mut CanaryStatus,
) -> Result<RequeueAction, Error> {
    if status.canary_weight < 100 {
        return manage_error(
            api,
            ctx,
            canary,
            Error::Precondition("EndCanaryRelease requires canaryWeight >= 100".into()),
        )
        .await;
    }

    let ns = canary.namespace().ok_or(Error::MissingNamespace)?;
    let name = canary.name_any();

    let new_primary = Release {
        id: spec.target_ref.name.clone(),
        name: spec.target_ref.name.clone(),
        target_ref: spec.target_ref.clone(),
    };

    let owner = routing::owner_reference_for(canary);
    routing::ensure_routing(&ctx.client, &ns, spec, owner, &new_primary, 100, None).await?;

    status.release_history.push(new_primary);
    status.is_canary_running = false;
    status.canary_weight = 0;
    status.canary_metric_value = 0.0;
    status.failed_checks = 0;
    status.iterations += 1;
    status.last_step_time = None;

    ctx.metrics.record_weight(&ns, &name, &spec.target_ref.name, 0);

    emit_event(
        &ctx.client,
        canary,
        EventType::Normal,
        "EndCanaryRelease",
        &format!("promoted '{}' to primary", spec.target_ref.name),
    )
    .await?;

    manage_success(
        api,
        ctx,
        canary,
        LastAction::EndCanaryRelease,
        status,
        spec.canary_analysis.interval,
    )
    .await
}

async fn rollback_release(
    api: &Api<Canary>,
    ctx: &Arc<Context>,
    canary: &Canary,
    spec: &crate::crds::CanarySpec,
    status: &mut CanaryStatus,
) -> Result<RequeueAction, Error> {
    let ns = canary.namespace().ok_or(Error::MissingNamespace)?;
    let name = canary.name_any();

    let last_good = status
        .primary()
        .ok_or_else(|| Error::Precondition("RollbackRelease requires non-empty release history".into()))?
        .clone();

    let owner = routing::owner_reference_for(canary);
    routing::ensure_routing(&ctx.client, &ns, spec, owner, &last_good, 100, None).await?;

    status.is_canary_running = false;
    status.canary_weight = 0;
    status.iterations = 0;
    status.failed_checks = 0;
    status.canary_metric_value = 0.0;

    ctx.metrics.record_weight(&ns, &name, &spec.target_ref.name, 0);

    emit_event(
        &ctx.client,
        canary,
        EventType::Warning,
        "RollbackRelease",
        &format!(
            "rolled back to '{}' after exceeding the failed-check threshold",
            last_good.name
        ),
    )
    .await?;

    status.reconcile_status = ReconcileStatus {
        status: ReconcileStatusValue::False,
        last_update: Utc::now(),
        reason: ROLLED_BACK_REASON.to_string(),
    };
    status.last_action = LastAction::RollbackRelease;
    patch_status(api, &name, status).await?;

    Ok(RequeueAction::requeue(Duration::from_secs(1)))
}

async fn persist_spec(api: &Api<Canary>, name: &str, spec: &crate::crds::CanarySpec) -> Result<(), Error> {
    let patch = json!({ "spec": spec });
    api.patch(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
        .await
        .map_err(Error::Kube)?;
    Ok(())
}

async fn patch_status(api: &Api<Canary>, name: &str, status: &CanaryStatus) -> Result<(), Error> {
    let patch = json!({ "status": status });
    api.patch_status(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
        .await
        .map_err(|e| Error::StatusWrite(e.to_string()))?;
    Ok(())
}

async fn emit_event(
    client: &Client,
    canary: &Canary,
    type_: EventType,
    reason: &str,
    note: &str,
) -> Result<(), Error> {
    let recorder = Recorder::new(client.clone(), "kharon-operator".into(), canary.object_ref(&()));
    recorder
        .publish(Event {
            type_,
            reason: reason.to_string(),
            note: Some(note.to_string()),
            action: "Reconciling".to_string(),
            secondary: None,
        })
        .await
        .map_err(Error::Kube)
}

/// Implements spec.4.7 ManageError: records the failure on the status and
/// backs off exponentially from the elapsed time since the last status
/// update, starting at 1s and capping at 6h.
async fn manage_error(
    api: &Api<Canary>,
    ctx: &Arc<Context>,
    canary: &Canary,
    err: Error,
) -> Result<RequeueAction, Error> {
    let ns = canary.namespace().unwrap_or_default();
    let name = canary.name_any();
    error!(canary = %name, namespace = %ns, error = %err, "reconcile failed");
    ctx.metrics.count_reconciliation(&ns, &name, "failure");

    emit_event(&ctx.client, canary, EventType::Warning, "ProcessingError", &err.to_string())
        .await
        .ok();

    let mut status = canary.status.clone().unwrap_or_default();
    let now = Utc::now();

    let last_interval = if status.reconcile_status.status == ReconcileStatusValue::True
        || status.reconcile_status.last_update == DateTime::<Utc>::UNIX_EPOCH
    {
        ChronoDuration::seconds(1)
    } else {
        now.signed_duration_since(status.reconcile_status.last_update)
    };

    let doubled_nanos = last_interval
        .num_nanoseconds()
        .unwrap_or(i64::MAX)
        .saturating_mul(2);
    let cap_nanos = ChronoDuration::hours(6).num_nanoseconds().unwrap_or(i64::MAX);
    let floor_nanos = ChronoDuration::seconds(1).num_nanoseconds().unwrap_or(1_000_000_000);
    let delay_nanos = doubled_nanos.min(cap_nanos).max(floor_nanos);

    status.reconcile_status = ReconcileStatus {
        status: ReconcileStatusValue::False,
        last_update: now,
        reason: err.to_string(),
    };

    if let Err(write_err) = patch_status(api, &name, &status).await {
        warn!(canary = %name, namespace = %ns, error = %write_err, "could not write failure status");
        return Ok(RequeueAction::requeue(Duration::from_secs(1)));
    }

    Ok(RequeueAction::requeue(Duration::from_nanos(delay_nanos as u64)))
}

/// Implements spec.4.7 ManageSuccess.
async fn manage_success(
    api: &Api<Canary>,
    ctx: &Arc<Context>,
    canary: &Canary,
    action: LastAction,
    status: &CanaryStatus,
    requeue_after_secs: i64,
) -> Result<RequeueAction, Error> {
    let ns = canary.namespace().unwrap_or_default();
    let name = canary.name_any();
    ctx.metrics.count_reconciliation(&ns, &name, "success");

    let mut status = status.clone();
    status.reconcile_status = ReconcileStatus {
        status: ReconcileStatusValue::True,
        last_update: Utc::now(),
        reason: String::new(),
    };
    status.last_action = action;

    patch_status(api, &name, &status).await?;

    if requeue_after_secs > 0 {
        Ok(RequeueAction::requeue(Duration::from_secs(requeue_after_secs as u64)))
    } else {
        Ok(RequeueAction::await_change())
    }
}

pub fn error_policy(canary: Arc<Canary>, error: &Error, ctx: Arc<Context>) -> RequeueAction {
    warn!(canary = %canary.name_any(), error = %error, "controller-level error policy invoked");
    ctx.metrics
        .count_reconciliation(&canary.namespace().unwrap_or_default(), &canary.name_any(), "policy_error");
    RequeueAction::requeue(Duration::from_secs(30))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crds::{CanaryAnalysis, CanarySpec, CanaryType, Metric, Operator, TargetRef};
    use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
    use std::collections::BTreeMap;

    fn base_spec(target_name: &str) -> CanarySpec {
        CanarySpec {
            enabled: true,
            initialized: true,
            type_: CanaryType::Native,
            service_name: "podinfo".into(),
            target_ref: TargetRef {
                api_version: "apps/v1".into(),
                kind: "Deployment".into(),
                name: target_name.into(),
            },
            target_ref_selector: BTreeMap::from([("app".to_string(), "podinfo".to_string())]),
            target_ref_container_name: "app".into(),
            target_ref_container_port: IntOrString::String("http".into()),
            target_ref_container_protocol: "TCP".into(),
            canary_analysis: CanaryAnalysis {
                metrics_server: "http://prom".into(),
                interval: 30,
                threshold: 2,
                max_weight: 50,
                step_weight: 10,
                metric: Metric {
                    name: "request-success-rate".into(),
                    threshold: 99.0,
                    interval: 10,
                    prometheus_query: "sum(rate(http_requests_total[1m]))".into(),
                    operator: Operator::Ge,
                },
            },
        }
    }

    fn release(name: &str) -> Release {
        Release {
            id: name.into(),
            name: name.into(),
            target_ref: TargetRef {
                api_version: "apps/v1".into(),
                kind: "Deployment".into(),
                name: name.into(),
            },
        }
    }

    #[test]
    fn s2_no_history_creates_primary() {
        let spec = base_spec("podinfo-v1");
        let status = CanaryStatus::default();
        assert_eq!(
            decide_action(&spec, &status, Utc::now()),
            Action::CreatePrimaryRelease
        );
    }

    #[test]
    fn s3_matching_target_is_steady_state() {
        let spec = base_spec("podinfo-v1");
        let mut status = CanaryStatus::default();
        status.release_history.push(release("podinfo-v1"));
        assert_eq!(decide_action(&spec, &status, Utc::now()), Action::NoAction);
    }

    #[test]
    fn s4_differing_target_with_no_prior_step_progresses_immediately() {
        let spec = base_spec("podinfo-v2");
        let mut status = CanaryStatus::default();
        status.release_history.push(release("podinfo-v1"));
        assert_eq!(decide_action(&spec, &status, Utc::now()), Action::ProgressCanaryRelease);
    }

    #[test]
    fn s5_within_interval_waits() {
        let spec = base_spec("podinfo-v2");
        let mut status = CanaryStatus::default();
        status.release_history.push(release("podinfo-v1"));
        status.last_step_time = Some(Utc::now());
        status.canary_weight = 10;
        match decide_action(&spec, &status, Utc::now()) {
            Action::Wait { .. } => {}
            other => panic!("expected Wait, got {other:?}"),
        }
    }

    #[test]
    fn s6_past_interval_progresses_further() {
        let spec = base_spec("podinfo-v2");
        let mut status = CanaryStatus::default();
        status.release_history.push(release("podinfo-v1"));
        status.canary_weight = 10;
        status.last_step_time = Some(Utc::now() - ChronoDuration::seconds(60));
        assert_eq!(decide_action(&spec, &status, Utc::now()), Action::ProgressCanaryRelease);
    }

    #[test]
    fn s7_full_weight_ends_the_canary() {
        let spec = base_spec("podinfo-v2");
        let mut status = CanaryStatus::default();
        status.release_history.push(release("podinfo-v1"));
        status.canary_weight = 100;
        status.last_step_time = Some(Utc::now() - ChronoDuration::seconds(60));
        assert_eq!(decide_action(&spec, &status, Utc::now()), Action::EndCanaryRelease);
    }

    #[test]
    fn s8_exceeding_failed_check_budget_rolls_back() {
        let spec = base_spec("podinfo-v2");
        let mut status = CanaryStatus::default();
        status.release_history.push(release("podinfo-v1"));
        status.canary_weight = 20;
        status.failed_checks = spec.canary_analysis.threshold + 1;
        assert_eq!(decide_action(&spec, &status, Utc::now()), Action::RollbackRelease);
    }

    #[test]
    fn s9_rollback_reentry_same_target_is_noop() {
        let spec = base_spec("podinfo-v1");
        let mut status = CanaryStatus::default();
        status.release_history.push(release("podinfo-v1"));
        status.reconcile_status = ReconcileStatus {
            status: ReconcileStatusValue::False,
            last_update: Utc::now(),
            reason: ROLLED_BACK_REASON.to_string(),
        };
        assert_eq!(decide_action(&spec, &status, Utc::now()), Action::RollbackReentryNoop);
    }

    #[test]
    fn s10_rollback_reentry_differing_target_rewrites() {
        let spec = base_spec("podinfo-v2");
        let mut status = CanaryStatus::default();
        status.release_history.push(release("podinfo-v1"));
        status.reconcile_status = ReconcileStatus {
            status: ReconcileStatusValue::False,
            last_update: Utc::now(),
            reason: ROLLED_BACK_REASON.to_string(),
        };
        assert_eq!(
            decide_action(&spec, &status, Utc::now()),
            Action::RollbackReentryRewrite
        );
    }

    #[test]
    fn weight_is_monotonically_non_decreasing_across_a_multi_tick_simulation() {
        let spec = base_spec("podinfo-v2");
        let mut status = CanaryStatus::default();
        status.release_history.push(release("podinfo-v1"));

        let mut now = Utc::now();
        let mut last_weight = 0;
        for _ in 0..6 {
            match decide_action(&spec, &status, now) {
                Action::ProgressCanaryRelease => {
                    let stepped = status.canary_weight + spec.canary_analysis.step_weight;
                    status.canary_weight = if stepped >= spec.canary_analysis.max_weight {
                        100
                    } else {
                        stepped
                    };
                    assert!(status.canary_weight >= last_weight);
                    last_weight = status.canary_weight;
                    status.last_step_time = Some(now);
                }
                Action::EndCanaryRelease => break,
                other => panic!("unexpected action mid-simulation: {other:?}"),
            }
            now = now + ChronoDuration::seconds(60);
        }
        assert_eq!(status.canary_weight, 100);
    }
}
