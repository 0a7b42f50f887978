/*
 * Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: predicate.rs
 *
 * The event-filtering predicate (spec.4.6): the watch should only wake the
 * engine on a meaningful spec change, not on every status/metadata churn.
 * Built directly on `kube_runtime`'s `Predicate` trait and its `generation`
 * predicate, combined with a small `enabled` predicate of our own so a
 * disabled object's edits hash identically to its last enabled state and
 * get filtered the same way an unchanged generation would.
 *
 * SPDX-License-Identifier: Apache-2.0
 */

use kube::runtime::{predicates, Predicate};

use crate::crds::Canary;

/// Hashes to a constant while the object is enabled (letting `generation`
/// drive change detection) and to a different constant while disabled, so
/// toggling `enabled` itself is treated as a meaningful change.
fn enabled(obj: &Canary) -> Option<u64> {
    Some(if obj.spec.enabled { 1 } else { 0 })
}

/// The combined predicate installed on the `Canary` watch.
pub fn canary_predicate() -> impl Predicate<Canary> + Copy {
    predicates::generation.combine(enabled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crds::{CanaryAnalysis, CanarySpec, CanaryType, Metric, Operator, TargetRef};
    use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
    use kube::api::ObjectMeta;
    use std::collections::BTreeMap;

    fn canary(enabled_flag: bool, generation: i64) -> Canary {
        Canary {
            metadata: ObjectMeta {
                generation: Some(generation),
                ..Default::default()
            },
            status: None,
            spec: CanarySpec {
                enabled: enabled_flag,
                initialized: false,
                type_: CanaryType::Native,
                service_name: "podinfo".into(),
                target_ref: TargetRef {
                    api_version: "apps/v1".into(),
                    kind: "Deployment".into(),
                    name: "podinfo".into(),
                },
                target_ref_selector: BTreeMap::new(),
                target_ref_container_name: String::new(),
                target_ref_container_port: IntOrString::String(String::new()),
                target_ref_container_protocol: String::new(),
                canary_analysis: CanaryAnalysis {
                    metrics_server: "http://prom".into(),
                    interval: 10,
                    threshold: 5,
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
            },
        }
    }

    #[test]
    fn toggling_enabled_changes_the_hash() {
        let pred = canary_predicate();
        let on = canary(true, 1);
        let off = canary(false, 1);
        assert_ne!(pred.hash_property(&on), pred.hash_property(&off));
    }

    #[test]
    fn generation_bump_changes_the_hash() {
        let pred = canary_predicate();
        let gen1 = canary(true, 1);
        let gen2 = canary(true, 2);
        assert_ne!(pred.hash_property(&gen1), pred.hash_property(&gen2));
    }
}
