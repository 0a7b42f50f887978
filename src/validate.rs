/*
 * Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: validate.rs
 *
 * The validator (spec.4.1). Pure, synchronous, no I/O: given a `CanarySpec`
 * it either returns `Ok(())` or an `Error::Validation` explaining which
 * field is missing or malformed. Mirrors the shape of the original `IsValid`
 * check, widened to also reject `type: Istio`, which this port does not
 * implement a routing writer for.
 *
 * SPDX-License-Identifier: Apache-2.0
 */

use crate::crds::{CanarySpec, CanaryType};
use crate::error::Error;

pub fn validate(spec: &CanarySpec) -> Result<(), Error> {
    if spec.target_ref.is_empty() {
        return Err(Error::Validation("targetRef is required".into()));
    }

    if spec.target_ref.kind != "Deployment" && spec.target_ref.kind != "DeploymentConfig" {
        return Err(Error::Validation(format!(
            "targetRef.kind '{}' is not supported, expected Deployment or DeploymentConfig",
            spec.target_ref.kind
        )));
    }

    if spec.target_ref.name.is_empty() {
        return Err(Error::Validation("targetRef.name is required".into()));
    }

    if spec.service_name.is_empty() {
        return Err(Error::Validation("serviceName is required".into()));
    }

    if spec.canary_analysis.is_zero() {
        return Err(Error::Validation("canaryAnalysis is required".into()));
    }

    if spec.canary_analysis.metrics_server.is_empty() {
        return Err(Error::Validation(
            "canaryAnalysis.metricsServer is required".into(),
        ));
    }

    if spec.canary_analysis.step_weight <= 0 {
        return Err(Error::Validation(
            "canaryAnalysis.stepWeight must be positive".into(),
        ));
    }

    if spec.canary_analysis.max_weight <= 0 || spec.canary_analysis.max_weight > 100 {
        return Err(Error::Validation(
            "canaryAnalysis.maxWeight must be in (0, 100]".into(),
        ));
    }

    if spec.canary_analysis.metric.prometheus_query.is_empty() {
        return Err(Error::Validation(
            "canaryAnalysis.metric.prometheusQuery is required".into(),
        ));
    }

    // Once initialized, targetRefContainerPort must have been resolved by the
    // target introspection step (spec.4.2); prior to that it's legitimately empty.
    if spec.initialized && spec.container_port_is_empty() {
        return Err(Error::Validation(
            "targetRefContainerPort was not resolved during initialization".into(),
        ));
    }

    if spec.type_ == CanaryType::Istio {
        return Err(Error::Validation(
            "type: Istio is not supported by this build; only Native routing is implemented".into(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crds::{CanaryAnalysis, Metric, Operator, TargetRef};
    use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
    use std::collections::BTreeMap;

    fn valid_spec() -> CanarySpec {
        CanarySpec {
            enabled: true,
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
                metrics_server: "http://prometheus:9090".into(),
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
        }
    }

    #[test]
    fn accepts_a_well_formed_spec() {
        assert!(validate(&valid_spec()).is_ok());
    }

    #[test]
    fn rejects_missing_target_ref() {
        let mut spec = valid_spec();
        spec.target_ref = TargetRef::default();
        assert!(validate(&spec).is_err());
    }

    #[test]
    fn rejects_unsupported_kind() {
        let mut spec = valid_spec();
        spec.target_ref.kind = "StatefulSet".into();
        assert!(validate(&spec).is_err());
    }

    #[test]
    fn rejects_istio_type() {
        let mut spec = valid_spec();
        spec.type_ = CanaryType::Istio;
        assert!(validate(&spec).is_err());
    }

    #[test]
    fn rejects_zero_canary_analysis() {
        let mut spec = valid_spec();
        spec.canary_analysis = CanaryAnalysis {
            metrics_server: String::new(),
            interval: 0,
            threshold: 0,
            max_weight: 0,
            step_weight: 0,
            metric: Metric {
                name: String::new(),
                threshold: 0.0,
                interval: 0,
                prometheus_query: String::new(),
                operator: Operator::Ge,
            },
        };
        assert!(validate(&spec).is_err());
    }

    #[test]
    fn rejects_out_of_range_max_weight() {
        let mut spec = valid_spec();
        spec.canary_analysis.max_weight = 150;
        assert!(validate(&spec).is_err());
    }

    #[test]
    fn initialized_spec_requires_resolved_port() {
        let mut spec = valid_spec();
        spec.initialized = true;
        assert!(validate(&spec).is_err());
    }
}
