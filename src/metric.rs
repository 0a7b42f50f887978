/*
 * Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: metric.rs
 *
 * The metric evaluator (spec.4.4). Queries the Prometheus-compatible HTTP
 * API named by `canaryAnalysis.metricsServer`, parses the query-range
 * envelope, and compares the sampled value against the configured threshold
 * with the configured operator.
 *
 * The JSON shape mirrors the original `PrometheusApiResponse`/`data`/
 * `result` structs: `{"status":"success","data":{"resultType":"vector",
 * "result":[{"metric":{...},"value":[<ts>,"<value>"]}]}}`.
 *
 * SPDX-License-Identifier: Apache-2.0
 */

use serde::Deserialize;
use serde_json::Value;

use crate::crds::{CanaryAnalysis, Operator};
use crate::error::Error;

#[derive(Deserialize, Debug)]
struct PrometheusApiResponse {
    status: String,
    data: PrometheusData,
}

#[derive(Deserialize, Debug)]
struct PrometheusData {
    result: Vec<PrometheusResult>,
}

#[derive(Deserialize, Debug)]
struct PrometheusResult {
    value: Vec<Value>,
}

/// Outcome of one metric evaluation tick.
pub struct Evaluation {
    pub value: f64,
    pub healthy: bool,
}

/// The record fields a query template may reference.
pub struct QueryContext<'a> {
    pub namespace: &'a str,
    pub name: &'a str,
    pub target_ref_name: &'a str,
    pub target_ref_kind: &'a str,
    pub service_name: &'a str,
}

/// Renders `{{ .Field }}`-style placeholders against `ctx`, matching the
/// handful of fields the spec names (`.Namespace`, `.Spec.TargetRef.Name`,
/// ...). Unknown placeholders are an `Error::Metric` rather than being sent
/// to the metrics server verbatim.
fn render_query(query: &str, ctx: &QueryContext) -> Result<String, Error> {
    let mut out = String::with_capacity(query.len());
    let mut rest = query;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find("}}")
            .ok_or_else(|| Error::Metric("prometheusQuery has an unterminated '{{' placeholder".into()))?;
        let field = after[..end].trim();

        let value = match field {
            ".Namespace" => ctx.namespace,
            ".Name" => ctx.name,
            ".Spec.ServiceName" => ctx.service_name,
            ".Spec.TargetRef.Name" => ctx.target_ref_name,
            ".Spec.TargetRef.Kind" => ctx.target_ref_kind,
            other => {
                return Err(Error::Metric(format!(
                    "prometheusQuery references unknown template field '{other}'"
                )))
            }
        };
        out.push_str(value);

        rest = &after[end + 2..];
    }
    out.push_str(rest);

    Ok(out)
}

/// Implements spec.4.4: render the query template, fetch the metric,
/// compare it to threshold, return the sampled value and whether it
/// passed. A metric that cannot be rendered, fetched, or parsed is an
/// `Error::Metric`, handled by the caller as a soft failure (spec.4.5
/// step 6): it does not increment `failedChecks`.
pub async fn evaluate(http: &reqwest::Client, analysis: &CanaryAnalysis, ctx: &QueryContext<'_>) -> Result<Evaluation, Error> {
    let query = render_query(&analysis.metric.prometheus_query, ctx)?;
    let url = format!(
        "{}/api/v1/query?query={}",
        analysis.metrics_server.trim_end_matches('/'),
        urlencode(&query)
    );

    let response = http
        .get(&url)
        .send()
        .await
        .map_err(|e| Error::Metric(format!("request to metrics server failed: {e}")))?;

    if !response.status().is_success() {
        return Err(Error::Metric(format!(
            "metrics server returned HTTP {}",
            response.status()
        )));
    }

    let body: PrometheusApiResponse = response
        .json()
        .await
        .map_err(|e| Error::Metric(format!("could not parse metrics server response: {e}")))?;

    if body.status != "success" {
        return Err(Error::Metric(format!(
            "metrics server reported status '{}'",
            body.status
        )));
    }

    let sample = body
        .data
        .result
        .first()
        .ok_or_else(|| Error::Metric("metrics server returned no results".into()))?;

    let raw = sample
        .value
        .get(1)
        .ok_or_else(|| Error::Metric("metric result is missing a value".into()))?;

    let value = raw
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .or_else(|| raw.as_f64())
        .unwrap_or(0.0);
    let value = if value.is_nan() { 0.0 } else { value };

    let healthy = compare(value, analysis.metric.threshold, analysis.metric.operator);

    Ok(Evaluation { value, healthy })
}

fn compare(value: f64, threshold: f64, operator: Operator) -> bool {
    match operator {
        Operator::Gt => value > threshold,
        Operator::Ge => value >= threshold,
        Operator::Lt => value < threshold,
        Operator::Le => value <= threshold,
    }
}

fn urlencode(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ge_operator_passes_at_threshold() {
        assert!(compare(99.0, 99.0, Operator::Ge));
        assert!(!compare(98.9, 99.0, Operator::Ge));
    }

    #[test]
    fn lt_operator_is_strict() {
        assert!(compare(0.5, 1.0, Operator::Lt));
        assert!(!compare(1.0, 1.0, Operator::Lt));
    }

    #[test]
    fn urlencode_escapes_reserved_characters() {
        assert_eq!(urlencode("sum(rate(x[1m]))"), "sum%28rate%28x%5B1m%5D%29%29");
    }

    fn query_ctx<'a>() -> QueryContext<'a> {
        QueryContext {
            namespace: "prod",
            name: "podinfo",
            target_ref_name: "podinfo-primary",
            target_ref_kind: "Deployment",
            service_name: "podinfo",
        }
    }

    #[test]
    fn render_query_substitutes_known_fields() {
        let rendered = render_query(
            r#"sum(rate(http_requests_total{namespace="{{ .Namespace }}",deployment="{{.Spec.TargetRef.Name}}"}[1m]))"#,
            &query_ctx(),
        )
        .unwrap();
        assert_eq!(
            rendered,
            r#"sum(rate(http_requests_total{namespace="prod",deployment="podinfo-primary"}[1m]))"#
        );
    }

    #[test]
    fn render_query_passes_through_a_literal_query_unchanged() {
        let rendered = render_query("sum(rate(http_requests_total[1m]))", &query_ctx()).unwrap();
        assert_eq!(rendered, "sum(rate(http_requests_total[1m]))");
    }

    #[test]
    fn render_query_rejects_unknown_placeholders() {
        assert!(render_query("{{ .Spec.Bogus }}", &query_ctx()).is_err());
    }

    #[test]
    fn render_query_rejects_unterminated_placeholders() {
        assert!(render_query("sum({{ .Namespace )", &query_ctx()).is_err());
    }

    #[test]
    fn parses_scalar_string_values_from_the_envelope() {
        let body: PrometheusApiResponse = serde_json::from_str(
            r#"{"status":"success","data":{"resultType":"vector","result":[{"metric":{},"value":[1690000000,"99.75"]}]}}"#,
        )
        .unwrap();
        assert_eq!(body.status, "success");
        let raw = &body.data.result[0].value[1];
        assert_eq!(raw.as_str().unwrap().parse::<f64>().unwrap(), 99.75);
    }
}
