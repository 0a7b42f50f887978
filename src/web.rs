/*
 * Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: web.rs
 *
 * The ambient health/metrics HTTP server (spec.2a item 5). Carries no
 * canary-domain logic: it only exposes what `State` already tracks so a
 * scraper or a liveness probe can read it.
 *
 * SPDX-License-Identifier: Apache-2.0
 */

use actix_web::{get, web, App, HttpResponse, HttpServer};
use prometheus::{Encoder, TextEncoder};

use kharon_operator::context::State;

#[get("/healthz")]
async fn healthz(state: web::Data<State>) -> HttpResponse {
    let diagnostics = state.diagnostics().await;
    HttpResponse::Ok().json(serde_json::json!({ "last_event": diagnostics.last_event }))
}

#[get("/metrics")]
async fn metrics(state: web::Data<State>) -> HttpResponse {
    let families = state.metrics();
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&families, &mut buffer) {
        return HttpResponse::InternalServerError().body(format!("failed to encode metrics: {e}"));
    }
    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}

pub async fn run(state: State, port: u16) -> std::io::Result<()> {
    let data = web::Data::new(state);
    HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .service(healthz)
            .service(metrics)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
