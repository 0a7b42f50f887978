/*
 * Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: main.rs
 *
 * The entry point for the canary release operator. It is responsible for
 * setting up tracing, probing that the `Canary` CRD is registered, building
 * the shared `Context`, and running the watch/reconcile loop alongside a
 * small health/metrics HTTP server.
 *
 * Architecture:
 * 1. **Initialization**: build a `tracing-subscriber` filter from `RUST_LOG`,
 *    then a `kube::Client`.
 * 2. **CRD probe**: list `Canary` with `limit(1)` before entering the watch
 *    loop; exit fast and loud if the CRD isn't installed.
 * 3. **Shared Context**: the Kubernetes client, the metric HTTP client, and
 *    the Prometheus registry, handed out per-reconcile by `State`.
 * 4. **Watch/reconcile loop**: built from `reflector`/`watcher`/`applier`
 *    directly rather than the `Controller` builder, because only this
 *    "hard-mode" path exposes `.predicate_filter()` — without it, every
 *    status write the engine itself makes would re-trigger the next
 *    reconcile, since nothing would gate the watch on `metadata.generation`.
 *    `predicate::canary_predicate()` is that gate; status-subresource patches
 *    don't bump `generation`, so a `NoAction`/steady-state tick no longer
 *    wakes the loop back up.
 * 5. **Health server**: a background Tokio task serving `/healthz` and
 *    `/metrics` — ambient, carries no canary-domain logic.
 *
 * SPDX-License-Identifier: Apache-2.0
 */

use futures::stream::StreamExt;
use kube::runtime::controller::{applier, trigger_self};
use kube::runtime::{reflector, watcher, WatchStreamExt};
use kube::{Api, Client};
use std::env;
use tracing::{error, info};

use kharon_operator::context::State;
use kharon_operator::controllers::canary_controller::{error_policy, reconcile};
use kharon_operator::crds::Canary;
use kharon_operator::predicate::canary_predicate;

mod web;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let client = Client::try_default().await?;

    let namespace = env::var("CANARY_NAMESPACE").ok();
    let canaries: Api<Canary> = match &namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    };

    if let Err(e) = canaries.list(&kube::api::ListParams::default().limit(1)).await {
        error!("Canary CRD is not queryable; {e:?}. Is the CRD installed?");
        std::process::exit(1);
    }

    let state = State::default();
    let context = state.create_context(client.clone());

    let health_port: u16 = env::var("CANARY_HEALTH_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8080);
    let health_state = state.clone();
    tokio::spawn(async move {
        if let Err(e) = web::run(health_state, health_port).await {
            error!("health/metrics server exited: {e}");
        }
    });

    info!("kharon-operator starting, watching Canary across {:?}", namespace);

    let (reader, writer) = reflector::store::<Canary>();
    let watch = reflector::reflector(writer, watcher::watcher(canaries, watcher::Config::default()))
        .applied_objects()
        .predicate_filter(canary_predicate());
    let queue = trigger_self(watch, Default::default());

    applier(reconcile, error_policy, context, reader, queue)
        .take_until(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("ctrl+c received, shutting down");
        })
        .for_each(|res| async move {
            match res {
                Ok(o) => info!("reconciled {:?}", o),
                Err(e) => error!("reconcile error: {e}"),
            }
        })
        .await;

    info!("kharon-operator shutting down");
    Ok(())
}
