/*
 * Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: error.rs
 *
 * The error taxonomy for the canary controller. Every fallible function in
 * this crate returns `Result<T, Error>`; the reconcile engine absorbs all of
 * these at its boundary (see `controllers::canary_controller::manage_error`)
 * and turns them into a status write, an event, and a backoff requeue.
 *
 * SPDX-License-Identifier: Apache-2.0
 */

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Canary object is not valid: {0}")]
    Validation(String),

    #[error("could not resolve targetRef: {0}")]
    TargetResolution(String),

    #[error("routing object error: {0}")]
    Routing(String),

    #[error("metric evaluation failed: {0}")]
    Metric(String),

    #[error("precondition violated: {0}")]
    Precondition(String),

    #[error("failed to write status: {0}")]
    StatusWrite(String),

    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("the object has no namespace")]
    MissingNamespace,

    #[error("finalizer error: {0}")]
    Finalizer(#[from] Box<kube::runtime::finalizer::Error<Error>>),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
