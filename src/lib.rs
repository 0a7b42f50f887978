/*
 * Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: lib.rs
 *
 * Re-exports the operator's modules as a library so the reconcile engine's
 * pure decision logic and its supporting modules are independently
 * unit-testable (spec.2d) without going through the `main` binary.
 *
 * SPDX-License-Identifier: Apache-2.0
 */

pub mod context;
pub mod controllers;
pub mod crds;
pub mod error;
pub mod metric;
pub mod predicate;
pub mod routing;
pub mod target;
pub mod validate;
