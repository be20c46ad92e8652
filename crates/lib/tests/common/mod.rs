#![allow(dead_code)]
//! # Common Test Utilities
//!
//! Shared helpers for the `ingestflow` integration tests.

use ingestflow::{Actor, Role};
use std::sync::Once;

static INIT: Once = Once::new();

/// Initializes the tracing subscriber once per test binary.
pub fn setup_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt().with_test_writer().init();
    });
}

pub fn editor(id: &str) -> Actor {
    Actor::new(id, Role::Editor)
}

pub fn viewer(id: &str) -> Actor {
    Actor::new(id, Role::Viewer)
}

pub fn admin() -> Actor {
    Actor::new("admin-user", Role::Admin)
}
