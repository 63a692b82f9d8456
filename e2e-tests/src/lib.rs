//! Test-only crate; see `tests/saga_e2e.rs`.
