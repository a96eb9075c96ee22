//! Test-only support shared across the workspace's crates (spec.md §9:
//! ambient test tooling, grounded on the teacher's own `test-utilities`):
//! installing this as a dev-dependency makes every `log::` call a test
//! exercises visible under `cargo test -- --nocapture`.

#[cfg(feature = "test_log")]
mod logging;
