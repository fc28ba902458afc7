//! Intentionally empty: this crate exists to host `tests/*.rs` integration
//! tests that exercise the workspace crates together rather than in
//! isolation.
