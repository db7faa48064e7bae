//! Integration test binary: the assistant driven end to end through a
//! scripted microphone, all scenarios linked into a single binary.
//!
//! See the matklad pattern: <https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html>

// Allow unwrap/expect in test code
#![allow(clippy::unwrap_used, clippy::expect_used)]

mod helpers;

mod scenarios;
mod stop_semantics;
