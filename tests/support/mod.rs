//! Helpers shared by the integration test binaries.
//!
//! Each test binary compiles its own copy and uses a different subset.
#![allow(dead_code)]

use std::net::TcpListener;

use wiremock::MockServer;

/// Set to `1`, `true` or `yes` to fail instead of skipping.
const REQUIRE_SOCKET_TESTS_ENV: &str = "MANIFEST_DOWNLOADER_REQUIRE_SOCKET_TESTS";

/// Returns true when `127.0.0.1` cannot be bound and the test should skip.
///
/// Panics instead when `MANIFEST_DOWNLOADER_REQUIRE_SOCKET_TESTS` is set.
pub fn loopback_unavailable() -> bool {
    let Err(error) = TcpListener::bind("127.0.0.1:0") else {
        return false;
    };
    let required = std::env::var(REQUIRE_SOCKET_TESTS_ENV).is_ok_and(|value| {
        matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
    });
    assert!(
        !required,
        "cannot bind 127.0.0.1 ({error}) while {REQUIRE_SOCKET_TESTS_ENV} is set"
    );
    eprintln!("skipping socket-bound test: cannot bind 127.0.0.1 ({error})");
    true
}

/// Starts a mock server, or `None` when loopback is unavailable.
pub async fn start_mock_server_or_skip() -> Option<MockServer> {
    if loopback_unavailable() {
        None
    } else {
        Some(MockServer::start().await)
    }
}
