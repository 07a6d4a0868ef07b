//! Lets wiremock tests skip in sandboxes without loopback networking.

use std::net::TcpListener;

use wiremock::MockServer;

/// Set to `1`, `true` or `yes` to fail instead of skipping.
const REQUIRE_SOCKET_TESTS_ENV: &str = "MANIFEST_DOWNLOADER_REQUIRE_SOCKET_TESTS";

fn sockets_required() -> bool {
    std::env::var(REQUIRE_SOCKET_TESTS_ENV).is_ok_and(|value| {
        matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
    })
}

/// Returns true when `127.0.0.1` cannot be bound and the test should skip.
///
/// # Panics
///
/// Panics instead of skipping when socket tests are required.
#[must_use]
pub fn loopback_unavailable() -> bool {
    let Err(error) = TcpListener::bind("127.0.0.1:0") else {
        return false;
    };
    assert!(
        !sockets_required(),
        "cannot bind 127.0.0.1 ({error}) while {REQUIRE_SOCKET_TESTS_ENV} is set"
    );
    eprintln!(
        "skipping socket-bound test: cannot bind 127.0.0.1 ({error}); \
         set {REQUIRE_SOCKET_TESTS_ENV}=1 to fail instead"
    );
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
