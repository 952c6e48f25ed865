/// Example: Concurrent Token Renewal
///
/// Eight worker threads hit a backend whose access token has just expired.
/// Only one renewal call is made; every request is replayed with the new
/// token.
///
/// Run:
/// RUST_LOG=tokenrelay=debug cargo run --example concurrent_refresh
use parking_lot::RwLock;
use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;
use tokenrelay::error::Result;
use tokenrelay::prelude::*;
use tracing_subscriber::EnvFilter;

/// In-process API that only accepts the most recently issued token
struct DemoBackend {
    current: RwLock<String>,
    renewals: AtomicUsize,
}

impl HttpTransport for DemoBackend {
    fn execute(&self, request: &ApiRequest) -> Result<ApiResponse> {
        thread::sleep(Duration::from_millis(20));

        let presented = request
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "));

        if presented != Some(self.current.read().as_str()) {
            return Ok(ApiResponse::new(
                StatusCode::UNAUTHORIZED,
                r#"{"message": "jwt expired"}"#,
            ));
        }
        Ok(ApiResponse::new(StatusCode::OK, r#"{"courses": []}"#))
    }
}

impl Renewer for DemoBackend {
    fn renew(&self, refresh_token: &str) -> std::result::Result<RenewedTokens, RefreshFailure> {
        let n = self.renewals.fetch_add(1, Ordering::SeqCst) + 1;
        thread::sleep(Duration::from_millis(150));

        let access_token = format!("access-{}", n);
        *self.current.write() = access_token.clone();
        Ok(RenewedTokens {
            access_token,
            refresh_token: Some(format!("{}-rotated", refresh_token)),
        })
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tokenrelay=info")),
        )
        .with_thread_names(true)
        .init();

    println!("=== Concurrent Token Renewal Example ===\n");

    let backend = Arc::new(DemoBackend {
        current: RwLock::new("access-0".to_string()),
        renewals: AtomicUsize::new(0),
    });

    let session = Arc::new(
        SessionManager::with_parts(
            SessionConfig::new("https://api.example.com/auth/refresh-token"),
            Arc::new(MemoryStorage::new()),
            backend.clone(),
            backend.clone(),
        )
        .expect("Failed to create session"),
    );

    session.on_session_ended(|event| println!("✗ Session ended: {}", event.reason));
    session
        .establish("expired-access", Some("refresh-1"))
        .expect("Failed to establish session");

    let workers = 8;
    let barrier = Arc::new(Barrier::new(workers));
    let handles: Vec<_> = (0..workers)
        .map(|i| {
            let session = session.clone();
            let barrier = barrier.clone();
            thread::Builder::new()
                .name(format!("worker-{}", i))
                .spawn(move || {
                    barrier.wait();
                    let url = format!("https://api.example.com/courses?page={}", i);
                    session.send(&ApiRequest::get(url)).map(|r| r.status)
                })
                .expect("Failed to spawn worker")
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        match handle.join().expect("Worker panicked") {
            Ok(status) => println!("✓ worker-{} got {}", i, status),
            Err(e) => println!("✗ worker-{} failed: {}", i, e),
        }
    }

    let credentials = session.credentials().expect("Failed to read credentials");
    println!("\nRenewal calls: {}", backend.renewals.load(Ordering::SeqCst));
    println!("Access token:  {:?}", credentials.access_token);
    println!("Refresh token: {:?}", credentials.refresh_token);

    session.logout().expect("Failed to log out");
    println!("Session active after logout: {}", session.is_active());
}
