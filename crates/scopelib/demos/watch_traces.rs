//! Stream traces from every enabled channel.
//!
//! Turns on trace reading, subscribes to registry events and prints a
//! one-line summary whenever a channel's trace is republished.
//!
//! # Usage
//!
//! ```sh
//! RUST_LOG=scopelib_engine=debug \
//!     cargo run -p scopelib --example watch_traces -- 192.168.1.20
//! ```

use std::time::Duration;

use scopelib::tek::mdo3000;
use scopelib::{Param, SENTINEL, ScopeBuilder, ScopeEvent};
use tokio::sync::broadcast::error::RecvError;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let host = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "192.168.1.20".to_string());

    let scope = ScopeBuilder::new(mdo3000())
        .host(&host)
        .poll_interval(Duration::from_millis(200))
        .read_traces(true)
        .measurements(true)
        .build()
        .await?;
    let mut events = scope.subscribe();
    scope.after_init()?;

    println!("Watching traces for 30 seconds...\n");
    let deadline = tokio::time::Instant::now() + Duration::from_secs(30);

    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            break;
        }
        match tokio::time::timeout(remaining, events.recv()).await {
            Ok(Ok(ScopeEvent::ParamsChanged { addr, params })) => {
                if !params.contains(&Param::WfTrace) {
                    continue;
                }
                let trace = scope.read_array(Param::WfTrace, addr);
                let shown: Vec<f64> = trace.into_iter().filter(|v| *v != SENTINEL).collect();
                let (lo, hi) = shown
                    .iter()
                    .fold((f64::MAX, f64::MIN), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
                if shown.is_empty() {
                    println!("CH{}  (empty)", addr + 1);
                } else {
                    println!(
                        "CH{}  {:>5} pts  min {:>8.4}  max {:>8.4}  {}",
                        addr + 1,
                        shown.len(),
                        lo,
                        hi,
                        scope.read_string(Param::TimDivStr, 0)
                    );
                }
            }
            Ok(Ok(ScopeEvent::Disconnected)) => println!("-- link down"),
            Ok(Ok(ScopeEvent::Connected)) => println!("-- link up"),
            Ok(Err(RecvError::Lagged(n))) => println!("(missed {n} events)"),
            Ok(Err(RecvError::Closed)) => break,
            Err(_) => break,
        }
    }

    scope.shutdown().await?;
    Ok(())
}
