//! Read the front-panel settings of a LAN-attached Tektronix scope.
//!
//! Connects, queues the start-up sequence, waits for the poller to work
//! through it and prints what the registry holds.
//!
//! # Usage
//!
//! ```sh
//! cargo run -p scopelib --example read_settings -- 192.168.1.20 mdo3000
//! ```

use std::time::Duration;

use anyhow::Context;
use scopelib::{NUM_CHANNELS, Param, ScopeBuilder};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "192.168.1.20".to_string());
    let model_name = args.next().unwrap_or_else(|| "mdo3000".to_string());
    let model = scopelib::find_model(&model_name)
        .with_context(|| format!("unknown model '{model_name}'"))?;

    println!("Connecting to {} at {}...", model.name, host);
    let scope = ScopeBuilder::new(model)
        .host(&host)
        .command_timeout(Duration::from_secs(1))
        .build()
        .await
        .context("connect failed")?;
    scope.after_init()?;

    // The start-up sequence is a few dozen exchanges.
    tokio::time::sleep(Duration::from_secs(3)).await;

    println!("Identity:    {}", scope.read_string(Param::Idn, 0));
    println!("Address:     {}", scope.read_string(Param::IpAddr, 0));
    println!("Time/div:    {}", scope.read_string(Param::TimDivStr, 0));
    println!("Delay:       {}", scope.read_string(Param::TimDlyStr, 0));
    println!(
        "Trigger:     level {:.3} V, source #{}, slope #{}",
        scope.read_float(Param::TrLev, 0),
        scope.read_int(Param::TrSource, 0),
        scope.read_int(Param::TrSlope, 0)
    );

    println!("\n{:<4} {:<4} {:>10} {:>10}", "Ch", "On", "V/div", "Position");
    for ch in 0..NUM_CHANNELS {
        println!(
            "{:<4} {:<4} {:>10.4} {:>10.2}",
            ch + 1,
            if scope.read_int(Param::ChOn, ch) != 0 { "yes" } else { "no" },
            scope.read_float(Param::ChScl, ch),
            scope.read_float(Param::ChPos, ch)
        );
    }

    let stats = scope.queue_stats();
    println!("\nQueued {} requests, {} rejected.", stats.sent(), stats.failed());
    scope.shutdown().await?;
    Ok(())
}
