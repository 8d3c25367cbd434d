// scopelib test application -- CLI tool for exercising the scope drivers
// against real hardware or a mock transport.
//
// Usage:
//   scopelib-test-app list
//   scopelib-test-app --model MDO3000 --host 192.168.1.20 info
//   scopelib-test-app --model TDS3000 --serial /dev/ttyUSB0 get ch_scl --ch 2
//   scopelib-test-app --model MDO3000 --host 192.168.1.20 set tr_lev 0.25
//   scopelib-test-app --model MDO3000 --host 192.168.1.20 send "*IDN?"
//   scopelib-test-app --model MDO3000 --host 192.168.1.20 waveform --ch 1
//   scopelib-test-app --model MDO3000 --host 192.168.1.20 -v monitor --duration 30
//   scopelib-test-app --model MDO3000 --host 192.168.1.20 save --file bench.cfg
//   scopelib-test-app --model MDO3000 --mock info

use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Parser, Subcommand};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use scopelib::{Param, SENTINEL, Scope, ScopeBuilder, ScopeEvent, ScopeModel, Value, ValueKind};
use scopelib_test_harness::MockTransport;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// scopelib test application -- drives an oscilloscope from the command line.
#[derive(Parser)]
#[command(name = "scopelib-test-app", version, about)]
struct Cli {
    /// Scope model (e.g. MDO3000, TDS3000). Required for all commands
    /// except `list`.
    #[arg(long)]
    model: Option<String>,

    /// Host name or IP address of a LAN-attached scope.
    #[arg(long)]
    host: Option<String>,

    /// Override the model's TCP port.
    #[arg(long)]
    port: Option<u16>,

    /// Serial port path (e.g. /dev/ttyUSB0, COM3).
    #[arg(long)]
    serial: Option<String>,

    /// Override the model's baud rate.
    #[arg(long)]
    baud: Option<u32>,

    /// Use a mock transport instead of a real link.
    /// Useful for verifying CLI parsing and builder wiring without hardware.
    #[arg(long)]
    mock: bool,

    /// Raise the log level (-v debug, -vv trace). RUST_LOG overrides.
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Seconds to wait for the scope to answer.
    #[arg(long, default_value_t = 5)]
    wait: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List all supported scope models.
    List,

    /// Print model details and the instrument's identity.
    Info,

    /// Read a parameter from the instrument.
    Get {
        /// Parameter name (e.g. ch_scl, tr_lev, tim_div). See `list`.
        param: String,

        /// Channel or measurement slot, 1-based.
        #[arg(long, default_value_t = 1)]
        ch: usize,
    },

    /// Write a parameter. Enumerated parameters take the keyword index.
    Set {
        param: String,
        value: String,

        /// Channel or measurement slot, 1-based.
        #[arg(long, default_value_t = 1)]
        ch: usize,
    },

    /// Send raw text and print the reply (queries end in `?`).
    Send { text: String },

    /// Fetch one trace and print it.
    Waveform {
        /// Channel, 1-based.
        #[arg(long, default_value_t = 1)]
        ch: usize,

        /// Print every sample instead of a summary.
        #[arg(long)]
        all: bool,
    },

    /// Stream traces and print registry events as they arrive.
    Monitor {
        /// Duration in seconds (0 = run until Ctrl-C).
        #[arg(long, default_value_t = 0)]
        duration: u64,
    },

    /// Save the instrument settings to a file.
    Save {
        /// Settings file (default: scope.cfg).
        #[arg(long, default_value = "scope.cfg")]
        file: String,
    },

    /// Restore instrument settings from a file written by `save`.
    Restore {
        #[arg(long, default_value = "scope.cfg")]
        file: String,
    },
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Convert a 1-based channel argument to a registry address.
fn channel_addr(ch: usize) -> Result<usize> {
    if ch == 0 {
        bail!("channels are numbered from 1");
    }
    Ok(ch - 1)
}

fn parse_param(name: &str) -> Result<Param> {
    name.parse::<Param>().map_err(anyhow::Error::msg)
}

/// Parse a command-line value according to the parameter's kind.
fn parse_value(param: Param, text: &str) -> Result<Value> {
    let value = match param.kind() {
        ValueKind::Int | ValueKind::Enum => Value::Int(
            text.trim()
                .parse()
                .with_context(|| format!("{param} takes an integer, got '{text}'"))?,
        ),
        ValueKind::Float => Value::Float(
            text.trim()
                .parse()
                .with_context(|| format!("{param} takes a number, got '{text}'"))?,
        ),
        ValueKind::Str => Value::Str(text.to_string()),
        ValueKind::FloatArray => bail!("{param} is read-only"),
    };
    Ok(value)
}

/// Wait until the poller republishes `param` at `addr`.
async fn wait_for(
    events: &mut broadcast::Receiver<ScopeEvent>,
    param: Param,
    addr: usize,
    timeout: Duration,
) -> Result<()> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        match tokio::time::timeout(remaining, events.recv()).await {
            Ok(Ok(ScopeEvent::ParamsChanged { addr: a, params }))
                if a == addr && params.contains(&param) =>
            {
                return Ok(());
            }
            Ok(Ok(ScopeEvent::Disconnected)) => bail!("scope stopped answering"),
            Ok(Ok(_)) | Ok(Err(RecvError::Lagged(_))) => {}
            Ok(Err(RecvError::Closed)) => bail!("driver stopped"),
            Err(_) => bail!("no update of {param} within {}s", timeout.as_secs()),
        }
    }
}

fn print_value(scope: &Scope, param: Param, addr: usize) -> Result<()> {
    let value = scope.read(param, addr)?;
    match value {
        Value::FloatArray(samples) => println!("{param}[{}] = {} samples", addr + 1, samples.len()),
        other => println!("{param}[{}] = {other}", addr + 1),
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// List command
// ---------------------------------------------------------------------------

fn cmd_list() -> Result<()> {
    let models = scopelib::supported_models();

    println!(
        "{:<10}  {:<10}  {:>6}  {:>8}  Time/div steps",
        "Model", "Id", "Record", "Preamble"
    );
    println!(
        "{:<10}  {:<10}  {:>6}  {:>8}  --------------",
        "-".repeat(10),
        "-".repeat(10),
        "------",
        "--------"
    );
    for m in &models {
        println!(
            "{:<10}  {:<10}  {:>6}  {:>8}  {}",
            m.name,
            m.model_id,
            m.trace_length,
            format!("{} fld", m.preamble.field_count()),
            m.time_div_values.len() * m.time_div_units.len()
        );
    }
    println!();
    println!("{} models total.", models.len());

    println!();
    println!("Parameters:");
    let names: Vec<&str> = Param::ALL.iter().map(|p| p.name()).collect();
    for row in names.chunks(6) {
        println!("  {}", row.join(", "));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Scope construction
// ---------------------------------------------------------------------------

fn lookup_model(cli: &Cli) -> Result<ScopeModel> {
    let name = cli
        .model
        .as_deref()
        .context("--model is required for this command")?;
    scopelib::find_model(name).with_context(|| {
        let known: Vec<&str> = scopelib::supported_models()
            .iter()
            .map(|m| m.name)
            .collect();
        format!(
            "unknown model '{}'. Supported models: {}",
            name,
            known.join(", ")
        )
    })
}

async fn create_scope(cli: &Cli, read_traces: bool) -> Result<Scope> {
    let model = lookup_model(cli)?;
    let name = model.name;
    let mut builder = ScopeBuilder::new(model)
        .read_traces(read_traces)
        .measurements(read_traces);

    if cli.mock {
        let scope = builder
            .build_with_transport(Box::new(MockTransport::new()))
            .await
            .context("failed to build scope with mock transport")?;
        println!("Connected (mock transport) -- {name}");
        return Ok(scope);
    }

    if let Some(host) = cli.host.as_deref() {
        builder = builder.host(host);
        if let Some(port) = cli.port {
            builder = builder.tcp_port(port);
        }
    } else if let Some(serial) = cli.serial.as_deref() {
        builder = builder.serial_port(serial);
        if let Some(baud) = cli.baud {
            builder = builder.baud_rate(baud);
        }
    } else {
        bail!("--host or --serial is required when not using --mock");
    }

    let scope = builder
        .build()
        .await
        .with_context(|| format!("failed to connect to {name}"))?;
    debug!(model = name, "connected");
    Ok(scope)
}

// ---------------------------------------------------------------------------
// Command implementations
// ---------------------------------------------------------------------------

async fn cmd_info(scope: &Scope, timeout: Duration) -> Result<()> {
    let model = scope.model();
    println!("Scope Information");
    println!("  Model:          {}", model.name);
    println!("  Model ID:       {}", model.model_id);
    println!("  TCP port:       {}", model.default_tcp_port);
    println!("  Baud rate:      {}", model.default_baud_rate);
    println!("  Record length:  {}", model.trace_length);
    println!("  Measurements:   {}", model.num_measurements);
    println!(
        "  Windows:        {}",
        model
            .horizontal_scales
            .iter()
            .map(|hs| format!("{}ns:{}+{}", hs.nanos, hs.start, hs.points))
            .collect::<Vec<_>>()
            .join(" ")
    );

    let mut events = scope.subscribe();
    scope.refresh(Param::Idn, 0)?;
    scope.refresh(Param::IpAddr, 0)?;
    match wait_for(&mut events, Param::Idn, 0, timeout).await {
        Ok(()) => {
            println!();
            println!("Instrument");
            println!("  Identity:       {}", scope.read_string(Param::Idn, 0));
            println!("  IP address:     {}", scope.read_string(Param::IpAddr, 0));
        }
        Err(e) => println!("\n(no identity: {e})"),
    }
    Ok(())
}

async fn cmd_get(scope: &Scope, param: Param, addr: usize, timeout: Duration) -> Result<()> {
    let mut events = scope.subscribe();
    scope.refresh(param, addr)?;
    wait_for(&mut events, param, addr, timeout).await?;
    print_value(scope, param, addr)
}

async fn cmd_set(
    scope: &Scope,
    param: Param,
    addr: usize,
    value: Value,
    timeout: Duration,
) -> Result<()> {
    let mut events = scope.subscribe();
    scope.write(param, addr, value)?;
    // Writes that the instrument echoes come back through the registry.
    if wait_for(&mut events, param, addr, timeout).await.is_ok() {
        print_value(scope, param, addr)?;
    } else {
        println!("{param}[{}] written", addr + 1);
    }
    Ok(())
}

async fn cmd_send(scope: &Scope, text: &str, timeout: Duration) -> Result<()> {
    let mut events = scope.subscribe();
    scope.write_string(Param::Command, 0, text)?;
    if text.trim_end().ends_with('?') {
        wait_for(&mut events, Param::Reply, 0, timeout).await?;
        println!("{}", scope.read_string(Param::Reply, 0));
    }
    Ok(())
}

async fn cmd_waveform(scope: &Scope, addr: usize, all: bool, timeout: Duration) -> Result<()> {
    let mut events = scope.subscribe();
    scope.write_int(Param::GetWf, addr, 1)?;
    wait_for(&mut events, Param::WfTrace, addr, timeout).await?;

    let trace = scope.read_array(Param::WfTrace, addr);
    let shown: Vec<f64> = trace.iter().copied().filter(|v| *v != SENTINEL).collect();
    println!(
        "CH{}: {} of {} samples on screen, time/div {}",
        addr + 1,
        shown.len(),
        trace.len(),
        scope.read_string(Param::TimDivStr, 0)
    );
    if shown.is_empty() {
        return Ok(());
    }
    if all {
        for (i, v) in shown.iter().enumerate() {
            println!("{i:>5}  {v:.6}");
        }
    } else {
        let (lo, hi) = shown
            .iter()
            .fold((f64::MAX, f64::MIN), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
        let mean = shown.iter().sum::<f64>() / shown.len() as f64;
        println!("  min {lo:.6}  max {hi:.6}  mean {mean:.6}");
        println!(
            "  span {:.6e} s  rate {:.6e} S/s",
            scope.read_float(Param::WfPeriod, 0),
            scope.read_float(Param::WfRate, 0)
        );
    }
    Ok(())
}

async fn cmd_monitor(scope: &Scope, duration_secs: u64) -> Result<()> {
    let mut event_rx = scope.subscribe();
    scope.after_init()?;

    println!("Monitoring scope events (Ctrl-C to stop)...");

    let deadline = if duration_secs > 0 {
        Some(Instant::now() + Duration::from_secs(duration_secs))
    } else {
        None
    };

    loop {
        let timeout = match deadline {
            Some(dl) => {
                let remaining = dl.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    println!("Monitor duration elapsed.");
                    break;
                }
                remaining
            }
            None => Duration::from_secs(3600),
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("Interrupted.");
                break;
            }
            recv = tokio::time::timeout(timeout, event_rx.recv()) => match recv {
                Ok(Ok(ScopeEvent::ParamsChanged { addr, params })) => {
                    let names: Vec<&str> = params.iter().map(|p| p.name()).collect();
                    println!("[{}] {}", addr + 1, names.join(" "));
                }
                Ok(Ok(event)) => println!("[event] {event:?}"),
                Ok(Err(RecvError::Lagged(n))) => {
                    println!("[warning] missed {n} events (consumer too slow)");
                }
                Ok(Err(RecvError::Closed)) => {
                    println!("Event channel closed.");
                    break;
                }
                Err(_) => {
                    if deadline.is_some() {
                        println!("Monitor duration elapsed.");
                    }
                    break;
                }
            }
        }
    }

    let stats = scope.queue_stats();
    println!("{} requests queued, {} rejected.", stats.sent(), stats.failed());
    Ok(())
}

/// Trigger a save or restore and report the driver's status message.
async fn cmd_persist(scope: &Scope, trigger: Param, file: &str, timeout: Duration) -> Result<()> {
    let mut events = scope.subscribe();
    scope.write_string(Param::FilePath, 0, file)?;
    scope.write_int(trigger, 0, 1)?;
    wait_for(&mut events, Param::Message, 0, timeout).await?;
    let message = scope.read_string(Param::Message, 0);
    println!("{message}");
    if message.contains("failed") {
        bail!("{trigger} of {file} did not complete");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    // The `list` command does not require a scope.
    if matches!(cli.command, Command::List) {
        return cmd_list();
    }

    let timeout = Duration::from_secs(cli.wait.max(1));
    let streaming = matches!(cli.command, Command::Monitor { .. });
    let scope = create_scope(&cli, streaming).await?;

    let result = match &cli.command {
        Command::Info => cmd_info(&scope, timeout).await,
        Command::Get { param, ch } => match (parse_param(param), channel_addr(*ch)) {
            (Ok(p), Ok(addr)) => cmd_get(&scope, p, addr, timeout).await,
            (Err(e), _) | (_, Err(e)) => Err(e),
        },
        Command::Set { param, value, ch } => {
            let parsed = parse_param(param).and_then(|p| {
                let v = parse_value(p, value)?;
                Ok((p, v, channel_addr(*ch)?))
            });
            match parsed {
                Ok((p, v, addr)) => cmd_set(&scope, p, addr, v, timeout).await,
                Err(e) => Err(e),
            }
        }
        Command::Send { text } => cmd_send(&scope, text, timeout).await,
        Command::Waveform { ch, all } => match channel_addr(*ch) {
            Ok(addr) => cmd_waveform(&scope, addr, *all, timeout).await,
            Err(e) => Err(e),
        },
        Command::Monitor { duration } => cmd_monitor(&scope, *duration).await,
        Command::Save { file } => cmd_persist(&scope, Param::Save, file, timeout).await,
        Command::Restore { file } => cmd_persist(&scope, Param::Restore, file, timeout).await,
        Command::List => unreachable!("list handled above"),
    };

    if cli.mock {
        scope.abort();
    } else {
        scope.shutdown().await.ok();
    }
    result
}
