//! Pacer entrypoint: run a parsed workout script headless.
//!
//! The runtime core is synchronous and single-consumer; every external
//! input goes through one channel with this main loop as the only receiver.
//! A tick producer thread supplies the periodic `tick` events (the frame
//! driver a UI host would normally provide), and an optional auto-advance
//! producer stands in for the user's "next" presses so effort-only scripts
//! can run unattended.

use anyhow::{Context, Result};
use clap::Parser;
use core_clock::{Clock, WallClock};
use core_compiler::JitCompiler;
use core_events::{Event, names};
use core_output::{OutputStatement, OutputType};
use core_runtime::{RuntimeLimits, ScriptRuntime};
use core_script::{CodeStatement, FragmentKind};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Bounded intake so a runaway producer backpressures instead of ballooning.
const EVENT_CHANNEL_CAP: usize = 1024;

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "pacer", version, about = "Workout script runtime")]
struct Args {
    /// Parsed workout script: a JSON array of statements as emitted by the
    /// parser.
    pub script: PathBuf,
    /// Configuration file path (overrides discovery of `pacer.toml`).
    #[arg(long = "config")]
    pub config: Option<PathBuf>,
    /// Also print `system` outputs (stack transitions).
    #[arg(long = "show-system")]
    pub show_system: bool,
    /// Stop the workout after this many milliseconds of wall time.
    #[arg(long = "max-ms")]
    pub max_ms: Option<u64>,
    /// Dispatch a `next` event on this cadence, standing in for the user.
    #[arg(long = "auto-advance-ms")]
    pub auto_advance_ms: Option<u64>,
    /// Append logs to this file instead of stderr.
    #[arg(long = "log-file")]
    pub log_file: Option<PathBuf>,
}

fn init_logging(log_file: Option<&PathBuf>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match log_file {
        Some(path) => {
            let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
            let file = path.file_name().map(PathBuf::from).unwrap_or_else(|| "pacer.log".into());
            let appender = tracing_appender::rolling::never(dir, file);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
            None
        }
    }
}

fn load_statements(path: &PathBuf) -> Result<Vec<CodeStatement>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading script {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("parsing script {}", path.display()))
}

/// One line per output, fragments summarized by kind.
fn format_output(output: &OutputStatement) -> String {
    let fragments: Vec<String> = output
        .fragments
        .iter()
        .map(|f| match &f.kind {
            FragmentKind::Effort { label } => format!("effort={label}"),
            FragmentKind::Rep { count } => format!("rep={count}"),
            FragmentKind::Rounds { count } => format!("rounds={count}"),
            FragmentKind::Duration { ms } => format!("duration={ms}ms"),
            FragmentKind::Elapsed { ms } => format!("elapsed={ms}ms"),
            FragmentKind::Total { ms } => format!("total={ms}ms"),
            FragmentKind::Text { value, .. } => format!("text={value:?}"),
            FragmentKind::Timer { duration_ms, .. } => {
                format!("timer={}ms", duration_ms.unwrap_or(0))
            }
            FragmentKind::Resistance { value, unit } => format!("load={value}{unit}"),
            FragmentKind::Distance { value, unit } => format!("distance={value}{unit}"),
            FragmentKind::Sound { trigger, seconds } => {
                format!("sound={trigger:?}/{seconds:?}")
            }
            FragmentKind::System { kind, .. } => format!("system={kind}"),
            other => other.name().to_string(),
        })
        .collect();
    let reason = output
        .completion_reason
        .map(|r| format!(" reason={r}"))
        .unwrap_or_default();
    format!(
        "[{:>10}] {} level={}{} {}",
        output.output_type.to_string(),
        output.source_block_key,
        output.stack_level,
        reason,
        fragments.join(" ")
    )
}

fn spawn_tick_producer(tx: Sender<Event>, interval: Duration) {
    std::thread::spawn(move || {
        let clock = WallClock;
        loop {
            std::thread::sleep(interval);
            if tx.send(Event::new(names::TICK, clock.now())).is_err() {
                break;
            }
        }
    });
}

fn spawn_advance_producer(tx: Sender<Event>, interval: Duration) {
    std::thread::spawn(move || {
        let clock = WallClock;
        loop {
            std::thread::sleep(interval);
            if tx.send(Event::new(names::NEXT, clock.now())).is_err() {
                break;
            }
        }
    });
}

fn run(runtime: &mut ScriptRuntime, rx: Receiver<Event>, max_ms: Option<u64>) {
    let deadline = max_ms.map(|ms| Instant::now() + Duration::from_millis(ms));
    runtime.start();
    while runtime.is_running() {
        if let Some(deadline) = deadline
            && Instant::now() >= deadline
        {
            info!(target: "runtime", "wall deadline reached; stopping");
            runtime.stop();
            break;
        }
        match rx.recv_timeout(Duration::from_millis(100)) {
            Ok(event) => runtime.handle(event),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let _log_guard = init_logging(args.log_file.as_ref());

    let config = core_config::load_from(args.config.clone())?;
    let statements = load_statements(&args.script)?;
    info!(
        target: "runtime",
        script = %args.script.display(),
        statements = statements.len(),
        "loaded"
    );

    let limits = RuntimeLimits {
        max_stack_depth: config.file.runtime.max_stack_depth,
        max_turn_iterations: config.file.runtime.max_turn_iterations,
    };
    let mut runtime = ScriptRuntime::new(
        statements,
        JitCompiler::default(),
        WallClock,
        limits,
    )
    .context("building runtime")?;

    let show_system = args.show_system || config.file.output.show_system;
    runtime.on_output(move |output| {
        if show_system || output.output_type != OutputType::System {
            println!("{}", format_output(output));
        }
    });

    let (tx, rx) = bounded::<Event>(EVENT_CHANNEL_CAP);
    spawn_tick_producer(tx.clone(), Duration::from_millis(config.effective_tick_interval_ms()));
    if let Some(ms) = args.auto_advance_ms {
        spawn_advance_producer(tx.clone(), Duration::from_millis(ms.max(10)));
    }
    drop(tx);

    run(&mut runtime, rx, args.max_ms);

    for error in runtime.errors() {
        warn!(target: "runtime", %error, "recorded during run");
    }
    info!(
        target: "runtime",
        outputs = runtime.outputs().len(),
        errors = runtime.errors().len(),
        "done"
    );
    Ok(())
}
