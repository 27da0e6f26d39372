//! folan - send files between two computers on the same network
//!
//! One side listens, the other connects and sends; both keep going across
//! dropped connections until a limit, the end of the input, or Ctrl-C.

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::style::{Color, Stylize};
use indicatif::HumanBytes;
use std::net::SocketAddr;
use std::process;
use std::sync::Arc;

use folan::cli::Cli;
use folan::config::{ReceiverConfig, RunConfig};
use folan::driver::{ReceiverDriver, RunSummary, SenderDriver, StopReason};
use folan::interrupt::Interrupt;
use folan::logger::{JsonLogger, Logger, NoopLogger};
use folan::progress::Output;

fn main() {
    let outcome = run();
    if let Err(e) = &outcome {
        eprintln!("{} {:#}", "error:".with(Color::Red).bold(), e);
    }
    process::exit(exit_code(&outcome));
}

/// 0 for any clean stop, a first Ctrl-C included; 130 is left to the
/// forced exit in the signal handler.
fn exit_code(outcome: &Result<StopReason>) -> i32 {
    match outcome {
        Ok(_) => 0,
        Err(_) => 1,
    }
}

fn run() -> Result<StopReason> {
    let cli = Cli::parse();
    let output = if cli.quiet {
        Output::Quiet
    } else {
        Output::Terminal
    };

    let interrupt = Interrupt::new();
    {
        let flag = interrupt.clone();
        ctrlc::set_handler(move || {
            if flag.trigger() {
                eprintln!("\nInterrupted again. Exiting (Ctrl-C)...");
                // Exit immediately with 130 (128 + SIGINT)
                process::exit(130);
            }
            eprintln!("\nInterrupted. Finishing the current file; press Ctrl-C again to quit now.");
        })
        .context("installing Ctrl-C handler")?;
    }

    // Choose logger once; NoopLogger when no log file was asked for
    let logger: Arc<dyn Logger> = match &cli.log_file {
        Some(p) => Arc::new(
            JsonLogger::new(p).with_context(|| format!("opening log file {}", p.display()))?,
        ),
        None => Arc::new(NoopLogger),
    };

    let summary = match RunConfig::from_command(&cli.command, output)? {
        RunConfig::Send(config) => {
            let target = config.addr;
            let driver = SenderDriver::new(config, interrupt)?.with_logger(logger);
            let summary = driver
                .run()
                .with_context(|| format!("sending to {}", target))?;
            print_summary("Sent", &summary, output);
            summary
        }
        RunConfig::Listen(config) => {
            let driver = ReceiverDriver::bind(config.clone(), interrupt)?.with_logger(logger);
            print_hint(driver.local_addr(), &config, output);
            let summary = driver
                .run()
                .with_context(|| format!("receiving into {}", config.save_dir.display()))?;
            print_summary("Received", &summary, output);
            summary
        }
    };
    Ok(summary.stop)
}

/// Tell the user what to run on the other machine
fn print_hint(local: SocketAddr, config: &ReceiverConfig, output: Output) {
    if output.is_quiet() {
        return;
    }
    let host = if local.ip().is_unspecified() {
        hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| local.ip().to_string())
    } else {
        local.ip().to_string()
    };
    eprintln!(
        "{} on {}, saving to {}",
        "Listening".with(Color::Green).bold(),
        local,
        config.save_dir.display()
    );
    eprintln!("On the other computer run:\n");
    eprintln!("    folan send {}:{} files <PATH>...\n", host, local.port());
}

fn print_summary(verb: &str, summary: &RunSummary, output: Output) {
    if output.is_quiet() {
        return;
    }
    let secs = summary.elapsed.as_secs_f64();
    let rate = if secs > 0.0 {
        (summary.totals.bytes as f64 / secs) as u64
    } else {
        0
    };
    eprintln!(
        "{} {} file(s), {} in {:.1}s ({}/s), {}",
        verb.with(Color::Green).bold(),
        summary.totals.files,
        HumanBytes(summary.totals.bytes),
        secs,
        HumanBytes(rate),
        summary.stop
    );
    if summary.reconnects > 0 {
        eprintln!("  {} reconnect(s)", summary.reconnects);
    }
    if !summary.skipped.is_empty() {
        eprintln!(
            "  {} {} file(s):",
            "Skipped".with(Color::Yellow).bold(),
            summary.skipped.len()
        );
        for s in &summary.skipped {
            eprintln!("    {}", s);
        }
    }
}
