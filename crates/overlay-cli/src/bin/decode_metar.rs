//! Decode raw METAR reports and print them as JSON.
//!
//! Reports come from the arguments, or one per line on stdin.

use anyhow::Context;
use clap::Parser;
use overlay_core::weather::{parse_metar, MetarRecord};
use std::io::{self, BufRead, Write};

/// Decode METAR reports to JSON
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Raw reports; reads stdin when empty
    reports: Vec<String>,

    /// Reject reports with no recognizable group instead of printing them
    #[arg(long)]
    strict: bool,

    /// Pretty-print each record
    #[arg(long)]
    pretty: bool,
}

fn decode(raw: &str, strict: bool) -> anyhow::Result<MetarRecord> {
    if strict {
        raw.parse::<MetarRecord>()
            .with_context(|| format!("cannot decode {:?}", raw))
    } else {
        Ok(parse_metar(raw))
    }
}

fn main() -> anyhow::Result<()> {
    overlay_cli::init_tracing("overlay_core=warn")?;
    let args = Args::parse();

    let reports: Vec<String> = if args.reports.is_empty() {
        io::stdin()
            .lock()
            .lines()
            .collect::<Result<Vec<_>, _>>()
            .context("failed to read stdin")?
    } else {
        args.reports
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut failures = 0;
    for raw in reports.iter().filter(|line| !line.trim().is_empty()) {
        match decode(raw, args.strict) {
            Ok(record) => {
                let json = if args.pretty {
                    serde_json::to_string_pretty(&record)?
                } else {
                    serde_json::to_string(&record)?
                };
                writeln!(out, "{}", json)?;
            }
            Err(err) => {
                failures += 1;
                tracing::error!("{:#}", err);
            }
        }
    }

    anyhow::ensure!(failures == 0, "{} report(s) could not be decoded", failures);
    Ok(())
}
