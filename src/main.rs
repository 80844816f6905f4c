mod aggregate;
mod cancel;
mod config;
mod consts;
mod infohash;
mod magnet;
mod scrape;
#[cfg(test)]
mod testing;
mod tracker;
mod util;
use crate::cancel::CancelToken;
use crate::config::ScrapeConfig;
use crate::consts::{DEFAULT_TRACKERS, DEFAULT_UDP_CHUNK_SIZE};
use crate::infohash::InfoHash;
use crate::magnet::magnet_link;
use crate::scrape::Scraper;
use crate::tracker::Tracker;
use anyhow::Context;
use clap::Parser;
use std::io::{self, ErrorKind, IsTerminal, Write, stderr, stdout};
use std::process::ExitCode;
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::{filter::Targets, fmt::time::OffsetTime, prelude::*};

/// Report the number of seeders for each of the given torrents, taking the
/// highest count reported by any of a set of trackers
#[derive(Clone, Debug, Eq, Parser, PartialEq)]
struct Arguments {
    /// Seconds to allow for each individual tracker operation
    #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..))]
    timeout: u64,

    /// Give up on trackers that have not answered after this many seconds
    /// in total and report what has been gathered so far
    #[arg(short = 'T', long, value_name = "SECONDS")]
    total_timeout: Option<u64>,

    /// Maximum number of info hashes to send in one UDP scrape request
    #[arg(long, default_value_t = DEFAULT_UDP_CHUNK_SIZE)]
    chunk_size: usize,

    /// Tracker to query; may be given multiple times.  Replaces the built-in
    /// tracker list.
    #[arg(long = "tracker", value_name = "URL", default_values = DEFAULT_TRACKERS.iter().copied())]
    trackers: Vec<Tracker>,

    /// Also print a magnet link for each torrent
    #[arg(long)]
    magnet: bool,

    /// List torrents from most to fewest seeders
    #[arg(long)]
    sort: bool,

    /// Emit log messages on stderr
    #[arg(long)]
    trace: bool,

    /// Hexadecimal info hashes of the torrents to look up
    hashes: Vec<InfoHash>,
}

fn main() -> ExitCode {
    let args = Arguments::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if let Some(ioerr) = e.downcast_ref::<io::Error>()
                && ioerr.kind() == ErrorKind::BrokenPipe
            {
                ExitCode::SUCCESS
            } else {
                let _ = writeln!(stderr().lock(), "seedscrape: {e}");
                ExitCode::FAILURE
            }
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn run(args: Arguments) -> anyhow::Result<()> {
    let Arguments {
        timeout,
        total_timeout,
        chunk_size,
        trackers,
        magnet,
        sort,
        trace,
        hashes,
    } = args;
    if trace {
        let timer =
            OffsetTime::local_rfc_3339().context("failed to determine local timezone offset")?;
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_timer(timer)
                    .with_ansi(stderr().is_terminal())
                    .with_writer(stderr),
            )
            .with(
                Targets::new()
                    .with_target(env!("CARGO_CRATE_NAME"), Level::TRACE)
                    .with_target("reqwest", Level::TRACE)
                    .with_default(Level::INFO),
            )
            .init();
    }
    let config = ScrapeConfig::new(trackers)
        .with_deadline(Duration::from_secs(timeout))
        .with_udp_chunk_size(chunk_size);
    let scraper = Scraper::new(config)?;
    if hashes.is_empty() {
        return Ok(());
    }
    tracing::info!(
        hashes = hashes.len(),
        trackers = scraper.trackers().len(),
        "Scraping trackers"
    );
    let cancel = CancelToken::new();
    let seeders = {
        let mut scrape = std::pin::pin!(scraper.scrape(&hashes, &cancel));
        tokio::select! {
            seeders = &mut scrape => seeders,
            () = interrupted(total_timeout.map(Duration::from_secs)) => {
                cancel.cancel();
                scrape.await
            }
        }
    };
    let mut report = hashes.into_iter().zip(seeders).collect::<Vec<_>>();
    if sort {
        report.sort_by(|(_, a), (_, b)| b.cmp(a));
    }
    let magnet_trackers = magnet.then(|| scraper.trackers());
    write_report(&mut stdout().lock(), &report, magnet_trackers)?;
    Ok(())
}

/// Resolves on Ctrl-C or once `total` has elapsed, whichever comes first
async fn interrupted(total: Option<Duration>) {
    let expired = async move {
        match total {
            Some(d) => tokio::time::sleep(d).await,
            None => std::future::pending().await,
        }
    };
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };
    tokio::select! {
        () = ctrl_c => tracing::info!("Interrupted; reporting results gathered so far"),
        () = expired => tracing::info!("Overall timeout expired; reporting results gathered so far"),
    }
}

fn write_report<W: Write>(
    out: &mut W,
    report: &[(InfoHash, u32)],
    magnet_trackers: Option<&[Tracker]>,
) -> io::Result<()> {
    let mut first = true;
    for (ih, seeders) in report {
        if !std::mem::replace(&mut first, false) {
            writeln!(out)?;
        }
        writeln!(out, "{ih}:")?;
        writeln!(out, "  Seeders: {seeders}")?;
        if let Some(trackers) = magnet_trackers {
            writeln!(out, "  Magnet: {}", magnet_link(ih, trackers))?;
        }
    }
    Ok(())
}
