use anyhow::{Context, Result};
use barrage::encoding::{read_results, write_results};
use barrage::report::Summary;
use barrage::{AttackConfig, AttackError, AttackJob, CancellationToken, ConfigError, LoadError};
use barrage_metrics::MetricsFactory;
use barrage_target::parse_duration;
use clap::{Args, Parser, Subcommand};
use log::{info, warn};
use prometheus::{Encoder, TextEncoder};
use std::fs::File;
use std::io;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::num::NonZeroUsize;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Constant rate load generator
#[derive(Parser)]
#[clap(name = "barrage", version)]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Send requests to the targets at a constant rate and write one result per request.
    Attack(AttackArgs),
    /// Summarize results written by `attack`.
    Report(ReportArgs),
}

#[derive(Args)]
struct AttackArgs {
    /// Requests per second.
    #[clap(long, default_value_t = 50)]
    rate: u64,
    /// Decides the number of requests, `rate * duration`, e.g. `10s`, `500ms`, `1m30s`.
    #[clap(long, default_value = "10s", value_parser = parse_duration)]
    duration: Duration,
    /// Targets file, or `stdin`.
    #[clap(long, default_value = "stdin")]
    targets: String,
    /// `random` or `sequential`.
    #[clap(long, default_value = "random")]
    ordering: String,
    /// `http` or `publish`.
    #[clap(long, default_value = "http")]
    protocol: String,
    /// Request header `Key: Value`, repeatable.
    #[clap(long = "header", short = 'H')]
    headers: Vec<String>,
    /// Results file, or `stdout`.
    #[clap(long, default_value = "stdout")]
    output: String,
    /// Seed of the random ordering. Picked from the clock and logged when missing.
    #[clap(long)]
    seed: Option<u64>,
    /// Maximum number of sends in flight, defaults to BARRAGE_MAX_IN_FLIGHT.
    #[clap(long)]
    max_in_flight: Option<NonZeroUsize>,
    /// Timeout of a single send, defaults to BARRAGE_SEND_TIMEOUT_MS.
    #[clap(long, value_parser = parse_duration)]
    send_timeout: Option<Duration>,
    /// `completion` waits for every request, `deadline` stops when the duration has elapsed.
    #[clap(long, default_value = "completion")]
    mode: String,
    /// Print prometheus metrics of the attack to stderr when done.
    #[clap(long)]
    metrics: bool,
}

impl AttackArgs {
    fn config(&self) -> Result<AttackConfig, ConfigError> {
        let mut config = AttackConfig::new(self.rate, self.duration);
        config.ordering = self.ordering.parse().map_err(ConfigError::Ordering)?;
        config.protocol = self.protocol.parse().map_err(ConfigError::Protocol)?;
        config.mode = self.mode.parse().map_err(ConfigError::Mode)?;
        config.seed = self.seed;
        config.max_in_flight = self.max_in_flight;
        config.send_timeout = self.send_timeout;
        Ok(config)
    }
}

#[derive(Args)]
struct ReportArgs {
    /// Results file, or `stdin`.
    #[clap(long, default_value = "stdin")]
    input: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    //init logging, stdout is reserved for results
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Attack(args) => attack(args).await,
        Command::Report(args) => report(args),
    }
}

async fn attack(args: AttackArgs) -> Result<()> {
    let config = args.config()?;
    let cancel = CancellationToken::new();
    let mut job = AttackJob::new(config, &args.headers)?.with_cancel(cancel.clone());
    let factory = MetricsFactory::default();
    if args.metrics {
        let metrics = factory.metrics(job.job_id()).await?;
        job = job.with_metrics(metrics);
    }

    let targets: Box<dyn BufRead> = if args.targets == "stdin" {
        Box::new(io::stdin().lock())
    } else {
        let file = File::open(&args.targets).map_err(|e| AttackError::Load(LoadError::Io(e)))?;
        Box::new(BufReader::new(file))
    };
    let attack = job.load(targets)?;
    let mut output: Box<dyn Write> = if args.output == "stdout" {
        Box::new(BufWriter::new(io::stdout()))
    } else {
        let file = File::create(&args.output).map_err(AttackError::Output)?;
        Box::new(BufWriter::new(file))
    };

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, stopping the attack");
            cancel.cancel();
        }
    });
    let results = attack.run().await;
    info!("Done!");

    info!("Writing results to '{}'", &args.output);
    write_results(&mut output, &results).map_err(AttackError::Output)?;
    if !results.is_complete() {
        warn!(
            "{} of {} planned requests completed",
            results.len(),
            results.planned()
        );
    }

    if args.metrics {
        let mut buffer = vec![];
        TextEncoder::new().encode(&factory.registry().gather(), &mut buffer)?;
        io::stderr().write_all(&buffer)?;
    }
    Ok(())
}

fn report(args: ReportArgs) -> Result<()> {
    let outcomes = if args.input == "stdin" {
        read_results(io::stdin().lock())
    } else {
        let file = File::open(&args.input).with_context(|| format!("Input file: {}", &args.input))?;
        read_results(BufReader::new(file))
    }
    .context("Input file")?;
    print!("{}", Summary::new(&outcomes));
    Ok(())
}
