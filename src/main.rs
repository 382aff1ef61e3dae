//! # shiftvisor CLI
//!
//! Usage:
//!   shiftvisor serve                  # run every job on its daily schedule
//!   shiftvisor run checkin-morning    # run one job now, exit non-zero on failure
//!   shiftvisor check                  # validate the jobs file, print next firings
//!
//! Runtime settings come from `SHIFTVISOR_*` variables, notification sinks
//! from `WXPUSH_*` / `WXPUSHER_*`, log filtering from `RUST_LOG`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use shiftvisor::{
    Bus, Config, JobsFile, LogWriter, NotificationDispatcher, SchedulerBuilder, Subscribe,
    SubscriberSet, next_fire, sink_from_env,
};

#[derive(Parser)]
#[command(
    name = "shiftvisor",
    version,
    about = "Daily portal chores with retries, a non-overlapping scheduler and push notifications"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Jobs file path
    #[arg(short, long, global = true, default_value = "jobs.toml", env = "SHIFTVISOR_JOBS")]
    jobs: PathBuf,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler until SIGINT/SIGTERM
    Serve,

    /// Run one job immediately through the retry wrapper
    Run {
        /// Job name from the jobs file
        job: String,

        /// Skip the outcome notification
        #[arg(long)]
        no_notify: bool,
    },

    /// Validate the jobs file and show when each job fires next
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "shiftvisor=debug,info" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let cfg = Config::from_env();
    let jobs = JobsFile::load(&cli.jobs)
        .with_context(|| format!("loading jobs from {}", cli.jobs.display()))?;

    match cli.command {
        Commands::Check => check(&cfg, &jobs),
        Commands::Run { job, no_notify } => run_one(cfg, &jobs, &job, no_notify).await,
        Commands::Serve => serve(cfg, &jobs).await,
    }
}

fn check(cfg: &Config, jobs: &JobsFile) -> Result<()> {
    let now = Utc::now().with_timezone(&cfg.scheduler.utc_offset);
    println!("{} job(s), reference offset UTC{}", jobs.jobs.len(), cfg.scheduler.utc_offset);
    for job in &jobs.jobs {
        let (at, wait) = next_fire(job.time()?, now);
        let policy = job.policy(&cfg.retry.policy);
        println!(
            "  {:<20} next {}  (in {}m)  attempts={} delay={}s notify={}",
            job.name,
            at.format("%Y-%m-%d %H:%M:%S"),
            wait.as_secs() / 60,
            policy.max_attempts,
            policy.base_delay.as_secs(),
            job.notify,
        );
    }
    Ok(())
}

async fn run_one(cfg: Config, jobs: &JobsFile, name: &str, no_notify: bool) -> Result<()> {
    let Some(job) = jobs.find(name) else {
        bail!("no job named {name:?} in the jobs file");
    };

    let bus = Bus::new(cfg.bus_capacity);
    let subs = Arc::new(SubscriberSet::new(subscribers(), bus.clone()));
    let stop = CancellationToken::new();
    let listener = Arc::clone(&subs).listen_until(stop.clone());

    let notifier = (!no_notify)
        .then(|| Arc::new(NotificationDispatcher::new(sink_from_env(), cfg.notify, bus.clone())));
    let trigger = job.to_trigger(&cfg, notifier)?;
    let outcome = trigger.run_and_report(&bus, cfg.scheduler.utc_offset).await;

    stop.cancel();
    let _ = listener.await;
    if let Ok(subs) = Arc::try_unwrap(subs) {
        subs.shutdown().await;
    }

    match outcome.into_result() {
        Ok(()) => Ok(()),
        Err(e) => bail!("job {name:?} failed: {e}"),
    }
}

async fn serve(cfg: Config, jobs: &JobsFile) -> Result<()> {
    if jobs.jobs.is_empty() {
        bail!("the jobs file defines no jobs");
    }

    let mut builder = SchedulerBuilder::new(cfg).with_subscribers(subscribers());
    let notifier = builder.notifier(sink_from_env());
    if !notifier.is_configured() {
        tracing::info!("no notification sink configured; outcomes are only logged");
    }

    for job in &jobs.jobs {
        builder = builder.trigger(job.to_trigger(&cfg, Some(Arc::clone(&notifier)))?);
    }

    builder.build().run_until_signal().await?;
    Ok(())
}

fn subscribers() -> Vec<Arc<dyn Subscribe>> {
    vec![Arc::new(LogWriter::new())]
}
