mod workload;

#[macro_use]
extern crate tracing;

use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Result};
use clap::Parser;
use mimalloc::MiMalloc;

use crate::workload::{run_workers, HttpTarget, PhaseStats};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args: Args = Args::parse();

    if args.concurrency == 0 {
        bail!("--concurrency must be at least 1");
    }

    info!(
        iterations = args.iterations,
        read_iterations = args.read_iterations,
        concurrency = args.concurrency,
        addr = %args.addr,
        "Running benchmarks."
    );

    let target = Arc::new(HttpTarget::new(args.addr.clone()));
    let start = Instant::now();

    let (write_stats, keys) =
        run_workers(args.concurrency, args.iterations, |_| {
            let target = target.clone();
            async move { target.random_write().await }
        })
        .await?;
    report("write", &write_stats, keys.len());

    if keys.is_empty() {
        warn!("No keys were written, skipping the read phase.");
    } else {
        let keys = Arc::new(keys);
        let (read_stats, _) =
            run_workers(args.concurrency, args.read_iterations, |_| {
                let target = target.clone();
                let keys = keys.clone();
                async move { target.random_read(&keys).await }
            })
            .await?;
        report("read", &read_stats, keys.len());
    }

    info!("Took {}", humantime::format_duration(start.elapsed()));

    Ok(())
}

fn report(phase: &str, stats: &PhaseStats, num_keys: usize) {
    info!(
        "{phase}: max = {}, min = {}, avg = {}, qps = {:.1} over {num_keys} keys",
        humantime::format_duration(stats.max),
        humantime::format_duration(stats.min),
        humantime::format_duration(stats.avg()),
        stats.qps(),
    );
}

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[arg(long, default_value_t = 1000)]
    /// The number of `set` requests each worker sends.
    iterations: usize,

    #[arg(long, default_value_t = 1000)]
    /// The number of `get` requests each worker sends.
    read_iterations: usize,

    #[arg(long, default_value_t = 2)]
    /// The number of concurrent workers.
    concurrency: usize,

    #[arg(long, default_value = "localhost:8080")]
    /// The HTTP address of the node to benchmark.
    addr: String,
}
