use std::future::Future;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use hyper::client::HttpConnector;
use hyper::{Client, Uri};
use rand::Rng;

const KEY_SPACE: u32 = 100_000;

/// Sends `set` and `get` requests with random keys to a single node.
pub struct HttpTarget {
    addr: String,
    client: Client<HttpConnector>,
}

impl HttpTarget {
    pub fn new(addr: String) -> Self {
        let client = Client::builder()
            .pool_max_idle_per_host(300)
            .pool_idle_timeout(Duration::from_secs(60))
            .build_http();

        Self { addr, client }
    }

    /// Writes a random value under a random key and returns the key.
    pub async fn random_write(&self) -> Result<String> {
        let (key, value) = {
            let mut rng = rand::thread_rng();
            (
                format!("key-{}", rng.gen_range(0..KEY_SPACE)),
                format!("value-{}", rng.gen_range(0..KEY_SPACE)),
            )
        };

        let query = serde_urlencoded::to_string([("key", &key), ("value", &value)])?;
        self.call(&format!("/set?{query}")).await?;

        Ok(key)
    }

    /// Reads a random key out of the given keys and returns it.
    pub async fn random_read(&self, keys: &[String]) -> Result<String> {
        let key = {
            let idx = rand::thread_rng().gen_range(0..keys.len());
            keys[idx].clone()
        };

        let query = serde_urlencoded::to_string([("key", &key)])?;
        self.call(&format!("/get?{query}")).await?;

        Ok(key)
    }

    async fn call(&self, path_and_query: &str) -> Result<()> {
        let uri: Uri = format!("http://{}{}", self.addr, path_and_query).parse()?;
        let response = self.client.get(uri).await?;
        let status = response.status();
        let body = hyper::body::to_bytes(response.into_body()).await?;

        if !status.is_success() {
            bail!(
                "request failed with status {status}: {}",
                String::from_utf8_lossy(&body)
            );
        }

        Ok(())
    }
}

#[derive(Debug, Clone)]
/// The latencies of one benchmark phase.
pub struct PhaseStats {
    pub max: Duration,
    pub min: Duration,
    pub total_requests: usize,
    /// The summed QPS of every worker.
    pub worker_qps: f64,
    /// The summed time every worker was busy.
    pub busy: Duration,
}

impl Default for PhaseStats {
    fn default() -> Self {
        Self {
            max: Duration::ZERO,
            min: Duration::MAX,
            total_requests: 0,
            worker_qps: 0.0,
            busy: Duration::ZERO,
        }
    }
}

impl PhaseStats {
    fn record(&mut self, latency: Duration) {
        self.max = self.max.max(latency);
        self.min = self.min.min(latency);
        self.total_requests += 1;
    }

    fn merge(&mut self, other: &PhaseStats) {
        self.max = self.max.max(other.max);
        self.min = self.min.min(other.min);
        self.total_requests += other.total_requests;
        self.worker_qps += other.worker_qps;
        self.busy += other.busy;
    }

    /// The average latency of a single request.
    pub fn avg(&self) -> Duration {
        if self.total_requests == 0 {
            return Duration::ZERO;
        }
        self.busy / self.total_requests as u32
    }

    /// The combined number of requests per second of all workers.
    pub fn qps(&self) -> f64 {
        self.worker_qps
    }
}

/// Runs `concurrency` workers which each call `op` `iterations` times one
/// after another.
///
/// Returns the merged stats and every value the calls produced. The first
/// failed call aborts the run.
pub async fn run_workers<F, Fut, T>(
    concurrency: usize,
    iterations: usize,
    op: F,
) -> Result<(PhaseStats, Vec<T>)>
where
    F: Fn(usize) -> Fut,
    Fut: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let mut handles = Vec::with_capacity(concurrency);
    for _ in 0..concurrency {
        let calls = (0..iterations).map(&op).collect::<Vec<_>>();
        handles.push(tokio::spawn(run_worker(calls)));
    }

    let mut stats = PhaseStats::default();
    let mut outputs = Vec::new();
    for handle in handles {
        let (worker_stats, worker_outputs) = handle.await??;
        stats.merge(&worker_stats);
        outputs.extend(worker_outputs);
    }

    Ok((stats, outputs))
}

async fn run_worker<Fut, T>(calls: Vec<Fut>) -> Result<(PhaseStats, Vec<T>)>
where
    Fut: Future<Output = Result<T>>,
{
    let mut stats = PhaseStats::default();
    let mut outputs = Vec::with_capacity(calls.len());

    let start = Instant::now();
    for call in calls {
        let call_start = Instant::now();
        outputs.push(call.await?);
        stats.record(call_start.elapsed());
    }

    let elapsed = start.elapsed();
    stats.busy = elapsed;
    if !elapsed.is_zero() {
        stats.worker_qps = stats.total_requests as f64 / elapsed.as_secs_f64();
    }

    Ok((stats, outputs))
}
