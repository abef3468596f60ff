//! Per-action request statistics and the end-of-run report.

use crate::session::ActionOutcome;
use hdrhistogram::Histogram;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::time::Duration;

/// Counters and latency histogram for one action name.
#[derive(Debug, Clone)]
struct ActionStats {
    requests: u64,
    failures: u64,
    skipped: u64,
    /// Latency in microseconds.
    latency: Histogram<u64>,
}

/// Highest latency tracked, in microseconds. Slower samples are clamped.
const MAX_LATENCY_MICROS: u64 = 60_000_000;

/// Thread-safe collector shared by every session of a run.
#[derive(Debug)]
pub struct MetricsCollector {
    template: Histogram<u64>,
    actions: Mutex<BTreeMap<&'static str, ActionStats>>,
}

impl MetricsCollector {
    /// Create an empty collector.
    ///
    /// # Errors
    ///
    /// Returns an error if the latency histogram cannot be created.
    pub fn new() -> Result<Self, hdrhistogram::CreationError> {
        Ok(Self {
            template: Histogram::new_with_bounds(1, MAX_LATENCY_MICROS, 3)?,
            actions: Mutex::new(BTreeMap::new()),
        })
    }

    /// Record one outcome under `name`.
    ///
    /// Responses with status >= 400 and transport errors count as failures;
    /// only responses contribute latency.
    pub fn record(&self, name: &'static str, outcome: &ActionOutcome) {
        let mut actions = self.actions.lock();
        let stats = actions.entry(name).or_insert_with(|| ActionStats {
            requests: 0,
            failures: 0,
            skipped: 0,
            latency: Histogram::new_from(&self.template),
        });

        match outcome {
            ActionOutcome::Response(response) => {
                stats.requests += 1;
                if response.is_failure() {
                    stats.failures += 1;
                }
                let micros = u64::try_from(response.latency.as_micros()).unwrap_or(u64::MAX);
                stats
                    .latency
                    .saturating_record(micros.clamp(1, MAX_LATENCY_MICROS));
            }
            ActionOutcome::Error(_) => {
                stats.requests += 1;
                stats.failures += 1;
            }
            ActionOutcome::NoRequest => {
                stats.skipped += 1;
            }
        }
    }

    /// Total requests recorded so far.
    pub fn total_requests(&self) -> u64 {
        self.actions.lock().values().map(|s| s.requests).sum()
    }

    /// Snapshot everything into a report covering `elapsed`.
    pub fn report(&self, users: usize, elapsed: Duration) -> SwarmReport {
        let actions = self
            .actions
            .lock()
            .iter()
            .map(|(&name, stats)| ActionSummary {
                name,
                requests: stats.requests,
                failures: stats.failures,
                skipped: stats.skipped,
                p50: quantile(&stats.latency, 0.50),
                p90: quantile(&stats.latency, 0.90),
                p99: quantile(&stats.latency, 0.99),
                max: if stats.latency.is_empty() {
                    Duration::ZERO
                } else {
                    Duration::from_micros(stats.latency.max())
                },
            })
            .collect();

        SwarmReport {
            users,
            elapsed,
            actions,
        }
    }
}

fn quantile(histogram: &Histogram<u64>, q: f64) -> Duration {
    if histogram.is_empty() {
        return Duration::ZERO;
    }
    Duration::from_micros(histogram.value_at_quantile(q))
}

/// Statistics for one action name.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionSummary {
    pub name: &'static str,
    pub requests: u64,
    pub failures: u64,
    /// Times the action was chosen but sent nothing.
    pub skipped: u64,
    pub p50: Duration,
    pub p90: Duration,
    pub p99: Duration,
    pub max: Duration,
}

/// Results of a swarm run.
#[derive(Debug, Clone)]
pub struct SwarmReport {
    /// Users that were started.
    pub users: usize,

    /// Wall-clock time from the first spawn to the last session stop.
    pub elapsed: Duration,

    /// Per-action statistics, sorted by name.
    pub actions: Vec<ActionSummary>,
}

impl SwarmReport {
    pub fn total_requests(&self) -> u64 {
        self.actions.iter().map(|a| a.requests).sum()
    }

    pub fn total_failures(&self) -> u64 {
        self.actions.iter().map(|a| a.failures).sum()
    }

    pub fn total_skipped(&self) -> u64 {
        self.actions.iter().map(|a| a.skipped).sum()
    }

    /// Requests per second over the whole run.
    pub fn requests_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        self.total_requests() as f64 / secs
    }

    /// Failed share of all requests, 0.0 when nothing was sent.
    pub fn failure_ratio(&self) -> f64 {
        match self.total_requests() {
            0 => 0.0,
            total => self.total_failures() as f64 / total as f64,
        }
    }

    /// Statistics for one action, if it was ever recorded.
    pub fn action(&self, name: &str) -> Option<&ActionSummary> {
        self.actions.iter().find(|a| a.name == name)
    }

    /// Print a summary table to stdout.
    pub fn print(&self) {
        println!();
        println!("=== Swarm Report ===");
        println!("Users:        {}", self.users);
        println!("Duration:     {:.1}s", self.elapsed.as_secs_f64());
        println!("Requests:     {}", self.total_requests());
        println!(
            "Failures:     {} ({:.2}%)",
            self.total_failures(),
            self.failure_ratio() * 100.0
        );
        println!("Skipped:      {}", self.total_skipped());
        println!("Throughput:   {:.2} req/s", self.requests_per_second());
        println!();
        println!(
            "{:<26} {:>8} {:>8} {:>8} {:>9} {:>9} {:>9} {:>9}",
            "action", "reqs", "fails", "skips", "p50", "p90", "p99", "max"
        );
        for a in &self.actions {
            println!(
                "{:<26} {:>8} {:>8} {:>8} {:>9} {:>9} {:>9} {:>9}",
                a.name,
                a.requests,
                a.failures,
                a.skipped,
                format_ms(a.p50),
                format_ms(a.p90),
                format_ms(a.p99),
                format_ms(a.max),
            );
        }
    }
}

fn format_ms(d: Duration) -> String {
    format!("{:.1}ms", d.as_secs_f64() * 1000.0)
}
