//! Swarm runner: spawns simulated users and drives them for a fixed time.

use crate::accounts::{AccountPoolError, AssignError, CredentialPool};
use crate::actions::{ActionTable, ActionTableError};
use crate::client::{ClientError, MastodonClient};
use crate::config::{ConfigError, SwarmConfig};
use crate::context::SwarmContext;
use crate::metrics::{MetricsCollector, SwarmReport};
use crate::session::SimUser;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Drives a population of [`SimUser`]s against one instance.
pub struct Swarm {
    config: SwarmConfig,
    context: SwarmContext,
    client: MastodonClient,
    actions: Arc<ActionTable>,
}

impl Swarm {
    /// Validate the config, load credentials from `config.credentials_path`
    /// and build the action table and HTTP client.
    pub fn new(config: SwarmConfig) -> Result<Self, SwarmError> {
        config.validate()?;
        let pool = CredentialPool::load_csv(&config.credentials_path)?;
        Self::with_pool(config, pool)
    }

    /// Like [`Swarm::new`] with an already loaded pool.
    pub fn with_pool(config: SwarmConfig, pool: CredentialPool) -> Result<Self, SwarmError> {
        config.validate()?;
        if pool.is_empty() {
            return Err(AssignError::EmptyPool.into());
        }
        if pool.len() < config.users {
            info!(
                pool = pool.len(),
                users = config.users,
                "Fewer credentials than users, accounts will be shared"
            );
        }

        let actions = ActionTable::with_overrides(&config.weights)?;
        let client = MastodonClient::new(&config.host, config.request_timeout)?;

        Ok(Self {
            context: SwarmContext::new(pool),
            client,
            actions: Arc::new(actions),
            config,
        })
    }

    pub fn config(&self) -> &SwarmConfig {
        &self.config
    }

    pub fn context(&self) -> &SwarmContext {
        &self.context
    }

    /// Wait until the instance answers `GET /api/v1/instance`.
    pub async fn wait_for_ready(&self, timeout: Duration) -> Result<(), SwarmError> {
        Ok(self.client.wait_for_ready(timeout).await?)
    }

    /// Run for the configured run time.
    pub async fn run(&self) -> Result<SwarmReport, SwarmError> {
        self.run_for(self.config.run_time).await
    }

    /// Spawn users at the configured rate, let them act until `duration`
    /// elapses, stop every session, then fire the test-stop hook.
    ///
    /// An action in flight when time runs out is allowed to finish so its
    /// bookkeeping, and therefore its cleanup, stays accurate.
    pub async fn run_for(&self, duration: Duration) -> Result<SwarmReport, SwarmError> {
        let metrics = Arc::new(MetricsCollector::new()?);
        let cancel = CancellationToken::new();
        let start = Instant::now();

        info!(
            host = %self.config.host,
            users = self.config.users,
            spawn_rate = self.config.spawn_rate,
            ?duration,
            "Starting swarm"
        );

        let timer = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(duration).await;
                cancel.cancel();
            })
        };

        let mut handles: Vec<JoinHandle<()>> = Vec::with_capacity(self.config.users);
        let mut spawn_error = None;
        let interval = self.config.spawn_interval();

        for i in 0..self.config.users {
            if i > 0 {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }

            let user = match SimUser::on_start(&self.context, self.client.clone(), self.config.seed)
            {
                Ok(user) => user,
                Err(e) => {
                    spawn_error = Some(e);
                    cancel.cancel();
                    break;
                }
            };
            debug!(user = user.index(), "Spawned user");

            handles.push(tokio::spawn(run_user(
                user,
                Arc::clone(&self.actions),
                Arc::clone(&metrics),
                cancel.clone(),
                self.config.wait_min,
                self.config.wait_max,
            )));
        }
        let spawned = handles.len();
        if spawn_error.is_none() {
            info!(spawned, elapsed = ?start.elapsed(), "All users spawned");
        }

        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                warn!(error = %e, "User task ended abnormally");
            }
        }
        timer.abort();
        self.context.on_test_stop();

        if let Some(e) = spawn_error {
            return Err(e.into());
        }

        let report = metrics.report(spawned, start.elapsed());
        info!(
            requests = report.total_requests(),
            failures = report.total_failures(),
            rps = %format!("{:.2}", report.requests_per_second()),
            "Swarm finished"
        );
        Ok(report)
    }
}

/// One user's loop: act, think, repeat until cancelled; then clean up.
async fn run_user(
    mut user: SimUser,
    actions: Arc<ActionTable>,
    metrics: Arc<MetricsCollector>,
    cancel: CancellationToken,
    wait_min: Duration,
    wait_max: Duration,
) {
    while !cancel.is_cancelled() {
        let action = user.next_action(&actions);
        let outcome = user.perform(action).await;
        metrics.record(action.name(), &outcome);

        let wait = user.wait_time(wait_min, wait_max);
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }
    }

    for (label, outcome) in user.on_stop().await {
        metrics.record(label, &outcome);
    }
}

/// Errors that prevent a swarm from starting or completing.
#[derive(Debug, thiserror::Error)]
pub enum SwarmError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Pool(#[from] AccountPoolError),

    #[error(transparent)]
    Assign(#[from] AssignError),

    #[error(transparent)]
    Actions(#[from] ActionTableError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("Could not create latency histogram: {0}")]
    Metrics(#[from] hdrhistogram::CreationError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use fediload_test_helpers::{credentials, MockInstance};

    fn fast_config(host: &str) -> SwarmConfig {
        SwarmConfig::new(host, "unused.csv")
            .with_users(3)
            .with_spawn_rate(100.0)
            .with_wait_time(Duration::from_millis(5), Duration::from_millis(10))
    }

    #[test]
    fn test_empty_pool_is_rejected() {
        let result = Swarm::with_pool(fast_config("http://127.0.0.1:1"), CredentialPool::default());
        assert!(matches!(
            result,
            Err(SwarmError::Assign(AssignError::EmptyPool))
        ));
    }

    #[test]
    fn test_unknown_weight_is_rejected() {
        let config = fast_config("http://127.0.0.1:1").with_weight("dance", 1);
        let result = Swarm::with_pool(config, CredentialPool::new(credentials(1)));
        assert!(matches!(result, Err(SwarmError::Actions(_))));
    }

    #[test]
    fn test_missing_credentials_file() {
        let config = fast_config("http://127.0.0.1:1");
        assert!(matches!(Swarm::new(config), Err(SwarmError::Pool(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_short_run_resets_cursor() {
        let mock = MockInstance::start().await;
        let swarm = Swarm::with_pool(
            fast_config(&mock.base_url()),
            CredentialPool::new(credentials(2)),
        )
        .unwrap();

        let report = swarm.run_for(Duration::from_millis(300)).await.unwrap();

        assert_eq!(report.users, 3);
        assert!(report.total_requests() > 0);
        assert_eq!(report.total_failures(), 0);
        assert_eq!(swarm.context().assigner().cursor(), 0);
    }

    #[tokio::test]
    async fn test_zero_duration_still_stops_cleanly() {
        let mock = MockInstance::start().await;
        let swarm = Swarm::with_pool(
            fast_config(&mock.base_url()).with_users(5),
            CredentialPool::new(credentials(5)),
        )
        .unwrap();

        let report = swarm.run_for(Duration::ZERO).await.unwrap();
        assert!(report.users <= 5);
        assert_eq!(swarm.context().assigner().cursor(), 0);
    }
}
