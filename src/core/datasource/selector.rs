use std::time::Duration;

use validator::Validate;

use super::{
    ConfigurationError, ConnectionCause, ConnectionError, ConnectionPool, ConnectionSource, DatasourceConnector,
    DatasourceRole, SelectionError, SelectionOutcome,
};
use crate::core::settings::DatasourceConfig;

/// Chooses the datasource to run against: the primary when it accepts a connection within the
/// timeout, otherwise the secondary. Never tries both concurrently and never retries.
#[derive(Debug, Clone)]
pub struct DatasourceSelector<C> {
    connector: C,
}

enum AttemptFailure {
    Misconfigured(ConfigurationError),
    Unreachable(ConnectionError),
}

impl<C: DatasourceConnector> DatasourceSelector<C> {
    pub fn new(connector: C) -> Self {
        Self { connector }
    }

    pub async fn select(
        &self, primary: &DatasourceConfig, secondary: &DatasourceConfig, connect_timeout: Duration,
    ) -> Result<ConnectionSource<C::Pool>, SelectionError> {
        self.evaluate(primary, secondary, connect_timeout).await.into_result()
    }

    #[tracing::instrument(level = "info", skip(self))]
    pub async fn evaluate(
        &self, primary: &DatasourceConfig, secondary: &DatasourceConfig, connect_timeout: Duration,
    ) -> SelectionOutcome<C::Pool> {
        let primary_error = match self.attempt(DatasourceRole::Primary, primary, connect_timeout).await {
            Ok(source) => {
                return SelectionOutcome::Selected { source, role: DatasourceRole::Primary };
            }
            Err(AttemptFailure::Misconfigured(error)) => return SelectionOutcome::Misconfigured(error),
            Err(AttemptFailure::Unreachable(error)) => error,
        };

        tracing::info!(
            primary_cause=%primary_error.cause,
            "attempting to connect to secondary datasource after primary failure."
        );

        match self.attempt(DatasourceRole::Secondary, secondary, connect_timeout).await {
            Ok(source) => {
                tracing::warn!(
                    endpoint=%source.endpoint(),
                    primary_cause=%primary_error.cause,
                    primary_cause_kind=%primary_error.kind(),
                    "failed over to secondary datasource."
                );
                SelectionOutcome::Selected { source, role: DatasourceRole::Secondary }
            }
            Err(AttemptFailure::Misconfigured(secondary_error)) => {
                tracing::error!(
                    primary_cause=%primary_error.cause,
                    primary_cause_kind=%primary_error.kind(),
                    secondary_error=%secondary_error,
                    "primary datasource is unavailable and secondary datasource is misconfigured."
                );
                SelectionOutcome::SecondaryMisconfigured { primary: primary_error, secondary: secondary_error }
            }
            Err(AttemptFailure::Unreachable(secondary_error)) => {
                tracing::error!(
                    primary_cause=%primary_error.cause,
                    primary_cause_kind=%primary_error.kind(),
                    secondary_cause=%secondary_error.cause,
                    secondary_cause_kind=%secondary_error.kind(),
                    "both primary and secondary datasources are unavailable."
                );
                SelectionOutcome::Failed { primary: primary_error, secondary: secondary_error }
            }
        }
    }

    async fn attempt(
        &self, role: DatasourceRole, config: &DatasourceConfig, connect_timeout: Duration,
    ) -> Result<ConnectionSource<C::Pool>, AttemptFailure> {
        if let Err(errors) = config.validate() {
            tracing::error!(%role, error=%errors, "{} datasource configuration is incomplete.", role);
            return Err(AttemptFailure::Misconfigured(ConfigurationError { role, errors }));
        }

        let endpoint = config.redacted_endpoint();
        tracing::info!(%role, %endpoint, ?connect_timeout, "connecting to {} datasource.", role);

        let result = match self.connector.build_pool(config, connect_timeout) {
            Ok(pool) => match validate_pool(&pool, connect_timeout).await {
                Ok(()) => Ok(pool),
                Err(cause) => {
                    pool.close().await;
                    Err(cause)
                }
            },
            Err(cause) => Err(cause),
        };

        match result {
            Ok(pool) => {
                tracing::info!(%role, %endpoint, "successfully connected to {} datasource.", role);
                Ok(ConnectionSource::new(pool, role, endpoint))
            }
            Err(cause) => {
                tracing::error!(
                    %role, %endpoint, cause_kind=%cause.kind(), error=%cause,
                    "failed to connect to {} datasource.", role
                );
                Err(AttemptFailure::Unreachable(ConnectionError { role, endpoint, cause }))
            }
        }
    }
}

/// Draws one connection and gives it straight back. The connection is dropped on every path,
/// including when the timeout abandons an in-flight acquire.
async fn validate_pool<P: ConnectionPool>(pool: &P, connect_timeout: Duration) -> Result<(), ConnectionCause> {
    let connection = tokio::time::timeout(connect_timeout, pool.acquire(connect_timeout))
        .await
        .map_err(|_elapsed| ConnectionCause::Timeout(connect_timeout))??;
    drop(connection);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use claim::{assert_matches, assert_none, assert_ok, assert_some_eq};
    use fake::faker::internet::en::{Password, Username};
    use fake::Fake;
    use pretty_assertions::assert_eq;

    use super::*;

    #[derive(Debug, Default)]
    struct Tracker {
        pools_built: AtomicUsize,
        pools_live: AtomicUsize,
        pools_closed: AtomicUsize,
        connections_open: AtomicUsize,
        connections_opened: AtomicUsize,
        acquired_from: Mutex<Vec<String>>,
    }

    impl Tracker {
        fn acquired_from(&self) -> Vec<String> {
            self.acquired_from.lock().map(|urls| urls.clone()).unwrap_or_default()
        }
    }

    /// Behavior keyed on the endpoint scheme: `good` connects, `bad` is refused, `slow` hangs
    /// while holding a half-open connection, `auth` is rejected.
    #[derive(Debug, Clone, Default)]
    struct FakeConnector {
        tracker: Arc<Tracker>,
    }

    impl DatasourceConnector for FakeConnector {
        type Pool = FakePool;

        fn build_pool(&self, config: &DatasourceConfig, _: Duration) -> Result<FakePool, ConnectionCause> {
            if config.driver == "missing" {
                return Err(ConnectionCause::UnsupportedDriver(config.driver.clone()));
            }
            self.tracker.pools_built.fetch_add(1, Ordering::SeqCst);
            self.tracker.pools_live.fetch_add(1, Ordering::SeqCst);
            Ok(FakePool { url: config.endpoint_url.clone(), tracker: self.tracker.clone() })
        }
    }

    #[derive(Debug)]
    struct FakePool {
        url: String,
        tracker: Arc<Tracker>,
    }

    #[derive(Debug)]
    struct FakeConnection(Arc<Tracker>);

    impl FakeConnection {
        fn open(tracker: &Arc<Tracker>) -> Self {
            tracker.connections_open.fetch_add(1, Ordering::SeqCst);
            tracker.connections_opened.fetch_add(1, Ordering::SeqCst);
            Self(tracker.clone())
        }
    }

    impl Drop for FakeConnection {
        fn drop(&mut self) {
            self.0.connections_open.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl Drop for FakePool {
        fn drop(&mut self) {
            self.tracker.pools_live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl ConnectionPool for FakePool {
        type Connection = FakeConnection;

        async fn acquire(&self, _timeout: Duration) -> Result<FakeConnection, ConnectionCause> {
            if let Ok(mut urls) = self.tracker.acquired_from.lock() {
                urls.push(self.url.clone());
            }

            if self.url.starts_with("good://") {
                Ok(FakeConnection::open(&self.tracker))
            } else if self.url.starts_with("slow://") {
                let _half_open = FakeConnection::open(&self.tracker);
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(FakeConnection::open(&self.tracker))
            } else if self.url.starts_with("auth://") {
                Err(ConnectionCause::Unavailable(anyhow::anyhow!("password authentication failed")))
            } else {
                let refused = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "connection refused");
                Err(ConnectionCause::Database(sqlx::Error::Io(refused)))
            }
        }

        async fn close(&self) {
            self.tracker.pools_closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn config_for(url: &str) -> DatasourceConfig {
        let username: String = Username().fake();
        let password: String = Password(8..20).fake();
        DatasourceConfig::new(url, username, password, "postgres")
    }

    const TIMEOUT: Duration = Duration::from_millis(3000);

    #[tokio::test]
    async fn test_primary_selected_without_touching_secondary() {
        lazy_static::initialize(&crate::tracing::TEST_TRACING);
        let connector = FakeConnector::default();
        let tracker = connector.tracker.clone();
        let selector = DatasourceSelector::new(connector);

        let source = assert_ok!(selector.select(&config_for("good://db1"), &config_for("good://db2"), TIMEOUT).await);
        assert_eq!(source.role(), DatasourceRole::Primary);
        assert_eq!(source.pool().url, "good://db1");
        assert_eq!(tracker.acquired_from(), vec!["good://db1".to_string()]);
        assert_eq!(tracker.pools_built.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.pools_closed.load(Ordering::SeqCst), 0);
        assert_eq!(tracker.connections_opened.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.connections_open.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fails_over_to_secondary() {
        lazy_static::initialize(&crate::tracing::TEST_TRACING);
        let connector = FakeConnector::default();
        let tracker = connector.tracker.clone();
        let selector = DatasourceSelector::new(connector);

        let outcome = selector
            .evaluate(&config_for("bad://host"), &config_for("good://host"), TIMEOUT)
            .await;
        assert_some_eq!(outcome.role(), DatasourceRole::Secondary);

        let source = assert_ok!(outcome.into_result());
        assert_eq!(source.role(), DatasourceRole::Secondary);
        assert_eq!(source.endpoint(), "good://host");
        assert_eq!(
            tracker.acquired_from(),
            vec!["bad://host".to_string(), "good://host".to_string()]
        );

        // the rejected primary pool is closed and dropped; only the selected pool remains
        assert_eq!(tracker.pools_closed.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.pools_live.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.connections_open.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_both_unavailable_keeps_both_causes() {
        lazy_static::initialize(&crate::tracing::TEST_TRACING);
        let selector = DatasourceSelector::new(FakeConnector::default());

        let outcome = selector
            .evaluate(&config_for("auth://db1"), &config_for("bad://db2"), TIMEOUT)
            .await;
        assert_none!(outcome.role());

        match outcome {
            SelectionOutcome::Failed { primary, secondary } => {
                assert_eq!(primary.role, DatasourceRole::Primary);
                assert_eq!(primary.endpoint, "auth://db1");
                assert_eq!(primary.kind(), "unavailable");
                assert!(format!("{}", primary).contains("password authentication failed"));

                assert_eq!(secondary.role, DatasourceRole::Secondary);
                assert_eq!(secondary.endpoint, "bad://db2");
                assert_eq!(secondary.kind(), "network");
            }
            other => panic!("expected both attempts to fail: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_both_unreachable_is_terminal_selection_error() {
        let connector = FakeConnector::default();
        let tracker = connector.tracker.clone();
        let selector = DatasourceSelector::new(connector);

        let result = selector.select(&config_for("bad://db1"), &config_for("bad://db2"), TIMEOUT).await;
        let error = match result {
            Err(error) => error,
            Ok(source) => panic!("unexpected selection of {}", source.role()),
        };
        assert_matches!(&error, SelectionError::Unavailable { .. });

        let message = format!("{}", error);
        assert!(message.contains("primary datasource at bad://db1"));
        assert!(message.contains("secondary datasource at bad://db2"));
        assert_eq!(tracker.pools_built.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.pools_closed.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.pools_live.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_misconfigured_secondary_is_never_validated() {
        let connector = FakeConnector::default();
        let tracker = connector.tracker.clone();
        let selector = DatasourceSelector::new(connector);

        let secondary = DatasourceConfig::new("good://db2", "", "secret", "postgres");
        let source = assert_ok!(selector.select(&config_for("good://db1"), &secondary, TIMEOUT).await);
        assert_eq!(source.role(), DatasourceRole::Primary);
        assert_eq!(tracker.pools_built.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_misconfigured_primary_is_fatal() {
        let connector = FakeConnector::default();
        let tracker = connector.tracker.clone();
        let selector = DatasourceSelector::new(connector);

        let primary = DatasourceConfig::new("good://db1", "app", "", "postgres");
        let outcome = selector.evaluate(&primary, &config_for("good://db2"), TIMEOUT).await;
        match outcome {
            SelectionOutcome::Misconfigured(error) => {
                assert_eq!(error.role, DatasourceRole::Primary);
                assert!(error.errors.field_errors().contains_key("password"));
            }
            other => panic!("expected configuration failure: {:?}", other),
        }
        assert_eq!(tracker.pools_built.load(Ordering::SeqCst), 0);
        assert!(tracker.acquired_from().is_empty());
    }

    #[tokio::test]
    async fn test_misconfigured_secondary_after_primary_failure_keeps_primary_cause() {
        lazy_static::initialize(&crate::tracing::TEST_TRACING);
        let connector = FakeConnector::default();
        let tracker = connector.tracker.clone();
        let selector = DatasourceSelector::new(connector);

        let secondary = DatasourceConfig::new("good://db2", "", "secret", "postgres");
        let error = match selector.select(&config_for("bad://db1"), &secondary, TIMEOUT).await {
            Err(error) => error,
            Ok(source) => panic!("unexpected selection of {}", source.role()),
        };

        match &error {
            SelectionError::SecondaryMisconfigured { primary, secondary } => {
                assert_eq!(primary.role, DatasourceRole::Primary);
                assert_eq!(primary.kind(), "network");
                assert_eq!(secondary.role, DatasourceRole::Secondary);
                assert!(secondary.errors.field_errors().contains_key("username"));
            }
            other => panic!("expected both failures to be reported: {:?}", other),
        }

        let message = format!("{}", error);
        assert!(message.contains("primary datasource at bad://db1"));
        assert!(message.contains("secondary datasource is misconfigured"));
        assert_eq!(tracker.pools_built.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.pools_live.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_driver_failure_triggers_failover() {
        let selector = DatasourceSelector::new(FakeConnector::default());

        let mut primary = config_for("good://db1");
        primary.driver = "missing".to_string();
        let source = assert_ok!(selector.select(&primary, &config_for("good://db2"), TIMEOUT).await);
        assert_eq!(source.role(), DatasourceRole::Secondary);
    }

    #[tokio::test]
    async fn test_selection_is_idempotent() {
        let selector = DatasourceSelector::new(FakeConnector::default());
        let primary = config_for("bad://db1");
        let secondary = config_for("good://db2");

        let first = selector.evaluate(&primary, &secondary, TIMEOUT).await.role();
        let second = selector.evaluate(&primary, &secondary, TIMEOUT).await.role();
        assert_some_eq!(first, DatasourceRole::Secondary);
        assert_eq!(first, second);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_primary_times_out_within_bound() {
        let connector = FakeConnector::default();
        let tracker = connector.tracker.clone();
        let selector = DatasourceSelector::new(connector);

        let start = tokio::time::Instant::now();
        let outcome = selector
            .evaluate(&config_for("slow://db1"), &config_for("slow://db2"), TIMEOUT)
            .await;
        let elapsed = start.elapsed();

        match outcome {
            SelectionOutcome::Failed { primary, secondary } => {
                assert_eq!(primary.kind(), "timeout");
                assert_eq!(secondary.kind(), "timeout");
            }
            other => panic!("expected both attempts to time out: {:?}", other),
        }
        assert!(elapsed >= TIMEOUT * 2);
        assert!(elapsed <= TIMEOUT * 2 + Duration::from_millis(50));
        assert_eq!(tracker.connections_open.load(Ordering::SeqCst), 0);
        assert_eq!(tracker.pools_live.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_primary_fails_over_to_secondary() {
        let selector = DatasourceSelector::new(FakeConnector::default());

        let start = tokio::time::Instant::now();
        let source = assert_ok!(
            selector
                .select(&config_for("slow://db1"), &config_for("good://db2"), TIMEOUT)
                .await
        );
        assert_eq!(source.role(), DatasourceRole::Secondary);
        assert!(start.elapsed() <= TIMEOUT + Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_selection_releases_resources() {
        let connector = FakeConnector::default();
        let tracker = connector.tracker.clone();
        let selector = DatasourceSelector::new(connector);

        let primary = config_for("slow://db1");
        let secondary = config_for("good://db2");
        let abandoned = tokio::time::timeout(
            Duration::from_millis(500),
            selector.select(&primary, &secondary, TIMEOUT),
        )
        .await;
        assert!(abandoned.is_err());

        assert_eq!(tracker.pools_built.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.pools_live.load(Ordering::SeqCst), 0);
        assert_eq!(tracker.connections_opened.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.connections_open.load(Ordering::SeqCst), 0);
    }
}
