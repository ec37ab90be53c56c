//! PostgreSQL implementation of the provider contract.
//!
//! All credential management goes through the SECURITY DEFINER helpers
//! installed by [`bootstrap`](crate::bootstrap); the provider itself holds
//! only `EXECUTE` on those helpers plus role-pack memberships. Driver error
//! text is mapped to the stable provider codes so higher layers can make
//! retry decisions without coupling to PostgreSQL messages.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode};
use sqlx::{ConnectOptions, Connection, Row};
use tokio::sync::RwLock;
use tokio::time::timeout;

use gatekeeper_providers::{
    AdminCredentials, CleanupOutcome, ConnectionConfig, CreateUserRequest, DatabaseEngine,
    DatabaseProvider, EphemeralUser, HealthReport, HealthState, PoolStats, ProviderError,
    ProvisionedUser, Result, RolePack,
};

use crate::bootstrap;
use crate::dsn::generate_postgres_dsn;
use crate::role_packs::{available_role_packs, ROLE_PACK_VERSION};

/// Version reported in health details and audit event data.
pub const POSTGRES_PROVIDER_VERSION: &str = "0.1.0";

const ENGINE: DatabaseEngine = DatabaseEngine::Postgres;

/// Pool and timeout bounds for the admin connection pool.
#[derive(Debug, Clone)]
pub struct PostgresProviderSettings {
    pub max_connections: u32,
    pub idle_timeout: Duration,
    pub connect_timeout: Duration,
    /// Server-side statement ceiling, applied to every pooled connection.
    pub statement_timeout: Duration,
    /// Client-side ceiling on a single provider query.
    pub query_timeout: Duration,
}

impl Default for PostgresProviderSettings {
    fn default() -> Self {
        Self {
            max_connections: 10,
            idle_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            statement_timeout: Duration::from_secs(30),
            query_timeout: Duration::from_secs(25),
        }
    }
}

struct ProviderState {
    pool: PgPool,
    connection: ConnectionConfig,
    server_version: String,
}

/// PostgreSQL provider.
///
/// Mutable state lives behind an async `RwLock` so `initialize` is
/// idempotent under concurrent first jobs and every operation works through
/// `&self`.
pub struct PostgresProvider {
    settings: PostgresProviderSettings,
    state: RwLock<Option<ProviderState>>,
}

impl PostgresProvider {
    pub fn new() -> Self {
        Self::with_settings(PostgresProviderSettings::default())
    }

    pub fn with_settings(settings: PostgresProviderSettings) -> Self {
        Self {
            settings,
            state: RwLock::new(None),
        }
    }

    async fn snapshot(&self) -> Result<(PgPool, ConnectionConfig, String)> {
        let state = self.state.read().await;
        match state.as_ref() {
            Some(state) => Ok((
                state.pool.clone(),
                state.connection.clone(),
                state.server_version.clone(),
            )),
            None => Err(ProviderError::not_initialized(ENGINE)),
        }
    }

    fn ssl_mode(mode: &str) -> PgSslMode {
        match mode {
            "require" => PgSslMode::Require,
            "disable" => PgSslMode::Disable,
            _ => PgSslMode::Prefer,
        }
    }

    fn pool_stats(pool: &PgPool) -> PoolStats {
        // sqlx does not expose waiter counts
        PoolStats {
            total: pool.size(),
            idle: pool.num_idle(),
            waiting: 0,
        }
    }

    /// Map a create failure onto the stable code set.
    ///
    /// "already exists" and "unknown role pack" come from the helper's
    /// RAISE messages (and PostgreSQL's own duplicate-role error); anything
    /// else is treated as transient.
    fn map_create_error(err: &sqlx::Error, username: &str, role_pack: &str) -> ProviderError {
        let message = err.to_string();
        if message.contains("already exists") {
            ProviderError::user_exists(ENGINE, username)
        } else if message.contains("unknown role pack") {
            ProviderError::role_not_found(ENGINE, role_pack)
        } else {
            ProviderError::creation_failed(ENGINE, message)
        }
    }
}

impl Default for PostgresProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DatabaseProvider for PostgresProvider {
    fn engine(&self) -> DatabaseEngine {
        ENGINE
    }

    fn version(&self) -> &'static str {
        POSTGRES_PROVIDER_VERSION
    }

    async fn initialize(
        &self,
        connection: &ConnectionConfig,
        credentials: &AdminCredentials,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        if state.is_some() {
            debug!("initialize called on initialized provider, ignoring");
            return Ok(());
        }

        let options = PgConnectOptions::new()
            .host(&connection.host)
            .port(connection.port)
            .database(&connection.database)
            .username(&credentials.username)
            .password(&credentials.password)
            .ssl_mode(Self::ssl_mode(&connection.ssl_mode))
            .options([(
                "statement_timeout",
                self.settings.statement_timeout.as_millis().to_string(),
            )]);

        let pool = PgPoolOptions::new()
            .max_connections(self.settings.max_connections)
            .idle_timeout(self.settings.idle_timeout)
            .acquire_timeout(self.settings.connect_timeout)
            .connect_with(options)
            .await
            .map_err(|e| ProviderError::init_error(ENGINE, format!("pool open failed: {}", e)))?;

        let probe: i32 = timeout(self.settings.query_timeout, async {
            sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(&pool).await
        })
        .await
        .map_err(|_| ProviderError::init_error(ENGINE, "connectivity probe timed out"))?
        .map_err(|e| ProviderError::init_error(ENGINE, format!("connectivity probe failed: {}", e)))?;
        debug_assert_eq!(probe, 1);

        let server_version: String = sqlx::query_scalar("SHOW server_version")
            .fetch_one(&pool)
            .await
            .unwrap_or_else(|_| "unknown".to_string());

        let checks = bootstrap::validate_setup(&pool).await.map_err(|e| {
            ProviderError::init_error(ENGINE, format!("setup validation failed: {}", e))
        })?;
        let missing: Vec<&str> = checks
            .iter()
            .filter(|c| !c.is_ok())
            .map(|c| c.check_name.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(ProviderError::init_error(
                ENGINE,
                format!("bootstrap incomplete, missing: {}", missing.join(", ")),
            ));
        }

        info!(
            "postgres provider initialized against {}:{}/{} (server {})",
            connection.host, connection.port, connection.database, server_version
        );
        *state = Some(ProviderState {
            pool,
            connection: connection.clone(),
            server_version,
        });
        Ok(())
    }

    async fn health_check(&self) -> Result<HealthReport> {
        let (pool, _, server_version) = match self.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(_) => {
                return Ok(HealthReport::new(
                    HealthState::Unhealthy,
                    "provider not initialized",
                    serde_json::json!({}),
                ));
            }
        };

        let stats = Self::pool_stats(&pool);
        let ping = timeout(self.settings.query_timeout, async {
            sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(&pool).await
        })
        .await;

        match ping {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                return Ok(HealthReport::new(
                    HealthState::Unhealthy,
                    format!("connectivity check failed: {}", e),
                    serde_json::json!({ "pool": stats }),
                ));
            }
            Err(_) => {
                return Ok(HealthReport::new(
                    HealthState::Unhealthy,
                    "connectivity check timed out",
                    serde_json::json!({ "pool": stats }),
                ));
            }
        }

        let checks = match bootstrap::validate_setup(&pool).await {
            Ok(checks) => checks,
            Err(e) => {
                return Ok(HealthReport::new(
                    HealthState::Degraded,
                    format!("setup validation failed: {}", e),
                    serde_json::json!({ "pool": stats }),
                ));
            }
        };

        let mut check_map = serde_json::Map::new();
        let mut all_ok = true;
        for check in &checks {
            all_ok &= check.is_ok();
            check_map.insert(
                check.check_name.clone(),
                serde_json::Value::String(check.status.clone()),
            );
        }

        let (state, message) = if all_ok {
            (HealthState::Healthy, "all checks passed".to_string())
        } else {
            (HealthState::Degraded, "one or more setup checks failed".to_string())
        };

        Ok(HealthReport::new(
            state,
            message,
            serde_json::json!({
                "checks": check_map,
                "pool": stats,
                "server_version": server_version,
            }),
        ))
    }

    async fn create_ephemeral_user(&self, request: &CreateUserRequest) -> Result<ProvisionedUser> {
        // the helper refuses malformed names too; checking here avoids the
        // round-trip
        if let Err(e) = gatekeeper_contracts::validate::validate_username(&request.username) {
            return Err(ProviderError::creation_failed(ENGINE, e.to_string()));
        }

        let (pool, connection, server_version) = self.snapshot().await?;
        let started = Instant::now();

        let expires_at = Utc::now() + chrono::Duration::minutes(i64::from(request.ttl_minutes));

        let outcome = timeout(self.settings.query_timeout, async {
            let mut tx = pool.begin().await?;
            sqlx::query("SELECT gatekeeper.create_ephemeral($1, $2, $3, $4, $5)")
                .bind(&request.username)
                .bind(request.password.as_str())
                .bind(expires_at)
                .bind(&request.role_pack)
                .bind(request.connection_limit)
                .execute(&mut *tx)
                .await?;
            tx.commit().await
        })
        .await;

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                // transaction rolls back on drop
                return Err(Self::map_create_error(&e, &request.username, &request.role_pack));
            }
            Err(_) => {
                return Err(ProviderError::creation_failed(ENGINE, "create timed out"));
            }
        }

        let dsn = generate_postgres_dsn(&connection, &request.username, &request.password);
        info!(
            "created ephemeral login {} (ttl {}m) in {:?}",
            request.username,
            request.ttl_minutes,
            started.elapsed()
        );

        Ok(ProvisionedUser {
            username: request.username.clone(),
            dsn,
            expires_at,
            connection_limit: request.connection_limit,
            metadata: HashMap::from([
                ("server_version".to_string(), server_version),
                ("role_pack".to_string(), request.role_pack.clone()),
                ("role_pack_version".to_string(), ROLE_PACK_VERSION.to_string()),
            ]),
        })
    }

    async fn drop_user(&self, username: &str) -> Result<bool> {
        let (pool, _, _) = self.snapshot().await?;

        let removed = timeout(self.settings.query_timeout, async {
            sqlx::query_scalar::<_, bool>("SELECT gatekeeper.drop_ephemeral($1)")
                .bind(username)
                .fetch_one(&pool)
                .await
        })
        .await
        .map_err(|_| ProviderError::drop_failed(ENGINE, "drop timed out"))?
        .map_err(|e| ProviderError::drop_failed(ENGINE, e.to_string()))?;

        if removed {
            info!("dropped ephemeral login {}", username);
        } else {
            debug!("drop of {} was a no-op, login absent", username);
        }
        Ok(removed)
    }

    async fn list_ephemeral_users(&self) -> Result<Vec<EphemeralUser>> {
        let (pool, _, _) = self.snapshot().await?;

        let rows = timeout(self.settings.query_timeout, async {
            sqlx::query(
                "SELECT username, expires_at, is_expired, connection_limit, active_connections \
                 FROM gatekeeper.list_ephemeral()",
            )
            .fetch_all(&pool)
            .await
        })
        .await
        .map_err(|_| ProviderError::list_failed(ENGINE, "list timed out"))?
        .map_err(|e| ProviderError::list_failed(ENGINE, e.to_string()))?;

        rows.iter()
            .map(|row| {
                Ok(EphemeralUser {
                    username: row
                        .try_get("username")
                        .map_err(|e| ProviderError::list_failed(ENGINE, e.to_string()))?,
                    expires_at: row
                        .try_get("expires_at")
                        .map_err(|e| ProviderError::list_failed(ENGINE, e.to_string()))?,
                    is_expired: row
                        .try_get("is_expired")
                        .map_err(|e| ProviderError::list_failed(ENGINE, e.to_string()))?,
                    connection_limit: row
                        .try_get("connection_limit")
                        .map_err(|e| ProviderError::list_failed(ENGINE, e.to_string()))?,
                    active_connections: row
                        .try_get("active_connections")
                        .map_err(|e| ProviderError::list_failed(ENGINE, e.to_string()))?,
                })
            })
            .collect()
    }

    async fn cleanup_expired_users(&self, older_than_minutes: u32) -> Result<Vec<CleanupOutcome>> {
        let (pool, _, _) = self.snapshot().await?;
        let started = Instant::now();

        let rows = timeout(self.settings.query_timeout, async {
            sqlx::query(
                "SELECT username, was_expired, dropped, error_message \
                 FROM gatekeeper.cleanup_expired($1)",
            )
            .bind(older_than_minutes as i32)
            .fetch_all(&pool)
            .await
        })
        .await
        .map_err(|_| ProviderError::cleanup_failed(ENGINE, "cleanup timed out"))?
        .map_err(|e| ProviderError::cleanup_failed(ENGINE, e.to_string()))?;

        let outcomes: Vec<CleanupOutcome> = rows
            .iter()
            .map(|row| {
                Ok(CleanupOutcome {
                    username: row
                        .try_get("username")
                        .map_err(|e| ProviderError::cleanup_failed(ENGINE, e.to_string()))?,
                    was_expired: row
                        .try_get("was_expired")
                        .map_err(|e| ProviderError::cleanup_failed(ENGINE, e.to_string()))?,
                    dropped: row
                        .try_get("dropped")
                        .map_err(|e| ProviderError::cleanup_failed(ENGINE, e.to_string()))?,
                    error: row
                        .try_get("error_message")
                        .map_err(|e| ProviderError::cleanup_failed(ENGINE, e.to_string()))?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        info!(
            "cleanup considered {} candidates, dropped {} in {:?}",
            outcomes.len(),
            outcomes.iter().filter(|o| o.dropped).count(),
            started.elapsed()
        );
        Ok(outcomes)
    }

    async fn get_available_role_packs(&self) -> Result<Vec<RolePack>> {
        Ok(available_role_packs())
    }

    async fn install_role_pack(&self, role_pack: &RolePack) -> Result<()> {
        if role_pack.engine != ENGINE {
            return Err(ProviderError::role_pack_error(
                ENGINE,
                format!(
                    "pack {} targets engine {}, not postgres",
                    role_pack.name, role_pack.engine
                ),
            ));
        }
        if role_pack.version != ROLE_PACK_VERSION {
            return Err(ProviderError::role_pack_error(
                ENGINE,
                format!(
                    "pack version {} does not match installed {}",
                    role_pack.version, ROLE_PACK_VERSION
                ),
            ));
        }

        let (pool, _, _) = self.snapshot().await?;
        let backing_role = crate::role_packs::pack_role_name(&role_pack.name);
        let present: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT FROM pg_roles WHERE rolname = $1)")
                .bind(&backing_role)
                .fetch_one(&pool)
                .await
                .map_err(|e| ProviderError::role_pack_error(ENGINE, e.to_string()))?;

        if present {
            // written by the bootstrap; install at a fixed version is a no-op
            debug!("role pack {} already installed", role_pack.name);
            Ok(())
        } else {
            Err(ProviderError::role_pack_error(
                ENGINE,
                format!(
                    "backing role {} missing, run the bootstrap installer",
                    backing_role
                ),
            ))
        }
    }

    fn generate_dsn(
        &self,
        connection: &ConnectionConfig,
        username: &str,
        password: &str,
    ) -> String {
        generate_postgres_dsn(connection, username, password)
    }

    async fn test_connection(&self, dsn: &str) -> Result<bool> {
        let Ok(options) = PgConnectOptions::from_str(dsn) else {
            return Ok(false);
        };
        let connected = timeout(self.settings.connect_timeout, async {
            let mut conn = options.connect().await?;
            let result = conn.ping().await;
            conn.close().await.ok();
            result
        })
        .await;
        Ok(matches!(connected, Ok(Ok(()))))
    }

    async fn close(&self) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(state) = state.take() {
            state.pool.close().await;
            info!("postgres provider closed");
        }
        Ok(())
    }
}
