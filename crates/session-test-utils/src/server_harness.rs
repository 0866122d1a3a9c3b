//! Test server harness for end-to-end testing.
//!
//! Provides `TestSessionServer` for spawning real session-service instances
//! in tests.

use chrono::Utc;
use common::secret::SecretString;
use session_service::config::Config;
use session_service::crypto;
use session_service::handlers::auth_handler::AppState;
use session_service::models::Role;
use session_service::routes;
use sqlx::PgPool;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Access signing secret used by every test server.
pub const TEST_ACCESS_SECRET: &str = "test-access-secret-0123456789-0123456789";

/// Refresh signing secret used by every test server. Distinct from the
/// access secret, as the service requires.
pub const TEST_REFRESH_SECRET: &str = "test-refresh-secret-0123456789-0123456789";

/// Bcrypt cost for seeded identities. Minimum keeps test suites fast.
const TEST_BCRYPT_COST: u32 = 4;

/// Test harness for spawning the session service in E2E tests.
///
/// # Example
/// ```rust,ignore
/// #[sqlx::test(migrations = "../../migrations")]
/// async fn test_login_e2e(pool: PgPool) -> Result<(), anyhow::Error> {
///     let server = TestSessionServer::spawn(pool).await?;
///     server.seed_user("alice", "password123", "admin").await?;
///
///     let response = server
///         .client()
///         .post(format!("{}/api/v1/auth/login", server.url()))
///         .json(&serde_json::json!({"username": "alice", "password": "password123"}))
///         .send()
///         .await?;
///
///     assert_eq!(response.status(), 200);
///     Ok(())
/// }
/// ```
pub struct TestSessionServer {
    addr: SocketAddr,
    pool: PgPool,
    config: Config,
    _handle: JoinHandle<()>,
}

impl TestSessionServer {
    /// Spawn a new test server instance on a random port.
    ///
    /// # Arguments
    /// * `pool` - Database connection pool (typically from `#[sqlx::test]`)
    pub async fn spawn(pool: PgPool) -> Result<Self, anyhow::Error> {
        let config = Config {
            database_url: String::new(), // Not used after connection established
            bind_address: "127.0.0.1:0".to_string(),
            access_token_secret: SecretString::from(TEST_ACCESS_SECRET),
            refresh_token_secret: SecretString::from(TEST_REFRESH_SECRET),
        };

        let state = Arc::new(AppState {
            pool: pool.clone(),
            config: config.clone(),
        });

        // Initialize metrics recorder for the test server. A recorder may
        // already be installed in this test process; fall back to a
        // standalone recorder in that case.
        let metrics_handle = match routes::init_metrics_recorder() {
            Ok(handle) => handle,
            Err(_) => {
                use metrics_exporter_prometheus::PrometheusBuilder;
                let recorder = PrometheusBuilder::new().build_recorder();
                recorder.handle()
            }
        };

        let app = routes::build_routes(state, metrics_handle);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            pool,
            config,
            _handle: handle,
        })
    }

    /// Get reference to the database pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Get the base URL of the test server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get the socket address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get reference to the server configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Build a reqwest client with a cookie store, mirroring how real
    /// callers hold the refresh cookie.
    pub fn client(&self) -> reqwest::Client {
        reqwest::Client::builder()
            .cookie_store(true)
            .build()
            .unwrap_or_default()
    }

    /// Seed an identity the session core can authenticate against.
    ///
    /// The identity table is read-only to the service itself, so tests
    /// write it directly.
    pub async fn seed_user(
        &self,
        username: &str,
        password: &str,
        role: &str,
    ) -> Result<Uuid, anyhow::Error> {
        let password_hash = crypto::hash_password(password, TEST_BCRYPT_COST)
            .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?;

        let row: (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO users (username, password_hash, role)
            VALUES ($1, $2, $3)
            RETURNING user_id
            "#,
        )
        .bind(username)
        .bind(password_hash)
        .bind(role)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0)
    }

    /// Mark a seeded identity inactive.
    pub async fn deactivate_user(&self, user_id: Uuid) -> Result<(), anyhow::Error> {
        sqlx::query("UPDATE users SET is_active = FALSE WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Mint an access credential that expired a given number of seconds ago.
    ///
    /// Signed with the server's real access secret, so only the timestamps
    /// are wrong. Useful for exercising the TOKEN_EXPIRED path.
    pub fn issue_expired_access_token(
        &self,
        user_id: Uuid,
        username: &str,
        role: Role,
        expired_seconds_ago: i64,
    ) -> Result<String, anyhow::Error> {
        let now = Utc::now().timestamp();
        let exp = now - expired_seconds_ago;

        let claims = crypto::AccessClaims {
            sub: user_id,
            username: username.to_string(),
            role,
            iat: exp - crypto::ACCESS_TOKEN_TTL_SECONDS,
            exp,
        };

        crypto::sign_access_claims(&claims, TEST_ACCESS_SECRET.as_bytes())
            .map_err(|e| anyhow::anyhow!("Failed to sign expired token: {}", e))
    }
}

impl Drop for TestSessionServer {
    fn drop(&mut self) {
        // Explicitly abort the HTTP server task so the port is released as
        // soon as the test completes.
        self._handle.abort();
    }
}
