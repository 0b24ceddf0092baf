//! Device authentication (`spec.md` §6 "Authentication"): invite-token
//! registration and recurring device auth (device id + secret + hardware
//! fingerprint), rate-limited to 3 failures per IP per 15 minutes. Grounded
//! in full on `api/device_pairing.rs`'s pairing-code/token flow, adapted
//! from a Postgres `source_connections` row to the SQLite `device_accounts`/
//! `invite_tokens`/`auth_failures` tables (see DESIGN.md); the sliding-window
//! rate limit is grounded on `api/rate_limit.rs`'s table-backed counting
//! shape (that file's daily-bucket business logic is not reused verbatim —
//! ours is a rolling window, not a calendar day).

use chrono::{Duration, Utc};
use sqlx::SqlitePool;

use crate::crypto::{generate_device_secret, generate_invite_token, hmac_hex};
use crate::error::{Error, Result};

/// Issued once at registration time; only its hash is ever stored again.
#[derive(Debug, Clone)]
pub struct RegisteredDevice {
    pub device_id: String,
    pub device_secret: String,
    pub is_admin: bool,
}

/// Outcome of a successful recurring authentication.
#[derive(Debug, Clone)]
pub struct AuthenticatedDevice {
    pub device_id: String,
    pub user_id: String,
    pub device_name: String,
    pub capabilities: Vec<String>,
    pub platform: String,
    pub is_admin: bool,
    /// Set when the presented fingerprint does not match the one on file;
    /// the caller is expected to notify admins but still let the device in
    /// (`spec.md` §6: "fingerprint changes are allowed but emit a warning").
    pub fingerprint_changed: bool,
}

pub struct DeviceAuth {
    pool: SqlitePool,
    hmac_key: Vec<u8>,
}

impl DeviceAuth {
    pub fn new(pool: SqlitePool, hmac_key: impl Into<Vec<u8>>) -> Self {
        Self {
            pool,
            hmac_key: hmac_key.into(),
        }
    }

    fn hash(&self, value: &str) -> String {
        hmac_hex(&self.hmac_key, value)
    }

    /// Issues a one-time invite token, returned in plaintext exactly once.
    pub async fn create_invite_token(&self, created_by_device_id: Option<&str>, ttl_hours: i64) -> Result<String> {
        let token = generate_invite_token();
        let token_hash = self.hash(&token);
        let now = Utc::now();
        let expires_at = now + Duration::hours(ttl_hours);

        sqlx::query(
            "INSERT INTO invite_tokens (token_hash, created_by_device_id, created_at, expires_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(&token_hash)
        .bind(created_by_device_id)
        .bind(now.to_rfc3339())
        .bind(expires_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Database(format!("failed to create invite token: {e}")))?;

        Ok(token)
    }

    /// Consumes an invite token and registers a new device account. The
    /// first device ever registered becomes admin (`spec.md` §6's admin
    /// surface needs at least one device able to reach it with no prior
    /// admin to grant that role).
    pub async fn register_device(
        &self,
        invite_token: &str,
        device_id: &str,
        user_id: &str,
        device_name: &str,
        platform: &str,
        capabilities: &[String],
        fingerprint: &str,
    ) -> Result<RegisteredDevice> {
        let token_hash = self.hash(invite_token);
        let now = Utc::now();

        let row: Option<(String, Option<String>, Option<String>)> = sqlx::query_as(
            "SELECT expires_at, consumed_at, revoked_at FROM invite_tokens WHERE token_hash = ?",
        )
        .bind(&token_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::Database(format!("failed to look up invite token: {e}")))?;

        let (expires_at, consumed_at, revoked_at) = row.ok_or_else(|| Error::Unauthorized("invalid invite token".to_string()))?;

        if consumed_at.is_some() {
            return Err(Error::Unauthorized("invite token already consumed".to_string()));
        }
        if revoked_at.is_some() {
            return Err(Error::Unauthorized("invite token revoked".to_string()));
        }
        let expires_at = chrono::DateTime::parse_from_rfc3339(&expires_at)
            .map_err(|e| Error::Database(format!("corrupt invite token expiry: {e}")))?;
        if expires_at < now {
            return Err(Error::Unauthorized("invite token expired".to_string()));
        }

        let (existing_devices,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM device_accounts")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| Error::Database(format!("failed to count device accounts: {e}")))?;
        let is_admin = existing_devices == 0;

        let device_secret = generate_device_secret();
        let capabilities_json = serde_json::to_string(capabilities)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::Database(format!("failed to begin transaction: {e}")))?;

        sqlx::query(
            "INSERT INTO device_accounts
                (device_id, user_id, device_name, platform, capabilities, token_hash, fingerprint_hash, is_admin, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(device_id)
        .bind(user_id)
        .bind(device_name)
        .bind(platform)
        .bind(&capabilities_json)
        .bind(self.hash(&device_secret))
        .bind(self.hash(fingerprint))
        .bind(is_admin)
        .bind(now.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(|e| Error::Database(format!("failed to register device: {e}")))?;

        sqlx::query("UPDATE invite_tokens SET consumed_by_device_id = ?, consumed_at = ? WHERE token_hash = ?")
            .bind(device_id)
            .bind(now.to_rfc3339())
            .bind(&token_hash)
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::Database(format!("failed to consume invite token: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| Error::Database(format!("failed to commit device registration: {e}")))?;

        Ok(RegisteredDevice {
            device_id: device_id.to_string(),
            device_secret,
            is_admin,
        })
    }

    /// Recurring auth: device id + secret + fingerprint, rate-limited per
    /// client IP. A revoked device is rejected outright.
    pub async fn authenticate(
        &self,
        device_id: &str,
        device_secret: &str,
        fingerprint: &str,
        client_ip: &str,
        max_failures: u32,
        window_secs: i64,
    ) -> Result<AuthenticatedDevice> {
        let ip_hash = self.hash(client_ip);
        self.check_rate_limit(&ip_hash, max_failures, window_secs).await?;

        let row: Option<(String, String, String, String, String, String, bool, Option<String>)> = sqlx::query_as(
            "SELECT user_id, device_name, platform, capabilities, token_hash, fingerprint_hash, is_admin, revoked_at
             FROM device_accounts WHERE device_id = ?",
        )
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::Database(format!("failed to look up device account: {e}")))?;

        let Some((user_id, device_name, platform, capabilities_json, token_hash, fingerprint_hash, is_admin, revoked_at)) = row
        else {
            self.record_failure(&ip_hash).await?;
            return Err(Error::Unauthorized("unknown device".to_string()));
        };

        if revoked_at.is_some() {
            self.record_failure(&ip_hash).await?;
            return Err(Error::Unauthorized("device revoked".to_string()));
        }

        if self.hash(device_secret) != token_hash {
            self.record_failure(&ip_hash).await?;
            return Err(Error::Unauthorized("invalid device secret".to_string()));
        }

        let fingerprint_changed = self.hash(fingerprint) != fingerprint_hash;

        sqlx::query("UPDATE device_accounts SET last_seen_at = ? WHERE device_id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(device_id)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Database(format!("failed to update last_seen_at: {e}")))?;

        let capabilities = serde_json::from_str(&capabilities_json)?;

        Ok(AuthenticatedDevice {
            device_id: device_id.to_string(),
            user_id,
            device_name,
            capabilities,
            platform,
            is_admin,
            fingerprint_changed,
        })
    }

    async fn check_rate_limit(&self, ip_hash: &str, max_failures: u32, window_secs: i64) -> Result<()> {
        let since = (Utc::now() - Duration::seconds(window_secs)).to_rfc3339();
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM auth_failures WHERE ip_hash = ? AND occurred_at > ?",
        )
        .bind(ip_hash)
        .bind(&since)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| Error::Database(format!("failed to check auth rate limit: {e}")))?;

        if count >= max_failures as i64 {
            return Err(Error::Unauthorized("too many failed auth attempts, try again later".to_string()));
        }
        Ok(())
    }

    async fn record_failure(&self, ip_hash: &str) -> Result<()> {
        sqlx::query("INSERT INTO auth_failures (ip_hash, occurred_at) VALUES (?, ?)")
            .bind(ip_hash)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Database(format!("failed to record auth failure: {e}")))?;
        Ok(())
    }

    /// Admin surface: `revoke_device` / `unrevoke_device` (`spec.md` §6).
    pub async fn revoke_device(&self, device_id: &str) -> Result<()> {
        sqlx::query("UPDATE device_accounts SET revoked_at = ? WHERE device_id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(device_id)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Database(format!("failed to revoke device: {e}")))?;
        Ok(())
    }

    pub async fn unrevoke_device(&self, device_id: &str) -> Result<()> {
        sqlx::query("UPDATE device_accounts SET revoked_at = NULL WHERE device_id = ?")
            .bind(device_id)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Database(format!("failed to unrevoke device: {e}")))?;
        Ok(())
    }

    /// Admin surface: `list_devices`. Never returns the token/fingerprint
    /// hashes themselves, only the fields an admin needs to act on.
    pub async fn list_devices(&self) -> Result<Vec<DeviceSummary>> {
        let rows: Vec<(String, String, String, String, bool, String, Option<String>, Option<String>)> = sqlx::query_as(
            "SELECT device_id, user_id, device_name, platform, is_admin, created_at, last_seen_at, revoked_at
             FROM device_accounts ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Database(format!("failed to list devices: {e}")))?;

        Ok(rows
            .into_iter()
            .map(|(device_id, user_id, device_name, platform, is_admin, created_at, last_seen_at, revoked_at)| DeviceSummary {
                device_id,
                user_id,
                device_name,
                platform,
                is_admin,
                created_at,
                last_seen_at,
                revoked: revoked_at.is_some(),
            })
            .collect())
    }

    /// Admin surface: `list_tokens`. The plaintext token is only ever known
    /// at creation time, so listings show consumption/expiry state, not the
    /// token value.
    pub async fn list_tokens(&self) -> Result<Vec<InviteTokenSummary>> {
        let rows: Vec<(String, Option<String>, String, String, Option<String>, Option<String>)> = sqlx::query_as(
            "SELECT token_hash, created_by_device_id, created_at, expires_at, consumed_by_device_id, revoked_at
             FROM invite_tokens ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Database(format!("failed to list invite tokens: {e}")))?;

        Ok(rows
            .into_iter()
            .map(|(token_hash, created_by_device_id, created_at, expires_at, consumed_by_device_id, revoked_at)| InviteTokenSummary {
                token_hash,
                created_by_device_id,
                created_at,
                expires_at,
                consumed_by_device_id,
                revoked: revoked_at.is_some(),
            })
            .collect())
    }

    /// Admin surface: `revoke_token`. Identifies the token by the hash
    /// returned from `list_tokens`, since the plaintext is never stored.
    pub async fn revoke_token(&self, token_hash: &str) -> Result<()> {
        sqlx::query("UPDATE invite_tokens SET revoked_at = ? WHERE token_hash = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(token_hash)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Database(format!("failed to revoke invite token: {e}")))?;
        Ok(())
    }
}

/// Admin-facing view of one device account (`spec.md` §6 `list_devices`).
#[derive(Debug, Clone)]
pub struct DeviceSummary {
    pub device_id: String,
    pub user_id: String,
    pub device_name: String,
    pub platform: String,
    pub is_admin: bool,
    pub created_at: String,
    pub last_seen_at: Option<String>,
    pub revoked: bool,
}

/// Admin-facing view of one invite token (`spec.md` §6 `list_tokens`).
#[derive(Debug, Clone)]
pub struct InviteTokenSummary {
    pub token_hash: String,
    pub created_by_device_id: Option<String>,
    pub created_at: String,
    pub expires_at: String,
    pub consumed_by_device_id: Option<String>,
    pub revoked: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn register_then_authenticate_round_trips() {
        let pool = test_pool().await;
        let auth = DeviceAuth::new(pool, b"test-hmac-key".to_vec());

        let token = auth.create_invite_token(None, 1).await.unwrap();
        let registered = auth
            .register_device(&token, "dev-1", "user-1", "Laptop", "macos", &["memory".to_string()], "fp-abc")
            .await
            .unwrap();
        assert!(registered.is_admin, "first device should be admin");

        let authed = auth
            .authenticate("dev-1", &registered.device_secret, "fp-abc", "1.2.3.4", 3, 900)
            .await
            .unwrap();
        assert_eq!(authed.device_id, "dev-1");
        assert!(!authed.fingerprint_changed);
    }

    #[tokio::test]
    async fn fingerprint_change_is_flagged_but_not_rejected() {
        let pool = test_pool().await;
        let auth = DeviceAuth::new(pool, b"test-hmac-key".to_vec());
        let token = auth.create_invite_token(None, 1).await.unwrap();
        let registered = auth
            .register_device(&token, "dev-1", "user-1", "Laptop", "macos", &["memory".to_string()], "fp-abc")
            .await
            .unwrap();

        let authed = auth
            .authenticate("dev-1", &registered.device_secret, "fp-new", "1.2.3.4", 3, 900)
            .await
            .unwrap();
        assert!(authed.fingerprint_changed);
    }

    #[tokio::test]
    async fn invite_token_cannot_be_reused() {
        let pool = test_pool().await;
        let auth = DeviceAuth::new(pool, b"test-hmac-key".to_vec());
        let token = auth.create_invite_token(None, 1).await.unwrap();
        auth.register_device(&token, "dev-1", "user-1", "Laptop", "macos", &["memory".to_string()], "fp-abc")
            .await
            .unwrap();

        let second = auth
            .register_device(&token, "dev-2", "user-1", "Phone", "web", &["memory".to_string()], "fp-xyz")
            .await;
        assert!(matches!(second, Err(Error::Unauthorized(_))));
    }

    #[tokio::test]
    async fn rate_limit_blocks_after_max_failures() {
        let pool = test_pool().await;
        let auth = DeviceAuth::new(pool, b"test-hmac-key".to_vec());
        let token = auth.create_invite_token(None, 1).await.unwrap();
        auth.register_device(&token, "dev-1", "user-1", "Laptop", "macos", &["memory".to_string()], "fp-abc")
            .await
            .unwrap();

        for _ in 0..3 {
            let _ = auth.authenticate("dev-1", "wrong-secret", "fp-abc", "9.9.9.9", 3, 900).await;
        }

        let result = auth.authenticate("dev-1", "wrong-secret", "fp-abc", "9.9.9.9", 3, 900).await;
        assert!(matches!(result, Err(Error::Unauthorized(_))));
    }

    #[tokio::test]
    async fn revoked_device_is_rejected() {
        let pool = test_pool().await;
        let auth = DeviceAuth::new(pool, b"test-hmac-key".to_vec());
        let token = auth.create_invite_token(None, 1).await.unwrap();
        let registered = auth
            .register_device(&token, "dev-1", "user-1", "Laptop", "macos", &["memory".to_string()], "fp-abc")
            .await
            .unwrap();

        auth.revoke_device("dev-1").await.unwrap();
        let result = auth
            .authenticate("dev-1", &registered.device_secret, "fp-abc", "1.2.3.4", 3, 900)
            .await;
        assert!(matches!(result, Err(Error::Unauthorized(_))));

        auth.unrevoke_device("dev-1").await.unwrap();
        let result = auth
            .authenticate("dev-1", &registered.device_secret, "fp-abc", "1.2.3.4", 3, 900)
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn revoked_token_cannot_be_consumed() {
        let pool = test_pool().await;
        let auth = DeviceAuth::new(pool, b"test-hmac-key".to_vec());
        let token = auth.create_invite_token(None, 1).await.unwrap();

        let tokens = auth.list_tokens().await.unwrap();
        assert_eq!(tokens.len(), 1);
        auth.revoke_token(&tokens[0].token_hash).await.unwrap();

        let result = auth
            .register_device(&token, "dev-1", "user-1", "Laptop", "macos", &["memory".to_string()], "fp-abc")
            .await;
        assert!(matches!(result, Err(Error::Unauthorized(_))));
    }

    #[tokio::test]
    async fn list_devices_reflects_registrations() {
        let pool = test_pool().await;
        let auth = DeviceAuth::new(pool, b"test-hmac-key".to_vec());
        let token = auth.create_invite_token(None, 1).await.unwrap();
        auth.register_device(&token, "dev-1", "user-1", "Laptop", "macos", &["memory".to_string()], "fp-abc")
            .await
            .unwrap();

        let devices = auth.list_devices().await.unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].device_id, "dev-1");
        assert!(devices[0].is_admin);
        assert!(!devices[0].revoked);
    }
}
