//! Token issuance and verification.
//!
//! The server consumes a [CredentialAuthority] to log users in, refresh token pairs and verify
//! bearer tokens. [StaticAuthority] is a self-contained authority over a fixed set of users,
//! issuing opaque UUID tokens held in memory.

use crate::error::EquipStatError;
use crate::models::TokenPair;

use std::fmt::Debug;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use hashbrown::HashMap;
use uuid::Uuid;

/// Issuer and verifier of access/refresh token pairs.
#[async_trait]
pub trait CredentialAuthority: Debug + Send + Sync {
    /// Issue a token pair for a user.
    ///
    /// Fails with [EquipStatError::InvalidCredentials] if the user is unknown or the password is
    /// wrong.
    async fn issue(&self, username: &str, password: &str) -> Result<TokenPair, EquipStatError>;

    /// Exchange a refresh token for a new token pair.
    ///
    /// Fails with [EquipStatError::InvalidRefreshToken] if the token is unknown, already used or
    /// expired.
    async fn refresh(&self, refresh: &str) -> Result<TokenPair, EquipStatError>;

    /// Returns the user an access token was issued to.
    ///
    /// Fails with [EquipStatError::Unauthorized] if the token is unknown or expired.
    async fn verify(&self, access: &str) -> Result<String, EquipStatError>;
}

/// A token and who it was issued to.
#[derive(Debug)]
struct Grant {
    username: String,
    expires: Instant,
}

impl Grant {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires
    }
}

#[derive(Debug, Default)]
struct Grants {
    access: HashMap<String, Grant>,
    refresh: HashMap<String, Grant>,
}

impl Grants {
    fn prune(&mut self, now: Instant) {
        self.access.retain(|_, grant| grant.is_live(now));
        self.refresh.retain(|_, grant| grant.is_live(now));
    }
}

/// Authority over a fixed set of users.
///
/// Refresh tokens are single use: a successful refresh revokes the refresh token presented and
/// issues a new pair.
#[derive(Debug)]
pub struct StaticAuthority {
    users: HashMap<String, String>,
    access_ttl: Duration,
    refresh_ttl: Duration,
    grants: Mutex<Grants>,
}

impl StaticAuthority {
    /// Create a [StaticAuthority].
    ///
    /// # Arguments
    ///
    /// * `users`: (username, password) pairs
    /// * `access_ttl`: Lifetime of access tokens
    /// * `refresh_ttl`: Lifetime of refresh tokens
    pub fn new(
        users: impl IntoIterator<Item = (String, String)>,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            users: users.into_iter().collect(),
            access_ttl,
            refresh_ttl,
            grants: Mutex::new(Grants::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Grants> {
        // No grant update can be left half applied.
        self.grants
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn grant(&self, grants: &mut Grants, username: &str, now: Instant) -> TokenPair {
        let pair = TokenPair {
            access: Uuid::new_v4().simple().to_string(),
            refresh: Uuid::new_v4().simple().to_string(),
        };
        grants.access.insert(
            pair.access.clone(),
            Grant {
                username: username.to_string(),
                expires: now + self.access_ttl,
            },
        );
        grants.refresh.insert(
            pair.refresh.clone(),
            Grant {
                username: username.to_string(),
                expires: now + self.refresh_ttl,
            },
        );
        pair
    }
}

#[async_trait]
impl CredentialAuthority for StaticAuthority {
    async fn issue(&self, username: &str, password: &str) -> Result<TokenPair, EquipStatError> {
        match self.users.get(username) {
            Some(expected) if expected == password => {}
            _ => {
                tracing::info!(username, "Rejected login");
                return Err(EquipStatError::InvalidCredentials);
            }
        }
        let now = Instant::now();
        let mut grants = self.lock();
        grants.prune(now);
        tracing::debug!(username, "Issued token pair");
        Ok(self.grant(&mut grants, username, now))
    }

    async fn refresh(&self, refresh: &str) -> Result<TokenPair, EquipStatError> {
        let now = Instant::now();
        let mut grants = self.lock();
        let grant = grants
            .refresh
            .remove(refresh)
            .filter(|grant| grant.is_live(now))
            .ok_or(EquipStatError::InvalidRefreshToken)?;
        grants.prune(now);
        tracing::debug!(username = %grant.username, "Refreshed token pair");
        Ok(self.grant(&mut grants, &grant.username, now))
    }

    async fn verify(&self, access: &str) -> Result<String, EquipStatError> {
        let now = Instant::now();
        let grants = self.lock();
        grants
            .access
            .get(access)
            .filter(|grant| grant.is_live(now))
            .map(|grant| grant.username.clone())
            .ok_or(EquipStatError::Unauthorized)
    }
}
