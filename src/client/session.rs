//! Client session with transparent token refresh.

use super::issuer::Issuer;
use super::transport::{ApiRequest, ApiResponse, Transport};
use super::{ClientError, IssuerError};
use crate::models::TokenPair;

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// How long a token refresh may take before the session is abandoned.
pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(10);

/// Access and refresh tokens held by one client.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl fmt::Debug for CredentialPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPair").finish_non_exhaustive()
    }
}

impl From<TokenPair> for CredentialPair {
    fn from(pair: TokenPair) -> Self {
        Self {
            access_token: pair.access,
            refresh_token: pair.refresh,
        }
    }
}

/// Authentication state of a [ResilientClient].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Session {
    Anonymous,
    Authenticated(CredentialPair),
    /// A refresh is in flight; the previous pair has been handed to the issuer
    Refreshing,
}

#[derive(Debug)]
struct State {
    session: Session,
    /// Incremented on every change of credentials
    generation: u64,
}

impl State {
    fn set(&mut self, session: Session) {
        self.session = session;
        self.generation += 1;
    }
}

/// Moves the session to [Session::Anonymous] unless disarmed, so that a refresh that fails, times
/// out or is cancelled never leaves the session [Session::Refreshing].
struct RefreshGuard<'a> {
    state: &'a Mutex<State>,
    armed: bool,
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if state.session == Session::Refreshing {
                tracing::warn!("Token refresh abandoned, session is now anonymous");
                state.set(Session::Anonymous);
            }
        }
    }
}

/// A client that holds a credential pair and recovers from access token expiry.
///
/// [ResilientClient::execute] sends a request with the current access token. If the server
/// answers 401 Unauthorized the token pair is refreshed and the same request is sent once more;
/// the result of that second attempt is final. Concurrent callers hitting 401 share a single
/// refresh.
pub struct ResilientClient {
    transport: Arc<dyn Transport>,
    issuer: Arc<dyn Issuer>,
    refresh_timeout: Duration,
    /// Never held across an await
    state: Mutex<State>,
    /// Held for the duration of any change of credentials by login or refresh
    refresh_gate: tokio::sync::Mutex<()>,
}

impl fmt::Debug for ResilientClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilientClient")
            .field("session", &self.session())
            .field("refresh_timeout", &self.refresh_timeout)
            .finish_non_exhaustive()
    }
}

impl ResilientClient {
    /// Create an anonymous client.
    pub fn new(transport: Arc<dyn Transport>, issuer: Arc<dyn Issuer>) -> Self {
        Self {
            transport,
            issuer,
            refresh_timeout: DEFAULT_REFRESH_TIMEOUT,
            state: Mutex::new(State {
                session: Session::Anonymous,
                generation: 0,
            }),
            refresh_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Bound the time a refresh may take.
    pub fn with_refresh_timeout(mut self, refresh_timeout: Duration) -> Self {
        self.refresh_timeout = refresh_timeout;
        self
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the current session state.
    pub fn session(&self) -> Session {
        self.state().session.clone()
    }

    /// Returns the credential pair, if authenticated.
    pub fn credentials(&self) -> Option<CredentialPair> {
        match &self.state().session {
            Session::Authenticated(pair) => Some(pair.clone()),
            Session::Anonymous | Session::Refreshing => None,
        }
    }

    /// Log in, replacing any current credentials.
    #[tracing::instrument(level = "DEBUG", skip(self, password))]
    pub async fn login(&self, username: &str, password: &str) -> Result<CredentialPair, ClientError> {
        let _gate = self.refresh_gate.lock().await;
        let pair = self
            .issuer
            .login(username, password)
            .await
            .map_err(ClientError::Authentication)?;
        self.state().set(Session::Authenticated(pair.clone()));
        tracing::info!("Logged in");
        Ok(pair)
    }

    /// Forget the credentials.
    pub fn logout(&self) {
        self.state().set(Session::Anonymous);
        tracing::info!("Logged out");
    }

    /// Exchange the refresh token for a new pair and return the new access token.
    ///
    /// On failure the credentials are discarded and the session becomes anonymous.
    pub async fn refresh(&self) -> Result<String, ClientError> {
        let _gate = self.refresh_gate.lock().await;
        self.refresh_holding_gate().await
    }

    /// Refresh with the gate held.
    async fn refresh_holding_gate(&self) -> Result<String, ClientError> {
        let refresh_token = {
            let mut state = self.state();
            let refresh_token = match &state.session {
                Session::Authenticated(pair) => pair.refresh_token.clone(),
                Session::Anonymous | Session::Refreshing => {
                    return Err(ClientError::NoRefreshToken)
                }
            };
            state.session = Session::Refreshing;
            refresh_token
        };
        let mut guard = RefreshGuard {
            state: &self.state,
            armed: true,
        };

        let result = tokio::time::timeout(self.refresh_timeout, self.issuer.refresh(&refresh_token))
            .await
            .unwrap_or(Err(IssuerError::Timeout));
        match result {
            Ok(pair) => {
                guard.armed = false;
                let mut state = self.state();
                if state.session != Session::Refreshing {
                    // Logged out while refreshing.
                    return Err(ClientError::NoRefreshToken);
                }
                let access_token = pair.access_token.clone();
                state.set(Session::Authenticated(pair));
                tracing::debug!("Refreshed token pair");
                Ok(access_token)
            }
            Err(error) => {
                tracing::warn!("Token refresh failed: {}", error);
                drop(guard);
                Err(ClientError::RefreshFailed(error))
            }
        }
    }

    /// Returns the access token to send, if any, and the generation it belongs to.
    ///
    /// Waits for an in-flight refresh to finish rather than sending a token being replaced.
    async fn current_token(&self) -> (Option<String>, u64) {
        loop {
            {
                let state = self.state();
                match &state.session {
                    Session::Authenticated(pair) => {
                        return (Some(pair.access_token.clone()), state.generation)
                    }
                    Session::Anonymous => return (None, state.generation),
                    Session::Refreshing => {}
                }
            }
            drop(self.refresh_gate.lock().await);
        }
    }

    /// Obtain a fresh access token after a request sent with generation `seen` was rejected.
    ///
    /// Only one caller refreshes; callers arriving after the credentials changed reuse the result.
    async fn renew(&self, seen: u64) -> Result<String, ClientError> {
        let _gate = self.refresh_gate.lock().await;
        {
            let state = self.state();
            if state.generation != seen {
                return match &state.session {
                    Session::Authenticated(pair) => Ok(pair.access_token.clone()),
                    Session::Anonymous | Session::Refreshing => Err(ClientError::SessionExpired),
                };
            }
        }
        self.refresh_holding_gate().await.map_err(|error| {
            tracing::info!("Session expired: {}", error);
            ClientError::SessionExpired
        })
    }

    /// Send a request, refreshing the credentials and retrying once if it is unauthorized.
    ///
    /// Returns the response if its status is successful. Error statuses are returned as
    /// [ClientError::Status]; a 401 on the retry is final. If the credentials cannot be refreshed
    /// the result is [ClientError::SessionExpired] and the session is anonymous.
    #[tracing::instrument(
        level = "DEBUG",
        skip(self, request),
        fields(method = %request.method, path = %request.target)
    )]
    pub async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, ClientError> {
        let (token, generation) = self.current_token().await;
        let response = self.transport.send(request, token.as_deref()).await?;
        if response.status != ApiResponse::UNAUTHORIZED {
            return check(response);
        }

        tracing::debug!("Request unauthorized, renewing access token");
        let token = self.renew(generation).await?;
        let response = self.transport.send(request, Some(&token)).await?;
        check(response)
    }
}

fn check(response: ApiResponse) -> Result<ApiResponse, ClientError> {
    if response.is_success() {
        Ok(response)
    } else {
        Err(ClientError::status(response.status, &response.body))
    }
}
