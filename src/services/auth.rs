/// Identity gate: anonymous visitors vs. authenticated admins
///
/// There is always exactly one [`Identity`]. Before the first anonymous
/// sign-in completes, and whenever re-establishing one fails, it is a
/// *guest*: an anonymous session without a token. Admin status is any
/// session the provider did not flag as anonymous.
///
/// ID tokens last an hour. [`IdentityGate::fresh_session`] swaps in a new
/// one shortly before expiry and publishes it like any other change.
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::FirebaseConfig;
use crate::error::AuthError;

/// Refresh this long before the provider's expiry.
pub const REFRESH_MARGIN: Duration = Duration::from_secs(5 * 60);

/// Lifetime assumed when the provider omits `expiresIn`.
const DEFAULT_TOKEN_LIFETIME: u64 = 3600;

/// One signed-in (or guest) session.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub local_id: String,
    /// Bearer token for the document store; `None` for a guest.
    pub id_token: Option<String>,
    pub refresh_token: Option<String>,
    /// When `id_token` stops being accepted.
    pub expires_at: Option<Instant>,
    pub email: Option<String>,
    pub is_anonymous: bool,
}

impl Session {
    /// Tokenless anonymous session.
    pub fn guest() -> Self {
        Self {
            local_id: "guest".to_string(),
            id_token: None,
            refresh_token: None,
            expires_at: None,
            email: None,
            is_anonymous: true,
        }
    }

    /// Whether the token expires within `margin` and can be renewed.
    pub fn needs_refresh(&self, margin: Duration) -> bool {
        match (self.refresh_token.as_ref(), self.expires_at) {
            (Some(_), Some(expires_at)) => Instant::now() + margin >= expires_at,
            _ => false,
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("local_id", &self.local_id)
            .field("id_token", &self.id_token.as_ref().map(|_| "<redacted>"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_at", &self.expires_at)
            .field("email", &self.email)
            .field("is_anonymous", &self.is_anonymous)
            .finish()
    }
}

/// Who is using the app right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Anonymous(Session),
    Admin(Session),
}

impl Identity {
    pub fn guest() -> Self {
        Self::Anonymous(Session::guest())
    }

    pub fn from_session(session: Session) -> Self {
        if session.is_anonymous {
            Self::Anonymous(session)
        } else {
            Self::Admin(session)
        }
    }

    pub fn session(&self) -> &Session {
        match self {
            Self::Anonymous(s) | Self::Admin(s) => s,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Admin(_))
    }

    /// Whether the session carries a token the document store will accept.
    pub fn has_credentials(&self) -> bool {
        self.session().id_token.is_some()
    }
}

/// Hands out a session whose token is good to use right now.
#[async_trait]
pub trait SessionSource: Send + Sync {
    async fn session(&self) -> Result<Session, AuthError>;
}

/// A fixed session, never refreshed.
#[async_trait]
impl SessionSource for Session {
    async fn session(&self) -> Result<Session, AuthError> {
        Ok(self.clone())
    }
}

/// Identity provider operations.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn sign_in_anonymously(&self) -> Result<Session, AuthError>;

    async fn sign_in_with_password(&self, email: &str, password: &str)
        -> Result<Session, AuthError>;

    /// Exchange the session's refresh token for a new ID token.
    async fn refresh(&self, session: &Session) -> Result<Session, AuthError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    local_id: String,
    id_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

/// Secure Token `grant_type=refresh_token` response (snake_case keys).
#[derive(Debug, Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<String>,
    user_id: String,
}

fn expiry(expires_in: Option<&str>) -> Instant {
    let seconds = expires_in
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(DEFAULT_TOKEN_LIFETIME);
    Instant::now() + Duration::from_secs(seconds)
}

/// `AuthBackend` backed by Firebase Authentication.
pub struct FirebaseAuth {
    api_key: String,
    base_url: String,
    token_url: String,
    client: reqwest::Client,
}

impl FirebaseAuth {
    pub fn new(config: &FirebaseConfig) -> Self {
        Self {
            api_key: config.api_key.clone(),
            base_url: config.auth_base_url.trim_end_matches('/').to_string(),
            token_url: format!("{}/v1/token", config.token_base_url.trim_end_matches('/')),
            client: reqwest::Client::new(),
        }
    }

    async fn call(
        &self,
        method: &str,
        body: serde_json::Value,
    ) -> Result<SignInResponse, AuthError> {
        let url = format!("{}/v1/accounts:{}", self.base_url, method);
        self.send(
            self.client
                .post(&url)
                .query(&[("key", self.api_key.as_str())])
                .json(&body),
        )
        .await
    }

    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T, AuthError> {
        let response = request
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(map_auth_error(&text));
        }

        serde_json::from_str(&text).map_err(|e| AuthError::Rejected(e.to_string()))
    }
}

#[async_trait]
impl AuthBackend for FirebaseAuth {
    async fn sign_in_anonymously(&self) -> Result<Session, AuthError> {
        let response = self
            .call("signUp", serde_json::json!({ "returnSecureToken": true }))
            .await?;
        Ok(Session {
            local_id: response.local_id,
            id_token: Some(response.id_token),
            expires_at: Some(expiry(response.expires_in.as_deref())),
            refresh_token: response.refresh_token,
            email: None,
            is_anonymous: true,
        })
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, AuthError> {
        let response = self
            .call(
                "signInWithPassword",
                serde_json::json!({
                    "email": email,
                    "password": password,
                    "returnSecureToken": true,
                }),
            )
            .await?;
        Ok(Session {
            local_id: response.local_id,
            id_token: Some(response.id_token),
            expires_at: Some(expiry(response.expires_in.as_deref())),
            refresh_token: response.refresh_token,
            email: response.email.filter(|e| !e.is_empty()),
            is_anonymous: false,
        })
    }

    async fn refresh(&self, session: &Session) -> Result<Session, AuthError> {
        let Some(refresh_token) = session.refresh_token.as_deref() else {
            return Err(AuthError::Rejected("session has no refresh token".into()));
        };

        let response: RefreshResponse = self
            .send(
                self.client
                    .post(&self.token_url)
                    .query(&[("key", self.api_key.as_str())])
                    .form(&[("grant_type", "refresh_token"), ("refresh_token", refresh_token)]),
            )
            .await?;

        Ok(Session {
            local_id: response.user_id,
            id_token: Some(response.id_token),
            refresh_token: Some(response.refresh_token),
            expires_at: Some(expiry(response.expires_in.as_deref())),
            email: session.email.clone(),
            is_anonymous: session.is_anonymous,
        })
    }
}

/// Map an Identity Toolkit error body (`error.message`, e.g.
/// `"INVALID_LOGIN_CREDENTIALS"` or `"TOO_MANY_ATTEMPTS_TRY_LATER : ..."`).
fn map_auth_error(body: &str) -> AuthError {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(|m| m.as_str())
                .map(String::from)
        })
        .unwrap_or_else(|| body.chars().take(200).collect());
    let code = message.split(" : ").next().unwrap_or_default().trim();

    match code {
        "EMAIL_NOT_FOUND" | "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" | "INVALID_EMAIL"
        | "USER_DISABLED" => AuthError::InvalidCredentials,
        "OPERATION_NOT_ALLOWED" | "ADMIN_ONLY_OPERATION" | "CONFIGURATION_NOT_FOUND" => {
            AuthError::ProviderDisabled(code.to_string())
        }
        _ => AuthError::Rejected(message),
    }
}

/// Live identity shared by the shell and the config store.
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct IdentityGate {
    backend: Arc<dyn AuthBackend>,
    state: Arc<watch::Sender<Identity>>,
}

impl IdentityGate {
    pub fn new(backend: Arc<dyn AuthBackend>) -> Self {
        let (state, _) = watch::channel(Identity::guest());
        Self {
            backend,
            state: Arc::new(state),
        }
    }

    pub fn current(&self) -> Identity {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Identity> {
        self.state.subscribe()
    }

    /// Sign in anonymously unless a credentialed session already exists.
    pub async fn establish(&self) -> Result<(), AuthError> {
        if self.current().has_credentials() {
            return Ok(());
        }

        let session = self.backend.sign_in_anonymously().await.map_err(|e| {
            warn!(error = %e, "anonymous sign-in failed");
            e
        })?;
        debug!(uid = %session.local_id, "anonymous session established");

        // A login that finished first wins.
        self.state.send_if_modified(|current| {
            if current.has_credentials() {
                false
            } else {
                *current = Identity::from_session(session);
                true
            }
        });
        Ok(())
    }

    /// Elevate to admin. On failure the identity is unchanged.
    pub async fn login(&self, email: &str, password: &str) -> Result<(), AuthError> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(AuthError::MissingCredentials);
        }

        let session = self
            .backend
            .sign_in_with_password(email, password)
            .await
            .map_err(|e| {
                warn!(error = %e, "admin login failed");
                e
            })?;

        info!(email = ?session.email, "🔑 admin signed in");
        self.state.send_replace(Identity::from_session(session));
        Ok(())
    }

    /// The current session, refreshed first when its token is about to
    /// expire. A refresh that loses a race with login or logout is not
    /// published.
    pub async fn fresh_session(&self) -> Result<Session, AuthError> {
        let session = self.current().session().clone();
        if !session.needs_refresh(REFRESH_MARGIN) {
            return Ok(session);
        }

        let refreshed = self.backend.refresh(&session).await.map_err(|e| {
            warn!(error = %e, "token refresh failed");
            e
        })?;
        debug!(uid = %refreshed.local_id, "ID token refreshed");

        self.state.send_if_modified(|current| {
            if current.session().local_id == refreshed.local_id {
                *current = Identity::from_session(refreshed.clone());
                true
            } else {
                false
            }
        });
        Ok(refreshed)
    }

    /// Drop the admin session and re-establish an anonymous one.
    ///
    /// The identity is a guest between the two steps and stays one if the
    /// anonymous sign-in fails.
    pub async fn logout(&self) -> Result<(), AuthError> {
        let previous = self.state.send_replace(Identity::guest());
        info!(email = ?previous.session().email, "admin signed out");
        self.establish().await
    }
}

#[async_trait]
impl SessionSource for IdentityGate {
    async fn session(&self) -> Result<Session, AuthError> {
        self.fresh_session().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Scripted provider: anonymous sign-in may fail, one admin account.
    struct FakeAuth {
        anonymous_ok: bool,
        anonymous_calls: AtomicUsize,
        password_calls: AtomicUsize,
        refresh_calls: AtomicUsize,
    }

    impl FakeAuth {
        fn new(anonymous_ok: bool) -> Arc<Self> {
            Arc::new(Self {
                anonymous_ok,
                anonymous_calls: AtomicUsize::new(0),
                password_calls: AtomicUsize::new(0),
                refresh_calls: AtomicUsize::new(0),
            })
        }
    }

    fn hour() -> Option<Instant> {
        Some(Instant::now() + Duration::from_secs(3600))
    }

    #[async_trait]
    impl AuthBackend for FakeAuth {
        async fn sign_in_anonymously(&self) -> Result<Session, AuthError> {
            let n = self.anonymous_calls.fetch_add(1, Ordering::SeqCst);
            if !self.anonymous_ok {
                return Err(AuthError::Network("offline".into()));
            }
            Ok(Session {
                local_id: format!("anon-{n}"),
                id_token: Some("anon-token".into()),
                refresh_token: Some("anon-refresh".into()),
                expires_at: hour(),
                email: None,
                is_anonymous: true,
            })
        }

        async fn sign_in_with_password(
            &self,
            email: &str,
            password: &str,
        ) -> Result<Session, AuthError> {
            self.password_calls.fetch_add(1, Ordering::SeqCst);
            if email == "admin@example.com" && password == "secret" {
                Ok(Session {
                    local_id: "admin-uid".into(),
                    id_token: Some("admin-token".into()),
                    refresh_token: Some("admin-refresh".into()),
                    expires_at: hour(),
                    email: Some(email.into()),
                    is_anonymous: false,
                })
            } else {
                Err(AuthError::InvalidCredentials)
            }
        }

        async fn refresh(&self, session: &Session) -> Result<Session, AuthError> {
            let n = self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            Ok(Session {
                id_token: Some(format!("refreshed-{n}")),
                expires_at: hour(),
                ..session.clone()
            })
        }
    }

    #[test]
    fn test_guest_is_anonymous_without_token() {
        let identity = Identity::guest();
        assert!(!identity.is_admin());
        assert!(!identity.has_credentials());
    }

    #[test]
    fn test_debug_redacts_token() {
        let session = Session {
            local_id: "u".into(),
            id_token: Some("very-secret".into()),
            refresh_token: Some("also-secret".into()),
            expires_at: None,
            email: None,
            is_anonymous: true,
        };
        let printed = format!("{session:?}");
        assert!(!printed.contains("very-secret"));
        assert!(!printed.contains("also-secret"));
    }

    #[tokio::test]
    async fn test_establish_creates_anonymous_session() {
        let gate = IdentityGate::new(FakeAuth::new(true));
        gate.establish().await.unwrap();

        let identity = gate.current();
        assert!(!identity.is_admin());
        assert!(identity.has_credentials());
    }

    #[tokio::test]
    async fn test_establish_is_noop_with_credentials() {
        let backend = FakeAuth::new(true);
        let gate = IdentityGate::new(backend.clone());
        gate.establish().await.unwrap();
        gate.establish().await.unwrap();
        assert_eq!(backend.anonymous_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_login_success_makes_admin() {
        let gate = IdentityGate::new(FakeAuth::new(true));
        gate.establish().await.unwrap();
        gate.login(" admin@example.com ", "secret").await.unwrap();

        let identity = gate.current();
        assert!(identity.is_admin());
        assert_eq!(identity.session().email.as_deref(), Some("admin@example.com"));
    }

    #[tokio::test]
    async fn test_login_failure_leaves_identity() {
        let gate = IdentityGate::new(FakeAuth::new(true));
        gate.establish().await.unwrap();
        let before = gate.current();

        let err = gate.login("admin@example.com", "wrong").await.unwrap_err();
        assert_eq!(err, AuthError::InvalidCredentials);
        assert_eq!(gate.current(), before);
    }

    #[tokio::test]
    async fn test_login_missing_fields_skips_backend() {
        let backend = FakeAuth::new(true);
        let gate = IdentityGate::new(backend.clone());

        let err = gate.login("  ", "secret").await.unwrap_err();
        assert_eq!(err, AuthError::MissingCredentials);
        let err = gate.login("admin@example.com", "").await.unwrap_err();
        assert_eq!(err, AuthError::MissingCredentials);
        assert_eq!(backend.password_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_logout_reestablishes_anonymous() {
        let gate = IdentityGate::new(FakeAuth::new(true));
        gate.login("admin@example.com", "secret").await.unwrap();
        let rx = gate.subscribe();

        gate.logout().await.unwrap();

        let identity = gate.current();
        assert!(!identity.is_admin());
        assert!(identity.has_credentials());
        assert!(rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_logout_keeps_guest_when_provider_down() {
        let gate = IdentityGate::new(FakeAuth::new(false));
        gate.login("admin@example.com", "secret").await.unwrap();

        let result = gate.logout().await;
        assert!(matches!(result, Err(AuthError::Network(_))));
        assert_eq!(gate.current(), Identity::guest());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_session_refreshes_near_expiry() {
        let backend = FakeAuth::new(true);
        let gate = IdentityGate::new(backend.clone());
        gate.establish().await.unwrap();
        let rx = gate.subscribe();

        let first = gate.fresh_session().await.unwrap();
        assert_eq!(backend.refresh_calls.load(Ordering::SeqCst), 0);
        assert!(!rx.has_changed().unwrap());

        tokio::time::advance(Duration::from_secs(3600) - REFRESH_MARGIN + Duration::from_secs(1)).await;
        let second = gate.fresh_session().await.unwrap();
        assert_eq!(backend.refresh_calls.load(Ordering::SeqCst), 1);
        assert_eq!(second.local_id, first.local_id);
        assert_eq!(second.id_token.as_deref(), Some("refreshed-0"));
        assert_eq!(gate.current().session(), &second);
        assert!(rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_guest_session_never_refreshes() {
        let backend = FakeAuth::new(false);
        let gate = IdentityGate::new(backend.clone());

        let session = gate.fresh_session().await.unwrap();
        assert_eq!(session, Session::guest());
        assert_eq!(backend.refresh_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_map_auth_error_codes() {
        let body = |m: &str| json!({ "error": { "code": 400, "message": m } }).to_string();
        assert_eq!(
            map_auth_error(&body("INVALID_LOGIN_CREDENTIALS")),
            AuthError::InvalidCredentials
        );
        assert_eq!(
            map_auth_error(&body("ADMIN_ONLY_OPERATION")),
            AuthError::ProviderDisabled("ADMIN_ONLY_OPERATION".into())
        );
        assert_eq!(
            map_auth_error(&body("TOO_MANY_ATTEMPTS_TRY_LATER : slow down")),
            AuthError::Rejected("TOO_MANY_ATTEMPTS_TRY_LATER : slow down".into())
        );
    }

    fn firebase(server: &MockServer) -> FirebaseAuth {
        FirebaseAuth::new(&FirebaseConfig {
            api_key: "fb-key".into(),
            auth_base_url: server.uri(),
            token_base_url: server.uri(),
            ..FirebaseConfig::default()
        })
    }

    #[tokio::test]
    async fn test_firebase_anonymous_sign_up() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/accounts:signUp"))
            .and(query_param("key", "fb-key"))
            .and(body_partial_json(json!({ "returnSecureToken": true })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "kind": "identitytoolkit#SignupNewUserResponse",
                "idToken": "tok",
                "refreshToken": "ref",
                "expiresIn": "3600",
                "localId": "anon-uid"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let session = firebase(&server).sign_in_anonymously().await.unwrap();
        assert_eq!(session.local_id, "anon-uid");
        assert_eq!(session.id_token.as_deref(), Some("tok"));
        assert_eq!(session.refresh_token.as_deref(), Some("ref"));
        assert!(session.expires_at.is_some());
        assert!(session.is_anonymous);
    }

    #[tokio::test]
    async fn test_firebase_password_sign_in() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/accounts:signInWithPassword"))
            .and(body_partial_json(json!({ "email": "admin@example.com", "password": "secret" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "localId": "admin-uid",
                "email": "admin@example.com",
                "idToken": "admin-tok",
                "registered": true
            })))
            .mount(&server)
            .await;

        let session = firebase(&server)
            .sign_in_with_password("admin@example.com", "secret")
            .await
            .unwrap();
        assert!(!session.is_anonymous);
        assert_eq!(session.email.as_deref(), Some("admin@example.com"));
    }

    #[tokio::test]
    async fn test_firebase_bad_password() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/accounts:signInWithPassword"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": { "code": 400, "message": "INVALID_LOGIN_CREDENTIALS", "errors": [] }
            })))
            .mount(&server)
            .await;

        let err = firebase(&server)
            .sign_in_with_password("admin@example.com", "nope")
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::InvalidCredentials);
    }

    #[tokio::test]
    async fn test_firebase_refresh_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/token"))
            .and(query_param("key", "fb-key"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=ref-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "new-tok",
                "expires_in": "3600",
                "token_type": "Bearer",
                "refresh_token": "ref-2",
                "id_token": "new-tok",
                "user_id": "anon-uid",
                "project_id": "123"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let session = Session {
            local_id: "anon-uid".into(),
            id_token: Some("old-tok".into()),
            refresh_token: Some("ref-1".into()),
            expires_at: Some(Instant::now()),
            email: None,
            is_anonymous: true,
        };
        let refreshed = firebase(&server).refresh(&session).await.unwrap();
        assert_eq!(refreshed.local_id, "anon-uid");
        assert_eq!(refreshed.id_token.as_deref(), Some("new-tok"));
        assert_eq!(refreshed.refresh_token.as_deref(), Some("ref-2"));
        assert!(refreshed.is_anonymous);
        assert!(!refreshed.needs_refresh(REFRESH_MARGIN));
    }

    #[tokio::test]
    async fn test_firebase_refresh_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": { "code": 400, "message": "TOKEN_EXPIRED", "status": "INVALID_ARGUMENT" }
            })))
            .mount(&server)
            .await;

        let session = Session {
            refresh_token: Some("stale".into()),
            ..Session::guest()
        };
        let err = firebase(&server).refresh(&session).await.unwrap_err();
        assert_eq!(err, AuthError::Rejected("TOKEN_EXPIRED".into()));
    }
}
