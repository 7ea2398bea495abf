//! Identity & session: credentials, sign-in/up/out and session events.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use bson::doc;
use chrono::{DateTime, Utc};
use crypto::bcrypt::bcrypt;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;

use crate::config::Config;
use crate::data::user::User;
use crate::data::{create, fetch_optional, find, from_document, to_document, Record};
use crate::error::{ServiceError, ServiceResult};
use crate::portal::Portal;
use crate::resp::jwt::SessionToken;
use crate::role::Role;
use crate::store::{Predicate, Query};

pub const CREDENTIAL_COLLECTION_NAME: &str = "credentials";
pub const PASSWORD_RESET_COLLECTION_NAME: &str = "password_resets";

/// How long a password reset token stays redeemable.
pub const RESET_TOKEN_MINUTES: i64 = 60;

/// The authenticated actor making a request.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize, ToSchema)]
pub struct Principal {
    pub id: String,
    pub role: Role,
}

impl From<&User> for Principal {
    fn from(user: &User) -> Self {
        Principal {
            id: user.id.clone(),
            role: user.role,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub principal: Principal,
    pub profile: User,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn principal(&self) -> &Principal {
        &self.principal
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct PasswordHash {
    salt: [u8; 16],
    hash: [u8; 24],
}

fn bcrypt_sha256(cost: u32, salt: &[u8; 16], password: &str) -> [u8; 24] {
    let mut hash: [u8; 24] = [0; 24];

    let mut sha = Sha256::new();
    sha2::Digest::update(&mut sha, password.as_bytes());

    bcrypt(cost, salt, sha.finalize().as_slice(), &mut hash);
    hash
}

impl PasswordHash {
    pub fn new(password: &str, cost: u32) -> PasswordHash {
        let salt: [u8; 16] = rand::random();
        let hash = bcrypt_sha256(cost, &salt, password);
        PasswordHash { salt, hash }
    }

    pub fn verify(&self, password: &str, cost: u32) -> bool {
        bcrypt_sha256(cost, &self.salt, password) == self.hash
    }
}

async fn hash_password(password: String, cost: u32) -> ServiceResult<PasswordHash> {
    tokio::task::spawn_blocking(move || PasswordHash::new(&password, cost))
        .await
        .map_err(|e| ServiceError::RemoteUnavailable(format!("password hashing failed: {}", e)))
}

async fn verify_password(hash: PasswordHash, password: String, cost: u32) -> ServiceResult<bool> {
    tokio::task::spawn_blocking(move || hash.verify(&password, cost))
        .await
        .map_err(|e| ServiceError::RemoteUnavailable(format!("password check failed: {}", e)))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Credential {
    #[serde(rename = "_id", default, skip_serializing_if = "String::is_empty")]
    id: String,
    user_id: String,
    email: String,
    password: PasswordHash,
}

impl Record for Credential {
    const COLLECTION: &'static str = CREDENTIAL_COLLECTION_NAME;
}

/// A single-use reset token. Only the SHA-256 digest of the token is stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PasswordReset {
    #[serde(rename = "_id", default, skip_serializing_if = "String::is_empty")]
    id: String,
    user_id: String,
    token_hash: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    expires_at: DateTime<Utc>,
    used: bool,
}

impl Record for PasswordReset {
    const COLLECTION: &'static str = PASSWORD_RESET_COLLECTION_NAME;
}

fn new_reset_token() -> String {
    let bytes: [u8; 32] = rand::random();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn token_digest(token: &str) -> String {
    Sha256::digest(token.trim().as_bytes())
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

fn validate_password(password: &str) -> ServiceResult<()> {
    if password.len() < 8 {
        return Err(ServiceError::invalid(
            "Password must be at least 8 characters (bytes) long.",
        ));
    }

    if password.len() > 72 {
        return Err(ServiceError::invalid(
            "Passwords longer than 72 characters (bytes) aren't supported.",
        ));
    }

    Ok(())
}

#[derive(Clone, Deserialize, ToSchema)]
pub struct SignupData {
    #[schema(format = "email")]
    pub email: String,
    #[schema(format = "password")]
    pub password: String,
    pub display_name: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub role: Role,
    #[serde(default)]
    pub enrollment_code: Option<String>,
}

impl std::fmt::Debug for SignupData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SignupData:{}:{}", self.email, self.role)
    }
}

impl SignupData {
    pub fn validate(&self) -> ServiceResult<()> {
        if !self.email.contains('@') {
            return Err(ServiceError::invalid("Not a valid e-mail address."));
        }

        if self.display_name.trim().is_empty() {
            return Err(ServiceError::invalid("Display name can't be empty."));
        }

        validate_password(&self.password)
    }
}

#[derive(Clone, Deserialize, ToSchema)]
pub struct LoginData {
    #[schema(format = "email")]
    pub email: String,
    #[schema(format = "password")]
    pub password: String,
}

impl std::fmt::Debug for LoginData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LoginData:{}", self.email)
    }
}

#[derive(Clone, Deserialize, ToSchema)]
pub struct ResetRequestData {
    #[schema(format = "email")]
    pub email: String,
}

impl std::fmt::Debug for ResetRequestData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ResetRequestData:{}", self.email)
    }
}

#[derive(Clone, Deserialize, ToSchema)]
pub struct ResetConfirmData {
    pub token: String,
    #[schema(format = "password")]
    pub password: String,
}

impl std::fmt::Debug for ResetConfirmData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ResetConfirmData")
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum SessionEvent {
    SignedIn(Principal),
    SignedOut(Principal),
    /// A reset token was issued and has to be delivered to `email`.
    ResetRequested { email: String, token: String },
}

type Listener = Arc<dyn Fn(&SessionEvent) + Send + Sync>;
type Listeners = Mutex<Vec<(u64, Listener)>>;

/// Registry of session change callbacks.
#[derive(Default)]
pub struct SessionHub {
    next_id: AtomicU64,
    listeners: Arc<Listeners>,
}

impl SessionHub {
    pub fn subscribe(
        &self,
        callback: impl Fn(&SessionEvent) + Send + Sync + 'static,
    ) -> SessionSubscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((id, Arc::new(callback)));

        SessionSubscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    pub fn notify(&self, event: &SessionEvent) {
        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .map(|(_, l)| l.clone())
            .collect();

        for listener in listeners {
            listener(event);
        }
    }
}

/// Keeps a session callback registered until dropped.
pub struct SessionSubscription {
    id: u64,
    listeners: Weak<Listeners>,
}

impl SessionSubscription {
    pub fn unsubscribe(self) {}
}

impl Drop for SessionSubscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .retain(|(id, _)| *id != self.id);
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub secret: String,
    pub session_days: i64,
    pub bcrypt_cost: u32,
    pub bootstrap_coordinators: Vec<String>,
}

impl From<&Config> for AuthSettings {
    fn from(c: &Config) -> Self {
        AuthSettings {
            secret: c.session_secret.clone(),
            session_days: c.session_days,
            bcrypt_cost: c.bcrypt_cost,
            bootstrap_coordinators: c
                .bootstrap_coordinators
                .iter()
                .map(|it| it.to_lowercase())
                .collect(),
        }
    }
}

pub struct Identity<'a> {
    portal: &'a Portal,
}

impl<'a> Identity<'a> {
    pub fn new(portal: &'a Portal) -> Identity<'a> {
        Identity { portal }
    }

    fn settings(&self) -> &AuthSettings {
        self.portal.auth()
    }

    fn open_session(&self, profile: User) -> ServiceResult<Session> {
        let principal = Principal::from(&profile);
        let token = SessionToken::new(&principal, self.settings().session_days);
        let encoded = token
            .encode_jwt(&self.settings().secret)
            .map_err(|e| {
                ServiceError::RemoteUnavailable(format!("unable to sign session: {}", e))
            })?;

        Ok(Session {
            principal,
            profile,
            token: encoded,
            expires_at: token.expires_at(),
        })
    }

    async fn email_taken(&self, email: &str) -> ServiceResult<bool> {
        let query = Query::new().eq("email", email).limit(1);
        Ok(!find::<User>(self.portal.store(), &query).await?.is_empty()
            || !find::<Credential>(self.portal.store(), &query).await?.is_empty())
    }

    /// Registers a new account, consuming its enrollment code.
    ///
    /// The code is consumed before the account is written. When the account
    /// write fails afterwards the code stays consumed and the user has to ask
    /// for a new one.
    pub async fn sign_up(&self, data: SignupData) -> ServiceResult<Session> {
        data.validate()?;
        let email = data.email.trim().to_lowercase();

        if self.email_taken(&email).await? {
            return Err(ServiceError::invalid("Email already registered."));
        }

        let password = hash_password(data.password.clone(), self.settings().bcrypt_cost).await?;

        let bootstrap = data.role == Role::Coordinator
            && self.settings().bootstrap_coordinators.contains(&email);
        let redeemed = if bootstrap {
            tracing::info!("registering bootstrap coordinator '{}'", email);
            None
        } else {
            let code = data
                .enrollment_code
                .as_deref()
                .map(str::trim)
                .filter(|it| !it.is_empty())
                .ok_or(ServiceError::InvalidOrUsedCode)?;
            let redemption = self.portal.enrollment().redeem(code, data.role).await?;
            Some((code.to_string(), redemption.matched_code_id))
        };

        let user = User {
            id: String::new(),
            email: email.clone(),
            display_name: data.display_name.trim().to_string(),
            phone: data.phone.clone(),
            role: data.role,
            enrollment_code: redeemed.as_ref().map(|(code, _)| code.clone()),
            enrollment_code_id: redeemed.as_ref().map(|(_, id)| id.clone()),
            registered_at: self.portal.now(),
            active: true,
        };

        let user = match self.create_account(user, password).await {
            Ok(user) => user,
            Err(e) => {
                if let Some((code, code_id)) = redeemed {
                    tracing::warn!(
                        "enrollment code '{}' ({}) was burned without creating '{}': {}",
                        code,
                        code_id,
                        email,
                        e
                    );
                }
                return Err(e);
            }
        };

        tracing::info!("registered {} '{}' ({})", user.role, user.id, user.email);
        let session = self.open_session(user)?;
        self.portal
            .sessions()
            .notify(&SessionEvent::SignedIn(session.principal.clone()));
        Ok(session)
    }

    async fn create_account(&self, mut user: User, password: PasswordHash) -> ServiceResult<User> {
        let store = self.portal.store();
        let id = store
            .insert_unique(
                User::COLLECTION,
                &[Predicate::eq("email", user.email.as_str())],
                to_document(&user)?,
            )
            .await?
            .ok_or_else(|| ServiceError::invalid("Email already registered."))?;
        user.id = id;

        let credential = Credential {
            id: String::new(),
            user_id: user.id.clone(),
            email: user.email.clone(),
            password,
        };
        let stored = store
            .insert_unique(
                Credential::COLLECTION,
                &[Predicate::eq("email", user.email.as_str())],
                to_document(&credential)?,
            )
            .await;

        match stored {
            Ok(Some(_)) => Ok(user),
            other => {
                if let Err(e) = store.delete(User::COLLECTION, &user.id).await {
                    tracing::error!("unable to remove orphaned profile '{}': {}", user.id, e);
                }
                match other {
                    Err(e) => Err(e.into()),
                    _ => Err(ServiceError::invalid("Email already registered.")),
                }
            }
        }
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> ServiceResult<Session> {
        let bad_login = || ServiceError::unauthorized("Bad email or password.");
        let email = email.trim().to_lowercase();

        // VULN: No throttling of repeated failed attempts.
        let credential = find::<Credential>(
            self.portal.store(),
            &Query::new().eq("email", email.as_str()).limit(1),
        )
        .await?
        .into_iter()
        .next()
        .ok_or_else(bad_login)?;

        if !verify_password(
            credential.password.clone(),
            password.to_string(),
            self.settings().bcrypt_cost,
        )
        .await?
        {
            return Err(bad_login());
        }

        let profile = fetch_optional::<User>(self.portal.store(), &credential.user_id)
            .await?
            .ok_or_else(bad_login)?;
        if !profile.active {
            return Err(ServiceError::unauthorized("Account is disabled."));
        }

        tracing::debug!("signed in '{}'", profile.id);
        let session = self.open_session(profile)?;
        self.portal
            .sessions()
            .notify(&SessionEvent::SignedIn(session.principal.clone()));
        Ok(session)
    }

    pub fn sign_out(&self, session: &Session) {
        tracing::debug!("signed out '{}'", session.principal.id);
        self.portal
            .sessions()
            .notify(&SessionEvent::SignedOut(session.principal.clone()));
    }

    /// Rebuilds a session from a previously issued token.
    pub async fn resume(&self, token: &str) -> ServiceResult<Session> {
        let claims = SessionToken::decode_jwt(token, &self.settings().secret)
            .map_err(|_| ServiceError::unauthorized("Session token is invalid or expired."))?;

        let profile = fetch_optional::<User>(self.portal.store(), &claims.sub)
            .await?
            .ok_or_else(|| ServiceError::unauthorized("Session user no longer exists."))?;
        if !profile.active {
            return Err(ServiceError::unauthorized("Account is disabled."));
        }

        Ok(Session {
            principal: Principal::from(&profile),
            profile,
            token: token.to_string(),
            expires_at: claims.expires_at(),
        })
    }

    /// Issues a reset token for the account registered under `email`.
    ///
    /// Unknown addresses succeed without issuing anything.
    /// The token is handed out only through a `ResetRequested` session event.
    pub async fn request_reset(&self, email: &str) -> ServiceResult<()> {
        let email = email.trim().to_lowercase();
        let credential = find::<Credential>(
            self.portal.store(),
            &Query::new().eq("email", email.as_str()).limit(1),
        )
        .await?
        .into_iter()
        .next();

        let credential = match credential {
            Some(it) => it,
            None => {
                tracing::debug!("ignoring password reset for unknown '{}'", email);
                return Ok(());
            }
        };

        let token = new_reset_token();
        let reset = PasswordReset {
            id: String::new(),
            user_id: credential.user_id.clone(),
            token_hash: token_digest(&token),
            expires_at: self.portal.now() + chrono::Duration::minutes(RESET_TOKEN_MINUTES),
            used: false,
        };
        create(self.portal.store(), &reset).await?;

        tracing::info!("issued password reset for '{}'", credential.user_id);
        self.portal
            .sessions()
            .notify(&SessionEvent::ResetRequested { email, token });
        Ok(())
    }

    /// Replaces the password of the account a reset token was issued for.
    ///
    /// The token is consumed even when it turns out to be expired.
    pub async fn reset_password(&self, token: &str, new_password: &str) -> ServiceResult<()> {
        let rejected = || ServiceError::unauthorized("Reset token is invalid or expired.");
        validate_password(new_password)?;

        let claimed = self
            .portal
            .store()
            .claim_one(
                PasswordReset::COLLECTION,
                &[
                    Predicate::eq("token_hash", token_digest(token)),
                    Predicate::eq("used", false),
                ],
                doc! { "used": true },
            )
            .await?
            .ok_or_else(rejected)?;
        let reset: PasswordReset = from_document(claimed)?;
        if reset.expires_at <= self.portal.now() {
            return Err(rejected());
        }

        let credential = find::<Credential>(
            self.portal.store(),
            &Query::new().eq("user_id", reset.user_id.as_str()).limit(1),
        )
        .await?
        .into_iter()
        .next()
        .ok_or_else(rejected)?;

        let password = hash_password(new_password.to_string(), self.settings().bcrypt_cost).await?;
        self.portal
            .store()
            .update(
                Credential::COLLECTION,
                &credential.id,
                doc! { "password": bson::to_bson(&password)? },
            )
            .await?;

        tracing::info!("password of '{}' was reset", reset.user_id);
        Ok(())
    }

    pub fn on_session_change(
        &self,
        callback: impl Fn(&SessionEvent) + Send + Sync + 'static,
    ) -> SessionSubscription {
        self.portal.sessions().subscribe(callback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{fetch, Page};
    use crate::portal::tests::{test_portal, Fixture};
    use crate::store::memory::tests::race;
    use crate::store::RecordStore;
    use mockable::Clock;
    use std::sync::atomic::AtomicUsize;

    fn signup(email: &str, role: Role, code: Option<&str>) -> SignupData {
        SignupData {
            email: email.to_string(),
            password: "correct horse".to_string(),
            display_name: "Ana Souza".to_string(),
            phone: None,
            role,
            enrollment_code: code.map(str::to_string),
        }
    }

    #[test]
    fn password_hashes_verify() {
        let hash = PasswordHash::new("s3cret-pass", 4);
        assert!(hash.verify("s3cret-pass", 4));
        assert!(!hash.verify("s3cret-pasS", 4));
        assert_ne!(hash, PasswordHash::new("s3cret-pass", 4));
    }

    #[test]
    fn signup_validation() {
        assert!(signup("ana@school.org", Role::Student, None).validate().is_ok());
        assert!(signup("ana.school.org", Role::Student, None).validate().is_err());

        let mut short = signup("ana@school.org", Role::Student, None);
        short.password = "short".to_string();
        assert!(matches!(short.validate(), Err(ServiceError::ValidationFailed(_))));
    }

    #[tokio::test]
    async fn code_gates_registration_by_role() {
        let Fixture { portal, coordinator, .. } = test_portal().await;
        let code = portal
            .enrollment()
            .issue(&coordinator, Role::Teacher)
            .await
            .expect("issue");
        assert!(code.code.starts_with("PROF"));

        let wrong_role = portal
            .identity()
            .sign_up(signup("s@school.org", Role::Student, Some(code.code.as_str())))
            .await;
        assert!(matches!(wrong_role, Err(ServiceError::InvalidOrUsedCode)));

        let session = portal
            .identity()
            .sign_up(signup("t@school.org", Role::Teacher, Some(code.code.as_str())))
            .await
            .expect("first registration succeeds");
        assert_eq!(session.principal.role, Role::Teacher);
        assert_eq!(session.profile.enrollment_code.as_deref(), Some(code.code.as_str()));
        assert_eq!(session.profile.enrollment_code_id.as_deref(), Some(code.id.as_str()));
        let stored: User = fetch(portal.store(), &session.profile.id).await.unwrap();
        assert_eq!(stored.enrollment_code_id, Some(code.id.clone()));

        let again = portal
            .identity()
            .sign_up(signup("t2@school.org", Role::Teacher, Some(code.code.as_str())))
            .await;
        assert!(matches!(again, Err(ServiceError::InvalidOrUsedCode)));

        let missing = portal
            .identity()
            .sign_up(signup("t3@school.org", Role::Teacher, None))
            .await;
        assert!(matches!(missing, Err(ServiceError::InvalidOrUsedCode)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_signups_consume_a_code_once() {
        let Fixture { portal, coordinator, .. } = test_portal().await;
        let code = portal
            .enrollment()
            .issue(&coordinator, Role::Student)
            .await
            .expect("issue");

        let portal = Arc::new(portal);
        let results = race(8, |i| {
            let portal = portal.clone();
            let data = signup(
                &format!("student{}@school.org", i),
                Role::Student,
                Some(code.code.as_str()),
            );
            async move { portal.identity().sign_up(data).await }
        })
        .await;

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, ServiceError::InvalidOrUsedCode)));
    }

    #[tokio::test]
    async fn sign_in_and_resume() {
        let Fixture { portal, .. } = test_portal().await;
        let events = Arc::new(AtomicUsize::new(0));
        let counter = events.clone();
        let subscription = portal.identity().on_session_change(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let registered = portal
            .identity()
            .sign_up(signup("admin@localhost", Role::Coordinator, None))
            .await
            .expect("bootstrap coordinator registers without code");

        let bad = portal.identity().sign_in("admin@localhost", "wrong password").await;
        assert!(matches!(bad, Err(ServiceError::Unauthorized(_))));

        let session = portal
            .identity()
            .sign_in("ADMIN@localhost", "correct horse")
            .await
            .expect("sign in");
        assert_eq!(session.principal, registered.principal);

        let resumed = portal.identity().resume(&session.token).await.expect("resume");
        assert_eq!(resumed.profile.id, registered.profile.id);
        assert!(portal.identity().resume("not-a-token").await.is_err());

        portal.identity().sign_out(&session);
        assert_eq!(events.load(Ordering::SeqCst), 3);

        subscription.unsubscribe();
        portal.identity().sign_out(&session);
        assert_eq!(events.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected_before_using_a_code() {
        let Fixture { portal, coordinator, .. } = test_portal().await;
        let first = portal.enrollment().issue(&coordinator, Role::Guardian).await.unwrap();
        let second = portal.enrollment().issue(&coordinator, Role::Guardian).await.unwrap();

        portal
            .identity()
            .sign_up(signup("g@school.org", Role::Guardian, Some(first.code.as_str())))
            .await
            .expect("registers");
        let duplicate = portal
            .identity()
            .sign_up(signup("G@school.org", Role::Guardian, Some(second.code.as_str())))
            .await;
        assert!(matches!(duplicate, Err(ServiceError::ValidationFailed(_))));

        let available = portal
            .enrollment()
            .list_available(&coordinator, Role::Guardian, Page::default())
            .await
            .unwrap();
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].code, second.code);
    }

    fn capture_reset_tokens(portal: &Portal) -> (SessionSubscription, Arc<Mutex<Vec<String>>>) {
        let tokens = Arc::new(Mutex::new(Vec::new()));
        let sink = tokens.clone();
        let subscription = portal.identity().on_session_change(move |event| {
            if let SessionEvent::ResetRequested { token, .. } = event {
                sink.lock().unwrap().push(token.clone());
            }
        });
        (subscription, tokens)
    }

    #[tokio::test]
    async fn reset_token_replaces_the_password_once() {
        let Fixture { portal, .. } = test_portal().await;
        let (_subscription, tokens) = capture_reset_tokens(&portal);
        portal
            .identity()
            .sign_up(signup("admin@localhost", Role::Coordinator, None))
            .await
            .expect("register");

        portal.identity().request_reset("nobody@school.org").await.expect("unknown");
        assert!(tokens.lock().unwrap().is_empty());

        portal.identity().request_reset(" Admin@localhost ").await.expect("request");
        let token = tokens.lock().unwrap().pop().expect("token delivered");

        let too_short = portal.identity().reset_password(&token, "short").await;
        assert!(matches!(too_short, Err(ServiceError::ValidationFailed(_))));

        portal
            .identity()
            .reset_password(&token, "battery staple")
            .await
            .expect("reset");
        let reused = portal.identity().reset_password(&token, "another pass").await;
        assert!(matches!(reused, Err(ServiceError::Unauthorized(_))));

        let old = portal.identity().sign_in("admin@localhost", "correct horse").await;
        assert!(matches!(old, Err(ServiceError::Unauthorized(_))));
        portal
            .identity()
            .sign_in("admin@localhost", "battery staple")
            .await
            .expect("new password works");
    }

    #[tokio::test]
    async fn reset_tokens_expire() {
        let Fixture { portal, clock, .. } = test_portal().await;
        let (_subscription, tokens) = capture_reset_tokens(&portal);
        portal
            .identity()
            .sign_up(signup("admin@localhost", Role::Coordinator, None))
            .await
            .expect("register");

        portal.identity().request_reset("admin@localhost").await.expect("request");
        let token = tokens.lock().unwrap().pop().expect("token delivered");
        let stored = portal
            .store()
            .query_many(PASSWORD_RESET_COLLECTION_NAME, &Query::new())
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
        assert_ne!(stored[0].get_str("token_hash").unwrap(), token);

        clock.set(clock.utc() + chrono::Duration::minutes(RESET_TOKEN_MINUTES));
        let expired = portal.identity().reset_password(&token, "battery staple").await;
        assert!(matches!(expired, Err(ServiceError::Unauthorized(_))));

        let wrong = portal.identity().reset_password("deadbeef", "battery staple").await;
        assert!(matches!(wrong, Err(ServiceError::Unauthorized(_))));
        portal
            .identity()
            .sign_in("admin@localhost", "correct horse")
            .await
            .expect("old password still works");
    }
}
