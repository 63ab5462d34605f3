//! Session and credential lifecycle
//!
//! One tracked slot per actor: issuing a new session supersedes any
//! prior one for the same actor. Operations on the same actor are
//! serialized through a per-slot mutex; different actors never contend.
//! The only background activity is the periodic expiry watch, a single
//! tokio interval task with idempotent start/stop.

use crate::error::Result;
use crate::role::{Namespace, Role};
use crate::storage::CredentialStore;
use crate::token::{Claims, TokenCodec, TokenRejection};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Session lifecycle state. `NONE` is the absence of a session; a
/// slot holding `None` or no slot at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Expired,
}

/// One authenticated actor's live credential.
#[derive(Debug, Clone)]
pub struct Session {
    pub actor_id: String,
    pub role: Role,
    pub namespace: Namespace,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub token: String,
    pub refresh_token: Option<String>,
    pub state: SessionState,
}

impl Session {
    fn from_claims(claims: Claims, token: &str) -> Self {
        Self {
            actor_id: claims.sub,
            role: claims.role,
            namespace: claims.ns,
            issued_at: DateTime::from_timestamp(claims.iat, 0).unwrap_or(DateTime::UNIX_EPOCH),
            expires_at: DateTime::from_timestamp(claims.exp, 0).unwrap_or(DateTime::UNIX_EPOCH),
            token: token.to_string(),
            refresh_token: None,
            state: SessionState::Active,
        }
    }
}

/// Why a credential failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidReason {
    /// No credential was presented.
    Missing,
    /// Past its validity window.
    Expired,
    /// Unparseable, unsigned, or wrong signature.
    Malformed,
    /// Structurally valid but superseded or invalidated.
    Revoked,
}

/// Outcome of [`SessionManager::validate`]. Invalid credentials are a
/// routine result, not an error.
#[derive(Debug, Clone)]
pub enum Validation {
    Valid(Session),
    Invalid(InvalidReason),
}

/// Outcome of [`SessionManager::renew`].
#[derive(Debug, Clone)]
pub enum Renewal {
    Renewed(Session),
    Rejected(InvalidReason),
}

/// Session timing policy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Credential validity window in seconds.
    pub ttl_seconds: i64,
    /// Window after expiry in which renewal is still permitted.
    pub grace_seconds: i64,
    /// Interval for the background expiry watch.
    pub watch_interval_seconds: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            ttl_seconds: 3600,
            grace_seconds: 300,
            watch_interval_seconds: 30,
        }
    }
}

/// Per-actor tracked state. `retire_at` is the latest expiry ever
/// issued for the actor; the slot stays in the map until that instant
/// (plus grace) passes, so revocation of not-yet-expired tokens
/// survives the session itself being taken down.
#[derive(Debug, Default)]
struct SlotState {
    session: Option<Session>,
    retire_at: Option<DateTime<Utc>>,
    evicted: bool,
}

impl SlotState {
    fn extend_retirement(&mut self, expires_at: DateTime<Utc>) {
        self.retire_at = Some(self.retire_at.map_or(expires_at, |at| at.max(expires_at)));
    }

    /// No live session and every token ever issued is past expiry and
    /// grace; nothing about this actor is worth remembering.
    fn retired(&self, now: DateTime<Utc>, grace: Duration) -> bool {
        let live = matches!(
            &self.session,
            Some(s) if s.state == SessionState::Active && now < s.expires_at
        );
        !live && self.retire_at.is_none_or(|at| now >= at + grace)
    }
}

type Slot = Arc<Mutex<SlotState>>;

/// Shared state reachable from both the request path and the expiry
/// watch task.
struct Inner {
    codec: Arc<dyn TokenCodec>,
    store: Arc<dyn CredentialStore>,
    settings: SessionSettings,
    slots: RwLock<HashMap<String, Slot>>,
}

impl Inner {
    fn storage_key(actor_id: &str) -> String {
        format!("opsgate/session/{actor_id}")
    }

    fn slot(&self, actor_id: &str) -> Slot {
        if let Some(slot) = self
            .slots
            .read()
            .expect("slot map lock poisoned")
            .get(actor_id)
        {
            return Arc::clone(slot);
        }
        let mut slots = self.slots.write().expect("slot map lock poisoned");
        Arc::clone(
            slots
                .entry(actor_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(SlotState::default()))),
        )
    }

    fn existing_slot(&self, actor_id: &str) -> Option<Slot> {
        self.slots
            .read()
            .expect("slot map lock poisoned")
            .get(actor_id)
            .cloned()
    }

    fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let grace = Duration::seconds(self.settings.grace_seconds);
        let snapshot: Vec<(String, Slot)> = self
            .slots
            .read()
            .expect("slot map lock poisoned")
            .iter()
            .map(|(actor, slot)| (actor.clone(), Arc::clone(slot)))
            .collect();

        let mut swept = 0;
        let mut retirable = Vec::new();
        for (actor_id, slot) in snapshot {
            let mut state = slot.lock().expect("session slot lock poisoned");
            if let Some(session) = state.session.as_mut() {
                if session.state == SessionState::Active && now >= session.expires_at {
                    session.state = SessionState::Expired;
                    if let Err(e) = self.store.remove(&Self::storage_key(&actor_id)) {
                        warn!(actor = %actor_id, error = %e, "failed to clear expired credential");
                    }
                    info!(actor = %actor_id, "session expired");
                    swept += 1;
                }
            }
            if state.retired(now, grace) {
                retirable.push(actor_id);
            }
        }

        if !retirable.is_empty() {
            let mut slots = self.slots.write().expect("slot map lock poisoned");
            for actor_id in retirable {
                let Some(slot) = slots.get(&actor_id).cloned() else {
                    continue;
                };
                // Re-check under the map lock; a concurrent issue may
                // have revived the slot since the sweep pass.
                let mut state = slot.lock().expect("session slot lock poisoned");
                if state.retired(now, grace) {
                    state.session = None;
                    state.evicted = true;
                    drop(state);
                    slots.remove(&actor_id);
                    debug!(actor = %actor_id, "session slot evicted");
                }
            }
        }
        swept
    }
}

/// Owns the lifecycle of every session: issuance, validation, renewal,
/// invalidation, and the background expiry watch.
pub struct SessionManager {
    inner: Arc<Inner>,
    watch: Mutex<Option<JoinHandle<()>>>,
}

impl SessionManager {
    pub fn new(
        codec: Arc<dyn TokenCodec>,
        store: Arc<dyn CredentialStore>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                codec,
                store,
                settings,
                slots: RwLock::new(HashMap::new()),
            }),
            watch: Mutex::new(None),
        }
    }

    /// Issue a new session for `actor_id`, superseding any prior one
    /// for that actor. The token is persisted to the credential store
    /// inside the same critical section, so in-memory and persisted
    /// state cannot stay inconsistent past this operation.
    pub fn issue(&self, actor_id: &str, role: Role, namespace: Namespace) -> Result<Session> {
        let now = Utc::now();
        let expires_at = now + Duration::seconds(self.inner.settings.ttl_seconds);
        let claims = Claims {
            sub: actor_id.to_string(),
            role,
            ns: namespace,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };
        let token = self.inner.codec.sign(&claims)?;
        let session = Session {
            actor_id: actor_id.to_string(),
            role,
            namespace,
            issued_at: now,
            expires_at,
            token: token.clone(),
            refresh_token: Some(Uuid::new_v4().to_string()),
            state: SessionState::Active,
        };

        loop {
            let slot = self.inner.slot(actor_id);
            let mut state = slot.lock().expect("session slot lock poisoned");
            // The expiry watch may have evicted this slot between the
            // map lookup and the lock; look it up again.
            if state.evicted {
                continue;
            }
            self.inner.store.set(&Inner::storage_key(actor_id), &token)?;
            state.session = Some(session.clone());
            state.extend_retirement(expires_at);
            break;
        }

        info!(actor = %actor_id, role = %role, namespace = %namespace, "session issued");
        Ok(session)
    }

    /// Verify a presented token and return the live session.
    ///
    /// Verification is stateless (signature plus expiry); when a
    /// tracked record exists for the actor it is additionally checked,
    /// so superseded and invalidated tokens are rejected even before
    /// their expiry.
    pub fn validate(&self, token: &str) -> Validation {
        let claims = match self.inner.codec.verify(token) {
            Ok(claims) => claims,
            Err(TokenRejection::Expired) => return Validation::Invalid(InvalidReason::Expired),
            Err(TokenRejection::Malformed) => return Validation::Invalid(InvalidReason::Malformed),
        };

        if let Some(slot) = self.inner.existing_slot(&claims.sub) {
            let guard = slot.lock().expect("session slot lock poisoned");
            return match guard.session.as_ref() {
                Some(session) if session.token != token => {
                    Validation::Invalid(InvalidReason::Revoked)
                }
                Some(session)
                    if session.state == SessionState::Expired
                        || Utc::now() >= session.expires_at =>
                {
                    Validation::Invalid(InvalidReason::Expired)
                }
                Some(session) => Validation::Valid(session.clone()),
                // The slot was invalidated; the token is out of service
                // even though its signature still verifies.
                None => Validation::Invalid(InvalidReason::Revoked),
            };
        }

        Validation::Valid(Session::from_claims(claims, token))
    }

    /// Renew the actor's session: extend expiry to `now + ttl` and
    /// rotate the token. Permitted while `now < expires_at + grace`.
    ///
    /// Idempotent under concurrency: a renew that would extend the
    /// window by less than a second returns the current session
    /// unchanged, so the second of two racing calls observes the
    /// first's result instead of rotating again.
    pub fn renew(&self, actor_id: &str) -> Result<Renewal> {
        let Some(slot) = self.inner.existing_slot(actor_id) else {
            return Ok(Renewal::Rejected(InvalidReason::Missing));
        };
        let mut guard = slot.lock().expect("session slot lock poisoned");
        let state = &mut *guard;
        let Some(session) = state.session.as_mut() else {
            return Ok(Renewal::Rejected(InvalidReason::Missing));
        };

        let now = Utc::now();
        let grace = Duration::seconds(self.inner.settings.grace_seconds);
        if now >= session.expires_at + grace {
            debug!(actor = %actor_id, "renewal rejected, grace period elapsed");
            return Ok(Renewal::Rejected(InvalidReason::Expired));
        }

        let target = now + Duration::seconds(self.inner.settings.ttl_seconds);
        if session.expires_at >= target - Duration::seconds(1) {
            return Ok(Renewal::Renewed(session.clone()));
        }

        let claims = Claims {
            sub: session.actor_id.clone(),
            role: session.role,
            ns: session.namespace,
            iat: now.timestamp(),
            exp: target.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };
        let token = self.inner.codec.sign(&claims)?;
        self.inner.store.set(&Inner::storage_key(actor_id), &token)?;

        session.token = token;
        session.expires_at = target;
        session.refresh_token = Some(Uuid::new_v4().to_string());
        session.state = SessionState::Active;
        let renewed = session.clone();
        state.extend_retirement(target);

        info!(actor = %actor_id, "session renewed");
        Ok(Renewal::Renewed(renewed))
    }

    /// Invalidate the actor's session and clear persisted credential
    /// material. Calling this when no session exists is a no-op.
    pub fn invalidate(&self, actor_id: &str) -> Result<()> {
        let Some(slot) = self.inner.existing_slot(actor_id) else {
            return Ok(());
        };
        let mut guard = slot.lock().expect("session slot lock poisoned");
        // `retire_at` stays behind as a revocation tombstone until the
        // expiry watch retires the slot.
        let had_session = guard.session.take().is_some();
        self.inner.store.remove(&Inner::storage_key(actor_id))?;
        if had_session {
            info!(actor = %actor_id, "session invalidated");
        }
        Ok(())
    }

    /// Read the persisted token for an actor, if any. The returned
    /// value is untrusted until it passes [`Self::validate`].
    pub fn stored_token(&self, actor_id: &str) -> Result<Option<String>> {
        Ok(self.inner.store.get(&Inner::storage_key(actor_id))?)
    }

    /// Run one expiry sweep: transition active sessions past their
    /// expiry to `Expired` and clear their persisted credentials.
    /// Slots whose every token is past expiry and grace are dropped
    /// from the map entirely; the stateless expiry check alone rejects
    /// their tokens from then on. Returns the number of sessions
    /// transitioned.
    pub fn sweep_expired(&self) -> usize {
        self.inner.sweep_expired()
    }

    /// Start the background expiry watch. Starting it while already
    /// running is a no-op.
    pub fn start_expiry_watch(&self) {
        let mut watch = self.watch.lock().expect("watch lock poisoned");
        if watch.is_some() {
            return;
        }
        let inner = Arc::clone(&self.inner);
        let interval =
            std::time::Duration::from_secs(self.inner.settings.watch_interval_seconds.max(1));
        *watch = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let swept = inner.sweep_expired();
                if swept > 0 {
                    debug!(swept, "expiry watch pass");
                }
            }
        }));
        debug!("expiry watch started");
    }

    /// Stop the background expiry watch. Stopping it while not running
    /// is a no-op.
    pub fn stop_expiry_watch(&self) {
        let mut watch = self.watch.lock().expect("watch lock poisoned");
        if let Some(handle) = watch.take() {
            handle.abort();
            debug!("expiry watch stopped");
        }
    }

    /// Whether the expiry watch is currently running.
    pub fn expiry_watch_running(&self) -> bool {
        self.watch.lock().expect("watch lock poisoned").is_some()
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.stop_expiry_watch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::token::JwtCodec;

    fn manager_with(settings: SessionSettings) -> (Arc<SessionManager>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let manager = Arc::new(SessionManager::new(
            Arc::new(JwtCodec::hs256(b"test-secret")),
            store.clone(),
            settings,
        ));
        (manager, store)
    }

    fn manager() -> (Arc<SessionManager>, Arc<MemoryStore>) {
        manager_with(SessionSettings::default())
    }

    #[test]
    fn issue_validate_roundtrip() {
        let (manager, store) = manager();
        let session = manager
            .issue("driver-7", Role::Driver, Namespace::Tenant)
            .unwrap();

        match manager.validate(&session.token) {
            Validation::Valid(validated) => {
                assert_eq!(validated.actor_id, "driver-7");
                assert_eq!(validated.role, Role::Driver);
                assert_eq!(validated.namespace, Namespace::Tenant);
            }
            Validation::Invalid(reason) => panic!("expected valid session, got {reason:?}"),
        }
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn issuing_supersedes_prior_session() {
        let (manager, _) = manager();
        let first = manager
            .issue("dispatcher-1", Role::Dispatcher, Namespace::Tenant)
            .unwrap();
        let second = manager
            .issue("dispatcher-1", Role::Dispatcher, Namespace::Tenant)
            .unwrap();

        assert!(matches!(
            manager.validate(&first.token),
            Validation::Invalid(InvalidReason::Revoked)
        ));
        assert!(matches!(
            manager.validate(&second.token),
            Validation::Valid(_)
        ));
    }

    #[test]
    fn invalidate_is_idempotent_and_revokes() {
        let (manager, store) = manager();
        let session = manager
            .issue("admin-1", Role::Admin, Namespace::Tenant)
            .unwrap();

        manager.invalidate("admin-1").unwrap();
        assert!(store.is_empty());
        assert!(matches!(
            manager.validate(&session.token),
            Validation::Invalid(InvalidReason::Revoked)
        ));

        // Second call sees no session; same terminal state, no error.
        manager.invalidate("admin-1").unwrap();
        assert!(store.is_empty());

        // Invalidating an actor that never had a session is a no-op.
        manager.invalidate("nobody").unwrap();
    }

    #[test]
    fn expired_token_fails_validation_despite_valid_signature() {
        let (manager, _) = manager_with(SessionSettings {
            ttl_seconds: -60,
            grace_seconds: 300,
            watch_interval_seconds: 30,
        });
        let session = manager
            .issue("driver-2", Role::Driver, Namespace::Tenant)
            .unwrap();
        assert!(matches!(
            manager.validate(&session.token),
            Validation::Invalid(InvalidReason::Expired)
        ));
    }

    #[test]
    fn renew_immediately_after_issue_is_idempotent() {
        let (manager, _) = manager();
        let session = manager
            .issue("client-1", Role::Client, Namespace::Tenant)
            .unwrap();

        let Renewal::Renewed(renewed) = manager.renew("client-1").unwrap() else {
            panic!("renewal rejected");
        };
        // Within the idempotence window nothing rotates.
        assert_eq!(renewed.token, session.token);
        assert_eq!(renewed.expires_at, session.expires_at);
    }

    #[test]
    fn renew_extends_and_rotates_after_time_passes() {
        let (manager, _) = manager();
        let session = manager
            .issue("client-2", Role::Client, Namespace::Tenant)
            .unwrap();

        std::thread::sleep(std::time::Duration::from_millis(1100));

        let Renewal::Renewed(renewed) = manager.renew("client-2").unwrap() else {
            panic!("renewal rejected");
        };
        assert_ne!(renewed.token, session.token);
        assert!(renewed.expires_at > session.expires_at);
        assert_ne!(renewed.refresh_token, session.refresh_token);

        // Old token is out of service after rotation.
        assert!(matches!(
            manager.validate(&session.token),
            Validation::Invalid(InvalidReason::Revoked)
        ));
        assert!(matches!(
            manager.validate(&renewed.token),
            Validation::Valid(_)
        ));
    }

    #[test]
    fn renew_outside_grace_is_rejected() {
        let (manager, _) = manager_with(SessionSettings {
            ttl_seconds: -600,
            grace_seconds: 60,
            watch_interval_seconds: 30,
        });
        manager
            .issue("driver-3", Role::Driver, Namespace::Tenant)
            .unwrap();

        assert!(matches!(
            manager.renew("driver-3").unwrap(),
            Renewal::Rejected(InvalidReason::Expired)
        ));
    }

    #[test]
    fn renew_without_session_is_rejected_as_missing() {
        let (manager, _) = manager();
        assert!(matches!(
            manager.renew("ghost").unwrap(),
            Renewal::Rejected(InvalidReason::Missing)
        ));
    }

    #[test]
    fn sweep_transitions_expired_sessions_and_clears_storage() {
        let (manager, store) = manager_with(SessionSettings {
            ttl_seconds: -1,
            grace_seconds: 300,
            watch_interval_seconds: 30,
        });
        manager
            .issue("driver-4", Role::Driver, Namespace::Tenant)
            .unwrap();
        assert_eq!(store.len(), 1);

        assert_eq!(manager.sweep_expired(), 1);
        assert!(store.is_empty());
        // A second sweep finds nothing left to transition.
        assert_eq!(manager.sweep_expired(), 0);
    }

    #[test]
    fn sweep_evicts_slots_once_all_tokens_are_past_grace() {
        let (manager, _) = manager_with(SessionSettings {
            ttl_seconds: -600,
            grace_seconds: 60,
            watch_interval_seconds: 30,
        });
        let session = manager
            .issue("driver-6", Role::Driver, Namespace::Tenant)
            .unwrap();

        assert_eq!(manager.sweep_expired(), 1);
        assert!(manager.inner.slots.read().unwrap().is_empty());

        // The stateless check alone still rejects the stale token.
        assert!(matches!(
            manager.validate(&session.token),
            Validation::Invalid(InvalidReason::Expired)
        ));
    }

    #[test]
    fn invalidated_slot_outlives_unexpired_tokens() {
        let (manager, _) = manager();
        let session = manager
            .issue("admin-3", Role::Admin, Namespace::Tenant)
            .unwrap();
        manager.invalidate("admin-3").unwrap();

        // The logged-out token's signature stays verifiable for the
        // full ttl, so the revocation tombstone must not be swept.
        manager.sweep_expired();
        assert_eq!(manager.inner.slots.read().unwrap().len(), 1);
        assert!(matches!(
            manager.validate(&session.token),
            Validation::Invalid(InvalidReason::Revoked)
        ));
    }

    #[test]
    fn racing_renews_converge_on_one_rotation() {
        let (manager, _) = manager();
        let session = manager
            .issue("driver-8", Role::Driver, Namespace::Tenant)
            .unwrap();

        // Get clear of the idempotence window so one racer rotates.
        std::thread::sleep(std::time::Duration::from_millis(1100));

        let a = {
            let manager = Arc::clone(&manager);
            std::thread::spawn(move || manager.renew("driver-8").unwrap())
        };
        let b = {
            let manager = Arc::clone(&manager);
            std::thread::spawn(move || manager.renew("driver-8").unwrap())
        };
        let (Renewal::Renewed(first), Renewal::Renewed(second)) =
            (a.join().unwrap(), b.join().unwrap())
        else {
            panic!("renewal rejected");
        };

        // One rotation happened; both racers observe the same
        // credential instead of stacking extensions.
        assert_eq!(first.token, second.token);
        assert_eq!(first.expires_at, second.expires_at);
        assert_ne!(first.token, session.token);
        assert!(matches!(
            manager.validate(&first.token),
            Validation::Valid(_)
        ));
    }

    #[tokio::test]
    async fn expiry_watch_is_idempotent_and_sweeps() {
        let (manager, store) = manager_with(SessionSettings {
            ttl_seconds: -1,
            grace_seconds: 300,
            watch_interval_seconds: 1,
        });
        manager
            .issue("driver-5", Role::Driver, Namespace::Tenant)
            .unwrap();
        assert_eq!(store.len(), 1);

        manager.start_expiry_watch();
        manager.start_expiry_watch(); // no-op
        assert!(manager.expiry_watch_running());

        // First tick fires immediately; give the task a moment to run.
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert!(store.is_empty());

        manager.stop_expiry_watch();
        manager.stop_expiry_watch(); // no-op
        assert!(!manager.expiry_watch_running());
    }

    #[test]
    fn stored_token_reads_back_persisted_credential() {
        let (manager, _) = manager();
        let session = manager
            .issue("admin-2", Role::Admin, Namespace::Tenant)
            .unwrap();
        assert_eq!(
            manager.stored_token("admin-2").unwrap(),
            Some(session.token)
        );
        assert_eq!(manager.stored_token("nobody").unwrap(), None);
    }
}
