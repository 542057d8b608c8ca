//! The session lifecycle coordinator — a single-consumer loop that owns the
//! authoritative "current identity" state. Every trigger (startup, sign-in,
//! sign-out, refresh, validation settle, push revocation, expiry tick) is an
//! event on one mailbox, so transitions serialize without locks.

use crate::revocation::{RevocationFeed, RevocationNotify, RevocationSignal, SubscriptionHandle};
use crate::store::CredentialStore;
use crate::validator::{validate_with_timeout, SessionValidator, ValidationError};
use console_core::config::SessionConfig;
use console_core::types::{Credential, IdentityClass, IdentitySnapshot};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Authoritative answer to "who is signed in right now".
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    /// No session. Callers may authenticate.
    Idle,
    /// A stored credential is being validated.
    Loading(IdentityClass),
    /// A validated identity is signed in.
    Active(IdentitySnapshot),
    /// Transient: a session or attempt was just torn down. The resting state
    /// observed through [`LifecycleCoordinator::state`] is Idle.
    Invalid(InvalidationReason),
}

/// Why a session (or an in-flight attempt) was torn down.
#[derive(Debug, Clone, PartialEq)]
pub enum InvalidationReason {
    /// The stored credential failed remote validation, or the check never
    /// settled before its deadline.
    Validation(ValidationError),
    /// The authority revoked the identity out-of-band.
    Revoked,
    /// The absolute session lifetime elapsed.
    Expired,
    /// An operator signed out, or signed in over a live session.
    SignedOut,
}

enum Event {
    Start,
    SignIn(Credential),
    SignOut,
    Refresh,
    ValidationSettled {
        epoch: u64,
        class: IdentityClass,
        result: Result<IdentitySnapshot, ValidationError>,
        is_refresh: bool,
    },
    Revoked {
        epoch: u64,
        signal: RevocationSignal,
    },
}

/// Handle to the coordinator loop. Cheap to clone; inject one per consumer
/// instead of reaching for ambient global state.
#[derive(Clone)]
pub struct LifecycleCoordinator {
    tx: mpsc::UnboundedSender<Event>,
    state_rx: watch::Receiver<SessionState>,
    events_tx: broadcast::Sender<SessionState>,
}

impl LifecycleCoordinator {
    /// Spawn the coordinator loop. The returned handle is the only mutation
    /// surface; every trigger is serialized through its mailbox.
    pub fn spawn(
        store: CredentialStore,
        validator: Arc<dyn SessionValidator>,
        feed: Arc<dyn RevocationFeed>,
        config: SessionConfig,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::Idle);
        let (events_tx, _) = broadcast::channel(64);

        let coordinator_loop = CoordinatorLoop {
            store,
            validator,
            feed,
            config,
            rx,
            self_tx: tx.clone(),
            state_tx,
            events_tx: events_tx.clone(),
            state: SessionState::Idle,
            epoch: 0,
            started: false,
            anchor: None,
            subscription: None,
            inflight: None,
        };
        tokio::spawn(coordinator_loop.run());

        Self {
            tx,
            state_rx,
            events_tx,
        }
    }

    /// Synchronous snapshot of the current state.
    pub fn state(&self) -> SessionState {
        self.state_rx.borrow().clone()
    }

    /// Every state transition in order, including the transient Invalid.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionState> {
        self.events_tx.subscribe()
    }

    /// Restore a session from storage, if one exists. Idempotent; invoked
    /// once at process init.
    pub fn start(&self) {
        self.send(Event::Start);
    }

    /// Persist a freshly issued credential and load it. Signing in over a
    /// live session tears that session down first.
    pub fn sign_in(&self, credential: Credential) {
        self.send(Event::SignIn(credential));
    }

    /// Tear down the current session or in-flight attempt. Idempotent; safe
    /// when already idle.
    pub fn sign_out(&self) {
        self.send(Event::SignOut);
    }

    /// Re-validate the active session. Ignored unless a session is active.
    pub fn refresh(&self) {
        self.send(Event::Refresh);
    }

    fn send(&self, event: Event) {
        if self.tx.send(event).is_err() {
            warn!("Session coordinator loop is gone; event dropped");
        }
    }
}

struct CoordinatorLoop {
    store: CredentialStore,
    validator: Arc<dyn SessionValidator>,
    feed: Arc<dyn RevocationFeed>,
    config: SessionConfig,
    rx: mpsc::UnboundedReceiver<Event>,
    self_tx: mpsc::UnboundedSender<Event>,
    state_tx: watch::Sender<SessionState>,
    events_tx: broadcast::Sender<SessionState>,
    state: SessionState,
    /// Epoch of the current attempt/session. Async completions carry the
    /// epoch they were issued under; a mismatch means they are stale.
    epoch: u64,
    started: bool,
    /// Absolute-expiry anchor. Set on the first Active transition of a
    /// session, never re-anchored by re-validation.
    anchor: Option<Instant>,
    subscription: Option<SubscriptionHandle>,
    inflight: Option<JoinHandle<()>>,
}

impl CoordinatorLoop {
    async fn run(mut self) {
        let mut poll =
            tokio::time::interval(Duration::from_secs(self.config.expiry_poll_secs.max(1)));
        poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(
            poll_secs = self.config.expiry_poll_secs,
            expiry_hours = self.config.absolute_expiry_hours,
            "Session coordinator started"
        );

        loop {
            tokio::select! {
                maybe_event = self.rx.recv() => match maybe_event {
                    Some(event) => self.handle(event).await,
                    None => break,
                },
                _ = poll.tick() => self.check_expiry(),
            }
        }
        info!("Session coordinator stopped");
    }

    async fn handle(&mut self, event: Event) {
        match event {
            Event::Start => {
                if self.started {
                    debug!("start() called again; ignoring");
                    return;
                }
                self.started = true;
                match self.store.active_class() {
                    Some(class) => self.begin_loading(class),
                    None => info!("No stored credential; session idle"),
                }
            }

            Event::SignIn(credential) => {
                self.started = true;
                // A live session (or in-flight load) ends before the new
                // credential takes over; from Idle this is a no-op.
                self.invalidate(InvalidationReason::SignedOut);
                info!(
                    class = %credential.class,
                    subject_id = %credential.subject_id,
                    "Credential signed in"
                );
                self.store.save(&credential);
                match self.store.active_class() {
                    Some(class) => self.begin_loading(class),
                    None => warn!("Signed-in credential unreadable; session idle"),
                }
            }

            Event::SignOut => self.invalidate(InvalidationReason::SignedOut),

            Event::Refresh => {
                let class = match &self.state {
                    SessionState::Active(snapshot) => snapshot.class,
                    _ => {
                        warn!("refresh() outside an active session; ignoring");
                        return;
                    }
                };
                if self.inflight.is_some() {
                    debug!("Validation already in flight; refresh ignored");
                    return;
                }
                match self.store.load(class) {
                    Some(credential) => self.spawn_validation(credential, true),
                    None => {
                        // The credential vanished underneath the session.
                        warn!(class = %class, "Stored credential gone during refresh");
                        self.invalidate(InvalidationReason::Validation(
                            ValidationError::SubjectMissing,
                        ));
                    }
                }
            }

            Event::ValidationSettled {
                epoch,
                class,
                result,
                is_refresh,
            } => {
                if epoch != self.epoch {
                    debug!(class = %class, "Stale validation result discarded");
                    return;
                }
                self.inflight = None;
                match result {
                    Ok(snapshot) => self.activate(snapshot, is_refresh).await,
                    Err(error) => {
                        warn!(class = %class, error = %error, "Session validation failed");
                        metrics::counter!("session.validation_failures").increment(1);
                        self.invalidate(InvalidationReason::Validation(error));
                    }
                }
            }

            Event::Revoked { epoch, signal } => {
                if epoch != self.epoch || !matches!(self.state, SessionState::Active(_)) {
                    debug!("Redundant revocation discarded");
                    return;
                }
                info!(
                    class = %signal.class,
                    subject_id = %signal.subject_id,
                    reason = ?signal.reason,
                    "Identity revoked by authority"
                );
                self.invalidate(InvalidationReason::Revoked);
            }
        }
    }

    /// Enter Loading for `class` and race the validator against its deadline.
    fn begin_loading(&mut self, class: IdentityClass) {
        match self.store.load(class) {
            Some(credential) => {
                self.epoch += 1;
                self.set_state(SessionState::Loading(class));
                self.spawn_validation(credential, false);
            }
            None => {
                warn!(class = %class, "Stored credential unreadable; session idle");
                self.set_state(SessionState::Idle);
            }
        }
    }

    fn spawn_validation(&mut self, credential: Credential, is_refresh: bool) {
        let epoch = self.epoch;
        let class = credential.class;
        let timeout = Duration::from_secs(self.config.validate_timeout_secs);
        let validator = Arc::clone(&self.validator);
        let tx = self.self_tx.clone();

        self.inflight = Some(tokio::spawn(async move {
            let result = validate_with_timeout(validator.as_ref(), &credential, timeout).await;
            let _ = tx.send(Event::ValidationSettled {
                epoch,
                class,
                result,
                is_refresh,
            });
        }));
    }

    async fn activate(&mut self, snapshot: IdentitySnapshot, is_refresh: bool) {
        if is_refresh {
            info!(subject_id = %snapshot.subject_id, "Session re-validated");
            self.set_state(SessionState::Active(snapshot));
            // The expiry anchor and subscription survive a refresh.
            return;
        }

        self.anchor = Some(Instant::now());
        match self.feed.subscribe(&snapshot, self.notify_callback()).await {
            Ok(handle) => self.subscription = Some(handle),
            Err(error) => {
                // Expiry and explicit sign-out still bound the session.
                warn!(error = %error, "Revocation subscription failed");
            }
        }
        info!(
            class = %snapshot.class,
            subject_id = %snapshot.subject_id,
            "Session active"
        );
        metrics::counter!("session.activations").increment(1);
        self.set_state(SessionState::Active(snapshot));
    }

    fn notify_callback(&self) -> RevocationNotify {
        let tx = self.self_tx.clone();
        let epoch = self.epoch;
        Box::new(move |signal| {
            let _ = tx.send(Event::Revoked { epoch, signal });
        })
    }

    fn check_expiry(&mut self) {
        if !matches!(self.state, SessionState::Active(_)) {
            return;
        }
        let Some(anchor) = self.anchor else { return };
        let lifetime = Duration::from_secs(self.config.absolute_expiry_hours * 3600);
        if anchor.elapsed() >= lifetime {
            info!(
                elapsed_secs = anchor.elapsed().as_secs(),
                "Absolute session lifetime reached"
            );
            self.invalidate(InvalidationReason::Expired);
        }
    }

    /// The single teardown path for every trigger: cancel the in-flight
    /// validation, tear down the subscription, clear the implicated
    /// credential, publish the transient Invalid, and rest at Idle. Calling
    /// it with no live session is a no-op, so racing triggers collapse to
    /// one execution.
    fn invalidate(&mut self, reason: InvalidationReason) {
        let class = match &self.state {
            SessionState::Loading(class) => *class,
            SessionState::Active(snapshot) => snapshot.class,
            SessionState::Idle | SessionState::Invalid(_) => {
                debug!("No live session to invalidate");
                return;
            }
        };

        self.epoch += 1;
        if let Some(task) = self.inflight.take() {
            task.abort();
        }
        if let Some(handle) = self.subscription.take() {
            handle.unsubscribe();
        }
        self.anchor = None;
        self.store.clear(class);

        info!(class = %class, reason = ?reason, "Session invalidated");
        metrics::counter!("session.invalidations").increment(1);
        self.set_state(SessionState::Invalid(reason));
        self.set_state(SessionState::Idle);
    }

    fn set_state(&mut self, next: SessionState) {
        if self.state == next {
            return;
        }
        self.state = next.clone();
        let _ = self.state_tx.send(next.clone());
        let _ = self.events_tx.send(next);
    }
}
