//! End-to-end lifecycle flow over the public API: file-backed credential
//! store, in-process revocation feed, and a scripted validator.

use async_trait::async_trait;
use chrono::Utc;
use console_core::config::SessionConfig;
use console_core::types::{
    Credential, IdentityClass, IdentitySnapshot, SubjectRecord, SubjectStatus,
};
use console_session::coordinator::{LifecycleCoordinator, SessionState};
use console_session::revocation::{InProcessRevocationFeed, RevocationSignal};
use console_session::store::CredentialStore;
use console_session::validator::{SessionValidator, ValidationError};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

struct AlwaysValid;

#[async_trait]
impl SessionValidator for AlwaysValid {
    async fn validate(
        &self,
        credential: &Credential,
    ) -> Result<IdentitySnapshot, ValidationError> {
        Ok(IdentitySnapshot {
            class: credential.class,
            subject_id: credential.subject_id,
            subject: SubjectRecord {
                subject_id: credential.subject_id,
                display_name: credential.display_name.clone(),
                email: None,
                tenant_id: (credential.class == IdentityClass::Tenant).then(Uuid::new_v4),
                roles: vec!["admin".into()],
                enabled: true,
                status: SubjectStatus::Active,
            },
            resolved_at: Utc::now(),
        })
    }
}

fn credential(class: IdentityClass) -> Credential {
    Credential {
        class,
        token: format!("issued-{class}"),
        subject_id: Uuid::new_v4(),
        display_name: "Operator".into(),
        issued_at: Utc::now(),
    }
}

async fn wait_active(coordinator: &LifecycleCoordinator) -> IdentitySnapshot {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(30);
    loop {
        if let SessionState::Active(snapshot) = coordinator.state() {
            return snapshot;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "session never became active"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

async fn wait_idle(coordinator: &LifecycleCoordinator) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(30);
    while coordinator.state() != SessionState::Idle {
        assert!(
            tokio::time::Instant::now() < deadline,
            "session never settled to idle"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test(start_paused = true)]
async fn sign_in_revoke_and_restart_flow() {
    let dir = tempfile::tempdir().unwrap();
    let store = CredentialStore::file(dir.path());
    let feed = Arc::new(InProcessRevocationFeed::new());
    let coordinator = LifecycleCoordinator::spawn(
        store.clone(),
        Arc::new(AlwaysValid),
        feed.clone(),
        SessionConfig::default(),
    );

    // Cold start with nothing persisted.
    coordinator.start();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(coordinator.state(), SessionState::Idle);

    // Tenant operator signs in; the credential lands on disk.
    coordinator.sign_in(credential(IdentityClass::Tenant));
    let snapshot = wait_active(&coordinator).await;
    assert_eq!(snapshot.class, IdentityClass::Tenant);
    assert!(store.load(IdentityClass::Tenant).is_some());
    assert_eq!(feed.subscriber_count(), 1);

    // The tenant is suspended upstream; the push signal signs the console out.
    feed.emit(RevocationSignal {
        class: IdentityClass::Tenant,
        subject_id: snapshot.subject_id,
        reason: Some("tenant suspended".into()),
    });
    wait_idle(&coordinator).await;
    assert!(store.load(IdentityClass::Tenant).is_none());

    // A platform operator signs in on the same console.
    coordinator.sign_in(credential(IdentityClass::Platform));
    let snapshot = wait_active(&coordinator).await;
    assert_eq!(snapshot.class, IdentityClass::Platform);

    // Process restart: a fresh coordinator over the same directory restores
    // the persisted platform session without a new sign-in.
    let restarted = LifecycleCoordinator::spawn(
        CredentialStore::file(dir.path()),
        Arc::new(AlwaysValid),
        Arc::new(InProcessRevocationFeed::new()),
        SessionConfig::default(),
    );
    restarted.start();
    let snapshot = wait_active(&restarted).await;
    assert_eq!(snapshot.class, IdentityClass::Platform);

    // Sign-out clears the store for good.
    restarted.sign_out();
    wait_idle(&restarted).await;
    assert!(CredentialStore::file(dir.path())
        .load(IdentityClass::Platform)
        .is_none());
}
