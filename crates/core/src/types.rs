use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Operator population a credential belongs to. The two classes authenticate
/// independently and never share a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityClass {
    /// Business-unit operator scoped to a single tenant.
    Tenant,
    /// Cross-tenant platform super-operator.
    Platform,
}

impl IdentityClass {
    pub const ALL: [IdentityClass; 2] = [IdentityClass::Tenant, IdentityClass::Platform];

    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityClass::Tenant => "tenant",
            IdentityClass::Platform => "platform",
        }
    }
}

impl std::fmt::Display for IdentityClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted proof-of-session for one identity class. Immutable once written;
/// replaced wholesale on re-auth, deleted on sign-out or invalidation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub class: IdentityClass,
    /// Opaque token issued by the session authority.
    pub token: String,
    pub subject_id: Uuid,
    pub display_name: String,
    pub issued_at: DateTime<Utc>,
}

/// Account lifecycle status reported by the session authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectStatus {
    Active,
    Suspended,
    Disabled,
    Cancelled,
}

/// Subject record resolved by the session authority for a validated token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectRecord {
    pub subject_id: Uuid,
    pub display_name: String,
    pub email: Option<String>,
    /// Set for tenant operators; `None` for platform operators.
    pub tenant_id: Option<Uuid>,
    pub roles: Vec<String>,
    /// Required active-flag; a subject with `enabled == false` is treated as
    /// missing rather than inactive.
    pub enabled: bool,
    pub status: SubjectStatus,
}

/// The resolved, validated view of who is signed in right now. Held only in
/// coordinator memory; superseded on every successful re-validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentitySnapshot {
    pub class: IdentityClass,
    pub subject_id: Uuid,
    pub subject: SubjectRecord,
    pub resolved_at: DateTime<Utc>,
}
