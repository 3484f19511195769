//! Access decision evaluated before any key is unwrapped.
//!
//! ## Rules
//!
//! | Role | Grants decryption when |
//! |------|------------------------|
//! | `Admin` | always |
//! | `Patient` | caller owns the document and it is visible to patients |
//! | `Doctor` | caller is on the allow-list, or the document is visible to doctors |
//! | none | never |
//!
//! The doctor rule is an OR: with the default `visible_to_doctor = true`
//! every doctor may decrypt and the allow-list only matters once the flag is
//! cleared. This is current policy; tightening it to an AND is a tracked
//! hardening candidate.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Caller roles known to the locker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Doctor,
    Patient,
}

impl Role {
    /// Parse a role label from the identity provider.
    ///
    /// Labels match exactly: lowercase, untrimmed, optionally behind the
    /// `ROLE_` authority prefix. Anything else yields `None`.
    pub fn parse(label: &str) -> Option<Role> {
        match label.strip_prefix("ROLE_").unwrap_or(label) {
            "admin" => Some(Role::Admin),
            "doctor" => Some(Role::Doctor),
            "patient" => Some(Role::Patient),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Doctor => "doctor",
            Role::Patient => "patient",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authenticated caller for a single request. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessContext {
    pub caller_id: String,
    /// `None` when the identity carried no role or an unrecognized one.
    pub role: Option<Role>,
}

impl AccessContext {
    pub fn new(caller_id: impl Into<String>, role: Role) -> Self {
        Self {
            caller_id: caller_id.into(),
            role: Some(role),
        }
    }

    /// Build a context from the identity provider's raw role label.
    pub fn from_claims(caller_id: impl Into<String>, role_label: Option<&str>) -> Self {
        Self {
            caller_id: caller_id.into(),
            role: role_label.and_then(Role::parse),
        }
    }

    /// Role label for logs; never includes the caller id.
    pub fn role_label(&self) -> &'static str {
        self.role.map(|r| r.as_str()).unwrap_or("none")
    }
}

fn default_true() -> bool {
    true
}

/// Ownership and visibility of a stored document. Read-only to the policy.
///
/// Missing visibility flags decode as `true`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    #[serde(alias = "ownerUid")]
    pub owner_id: String,
    #[serde(default = "default_true", alias = "isVisibleToPatient")]
    pub visible_to_patient: bool,
    #[serde(default = "default_true", alias = "isVisibleToDoctor")]
    pub visible_to_doctor: bool,
    #[serde(default, alias = "allowedDoctorUids")]
    pub explicitly_allowed_doctor_ids: BTreeSet<String>,
    #[serde(default, alias = "sharedWith")]
    pub shared_with_ids: BTreeSet<String>,
}

impl DocumentMetadata {
    /// Metadata for a new document with default visibility.
    pub fn owned_by(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            visible_to_patient: true,
            visible_to_doctor: true,
            explicitly_allowed_doctor_ids: BTreeSet::new(),
            shared_with_ids: BTreeSet::new(),
        }
    }
}

/// Why access was granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grant {
    Admin,
    Owner,
    DoctorAllowList,
    DoctorVisibility,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Granted(Grant),
    Denied,
}

impl AccessDecision {
    pub fn is_granted(&self) -> bool {
        matches!(self, AccessDecision::Granted(_))
    }
}

/// Evaluate the policy and report the reason for a grant.
pub fn decide(ctx: &AccessContext, meta: &DocumentMetadata) -> AccessDecision {
    match ctx.role {
        Some(Role::Admin) => AccessDecision::Granted(Grant::Admin),
        Some(Role::Patient) => {
            if ctx.caller_id == meta.owner_id && meta.visible_to_patient {
                AccessDecision::Granted(Grant::Owner)
            } else {
                AccessDecision::Denied
            }
        }
        Some(Role::Doctor) => {
            if meta.explicitly_allowed_doctor_ids.contains(&ctx.caller_id) {
                AccessDecision::Granted(Grant::DoctorAllowList)
            } else if meta.visible_to_doctor {
                AccessDecision::Granted(Grant::DoctorVisibility)
            } else {
                AccessDecision::Denied
            }
        }
        None => AccessDecision::Denied,
    }
}

/// Whether `ctx` may decrypt the document described by `meta`.
pub fn can_decrypt(ctx: &AccessContext, meta: &DocumentMetadata) -> bool {
    decide(ctx, meta).is_granted()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(owner: &str) -> DocumentMetadata {
        DocumentMetadata::owned_by(owner)
    }

    #[test]
    fn admin_always_granted() {
        let ctx = AccessContext::new("a1", Role::Admin);
        let mut m = meta("p1");
        m.visible_to_patient = false;
        m.visible_to_doctor = false;
        assert_eq!(decide(&ctx, &m), AccessDecision::Granted(Grant::Admin));
    }

    #[test]
    fn patient_owner_visible() {
        let ctx = AccessContext::new("p1", Role::Patient);
        assert!(can_decrypt(&ctx, &meta("p1")));
    }

    #[test]
    fn patient_owner_hidden() {
        let ctx = AccessContext::new("p1", Role::Patient);
        let mut m = meta("p1");
        m.visible_to_patient = false;
        assert!(!can_decrypt(&ctx, &m));
    }

    #[test]
    fn patient_not_owner() {
        let ctx = AccessContext::new("p1", Role::Patient);
        assert!(!can_decrypt(&ctx, &meta("p2")));
    }

    #[test]
    fn patient_not_rescued_by_share_list() {
        let ctx = AccessContext::new("p1", Role::Patient);
        let mut m = meta("p2");
        m.shared_with_ids.insert("p1".into());
        assert!(!can_decrypt(&ctx, &m));
    }

    #[test]
    fn doctor_on_allow_list_with_flag_cleared() {
        let ctx = AccessContext::new("d1", Role::Doctor);
        let mut m = meta("p1");
        m.explicitly_allowed_doctor_ids.insert("d1".into());
        m.visible_to_doctor = false;
        assert_eq!(decide(&ctx, &m), AccessDecision::Granted(Grant::DoctorAllowList));
    }

    #[test]
    fn doctor_by_visibility_flag() {
        let ctx = AccessContext::new("d2", Role::Doctor);
        assert_eq!(
            decide(&ctx, &meta("p1")),
            AccessDecision::Granted(Grant::DoctorVisibility)
        );
    }

    #[test]
    fn doctor_denied_when_hidden_and_not_listed() {
        let ctx = AccessContext::new("d2", Role::Doctor);
        let mut m = meta("p1");
        m.explicitly_allowed_doctor_ids.insert("d1".into());
        m.visible_to_doctor = false;
        assert!(!can_decrypt(&ctx, &m));
    }

    #[test]
    fn unknown_role_denied() {
        let ctx = AccessContext::from_claims("n1", Some("nurse"));
        assert_eq!(ctx.role, None);
        assert!(!can_decrypt(&ctx, &meta("n1")));
    }

    #[test]
    fn missing_role_denied() {
        let ctx = AccessContext::from_claims("p1", None);
        assert!(!can_decrypt(&ctx, &meta("p1")));
    }

    #[test]
    fn role_parse() {
        assert_eq!(Role::parse("admin"), Some(Role::Admin));
        assert_eq!(Role::parse("doctor"), Some(Role::Doctor));
        assert_eq!(Role::parse("ROLE_patient"), Some(Role::Patient));
        assert_eq!(Role::parse("ROLE_admin"), Some(Role::Admin));
        assert_eq!(Role::parse("ROLE_"), None);
        assert_eq!(Role::parse("nurse"), None);
        assert_eq!(Role::parse(""), None);
    }

    #[test]
    fn role_parse_is_exact() {
        for label in [
            "Admin",
            "ADMIN",
            " admin",
            "admin ",
            " ADMIN ",
            "role_admin",
            "role_Admin",
            "Role_admin",
            "ROLE_Admin",
            "DOCTOR",
            "Patient",
        ] {
            assert_eq!(Role::parse(label), None, "{:?}", label);
        }
    }

    #[test]
    fn near_miss_admin_labels_denied() {
        let mut m = meta("p1");
        m.visible_to_patient = false;
        m.visible_to_doctor = false;
        for label in ["Admin", " admin", " ADMIN ", "role_admin", "role_Admin"] {
            let ctx = AccessContext::from_claims("x", Some(label));
            assert_eq!(ctx.role, None, "{:?}", label);
            assert_eq!(decide(&ctx, &m), AccessDecision::Denied, "{:?}", label);
        }
    }

    #[test]
    fn metadata_defaults_are_permissive() {
        let m: DocumentMetadata = serde_json::from_str(r#"{"owner_id":"p1"}"#).unwrap();
        assert!(m.visible_to_patient);
        assert!(m.visible_to_doctor);
        assert!(m.explicitly_allowed_doctor_ids.is_empty());
    }

    #[test]
    fn metadata_accepts_document_store_field_names() {
        let m: DocumentMetadata = serde_json::from_str(
            r#"{"ownerUid":"p1","isVisibleToPatient":false,"allowedDoctorUids":["d1"]}"#,
        )
        .unwrap();
        assert_eq!(m.owner_id, "p1");
        assert!(!m.visible_to_patient);
        assert!(m.explicitly_allowed_doctor_ids.contains("d1"));
    }

    #[test]
    fn role_label_hides_caller() {
        let ctx = AccessContext::from_claims("secret-uid", Some("nurse"));
        assert_eq!(ctx.role_label(), "none");
    }
}
