//! Collaborator traits for the document locker.
//!
//! The locker never talks to a concrete database, object store or identity
//! service; it is handed implementations of these traits.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{DoctorAssignment, StoredDocument};

/// Storage backend for ciphertext blobs.
///
/// Allows abstracting over filesystem, S3, or other storage providers.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write data to the specified path, replacing any previous content.
    async fn write(&self, path: &str, data: &[u8]) -> Result<()>;

    /// Read data from the specified path. Missing blobs are `NotFound`.
    async fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Delete data at the specified path. Deleting a missing blob succeeds.
    async fn delete(&self, path: &str) -> Result<()>;

    /// Check if data exists at the specified path.
    async fn exists(&self, path: &str) -> Result<bool>;
}

/// Repository for document records.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a new record. Fails if the id already exists.
    async fn insert(&self, doc: StoredDocument) -> Result<()>;

    async fn get(&self, doc_id: Uuid) -> Result<Option<StoredDocument>>;

    async fn list_all(&self) -> Result<Vec<StoredDocument>>;

    /// Records owned by any of `owner_ids`.
    async fn list_by_owners(&self, owner_ids: &[String]) -> Result<Vec<StoredDocument>>;

    /// Records whose share list contains `user_id`.
    async fn list_shared_with(&self, user_id: &str) -> Result<Vec<StoredDocument>>;

    /// Update the patient visibility flag. Missing records are `NotFound`.
    async fn set_visible_to_patient(&self, doc_id: Uuid, visible: bool) -> Result<()>;

    /// Add `user_id` to the share list. Missing records are `NotFound`.
    async fn add_shared_with(&self, doc_id: Uuid, user_id: &str) -> Result<()>;

    async fn delete(&self, doc_id: Uuid) -> Result<()>;
}

/// Identity asserted by a verified token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub user_id: String,
    /// Raw role claim, if the token carried one.
    pub role: Option<String>,
}

/// External identity service.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Verify a bearer token. Invalid or expired tokens are `Unauthorized`.
    async fn verify_token(&self, token: &str) -> Result<VerifiedIdentity>;

    /// Resolve a user id from an email address. Unknown emails are `NotFound`.
    async fn user_id_by_email(&self, email: &str) -> Result<String>;
}

/// Doctor to patient assignments maintained by administrators.
#[async_trait]
pub trait DoctorAssignments: Send + Sync {
    async fn assigned_patients(&self, doctor_id: &str) -> Result<Vec<String>>;

    /// Add a patient to a doctor's list. Assigning twice is a no-op.
    async fn assign(&self, doctor_id: &str, patient_id: &str) -> Result<()>;

    /// Every doctor with at least one patient, ordered by doctor id.
    async fn list_assignments(&self) -> Result<Vec<DoctorAssignment>>;
}
