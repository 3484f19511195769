//! Document locker service.
//!
//! Authenticates callers through the [`IdentityProvider`], seals uploads with
//! the [`EnvelopeCodec`], and serves downloads only after the access policy
//! grants them. Sealing and opening run on the blocking pool.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use locker_crypto::{
    base64_encode, decide, AccessContext, AccessDecision, DocumentMetadata, EnvelopeCodec, Role,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::DEFAULT_MAX_UPLOAD_BYTES;
use crate::content_type::{detect_content_type, sanitize_filename};
use crate::error::{Error, Result};
use crate::models::{
    storage_path, AccessType, DoctorAssignment, DocumentSummary, Download, StoredDocument,
    UploadReceipt,
};
use crate::traits::{BlobStore, DoctorAssignments, DocumentStore, IdentityProvider};

pub struct DocumentLocker {
    codec: EnvelopeCodec,
    blobs: Arc<dyn BlobStore>,
    documents: Arc<dyn DocumentStore>,
    identity: Arc<dyn IdentityProvider>,
    assignments: Arc<dyn DoctorAssignments>,
    max_upload_bytes: usize,
}

impl DocumentLocker {
    pub fn new(
        codec: EnvelopeCodec,
        blobs: Arc<dyn BlobStore>,
        documents: Arc<dyn DocumentStore>,
        identity: Arc<dyn IdentityProvider>,
        assignments: Arc<dyn DoctorAssignments>,
    ) -> Self {
        Self {
            codec,
            blobs,
            documents,
            identity,
            assignments,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    pub fn with_max_upload_bytes(mut self, max: usize) -> Self {
        self.max_upload_bytes = max;
        self
    }

    /// Verify `token` and build the caller's access context.
    pub async fn authenticate(&self, token: &str) -> Result<AccessContext> {
        let identity = self.identity.verify_token(token).await.map_err(|e| match e {
            Error::Unauthorized(_) => e,
            other => {
                warn!(error = %other, "Identity provider failure");
                Error::Unauthorized("token could not be verified".to_string())
            }
        })?;
        Ok(AccessContext::from_claims(
            identity.user_id,
            identity.role.as_deref(),
        ))
    }

    /// Encrypt and store a document on behalf of a patient.
    ///
    /// Only admins and doctors may upload. The blob is removed again if the
    /// record cannot be inserted.
    pub async fn upload(
        &self,
        uploader_token: &str,
        patient_email: &str,
        filename: &str,
        data: Vec<u8>,
    ) -> Result<UploadReceipt> {
        let ctx = self.authenticate(uploader_token).await?;
        if !matches!(ctx.role, Some(Role::Admin) | Some(Role::Doctor)) {
            debug!(role = ctx.role_label(), op = "upload", "Upload refused for role");
            return Err(Error::Forbidden("only admins and doctors may upload".to_string()));
        }
        if data.len() > self.max_upload_bytes {
            return Err(Error::InvalidInput(format!(
                "file exceeds the {} byte upload limit",
                self.max_upload_bytes
            )));
        }

        let owner_id = self
            .identity
            .user_id_by_email(patient_email)
            .await
            .map_err(|e| match e {
                Error::NotFound(_) => Error::InvalidInput("unknown patient email".to_string()),
                other => other,
            })?;

        let original_filename = sanitize_filename(filename);
        let size = data.len();
        let codec = self.codec.clone();
        let sealed = tokio::task::spawn_blocking(move || codec.seal(&data))
            .await
            .map_err(|e| Error::Internal(format!("seal task failed: {}", e)))??;

        let doc_id = Uuid::now_v7();
        let path = storage_path(&doc_id);
        self.blobs.write(&path, &sealed.payload.ciphertext).await?;

        let record = StoredDocument {
            doc_id,
            original_filename: original_filename.clone(),
            storage_path: path.clone(),
            wrapped_key: sealed.wrapped_key,
            nonce: base64_encode(&sealed.payload.nonce),
            uploaded_by: ctx.caller_id.clone(),
            created_at: Utc::now(),
            access: DocumentMetadata::owned_by(owner_id),
        };

        if let Err(e) = self.documents.insert(record).await {
            warn!(doc_id = %doc_id, error = %e, "Record insert failed, removing blob");
            if let Err(cleanup) = self.blobs.delete(&path).await {
                warn!(
                    doc_id = %doc_id,
                    storage_path = %path,
                    error = %cleanup,
                    "Orphaned blob left behind"
                );
            }
            return Err(e);
        }

        info!(doc_id = %doc_id, role = ctx.role_label(), size, "Document uploaded");
        Ok(UploadReceipt {
            doc_id,
            original_filename,
            size,
        })
    }

    /// Decrypt a document for the caller.
    pub async fn download(&self, token: &str, doc_id: Uuid) -> Result<Download> {
        let ctx = self.authenticate(token).await?;
        let doc = self
            .documents
            .get(doc_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("document {}", doc_id)))?;

        // Skip blob I/O for callers the codec would refuse anyway.
        if decide(&ctx, &doc.access) == AccessDecision::Denied {
            info!(doc_id = %doc_id, role = ctx.role_label(), "Download denied");
            return Err(Error::Forbidden("access denied".to_string()));
        }

        let ciphertext = self.blobs.read(&doc.storage_path).await.map_err(|e| {
            warn!(doc_id = %doc_id, error = %e, "Blob missing for document record");
            Error::Unavailable("ciphertext missing".to_string())
        })?;
        let payload = doc.payload(ciphertext)?;

        let codec = self.codec.clone();
        let wrapped_key = doc.wrapped_key.clone();
        let meta = doc.access.clone();
        let caller = ctx.clone();
        let data = tokio::task::spawn_blocking(move || {
            codec.open(&payload, &wrapped_key, &caller, &meta)
        })
        .await
        .map_err(|e| Error::Internal(format!("open task failed: {}", e)))??;

        let content_type = detect_content_type(&doc.original_filename, &data);
        info!(doc_id = %doc_id, role = ctx.role_label(), size = data.len(), "Document downloaded");
        Ok(Download {
            data,
            content_type,
            filename: doc.original_filename,
        })
    }

    /// Documents visible to the caller, tagged with how they became visible.
    ///
    /// Doctors see their assigned patients' documents first, then documents
    /// shared with them; a document reachable both ways is listed once as
    /// `assigned`. Results are ordered newest first.
    pub async fn list(&self, token: &str) -> Result<Vec<DocumentSummary>> {
        let ctx = self.authenticate(token).await?;

        let mut summaries: Vec<DocumentSummary> = match ctx.role {
            Some(Role::Admin) => self
                .documents
                .list_all()
                .await?
                .iter()
                .map(|d| DocumentSummary::from_document(d, AccessType::Admin))
                .collect(),
            Some(Role::Patient) => self
                .documents
                .list_by_owners(std::slice::from_ref(&ctx.caller_id))
                .await?
                .iter()
                .filter(|d| d.access.visible_to_patient)
                .map(|d| DocumentSummary::from_document(d, AccessType::Patient))
                .collect(),
            Some(Role::Doctor) => self.list_for_doctor(&ctx.caller_id).await?,
            None => {
                debug!(op = "list", "Listing refused without a known role");
                return Err(Error::Forbidden("unknown role".to_string()));
            }
        };

        summaries.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.doc_id.cmp(&b.doc_id))
        });
        debug!(role = ctx.role_label(), result_count = summaries.len(), "Listed documents");
        Ok(summaries)
    }

    async fn list_for_doctor(&self, doctor_id: &str) -> Result<Vec<DocumentSummary>> {
        let mut seen: HashMap<Uuid, DocumentSummary> = HashMap::new();

        let patients = self.assignments.assigned_patients(doctor_id).await?;
        if !patients.is_empty() {
            for doc in self.documents.list_by_owners(&patients).await? {
                seen.entry(doc.doc_id)
                    .or_insert_with(|| DocumentSummary::from_document(&doc, AccessType::Assigned));
            }
        }

        for doc in self.documents.list_shared_with(doctor_id).await? {
            seen.entry(doc.doc_id)
                .or_insert_with(|| DocumentSummary::from_document(&doc, AccessType::Shared));
        }

        Ok(seen.into_values().collect())
    }

    /// Show or hide a document from its patient.
    ///
    /// Admins may change any document; a doctor only one the policy
    /// currently lets them open.
    pub async fn set_patient_visibility(
        &self,
        token: &str,
        doc_id: Uuid,
        visible: bool,
    ) -> Result<()> {
        let ctx = self.authenticate(token).await?;
        if !matches!(ctx.role, Some(Role::Admin) | Some(Role::Doctor)) {
            return Err(Error::Forbidden(
                "only admins and doctors may change visibility".to_string(),
            ));
        }
        let doc = self
            .documents
            .get(doc_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("document {}", doc_id)))?;
        if decide(&ctx, &doc.access) == AccessDecision::Denied {
            info!(doc_id = %doc_id, role = ctx.role_label(), "Visibility change denied");
            return Err(Error::Forbidden("access denied".to_string()));
        }
        self.documents.set_visible_to_patient(doc_id, visible).await?;
        info!(doc_id = %doc_id, role = ctx.role_label(), visible, "Patient visibility changed");
        Ok(())
    }

    /// Add a user, found by email, to a document's share list.
    ///
    /// The caller must currently be able to open the document.
    pub async fn share(&self, token: &str, doc_id: Uuid, recipient_email: &str) -> Result<()> {
        let ctx = self.authenticate(token).await?;
        let doc = self
            .documents
            .get(doc_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("document {}", doc_id)))?;
        if decide(&ctx, &doc.access) == AccessDecision::Denied {
            info!(doc_id = %doc_id, role = ctx.role_label(), "Share denied");
            return Err(Error::Forbidden("access denied".to_string()));
        }

        let recipient = self
            .identity
            .user_id_by_email(recipient_email)
            .await
            .map_err(|e| match e {
                Error::NotFound(_) => Error::InvalidInput("unknown recipient email".to_string()),
                other => other,
            })?;
        self.documents.add_shared_with(doc_id, &recipient).await?;
        info!(doc_id = %doc_id, role = ctx.role_label(), "Document shared");
        Ok(())
    }

    /// Assign a patient to a doctor. Admins only.
    pub async fn assign_patient(
        &self,
        token: &str,
        doctor_email: &str,
        patient_email: &str,
    ) -> Result<()> {
        let ctx = self.authenticate(token).await?;
        if ctx.role != Some(Role::Admin) {
            return Err(Error::Forbidden("only admins may assign patients".to_string()));
        }
        let doctor_id = self.identity.user_id_by_email(doctor_email).await?;
        let patient_id = self.identity.user_id_by_email(patient_email).await?;
        self.assignments.assign(&doctor_id, &patient_id).await?;
        info!(op = "assign_patient", "Patient assigned to doctor");
        Ok(())
    }

    /// Every doctor to patients assignment. Admins only.
    pub async fn assignments(&self, token: &str) -> Result<Vec<DoctorAssignment>> {
        let ctx = self.authenticate(token).await?;
        if ctx.role != Some(Role::Admin) {
            return Err(Error::Forbidden("only admins may list assignments".to_string()));
        }
        let assignments = self.assignments.list_assignments().await?;
        debug!(result_count = assignments.len(), "Listed assignments");
        Ok(assignments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{
        InMemoryAssignments, InMemoryBlobStore, InMemoryDocumentStore, StaticIdentityProvider,
    };
    use locker_crypto::MasterKeyPair;
    use std::sync::OnceLock;

    fn codec() -> EnvelopeCodec {
        static KEYS: OnceLock<Arc<MasterKeyPair>> = OnceLock::new();
        let keys = KEYS.get_or_init(|| Arc::new(MasterKeyPair::generate(2048).unwrap()));
        EnvelopeCodec::new(keys.clone())
    }

    struct Fixture {
        locker: DocumentLocker,
        blobs: Arc<InMemoryBlobStore>,
        documents: Arc<InMemoryDocumentStore>,
    }

    async fn fixture() -> Fixture {
        let identity = Arc::new(StaticIdentityProvider::new());
        identity.add_user("admin-token", "admin@example.com", "a1", Some("ROLE_admin")).await;
        identity.add_user("doctor-token", "doc@example.com", "d1", Some("doctor")).await;
        identity.add_user("patient-token", "pat@example.com", "p1", Some("patient")).await;
        identity.add_user("nurse-token", "nurse@example.com", "n1", Some("nurse")).await;

        let blobs = Arc::new(InMemoryBlobStore::new());
        let documents = Arc::new(InMemoryDocumentStore::new());
        let locker = DocumentLocker::new(
            codec(),
            blobs.clone(),
            documents.clone(),
            identity,
            Arc::new(InMemoryAssignments::new()),
        );
        Fixture {
            locker,
            blobs,
            documents,
        }
    }

    #[tokio::test]
    async fn test_upload_then_patient_download() {
        let f = fixture().await;
        let receipt = f
            .locker
            .upload("doctor-token", "pat@example.com", "result.txt", b"all clear".to_vec())
            .await
            .unwrap();

        let stored = f.blobs.read(&storage_path(&receipt.doc_id)).await.unwrap();
        assert_ne!(stored, b"all clear");

        let download = f.locker.download("patient-token", receipt.doc_id).await.unwrap();
        assert_eq!(download.data, b"all clear");
        assert_eq!(download.content_type, "text/plain");
        assert_eq!(download.filename, "result.txt");
    }

    #[tokio::test]
    async fn test_patient_cannot_upload() {
        let f = fixture().await;
        let err = f
            .locker
            .upload("patient-token", "pat@example.com", "x.txt", b"x".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
        assert!(f.blobs.is_empty().await);
    }

    #[tokio::test]
    async fn test_upload_unknown_patient() {
        let f = fixture().await;
        let err = f
            .locker
            .upload("admin-token", "ghost@example.com", "x.txt", b"x".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_upload_size_limit() {
        let f = fixture().await;
        let locker = f.locker.with_max_upload_bytes(4);
        let err = locker
            .upload("admin-token", "pat@example.com", "x.txt", b"too long".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_invalid_token_is_unauthorized() {
        let f = fixture().await;
        let err = f.locker.list("forged").await.unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_hidden_document_is_forbidden_for_patient() {
        let f = fixture().await;
        let receipt = f
            .locker
            .upload("admin-token", "pat@example.com", "x.txt", b"x".to_vec())
            .await
            .unwrap();
        f.locker
            .set_patient_visibility("doctor-token", receipt.doc_id, false)
            .await
            .unwrap();

        let err = f.locker.download("patient-token", receipt.doc_id).await.unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
        assert!(f.locker.list("patient-token").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_document_is_not_found() {
        let f = fixture().await;
        let err = f.locker.download("admin-token", Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_tampered_blob_is_unavailable() {
        let f = fixture().await;
        let receipt = f
            .locker
            .upload("admin-token", "pat@example.com", "x.txt", b"x".to_vec())
            .await
            .unwrap();
        let path = storage_path(&receipt.doc_id);
        let mut blob = f.blobs.read(&path).await.unwrap();
        blob[0] ^= 1;
        f.blobs.write(&path, &blob).await.unwrap();

        let err = f.locker.download("admin-token", receipt.doc_id).await.unwrap_err();
        assert!(matches!(err, Error::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_visibility_change_requires_staff() {
        let f = fixture().await;
        let receipt = f
            .locker
            .upload("admin-token", "pat@example.com", "x.txt", b"x".to_vec())
            .await
            .unwrap();
        let err = f
            .locker
            .set_patient_visibility("patient-token", receipt.doc_id, false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
        let doc = f.documents.get(receipt.doc_id).await.unwrap().unwrap();
        assert!(doc.access.visible_to_patient);
    }

    #[tokio::test]
    async fn test_refused_doctor_cannot_hide_document_from_owner() {
        let f = fixture().await;
        let receipt = f
            .locker
            .upload("admin-token", "pat@example.com", "x.txt", b"x".to_vec())
            .await
            .unwrap();
        let mut doc = f.documents.get(receipt.doc_id).await.unwrap().unwrap();
        doc.access.visible_to_doctor = false;
        f.documents.put(doc).await;

        let err = f.locker.download("doctor-token", receipt.doc_id).await.unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
        let err = f
            .locker
            .set_patient_visibility("doctor-token", receipt.doc_id, false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));

        let download = f.locker.download("patient-token", receipt.doc_id).await.unwrap();
        assert_eq!(download.data, b"x");
    }

    #[tokio::test]
    async fn test_admin_changes_visibility_on_hidden_document() {
        let f = fixture().await;
        let receipt = f
            .locker
            .upload("admin-token", "pat@example.com", "x.txt", b"x".to_vec())
            .await
            .unwrap();
        let mut doc = f.documents.get(receipt.doc_id).await.unwrap().unwrap();
        doc.access.visible_to_doctor = false;
        f.documents.put(doc).await;

        f.locker
            .set_patient_visibility("admin-token", receipt.doc_id, false)
            .await
            .unwrap();
        let doc = f.documents.get(receipt.doc_id).await.unwrap().unwrap();
        assert!(!doc.access.visible_to_patient);
    }

    #[tokio::test]
    async fn test_assignments_admin_only() {
        let f = fixture().await;
        f.locker
            .assign_patient("admin-token", "doc@example.com", "pat@example.com")
            .await
            .unwrap();

        let listed = f.locker.assignments("admin-token").await.unwrap();
        assert_eq!(
            listed,
            vec![DoctorAssignment {
                doctor_id: "d1".to_string(),
                patient_ids: vec!["p1".to_string()],
            }]
        );

        for token in ["doctor-token", "patient-token", "nurse-token"] {
            let err = f.locker.assignments(token).await.unwrap_err();
            assert!(matches!(err, Error::Forbidden(_)), "{}", token);
        }
    }

    #[tokio::test]
    async fn test_unknown_role_cannot_list() {
        let f = fixture().await;
        let err = f.locker.list("nurse-token").await.unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
    }
}
