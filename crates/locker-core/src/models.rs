//! Records persisted by the locker and values returned to callers.

use chrono::{DateTime, Utc};
use locker_crypto::{base64_decode, DocumentMetadata, EncryptedPayload, WrappedKey};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Blob path for a document's ciphertext, relative to the blob root.
pub fn storage_path(doc_id: &Uuid) -> String {
    format!("encrypted_files/{}", doc_id.as_hyphenated())
}

/// Document record: envelope parameters plus ownership and visibility.
///
/// The ciphertext itself lives in the blob store at `storage_path`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub doc_id: Uuid,
    pub original_filename: String,
    pub storage_path: String,
    pub wrapped_key: WrappedKey,
    /// Base64 of the 12-byte AES-GCM nonce.
    pub nonce: String,
    pub uploaded_by: String,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub access: DocumentMetadata,
}

impl StoredDocument {
    /// Rebuild the encrypted payload from this record and the fetched blob.
    ///
    /// A corrupt nonce makes the document unavailable, like any other
    /// integrity failure.
    pub fn payload(&self, ciphertext: Vec<u8>) -> Result<EncryptedPayload> {
        let nonce = base64_decode(&self.nonce)
            .map_err(|_| Error::Unavailable("stored nonce is not valid base64".to_string()))?;
        EncryptedPayload::from_parts(ciphertext, &nonce)
            .map_err(|_| Error::Unavailable("stored nonce has the wrong length".to_string()))
    }
}

/// How a caller came to see a document in a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessType {
    Admin,
    Patient,
    Assigned,
    Shared,
}

/// Listing entry. Carries no envelope material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub doc_id: Uuid,
    pub original_filename: String,
    pub owner_id: String,
    pub uploaded_by: String,
    pub created_at: DateTime<Utc>,
    pub visible_to_patient: bool,
    pub access_type: AccessType,
}

impl DocumentSummary {
    pub fn from_document(doc: &StoredDocument, access_type: AccessType) -> Self {
        Self {
            doc_id: doc.doc_id,
            original_filename: doc.original_filename.clone(),
            owner_id: doc.access.owner_id.clone(),
            uploaded_by: doc.uploaded_by.clone(),
            created_at: doc.created_at,
            visible_to_patient: doc.access.visible_to_patient,
            access_type,
        }
    }
}

/// Result of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadReceipt {
    pub doc_id: Uuid,
    pub original_filename: String,
    pub size: usize,
}

/// Patients assigned to one doctor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoctorAssignment {
    pub doctor_id: String,
    pub patient_ids: Vec<String>,
}

/// Decrypted document ready to be served.
#[derive(Clone)]
pub struct Download {
    pub data: Vec<u8>,
    pub content_type: String,
    pub filename: String,
}

impl Download {
    /// `Content-Disposition` value for serving inline.
    pub fn content_disposition(&self) -> String {
        format!("inline; filename=\"{}\"", self.filename.replace('"', "_"))
    }
}

impl std::fmt::Debug for Download {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Download")
            .field("size", &self.data.len())
            .field("content_type", &self.content_type)
            .field("filename", &self.filename)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use locker_crypto::base64_encode;

    fn document(nonce: String) -> StoredDocument {
        let doc_id = Uuid::new_v4();
        StoredDocument {
            doc_id,
            original_filename: "scan.pdf".to_string(),
            storage_path: storage_path(&doc_id),
            wrapped_key: WrappedKey::new("AAAA"),
            nonce,
            uploaded_by: "d1".to_string(),
            created_at: Utc::now(),
            access: DocumentMetadata::owned_by("p1"),
        }
    }

    #[test]
    fn test_storage_path_layout() {
        let id = Uuid::nil();
        assert_eq!(
            storage_path(&id),
            "encrypted_files/00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn test_payload_from_record() {
        let doc = document(base64_encode(&[7u8; 12]));
        let payload = doc.payload(vec![1, 2, 3]).unwrap();
        assert_eq!(payload.nonce, [7u8; 12]);
        assert_eq!(payload.ciphertext, vec![1, 2, 3]);
    }

    #[test]
    fn test_corrupt_nonce_is_unavailable() {
        let bad_base64 = document("***".to_string());
        assert!(matches!(bad_base64.payload(vec![]), Err(Error::Unavailable(_))));

        let short = document(base64_encode(&[0u8; 8]));
        assert!(matches!(short.payload(vec![]), Err(Error::Unavailable(_))));
    }

    #[test]
    fn test_record_serializes_flat() {
        let doc = document(base64_encode(&[0u8; 12]));
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["owner_id"], "p1");
        assert_eq!(json["visible_to_patient"], true);
        let back: StoredDocument = serde_json::from_value(json).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn test_access_type_labels() {
        assert_eq!(serde_json::to_string(&AccessType::Assigned).unwrap(), "\"assigned\"");
        assert_eq!(serde_json::to_string(&AccessType::Shared).unwrap(), "\"shared\"");
    }

    #[test]
    fn test_content_disposition_quotes() {
        let download = Download {
            data: vec![],
            content_type: "text/plain".to_string(),
            filename: "a\"b.txt".to_string(),
        };
        assert_eq!(download.content_disposition(), "inline; filename=\"a_b.txt\"");
        assert!(!format!("{:?}", download).contains("data:"));
    }
}
