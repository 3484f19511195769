//! In-memory collaborators for tests and local runs.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{DoctorAssignment, StoredDocument};
use crate::traits::{
    BlobStore, DoctorAssignments, DocumentStore, IdentityProvider, VerifiedIdentity,
};

#[derive(Debug, Default)]
pub struct InMemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        self.blobs
            .write()
            .await
            .insert(path.to_string(), data.to_vec());
        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        self.blobs
            .read()
            .await
            .get(path)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("blob {}", path)))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.blobs.write().await.remove(path);
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.blobs.read().await.contains_key(path))
    }
}

#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    docs: RwLock<HashMap<Uuid, StoredDocument>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a record wholesale. Used to seed share lists and allow-lists.
    pub async fn put(&self, doc: StoredDocument) {
        self.docs.write().await.insert(doc.doc_id, doc);
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn insert(&self, doc: StoredDocument) -> Result<()> {
        let mut docs = self.docs.write().await;
        if docs.contains_key(&doc.doc_id) {
            return Err(Error::Storage(format!("document {} already exists", doc.doc_id)));
        }
        docs.insert(doc.doc_id, doc);
        Ok(())
    }

    async fn get(&self, doc_id: Uuid) -> Result<Option<StoredDocument>> {
        Ok(self.docs.read().await.get(&doc_id).cloned())
    }

    async fn list_all(&self) -> Result<Vec<StoredDocument>> {
        Ok(self.docs.read().await.values().cloned().collect())
    }

    async fn list_by_owners(&self, owner_ids: &[String]) -> Result<Vec<StoredDocument>> {
        Ok(self
            .docs
            .read()
            .await
            .values()
            .filter(|d| owner_ids.contains(&d.access.owner_id))
            .cloned()
            .collect())
    }

    async fn list_shared_with(&self, user_id: &str) -> Result<Vec<StoredDocument>> {
        Ok(self
            .docs
            .read()
            .await
            .values()
            .filter(|d| d.access.shared_with_ids.contains(user_id))
            .cloned()
            .collect())
    }

    async fn set_visible_to_patient(&self, doc_id: Uuid, visible: bool) -> Result<()> {
        let mut docs = self.docs.write().await;
        let doc = docs
            .get_mut(&doc_id)
            .ok_or_else(|| Error::NotFound(format!("document {}", doc_id)))?;
        doc.access.visible_to_patient = visible;
        Ok(())
    }

    async fn add_shared_with(&self, doc_id: Uuid, user_id: &str) -> Result<()> {
        let mut docs = self.docs.write().await;
        let doc = docs
            .get_mut(&doc_id)
            .ok_or_else(|| Error::NotFound(format!("document {}", doc_id)))?;
        doc.access.shared_with_ids.insert(user_id.to_string());
        Ok(())
    }

    async fn delete(&self, doc_id: Uuid) -> Result<()> {
        self.docs.write().await.remove(&doc_id);
        Ok(())
    }
}

/// Identity provider backed by fixed token and email tables.
#[derive(Debug, Default)]
pub struct StaticIdentityProvider {
    tokens: RwLock<HashMap<String, VerifiedIdentity>>,
    emails: RwLock<HashMap<String, String>>,
}

impl StaticIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user reachable by `token` and `email`.
    pub async fn add_user(&self, token: &str, email: &str, user_id: &str, role: Option<&str>) {
        self.tokens.write().await.insert(
            token.to_string(),
            VerifiedIdentity {
                user_id: user_id.to_string(),
                role: role.map(str::to_string),
            },
        );
        self.emails
            .write()
            .await
            .insert(email.to_ascii_lowercase(), user_id.to_string());
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn verify_token(&self, token: &str) -> Result<VerifiedIdentity> {
        self.tokens
            .read()
            .await
            .get(token)
            .cloned()
            .ok_or_else(|| Error::Unauthorized("invalid token".to_string()))
    }

    async fn user_id_by_email(&self, email: &str) -> Result<String> {
        self.emails
            .read()
            .await
            .get(&email.trim().to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| Error::NotFound("no user with that email".to_string()))
    }
}

#[derive(Debug, Default)]
pub struct InMemoryAssignments {
    assignments: RwLock<BTreeMap<String, BTreeSet<String>>>,
}

impl InMemoryAssignments {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DoctorAssignments for InMemoryAssignments {
    async fn assigned_patients(&self, doctor_id: &str) -> Result<Vec<String>> {
        Ok(self
            .assignments
            .read()
            .await
            .get(doctor_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn assign(&self, doctor_id: &str, patient_id: &str) -> Result<()> {
        self.assignments
            .write()
            .await
            .entry(doctor_id.to_string())
            .or_default()
            .insert(patient_id.to_string());
        Ok(())
    }

    async fn list_assignments(&self) -> Result<Vec<DoctorAssignment>> {
        Ok(self
            .assignments
            .read()
            .await
            .iter()
            .map(|(doctor_id, patients)| DoctorAssignment {
                doctor_id: doctor_id.clone(),
                patient_ids: patients.iter().cloned().collect(),
            })
            .collect())
    }
}
