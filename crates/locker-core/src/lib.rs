//! # locker-core
//!
//! Document locker service built on `locker-crypto`.
//!
//! This crate provides:
//! - [`DocumentLocker`]: access-checked upload, download, listing and sharing
//! - Collaborator traits for blob storage, document records, identity and
//!   doctor assignments, with in-memory and filesystem implementations
//! - Error types with a generic outward classification
//! - Environment configuration and structured logging setup

pub mod blob_store;
pub mod config;
pub mod content_type;
pub mod error;
pub mod locker;
pub mod logging;
pub mod memory;
pub mod models;
pub mod traits;

// Re-export commonly used types
pub use blob_store::FilesystemBlobStore;
pub use config::LockerConfig;
pub use content_type::{detect_content_type, sanitize_filename};
pub use error::{Error, PublicFailure, Result};
pub use locker::DocumentLocker;
pub use memory::{
    InMemoryAssignments, InMemoryBlobStore, InMemoryDocumentStore, StaticIdentityProvider,
};
pub use models::{
    storage_path, AccessType, DoctorAssignment, DocumentSummary, Download, StoredDocument,
    UploadReceipt,
};
pub use traits::{BlobStore, DoctorAssignments, DocumentStore, IdentityProvider, VerifiedIdentity};

// Re-export the crypto crate for convenience
pub use locker_crypto;
