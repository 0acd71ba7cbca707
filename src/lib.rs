//! phototriage - Photo Library Triage Engine
//!
//! Reviews a photo library in random batches of keep/delete decisions,
//! finds byte-identical duplicates by content fingerprint (BLAKE3), and
//! merges them down to one survivor per group. Decisions are persisted
//! write-through, so a review can be resumed at any time.
//!
//! The engine is presentation-agnostic: photo storage and decision storage
//! are injected through the [`backend::AssetBackend`] and
//! [`store::PersistenceStore`] traits.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use phototriage::backend::MemoryBackend;
//! use phototriage::config::TriageConfig;
//! use phototriage::decisions::DecisionStore;
//! use phototriage::duplicates::GrouperConfig;
//! use phototriage::error::StructuredError;
//! use phototriage::progress::Progress;
//! use phototriage::session::ReviewSession;
//! use phototriage::store::MemoryStore;
//!
//! let backend = Arc::new(MemoryBackend::new());
//! backend.insert("IMG_0001", b"pixels".to_vec());
//! backend.insert("IMG_0002", b"pixels".to_vec());
//!
//! let config = TriageConfig::default();
//! let store = DecisionStore::load(Box::new(MemoryStore::new())).unwrap();
//! let mut session = ReviewSession::open(backend, store, &config).unwrap();
//!
//! // Pass `false` to draw a progress bar on the terminal.
//! let progress = Arc::new(Progress::new(true));
//! let scan = GrouperConfig::from(&config).with_progress_callback(progress);
//! let report = session.find_duplicates(scan).unwrap();
//! let merged = session.merge_duplicates(&report.groups).unwrap();
//! assert_eq!(merged.deleted.len(), 1);
//!
//! let batch = session.start_batch().unwrap().clone();
//! for id in &batch {
//!     session.record_keep(id).unwrap();
//! }
//! session.complete_batch().unwrap();
//!
//! // Errors map to stable codes for the presentation layer.
//! let done = session.start_batch().unwrap_err();
//! let rendered = StructuredError::from(&done);
//! assert_eq!(rendered.code, "PT000");
//! assert!(!rendered.fault);
//! ```

pub mod backend;
pub mod batch;
pub mod cancel;
pub mod config;
pub mod decisions;
pub mod duplicates;
pub mod error;
pub mod fingerprint;
pub mod logging;
pub mod progress;
pub mod session;
pub mod store;
