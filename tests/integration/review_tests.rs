use phototriage::backend::{AssetBackend, AssetId, AssetKind, MemoryBackend};
use phototriage::config::TriageConfig;
use phototriage::decisions::{Decision, DecisionStore};
use phototriage::session::{ReviewSession, SessionError, SessionState};
use phototriage::store::{JsonFileStore, MemoryStore};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashSet;
use std::sync::Arc;
use tempfile::tempdir;

fn library(n: usize) -> Arc<MemoryBackend> {
    let backend = Arc::new(MemoryBackend::new());
    for i in 0..n {
        backend.insert(
            format!("IMG_{:04}", i),
            format!("photo {}", i).into_bytes(),
        );
    }
    backend
}

fn config(batch_size: usize) -> TriageConfig {
    TriageConfig {
        batch_size,
        ..TriageConfig::default()
    }
}

fn open_session(backend: &Arc<MemoryBackend>, store: DecisionStore, batch_size: usize) -> ReviewSession {
    ReviewSession::open(backend.clone(), store, &config(batch_size)).unwrap()
}

#[test]
fn test_review_whole_library() {
    let backend = library(20);
    let store = DecisionStore::load(Box::new(MemoryStore::new())).unwrap();
    let mut session = open_session(&backend, store, 9);
    let mut rng = StdRng::seed_from_u64(11);

    let mut presented = HashSet::new();
    let mut batches = 0;
    loop {
        let batch = match session.start_batch_with_rng(&mut rng) {
            Ok(batch) => batch.clone(),
            Err(SessionError::NoPhotosRemaining) => break,
            Err(e) => panic!("unexpected error: {}", e),
        };
        assert!(batch.len() <= 9);
        for (i, id) in batch.iter().enumerate() {
            assert!(presented.insert(id.clone()), "{} presented twice", id);
            if i % 3 == 0 {
                session.record_delete(id).unwrap();
            } else {
                session.record_keep(id).unwrap();
            }
        }
        session.complete_batch().unwrap();
        batches += 1;
    }

    assert_eq!(batches, 3);
    assert_eq!(presented.len(), 20);
    let stats = session.stats();
    assert_eq!(stats.kept + stats.deleted, 20);
    assert_eq!(stats.undecided, 0);
    assert_eq!(backend.len(), stats.kept);
    assert_eq!(session.state(), SessionState::Idle);
}

#[test]
fn test_undecided_assets_return_after_reset() {
    let backend = library(4);
    let store = DecisionStore::load(Box::new(MemoryStore::new())).unwrap();
    let mut session = open_session(&backend, store, 9);

    let batch = session.start_batch().unwrap().clone();
    assert_eq!(batch.len(), 4);
    session.record_keep(&batch.ids()[0]).unwrap();
    session.complete_batch().unwrap();

    assert!(matches!(
        session.start_batch(),
        Err(SessionError::NoPhotosRemaining)
    ));

    session.reset_universe().unwrap();
    let again = session.start_batch().unwrap().clone();
    assert_eq!(again.len(), 3);
    assert!(!again.contains(&batch.ids()[0]));
}

#[test]
fn test_kept_then_deleted_overwrites() {
    let backend = library(1);
    let store = DecisionStore::load(Box::new(MemoryStore::new())).unwrap();
    let mut session = open_session(&backend, store, 1);
    let id = AssetId::from("IMG_0000");

    session.start_batch().unwrap();
    session.record_keep(&id).unwrap();
    assert_eq!(session.store().status_of(&id), Decision::Kept);

    session.record_delete(&id).unwrap();
    assert_eq!(session.store().status_of(&id), Decision::Deleted);
    assert!(!session.store().kept().contains(&id));
    assert!(!backend.contains(&id));
}

#[test]
fn test_failed_delete_keeps_asset_reviewable() {
    let backend = library(2);
    backend.reject_deletes("photo library is read-only");
    let store = DecisionStore::load(Box::new(MemoryStore::new())).unwrap();
    let mut session = open_session(&backend, store, 2);

    let batch = session.start_batch().unwrap().clone();
    let id = &batch.ids()[0];
    assert!(matches!(
        session.record_delete(id),
        Err(SessionError::BackendDelete(_))
    ));
    assert_eq!(session.store().status_of(id), Decision::Undecided);
    assert!(backend.contains(id));

    backend.accept_deletes();
    assert!(session.record_delete(id).unwrap());
    assert_eq!(session.store().status_of(id), Decision::Deleted);
}

#[test]
fn test_decisions_survive_restart() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("decisions.json");
    let backend = library(6);

    let decided: Vec<AssetId> = {
        let store = DecisionStore::load(Box::new(JsonFileStore::open(&path).unwrap())).unwrap();
        let mut session = open_session(&backend, store, 3);
        let batch = session.start_batch().unwrap().clone();
        session.record_keep(&batch.ids()[0]).unwrap();
        session.record_delete(&batch.ids()[1]).unwrap();
        session.complete_batch().unwrap();
        batch.ids()[..2].to_vec()
    };

    let store = DecisionStore::load(Box::new(JsonFileStore::open(&path).unwrap())).unwrap();
    assert_eq!(store.status_of(&decided[0]), Decision::Kept);
    assert_eq!(store.status_of(&decided[1]), Decision::Deleted);

    let mut session = open_session(&backend, store, 9);
    // The deleted asset is gone from the backend; the kept one is decided.
    assert_eq!(session.universe().len(), 5);
    let batch = session.start_batch().unwrap().clone();
    assert_eq!(batch.len(), 4);
    assert!(!batch.contains(&decided[0]));
}

#[test]
fn test_batches_are_random() {
    let backend = library(30);
    let mut seen_batches = HashSet::new();

    for _ in 0..10 {
        let store = DecisionStore::load(Box::new(MemoryStore::new())).unwrap();
        let mut session = open_session(&backend, store, 9);
        let mut ids = session.start_batch().unwrap().clone().into_ids();
        ids.sort();
        seen_batches.insert(ids);
    }

    // C(30, 9) possible batches; ten identical draws are practically impossible.
    assert!(seen_batches.len() > 1);
}

#[test]
fn test_session_lists_requested_kind() {
    let backend = Arc::new(MemoryBackend::new());
    backend.insert("IMG_0001", b"photo".to_vec());
    backend.insert_asset(AssetId::from("MOV_0001"), b"video".to_vec(), AssetKind::Video, None);
    let store = DecisionStore::load(Box::new(MemoryStore::new())).unwrap();

    let session = ReviewSession::open(backend.clone(), store, &TriageConfig::default()).unwrap();
    assert_eq!(session.universe(), &[AssetId::from("IMG_0001")]);

    let all = backend.list_assets(AssetKind::Any).unwrap();
    assert_eq!(all.len(), 2);
}

#[test]
fn test_session_kind_comes_from_config() {
    let backend = Arc::new(MemoryBackend::new());
    backend.insert("IMG_0001", b"photo".to_vec());
    backend.insert_asset(AssetId::from("MOV_0001"), b"video".to_vec(), AssetKind::Video, None);

    let videos = TriageConfig {
        asset_kind: AssetKind::Video,
        ..TriageConfig::default()
    };
    let store = DecisionStore::load(Box::new(MemoryStore::new())).unwrap();
    let session = ReviewSession::open(backend.clone(), store, &videos).unwrap();
    assert_eq!(session.universe(), &[AssetId::from("MOV_0001")]);

    let everything = TriageConfig {
        asset_kind: AssetKind::Any,
        ..TriageConfig::default()
    };
    let store = DecisionStore::load(Box::new(MemoryStore::new())).unwrap();
    let session = ReviewSession::open(backend, store, &everything).unwrap();
    assert_eq!(session.universe().len(), 2);
}

#[test]
fn test_clear_records_makes_everything_reviewable() {
    let backend = library(3);
    let store = DecisionStore::load(Box::new(MemoryStore::new())).unwrap();
    let mut session = open_session(&backend, store, 3);

    let batch = session.start_batch().unwrap().clone();
    for id in &batch {
        session.record_keep(id).unwrap();
    }
    session.complete_batch().unwrap();
    assert_eq!(session.stats().undecided, 0);

    session.store_mut().clear().unwrap();
    session.reset_universe().unwrap();
    assert_eq!(session.stats().undecided, 3);
    assert_eq!(session.start_batch().unwrap().len(), 3);
}
