use phototriage::backend::{AssetBackend, AssetId, DeleteMode, DirectoryBackend};
use phototriage::config::TriageConfig;
use phototriage::decisions::{Decision, DecisionStore};
use phototriage::duplicates::GrouperConfig;
use phototriage::session::{ReviewSession, SessionError};
use phototriage::store::JsonFileStore;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

fn write(root: &Path, name: &str, content: &[u8]) {
    let path = root.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

#[test]
fn test_review_directory_library() {
    let library = tempdir().unwrap();
    let state = tempdir().unwrap();
    write(library.path(), "a.jpg", b"one");
    write(library.path(), "trip/b.heic", b"two");
    write(library.path(), "trip/c.png", b"three");
    write(library.path(), "clip.mov", b"video");
    write(library.path(), ".thumbnails/a.jpg", b"one");

    let backend = Arc::new(
        DirectoryBackend::new(library.path()).with_delete_mode(DeleteMode::Permanent),
    );
    let store_path = state.path().join("decisions.json");
    let store = DecisionStore::load(Box::new(JsonFileStore::open(&store_path).unwrap())).unwrap();
    let config = TriageConfig {
        batch_size: 9,
        ..TriageConfig::default()
    };

    let mut session =
        ReviewSession::open(backend.clone(), store, &config).unwrap();
    assert_eq!(session.universe().len(), 3);

    let batch = session.start_batch().unwrap().clone();
    assert_eq!(batch.len(), 3);
    let doomed = AssetId::from("trip/b.heic");
    for id in &batch {
        if *id == doomed {
            session.record_delete(id).unwrap();
        } else {
            session.record_keep(id).unwrap();
        }
    }
    session.complete_batch().unwrap();

    assert!(!library.path().join("trip/b.heic").exists());
    assert!(library.path().join("clip.mov").exists());

    // Restart: nothing left to review, decisions intact.
    let store = DecisionStore::load(Box::new(JsonFileStore::open(&store_path).unwrap())).unwrap();
    assert_eq!(store.status_of(&doomed), Decision::Deleted);
    let mut session =
        ReviewSession::open(backend, store, &config).unwrap();
    assert!(matches!(
        session.start_batch(),
        Err(SessionError::NoPhotosRemaining)
    ));
}

#[test]
fn test_directory_duplicates_through_session() {
    let library = tempdir().unwrap();
    write(library.path(), "a.jpg", b"same");
    write(library.path(), "copy/a.jpg", b"same");
    write(library.path(), "b.jpg", b"different");

    let backend = Arc::new(
        DirectoryBackend::new(library.path()).with_delete_mode(DeleteMode::Permanent),
    );
    let state = tempdir().unwrap();
    let store = DecisionStore::load(Box::new(
        JsonFileStore::open(&state.path().join("decisions.json")).unwrap(),
    ))
    .unwrap();
    let mut session =
        ReviewSession::open(backend.clone(), store, &TriageConfig::default())
            .unwrap();

    let report = session.find_duplicates(GrouperConfig::default()).unwrap();
    assert_eq!(report.groups.len(), 1);
    let group = &report.groups[0];
    let survivor = group.survivor().clone();
    let duplicate = group.deletion_candidates()[0].clone();

    let merged = session.merge_duplicates(&report.groups).unwrap();
    assert_eq!(merged.deleted, vec![duplicate.clone()]);
    assert!(backend.contains(&survivor));
    assert!(!backend.contains(&duplicate));
    assert_eq!(session.stats().deleted, 1);
}

#[test]
fn test_unlisted_root_is_an_error() {
    let dir = tempdir().unwrap();
    let backend = Arc::new(DirectoryBackend::new(&dir.path().join("missing")));
    let store = DecisionStore::load(Box::new(
        JsonFileStore::open(&dir.path().join("decisions.json")).unwrap(),
    ))
    .unwrap();

    let result = ReviewSession::open(backend, store, &TriageConfig::default());
    assert!(matches!(result, Err(SessionError::List(_))));
}
