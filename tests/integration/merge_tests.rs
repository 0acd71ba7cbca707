use phototriage::backend::{AssetBackend, AssetId, DeleteMode, DirectoryBackend, MemoryBackend};
use phototriage::decisions::{Decision, DecisionError, DecisionStore, ReassignPolicy};
use phototriage::error::{ErrorCode, StructuredError};
use phototriage::duplicates::{merge_duplicates, DuplicateGrouper, GrouperConfig, MergeError};
use phototriage::store::{JsonFileStore, MemoryStore, PersistenceStore, DELETED_KEY};
use std::collections::BTreeSet;
use std::fs;
use std::sync::Arc;
use tempfile::tempdir;

fn ids(values: &[&str]) -> Vec<AssetId> {
    values.iter().map(|v| AssetId::from(*v)).collect()
}

#[test]
fn test_scan_then_merge_keeps_one_copy_per_group() {
    let backend = Arc::new(MemoryBackend::new());
    for (id, content) in [
        ("A", "sunset"),
        ("B", "beach"),
        ("C", "sunset"),
        ("D", "beach"),
        ("E", "sunset"),
        ("F", "unique"),
    ] {
        backend.insert(id, content.as_bytes().to_vec());
    }
    let mut store = DecisionStore::load(Box::new(MemoryStore::new())).unwrap();
    let input = ids(&["A", "B", "C", "D", "E", "F"]);

    let report = DuplicateGrouper::new(backend.clone(), GrouperConfig::default())
        .group_undecided(&input, &store)
        .unwrap();
    assert_eq!(report.groups.len(), 2);

    let merged = merge_duplicates(&report.groups, &*backend, &mut store).unwrap();

    assert_eq!(merged.groups_merged, 2);
    assert_eq!(merged.deleted, ids(&["C", "E", "D"]));
    assert_eq!(backend.delete_calls(), 1);
    assert_eq!(backend.len(), 3);
    for survivor in ids(&["A", "B", "F"]) {
        assert!(backend.contains(&survivor));
        assert_eq!(store.status_of(&survivor), Decision::Undecided);
    }

    // A second scan finds nothing left to merge.
    let rescan = DuplicateGrouper::new(backend.clone(), GrouperConfig::default())
        .group_undecided(&input, &store)
        .unwrap();
    assert!(rescan.is_empty());
}

#[test]
fn test_merge_respects_decisions_made_after_scan() {
    let backend = Arc::new(MemoryBackend::new());
    for id in ["A", "B", "C"] {
        backend.insert(id, b"same".to_vec());
    }
    let mut store = DecisionStore::load(Box::new(MemoryStore::new()))
        .unwrap()
        .with_policy(ReassignPolicy::Reject);

    let report = DuplicateGrouper::new(backend.clone(), GrouperConfig::default())
        .group_undecided(&ids(&["A", "B", "C"]), &store)
        .unwrap();

    // User keeps B between the scan and the merge.
    store.decide(&AssetId::from("B"), Decision::Kept).unwrap();

    let merged = merge_duplicates(&report.groups, &*backend, &mut store).unwrap();
    assert_eq!(merged.deleted, ids(&["C"]));
    assert_eq!(merged.exempt, ids(&["B"]));
    assert_eq!(store.status_of(&AssetId::from("B")), Decision::Kept);
}

#[test]
fn test_merge_is_recorded_in_one_write() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("decisions.json");
    let backend = Arc::new(MemoryBackend::new());
    for id in ["A", "B", "C", "D"] {
        backend.insert(id, b"same".to_vec());
    }
    let persistence = Arc::new(JsonFileStore::open(&path).unwrap());
    let mut store = DecisionStore::load(Box::new(persistence.clone())).unwrap();

    let report = DuplicateGrouper::new(backend.clone(), GrouperConfig::default())
        .group_undecided(&ids(&["A", "B", "C", "D"]), &store)
        .unwrap();
    merge_duplicates(&report.groups, &*backend, &mut store).unwrap();

    let reopened = JsonFileStore::open(&path).unwrap();
    let deleted = reopened.load_set(DELETED_KEY).unwrap();
    let expected: BTreeSet<String> = ["B", "C", "D"].iter().map(|s| s.to_string()).collect();
    assert_eq!(deleted, expected);
}

#[test]
fn test_merge_on_directory_backend() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.jpg"), b"same").unwrap();
    fs::write(dir.path().join("b.jpg"), b"same").unwrap();

    let backend =
        Arc::new(DirectoryBackend::new(dir.path()).with_delete_mode(DeleteMode::Permanent));
    let mut store = DecisionStore::load(Box::new(MemoryStore::new())).unwrap();

    let report = DuplicateGrouper::new(backend.clone(), GrouperConfig::default())
        .group_undecided(&ids(&["a.jpg", "b.jpg"]), &store)
        .unwrap();
    let merged = merge_duplicates(&report.groups, &*backend, &mut store).unwrap();

    assert_eq!(merged.deleted, ids(&["b.jpg"]));
    assert!(dir.path().join("a.jpg").exists());
    assert!(!dir.path().join("b.jpg").exists());
}

#[test]
fn test_partial_backend_failure_records_only_deleted() {
    let backend = Arc::new(MemoryBackend::new());
    for id in ["A", "B", "C", "D"] {
        backend.insert(id, b"same".to_vec());
    }
    backend.fail_partially([AssetId::from("D")]);
    let mut store = DecisionStore::load(Box::new(MemoryStore::new())).unwrap();

    let report = DuplicateGrouper::new(backend.clone(), GrouperConfig::default())
        .group_undecided(&ids(&["A", "B", "C", "D"]), &store)
        .unwrap();
    let err = merge_duplicates(&report.groups, &*backend, &mut store).unwrap_err();

    assert!(matches!(err, MergeError::Backend { .. }));
    assert_eq!(err.report().deleted, ids(&["B", "C"]));
    assert_eq!(store.status_of(&AssetId::from("D")), Decision::Undecided);
    assert!(backend.contains(&AssetId::from("D")));
}

fn same_content_library(names: &[&str]) -> Arc<MemoryBackend> {
    let backend = Arc::new(MemoryBackend::new());
    for id in names {
        backend.insert(*id, b"same".to_vec());
    }
    backend
}

#[test]
fn test_unrecordable_merge_reports_lost_deletions() {
    let backend = same_content_library(&["A", "B", "C"]);
    let memory = Arc::new(MemoryStore::new());
    let mut store = DecisionStore::load(Box::new(memory.clone())).unwrap();

    let report = DuplicateGrouper::new(backend.clone(), GrouperConfig::default())
        .group_undecided(&ids(&["A", "B", "C"]), &store)
        .unwrap();
    memory.set_fail_writes(true);
    let err = merge_duplicates(&report.groups, &*backend, &mut store).unwrap_err();

    assert!(matches!(
        err,
        MergeError::Decision {
            source: DecisionError::Persistence(_),
            ..
        }
    ));
    assert_eq!(ErrorCode::from(&err), ErrorCode::Persistence);
    assert!(StructuredError::from(&err).fault);
    assert!(err.report().deleted.is_empty());
    assert_eq!(err.report().unrecorded, ids(&["B", "C"]));
    assert!(!backend.contains(&AssetId::from("B")));
    assert!(!backend.contains(&AssetId::from("C")));
    assert_eq!(store.status_of(&AssetId::from("B")), Decision::Undecided);
}

#[test]
fn test_partial_failure_with_unwritable_store_is_surfaced() {
    let backend = same_content_library(&["A", "B", "C"]);
    backend.fail_partially([AssetId::from("C")]);
    let memory = Arc::new(MemoryStore::new());
    let mut store = DecisionStore::load(Box::new(memory.clone())).unwrap();

    let report = DuplicateGrouper::new(backend.clone(), GrouperConfig::default())
        .group_undecided(&ids(&["A", "B", "C"]), &store)
        .unwrap();
    memory.set_fail_writes(true);
    let err = merge_duplicates(&report.groups, &*backend, &mut store).unwrap_err();

    // B is gone from the backend; the failed write must not be hidden
    // behind the backend error.
    assert!(matches!(err, MergeError::Decision { .. }));
    assert!(err.report().deleted.is_empty());
    assert_eq!(err.report().unrecorded, ids(&["B"]));
    assert!(!backend.contains(&AssetId::from("B")));
    assert!(backend.contains(&AssetId::from("C")));
    assert_eq!(store.status_of(&AssetId::from("B")), Decision::Undecided);
}
