use phototriage::backend::{AssetId, DirectoryBackend, MemoryBackend};
use phototriage::cancel::CancelToken;
use phototriage::decisions::{Decision, DecisionStore};
use phototriage::duplicates::{DuplicateGrouper, GroupError, GrouperConfig};
use phototriage::fingerprint::Fingerprint;
use phototriage::progress::{Progress, ProgressCallback};
use phototriage::store::MemoryStore;
use std::collections::BTreeSet;
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

fn ids(values: &[&str]) -> Vec<AssetId> {
    values.iter().map(|v| AssetId::from(*v)).collect()
}

fn abcd_library() -> Arc<MemoryBackend> {
    let backend = Arc::new(MemoryBackend::new());
    backend.insert("A", b"sunset".to_vec());
    backend.insert("B", b"beach".to_vec());
    backend.insert("C", b"sunset".to_vec());
    backend.insert("D", b"mountain".to_vec());
    backend
}

#[test]
fn test_abcd_scenario() {
    let backend = abcd_library();
    let grouper = DuplicateGrouper::new(backend, GrouperConfig::default());

    let report = grouper
        .group(&ids(&["A", "B", "C", "D"]), &BTreeSet::new())
        .unwrap();

    assert_eq!(report.groups.len(), 1);
    let group = &report.groups[0];
    assert_eq!(group.members(), ids(&["A", "C"]).as_slice());
    assert_eq!(group.survivor(), &AssetId::from("A"));
    assert_eq!(group.fingerprint(), &Fingerprint::of(b"sunset"));
    assert_eq!(report.stats.input_assets, 4);
    assert_eq!(report.stats.fingerprinted, 4);
}

#[test]
fn test_abcd_with_kept_survivor_excluded() {
    let backend = abcd_library();
    let mut store = DecisionStore::load(Box::new(MemoryStore::new())).unwrap();
    store.decide(&AssetId::from("A"), Decision::Kept).unwrap();

    let report = DuplicateGrouper::new(backend, GrouperConfig::default())
        .group_undecided(&ids(&["A", "B", "C", "D"]), &store)
        .unwrap();

    // C no longer has an undecided twin.
    assert!(report.is_empty());
    assert_eq!(report.stats.excluded_assets, 1);
}

#[test]
fn test_single_thread_and_many_threads_agree() {
    let backend = Arc::new(MemoryBackend::new());
    let mut input = Vec::new();
    for i in 0..60 {
        let id = format!("IMG_{:03}", i);
        backend.insert(id.as_str(), format!("content {}", i % 7).into_bytes());
        input.push(AssetId::new(id));
    }

    let one = DuplicateGrouper::new(backend.clone(), GrouperConfig::default().with_io_threads(1))
        .group(&input, &BTreeSet::new())
        .unwrap();
    let many = DuplicateGrouper::new(backend, GrouperConfig::default().with_io_threads(8))
        .group(&input, &BTreeSet::new())
        .unwrap();

    assert_eq!(one.groups, many.groups);
    assert_eq!(one.groups.len(), 7);
    // Survivors are the first occurrence of each content.
    for (i, group) in one.groups.iter().enumerate() {
        assert_eq!(group.survivor(), &AssetId::new(format!("IMG_{:03}", i)));
    }
}

#[test]
fn test_stalled_fetch_does_not_block_scan() {
    let backend = abcd_library();
    backend.stall_fetch("B", Duration::from_secs(2));

    let config = GrouperConfig::default()
        .with_io_threads(2)
        .with_fetch_timeout(Some(Duration::from_millis(100)));
    let report = DuplicateGrouper::new(backend, config)
        .group(&ids(&["A", "B", "C", "D"]), &BTreeSet::new())
        .unwrap();

    assert_eq!(report.groups.len(), 1);
    assert_eq!(report.stats.timed_out, 1);
    assert_eq!(report.stats.errors[0].id(), &AssetId::from("B"));
}

struct CancelOnFirstItem {
    token: CancelToken,
}

impl ProgressCallback for CancelOnFirstItem {
    fn on_phase_start(&self, _phase: &str, _total: usize) {}

    fn on_progress(&self, _current: usize, _item: &str) {
        self.token.cancel();
    }

    fn on_phase_end(&self, _phase: &str) {}
}

#[test]
fn test_cancel_during_scan() {
    let backend = abcd_library();
    let token = CancelToken::new();
    let config = GrouperConfig::default()
        .with_io_threads(1)
        .with_cancel_token(token.clone())
        .with_progress_callback(Arc::new(CancelOnFirstItem {
            token: token.clone(),
        }));

    let result = DuplicateGrouper::new(backend.clone(), config)
        .group(&ids(&["A", "B", "C", "D"]), &BTreeSet::new());

    assert!(matches!(result, Err(GroupError::Cancelled)));
    assert!(backend.fetch_calls() < 4);
}

#[test]
fn test_directory_scan_groups_identical_files() {
    let dir = tempdir().unwrap();
    fs::create_dir(dir.path().join("2023")).unwrap();
    fs::write(dir.path().join("a.jpg"), b"same pixels").unwrap();
    fs::write(dir.path().join("2023/b.jpg"), b"same pixels").unwrap();
    fs::write(dir.path().join("c.png"), b"other pixels").unwrap();
    fs::write(dir.path().join("notes.txt"), b"same pixels").unwrap();

    let backend = Arc::new(DirectoryBackend::new(dir.path()));
    let input = ids(&["a.jpg", "2023/b.jpg", "c.png"]);
    let report = DuplicateGrouper::new(backend, GrouperConfig::default())
        .group(&input, &BTreeSet::new())
        .unwrap();

    assert_eq!(report.groups.len(), 1);
    assert_eq!(report.groups[0].members(), ids(&["a.jpg", "2023/b.jpg"]).as_slice());
}

#[test]
fn test_missing_file_is_reported_not_fatal() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.jpg"), b"x").unwrap();
    fs::write(dir.path().join("b.jpg"), b"x").unwrap();

    let backend = Arc::new(DirectoryBackend::new(dir.path()));
    let report = DuplicateGrouper::new(backend, GrouperConfig::default())
        .group(&ids(&["a.jpg", "gone.jpg", "b.jpg"]), &BTreeSet::new())
        .unwrap();

    assert_eq!(report.groups.len(), 1);
    assert_eq!(report.stats.failed, 1);
    assert_eq!(report.stats.errors[0].id(), &AssetId::from("gone.jpg"));
}

#[test]
fn test_scan_with_terminal_reporter() {
    let backend = abcd_library();
    let progress = Arc::new(Progress::new(true));
    let grouper = DuplicateGrouper::new(
        backend,
        GrouperConfig::default().with_progress_callback(progress),
    );

    let report = grouper
        .group(&ids(&["A", "B", "C", "D"]), &BTreeSet::new())
        .unwrap();
    assert_eq!(report.stats.fingerprinted, 4);
    assert_eq!(report.groups.len(), 1);
}
