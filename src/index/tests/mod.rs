use super::*;
use crate::config::SpaceKind;

fn open_l2(dim: usize, capacity: usize) -> Index {
    Index::init(dim, SpaceKind::L2, capacity, 4, 32, 7, true, false, PersistenceMode::InMemory).unwrap()
}

#[test]
fn init_rejects_zero_dim() {
    let err = Index::init(0, SpaceKind::L2, 8, 4, 32, 1, false, false, PersistenceMode::InMemory)
        .unwrap_err();
    assert!(matches!(err, IndexError::InvalidArgument(_)));
}

#[test]
fn add_then_get_roundtrips_vector() {
    let index = open_l2(3, 8);
    index.add(&[1.0, 2.0, 3.0], 42, false).unwrap();
    assert_eq!(index.get(42).unwrap(), vec![1.0, 2.0, 3.0]);
    assert_eq!(index.len().unwrap(), 1);
}

#[test]
fn knn_self_query_returns_exact_match_first() {
    let index = open_l2(2, 16);
    for i in 0..20u64 {
        index.add(&[i as f32, 0.0], i, false).unwrap();
    }
    let hits = index.knn(&[7.0, 0.0], 1, None, None).unwrap();
    assert_eq!(hits[0].0, 7);
    assert!(hits[0].1 < 1e-6);
}

#[test]
fn knn_honors_allow_and_deny_lists() {
    let index = open_l2(1, 8);
    for i in 0..5u64 {
        index.add(&[i as f32], i, false).unwrap();
    }
    let allow: HashSet<u64> = [1, 2, 3].into_iter().collect();
    let deny: HashSet<u64> = [2].into_iter().collect();
    let hits = index.knn(&[0.0], 5, Some(&allow), Some(&deny)).unwrap();
    let labels: Vec<u64> = hits.iter().map(|(l, _)| *l).collect();
    assert_eq!(labels, vec![1, 3]);
}

#[test]
fn mark_deleted_removes_from_results_and_len() {
    let index = open_l2(1, 8);
    index.add(&[1.0], 1, false).unwrap();
    index.add(&[2.0], 2, false).unwrap();
    index.mark_deleted(1).unwrap();

    assert_eq!(index.len().unwrap(), 1);
    assert!(matches!(index.get(1).unwrap_err(), IndexError::LabelDeleted(1)));
    let hits = index.knn(&[1.0], 10, None, None).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].0, 2);
}

#[test]
fn replace_deleted_reuses_a_tombstoned_slot_once_capacity_is_full() {
    let index = open_l2(1, 2);
    index.add(&[1.0], 1, false).unwrap();
    index.add(&[2.0], 2, false).unwrap();
    index.mark_deleted(1).unwrap();

    assert!(matches!(
        index.add(&[3.0], 3, false).unwrap_err(),
        IndexError::CapacityExceeded { capacity: 2 }
    ));
    index.add(&[3.0], 3, true).unwrap();
    assert_eq!(index.len().unwrap(), 2);
    assert_eq!(index.get(3).unwrap(), vec![3.0]);
    assert!(index.get(1).is_err());
}

#[test]
fn get_last_error_reports_and_then_clears() {
    let index = open_l2(2, 4);
    let before = index.add(&[1.0], 1, false).unwrap_err();
    assert_eq!(get_last_error().unwrap(), before.to_string());

    index.add(&[1.0, 1.0], 1, false).unwrap();
    assert!(get_last_error().is_none());
}

#[test]
fn set_ef_rejects_zero_and_default_is_ten() {
    let index = open_l2(2, 4);
    assert_eq!(index.get_ef(), 10);
    assert!(index.set_ef(0).is_err());
    index.set_ef(50).unwrap();
    assert_eq!(index.get_ef(), 50);
}

#[test]
fn resize_rejects_shrinking() {
    let index = open_l2(2, 8);
    assert!(index.resize(4).is_err());
    index.resize(16).unwrap();
    assert_eq!(index.capacity().unwrap(), 16);
}

#[test]
fn snapshot_save_and_load_round_trips_through_the_boundary() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.bin");

    let index = open_l2(2, 16);
    for i in 0..10u64 {
        index.add(&[i as f32, (i * 2) as f32], i, false).unwrap();
    }
    index.mark_deleted(3).unwrap();
    index.save(&path).unwrap();

    let loaded = Index::load(&path, true, false).unwrap();
    assert_eq!(loaded.len().unwrap(), 9);
    assert!(loaded.get(3).is_err());
    for i in [0u64, 1, 2, 4, 5] {
        assert_eq!(loaded.get(i).unwrap(), vec![i as f32, (i * 2) as f32]);
    }
}

#[test]
fn persistent_mode_persist_dirty_then_reload() {
    let dir = tempfile::tempdir().unwrap();
    let index = Index::init(
        2,
        SpaceKind::L2,
        8,
        4,
        32,
        9,
        true,
        false,
        PersistenceMode::Persistent { dir: dir.path().to_path_buf() },
    )
    .unwrap();
    index.add(&[1.0, 1.0], 1, false).unwrap();
    index.persist_dirty().unwrap();
    index.add(&[2.0, 2.0], 2, false).unwrap();
    index.persist_dirty().unwrap();

    let loaded = Index::load(dir.path(), true, true).unwrap();
    assert_eq!(loaded.get(1).unwrap(), vec![1.0, 1.0]);
    assert_eq!(loaded.get(2).unwrap(), vec![2.0, 2.0]);
}

#[test]
fn load_overrides_persisted_allow_replace_deleted_policy() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.bin");

    let index = Index::init(1, SpaceKind::L2, 4, 4, 16, 1, true, false, PersistenceMode::InMemory).unwrap();
    index.add(&[1.0], 1, false).unwrap();
    index.save(&path).unwrap();

    let loaded = Index::load(&path, false, false).unwrap();
    assert!(!loaded.allow_replace_deleted());
}

#[test]
fn check_integrity_passes_on_a_freshly_built_index() {
    let index = open_l2(3, 32);
    for i in 0..20u64 {
        index.add(&[i as f32, (i % 3) as f32, (i * i) as f32], i, false).unwrap();
    }
    index.mark_deleted(5).unwrap();
    index.check_integrity().unwrap();
}
