use super::*;
use crate::config::SpaceKind;
use crate::graph::NoFilter;

fn config(dim: usize, store_original: bool, space: SpaceKind) -> IndexConfig {
    IndexConfig {
        dim,
        space,
        m: 4,
        ef_construction: 32,
        seed: 11,
        allow_replace_deleted: true,
        store_original,
        persistence: PersistenceMode::InMemory,
    }
}

#[test]
fn snapshot_round_trip_preserves_vectors_and_labels() {
    let cfg = config(3, false, SpaceKind::L2);
    let graph = Graph::new(&cfg);
    graph.resize(8).unwrap();
    for i in 0..5u64 {
        graph.add_point(i, &[i as f32, (i * 2) as f32, (i * 3) as f32], false).unwrap();
    }
    graph.mark_deleted(2).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snapshot.bin");
    save_snapshot(&graph, &cfg, &path).unwrap();

    let (loaded_config, loaded) = load_snapshot(&path, PersistenceMode::InMemory).unwrap();
    assert_eq!(loaded_config.dim, 3);
    assert_eq!(loaded.capacity().unwrap(), 8);
    for i in [0u64, 1, 3, 4] {
        assert_eq!(
            loaded.get_data_by_label(i).unwrap(),
            vec![i as f32, (i * 2) as f32, (i * 3) as f32]
        );
    }
    assert!(loaded.get_data_by_label(2).is_err());
    loaded.check_integrity().unwrap();
}

#[test]
fn snapshot_round_trip_queries_match_within_tolerance() {
    let cfg = config(2, false, SpaceKind::L2);
    let graph = Graph::new(&cfg);
    graph.resize(16).unwrap();
    for i in 0..10u64 {
        graph.add_point(i, &[i as f32, 0.0], false).unwrap();
    }

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snapshot.bin");
    save_snapshot(&graph, &cfg, &path).unwrap();
    let (_, loaded) = load_snapshot(&path, PersistenceMode::InMemory).unwrap();

    let before = graph.knn(&[4.2, 0.0], 3, &NoFilter).unwrap();
    let after = loaded.knn(&[4.2, 0.0], 3, &NoFilter).unwrap();
    assert_eq!(before.len(), after.len());
    for ((l1, d1), (l2, d2)) in before.iter().zip(after.iter()) {
        assert_eq!(l1, l2);
        assert!((d1 - d2).abs() < 1e-6);
    }
}

#[test]
fn cosine_store_original_round_trips_exact_original_vector() {
    let cfg = config(2, true, SpaceKind::Cosine);
    let graph = Graph::new(&cfg);
    graph.resize(4).unwrap();
    graph.add_point(1, &[3.0, 4.0], false).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snapshot.bin");
    save_snapshot(&graph, &cfg, &path).unwrap();
    let (_, loaded) = load_snapshot(&path, PersistenceMode::InMemory).unwrap();

    assert_eq!(loaded.get_data_by_label(1).unwrap(), vec![3.0, 4.0]);
}

#[test]
fn empty_index_persists_and_reloads_cleanly() {
    let cfg = config(4, false, SpaceKind::L2);
    let graph = Graph::new(&cfg);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snapshot.bin");
    save_snapshot(&graph, &cfg, &path).unwrap();
    let (_, loaded) = load_snapshot(&path, PersistenceMode::InMemory).unwrap();

    assert_eq!(loaded.capacity().unwrap(), 0);
    assert!(loaded.entry_point().unwrap().is_none());
    assert_eq!(loaded.knn(&[0.0, 0.0, 0.0, 0.0], 1, &NoFilter).unwrap().len(), 0);
}

#[test]
fn persistent_mode_persist_dirty_then_reload_round_trips() {
    let cfg_dir = tempfile::tempdir().unwrap();
    let cfg = IndexConfig {
        persistence: PersistenceMode::Persistent { dir: cfg_dir.path().to_path_buf() },
        ..config(2, false, SpaceKind::L2)
    };
    let graph = Graph::new(&cfg);
    graph.resize(8).unwrap();
    graph.add_point(1, &[1.0, 1.0], false).unwrap();
    persist_dirty(&graph, &cfg, cfg_dir.path()).unwrap();

    graph.add_point(2, &[2.0, 2.0], false).unwrap();
    persist_dirty(&graph, &cfg, cfg_dir.path()).unwrap();

    let (_, loaded) = load_persistent(cfg_dir.path()).unwrap();
    assert_eq!(loaded.get_data_by_label(1).unwrap(), vec![1.0, 1.0]);
    assert_eq!(loaded.get_data_by_label(2).unwrap(), vec![2.0, 2.0]);
}

#[test]
fn persist_dirty_with_nothing_dirty_is_a_no_op_but_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = IndexConfig {
        persistence: PersistenceMode::Persistent { dir: dir.path().to_path_buf() },
        ..config(2, false, SpaceKind::L2)
    };
    let graph = Graph::new(&cfg);
    graph.resize(4).unwrap();
    graph.add_point(1, &[0.0, 0.0], false).unwrap();
    persist_dirty(&graph, &cfg, dir.path()).unwrap();
    graph.take_dirty().unwrap();

    persist_dirty(&graph, &cfg, dir.path()).unwrap();
    let (_, loaded) = load_persistent(dir.path()).unwrap();
    assert_eq!(loaded.get_data_by_label(1).unwrap(), vec![0.0, 0.0]);
}

#[test]
fn two_snapshots_of_the_same_state_are_byte_identical() {
    let cfg = config(3, false, SpaceKind::L2);
    let graph = Graph::new(&cfg);
    graph.resize(8).unwrap();
    for i in 0..5u64 {
        graph.add_point(i, &[i as f32, (i * 2) as f32, (i * 3) as f32], false).unwrap();
    }
    graph.mark_deleted(2).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let first_path = dir.path().join("first.bin");
    let second_path = dir.path().join("second.bin");
    save_snapshot(&graph, &cfg, &first_path).unwrap();

    let (loaded_config, loaded) = load_snapshot(&first_path, PersistenceMode::InMemory).unwrap();
    save_snapshot(&loaded, &loaded_config, &second_path).unwrap();

    let first_bytes = std::fs::read(&first_path).unwrap();
    let second_bytes = std::fs::read(&second_path).unwrap();
    assert_eq!(first_bytes, second_bytes);
}

#[test]
fn header_rejects_truncated_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.bin");
    std::fs::write(&path, b"short").unwrap();
    let err = load_snapshot(&path, PersistenceMode::InMemory).unwrap_err();
    assert!(matches!(err, IndexError::Encoding(_) | IndexError::Corruption(_)));
}
