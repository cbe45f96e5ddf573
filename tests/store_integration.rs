//! Store Integration Tests
//!
//! Exercises the store facade the way the server and CLI use it.

use std::fs;
use std::sync::{Arc, Barrier};
use std::thread;

use assert_matches::assert_matches;
use tempfile::TempDir;

use tristore::{Error, StoreConfig, StripeLocations, StripeRole, StripeStore, BLOCK_SIZE};

fn open_store(root: &TempDir) -> StripeStore {
    let config = StoreConfig {
        locations: StripeLocations::new(
            root.path().join("data-a"),
            root.path().join("data-b"),
            root.path().join("parity"),
        ),
        ..Default::default()
    };
    let store = StripeStore::new(config).expect("store");
    store.provision().expect("provision");
    store
}

#[test]
fn test_reopened_store_reads_published_objects() {
    let root = TempDir::new().expect("tempdir");
    let data: Vec<u8> = (0..3 * BLOCK_SIZE / 2).map(|i| (i % 7) as u8).collect();

    {
        let store = open_store(&root);
        store.put("persisted", &data).expect("put");
    }

    let store = open_store(&root);
    assert_eq!(store.get("persisted").expect("get"), data);
    assert_matches!(
        store.put("persisted", b"again"),
        Err(Error::AlreadyExists { .. })
    );
}

#[test]
fn test_concurrent_puts_have_one_winner() {
    let root = TempDir::new().expect("tempdir");
    let store = Arc::new(open_store(&root));
    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|i| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                store.put("shared", &[i as u8; 10]).map(|_| i)
            })
        })
        .collect();

    let mut winner = None;
    for handle in handles {
        match handle.join().expect("thread") {
            Ok(i) => {
                assert!(winner.is_none(), "two writers succeeded");
                winner = Some(i);
            }
            Err(e) => assert_matches!(e, Error::Busy { .. } | Error::AlreadyExists { .. }),
        }
    }

    let winner = winner.expect("one writer succeeds") as u8;
    assert_eq!(store.get("shared").expect("get"), vec![winner; 10]);
}

#[test]
fn test_lose_a_directory_then_repair() {
    let root = TempDir::new().expect("tempdir");
    let store = open_store(&root);

    let objects: Vec<(String, Vec<u8>)> = (0..4)
        .map(|i| (format!("obj-{}", i), vec![i as u8 + 1; i * BLOCK_SIZE + 3]))
        .collect();
    for (name, data) in &objects {
        store.put(name, data).expect("put");
    }

    // wipe the whole data-a directory
    let data_a = store.locations().dir(StripeRole::DataA).to_path_buf();
    fs::remove_dir_all(&data_a).expect("wipe");
    fs::create_dir_all(&data_a).expect("recreate");

    for (name, data) in &objects {
        assert_eq!(&store.get(name).expect("degraded get"), data);
    }
    assert_eq!(store.metrics().degraded_reads.get(), objects.len() as u64);

    let report = store.repair().expect("repair");
    assert_eq!(report.rebuilt.len(), objects.len());
    assert!(report.rebuilt.iter().all(|(role, _)| *role == StripeRole::DataA));

    for (name, data) in &objects {
        assert_eq!(store.stat(name).expect("stat").missing, None);
        assert_eq!(&store.get(name).expect("get"), data);
    }
}
