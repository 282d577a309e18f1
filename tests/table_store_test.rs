//! Table Store Integration Tests
//!
//! Row-level semantics over the range transport, plus multi-seed runs of
//! random operation sequences checked against a plain in-memory model while
//! the transport injects faults.

use callsheet::record;
use callsheet::sheets::{
    InMemorySheets, Key, Record, SheetRange, SheetTransport, SimulatedSheets,
    SimulatedSheetsConfig,
};
use callsheet::store::{StoreError, TableStore};
use callsheet::worker::spawn_serial_worker;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

const TABLE: &str = "Requests";

fn store() -> (TableStore<InMemorySheets>, InMemorySheets) {
    let sheets = InMemorySheets::new().with_table(TABLE, &["id", "name", "added"]);
    let (worker, _task) = spawn_serial_worker();
    (TableStore::new(sheets.clone(), worker), sheets)
}

fn caller(key: Key, n: u32) -> Record {
    record![key, format!("caller-{}", n), "2024-01-01T00:00:00"]
}

#[tokio::test]
async fn test_append_then_find() {
    let (store, _) = store();
    store.append(TABLE, caller(5, 1)).await.unwrap();
    assert_eq!(store.find(TABLE, 5).await.unwrap(), Some(caller(5, 1)));
    assert_eq!(store.find(TABLE, 6).await.unwrap(), None);
}

#[tokio::test]
async fn test_duplicate_append_keeps_both_rows() {
    let (store, _) = store();
    store.append(TABLE, caller(5, 1)).await.unwrap();
    store.append(TABLE, caller(5, 2)).await.unwrap();

    let all = store.get_all(TABLE).await.unwrap();
    assert_eq!(all, vec![caller(5, 1), caller(5, 2)]);
    // Lookup returns the first.
    assert_eq!(store.find(TABLE, 5).await.unwrap(), Some(caller(5, 1)));
}

#[tokio::test]
async fn test_delete_subset_leaves_rest_in_order() {
    let (store, _) = store();
    for key in 1..=6 {
        store.append(TABLE, caller(key, key as u32)).await.unwrap();
    }
    assert_eq!(store.delete(TABLE, &[2, 5, 6]).await.unwrap(), 3);

    for key in [2, 5, 6] {
        assert_eq!(store.find(TABLE, key).await.unwrap(), None);
    }
    assert_eq!(
        store.get_all(TABLE).await.unwrap(),
        vec![caller(1, 1), caller(3, 3), caller(4, 4)]
    );
}

#[tokio::test]
async fn test_delete_overwrites_whole_body_once() {
    let (store, sheets) = store();
    for key in 1..=3 {
        store.append(TABLE, caller(key, 0)).await.unwrap();
    }
    let updates = sheets.update_count();
    store.delete(TABLE, &[1]).await.unwrap();
    assert_eq!(sheets.update_count(), updates + 1);

    // Header plus three rows, the last now blank.
    let raw = sheets.raw_rows(TABLE).unwrap();
    assert_eq!(raw.len(), 4);
    let visible = sheets.get(&SheetRange::table(TABLE)).await.unwrap();
    assert_eq!(visible.len(), 3);
}

#[tokio::test]
async fn test_delete_of_absent_key_is_noop() {
    let (store, sheets) = store();
    store.append(TABLE, caller(100, 1)).await.unwrap();
    let updates = sheets.update_count();

    assert_eq!(store.delete(TABLE, &[999]).await.unwrap(), 0);
    assert_eq!(sheets.update_count(), updates);
    assert_eq!(store.get_all(TABLE).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_update_touches_only_its_row() {
    let (store, sheets) = store();
    for key in 1..=3 {
        store.append(TABLE, caller(key, key as u32)).await.unwrap();
    }
    let before = sheets.raw_rows(TABLE).unwrap();

    store.update(TABLE, caller(2, 20)).await.unwrap();

    let after = sheets.raw_rows(TABLE).unwrap();
    assert_eq!(before[1], after[1]);
    assert_eq!(before[3], after[3]);
    assert_ne!(before[2], after[2]);
    assert_eq!(store.find(TABLE, 2).await.unwrap(), Some(caller(2, 20)));
}

#[tokio::test]
async fn test_update_matches_key_column() {
    // A row whose second column equals the key must not be the one rewritten.
    let (store, _) = store();
    store.append(TABLE, record![1u64, "2", "t"]).await.unwrap();
    store.append(TABLE, record![2u64, "b", "t"]).await.unwrap();

    store.update(TABLE, record![2u64, "B", "t"]).await.unwrap();

    let all = store.get_all(TABLE).await.unwrap();
    assert_eq!(all[0], record![1u64, 2u64, "t"]);
    assert_eq!(all[1], record![2u64, "B", "t"]);
}

#[tokio::test]
async fn test_update_missing_key() {
    let (store, _) = store();
    store.append(TABLE, caller(1, 1)).await.unwrap();
    let err = store.update(TABLE, caller(9, 9)).await.unwrap_err();
    assert!(matches!(err, StoreError::RecordNotFound { key: 9, .. }));
}

#[tokio::test]
async fn test_nineteen_digit_keys_survive_storage() {
    let (store, _) = store();
    let key: Key = 1_234_567_890_123_456_789;
    store.append(TABLE, caller(key, 1)).await.unwrap();

    let found = store.find(TABLE, key).await.unwrap().unwrap();
    assert_eq!(found.key(), Some(key));
    assert_eq!(store.delete(TABLE, &[key]).await.unwrap(), 1);
}

#[tokio::test]
async fn test_gaps_never_surface() {
    let (store, _) = store();
    for key in 1..=4 {
        store.append(TABLE, caller(key, 0)).await.unwrap();
    }
    store.delete(TABLE, &[2]).await.unwrap();
    store.append(TABLE, caller(5, 0)).await.unwrap();
    store.delete(TABLE, &[1]).await.unwrap();

    let all = store.get_all(TABLE).await.unwrap();
    assert!(all.iter().all(|r| !r.is_gap()));
    let keys: Vec<Key> = all.iter().filter_map(Record::key).collect();
    assert_eq!(keys, vec![3, 4, 5]);
}

/// Random appends, updates and deletes against a faulty transport. Failed
/// calls change nothing, so the store must always match the model.
async fn run_model_check(seed: u64, ops: usize) -> Result<(), String> {
    let memory = InMemorySheets::new().with_table(TABLE, &["id", "name", "added"]);
    let config = SimulatedSheetsConfig {
        get_fail_prob: 0.05,
        append_fail_prob: 0.05,
        update_fail_prob: 0.05,
    };
    let sheets = SimulatedSheets::new(memory, seed, config);
    let (worker, _task) = spawn_serial_worker();
    let store = TableStore::new(sheets.clone(), worker);

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut model: Vec<Record> = Vec::new();

    for step in 0..ops {
        let key: Key = rng.gen_range(1..=12);
        match rng.gen_range(0..3) {
            0 => {
                let rec = caller(key, step as u32);
                if store.append(TABLE, rec.clone()).await.is_ok() {
                    model.push(rec);
                }
            }
            1 => {
                let rec = caller(key, step as u32);
                match store.update(TABLE, rec.clone()).await {
                    Ok(()) => {
                        let slot = model
                            .iter_mut()
                            .find(|r| r.key() == Some(key))
                            .ok_or_else(|| format!("step {}: update of absent key {} succeeded", step, key))?;
                        *slot = rec;
                    }
                    Err(StoreError::RecordNotFound { .. }) => {
                        if model.iter().any(|r| r.key() == Some(key)) {
                            return Err(format!("step {}: key {} reported missing", step, key));
                        }
                    }
                    Err(_) => {}
                }
            }
            _ => {
                let other: Key = rng.gen_range(1..=12);
                if let Ok(removed) = store.delete(TABLE, &[key, other]).await {
                    let before = model.len();
                    model.retain(|r| !matches!(r.key(), Some(k) if k == key || k == other));
                    if before - model.len() != removed {
                        return Err(format!(
                            "step {}: removed {} rows, model removed {}",
                            step,
                            removed,
                            before - model.len()
                        ));
                    }
                }
            }
        }
    }

    sheets.set_config(SimulatedSheetsConfig::no_faults());
    let stored = store.get_all(TABLE).await.map_err(|e| e.to_string())?;
    if stored != model {
        return Err(format!("final table {:?} != model {:?}", stored, model));
    }
    Ok(())
}

#[tokio::test]
async fn test_store_matches_model_50_seeds() {
    for seed in 0..50 {
        if let Err(msg) = run_model_check(seed, 200).await {
            panic!("Seed {} failed: {}", seed, msg);
        }
    }
}
