//! Tabular Record Store
//!
//! Row-level get / append / update / delete emulated over whole-range reads
//! and range overwrites. Nothing is cached: every operation re-reads what it
//! needs, so the remote store stays the single source of truth.
//!
//! `update` and `delete` are read-then-overwrite sequences whose row numbers
//! are only valid while nobody else writes the table. That holds because every
//! public operation runs on the store's serial worker.

use crate::sheets::{
    decode_rows, encode_record, encode_rows, Key, Record, SheetRange, SheetTransport, FIRST_DATA_ROW,
};
use crate::store::error::StoreError;
use crate::worker::WorkerHandle;
use serde_json::Value;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info};

/// Direct range operations. Not serialized on their own.
struct RangeTables<T: SheetTransport> {
    transport: T,
}

impl<T: SheetTransport> RangeTables<T> {
    /// Every row below the header, gaps included, in table order
    async fn read_rows(&self, table: &str) -> Result<Vec<Record>, StoreError> {
        let rows = self.transport.get(&SheetRange::table(table)).await?;
        if rows.len() <= 1 {
            return Ok(Vec::new());
        }
        Ok(decode_rows(&rows[1..]))
    }

    async fn get_all(&self, table: &str) -> Result<Vec<Record>, StoreError> {
        let rows = self.read_rows(table).await?;
        Ok(rows.into_iter().filter(|r| !r.is_gap()).collect())
    }

    async fn find(&self, table: &str, key: Key) -> Result<Option<Record>, StoreError> {
        let rows = self.read_rows(table).await?;
        Ok(rows.into_iter().find(|r| r.has_key(key)))
    }

    async fn append(&self, table: &str, record: &Record) -> Result<(), StoreError> {
        if record.is_gap() {
            return Err(StoreError::InvalidArgument(
                "cannot append an empty record".to_string(),
            ));
        }
        self.transport
            .append(&SheetRange::table(table), vec![encode_record(record)])
            .await?;
        debug!(table, key = ?record.key(), "appended record");
        Ok(())
    }

    async fn update(&self, table: &str, record: &Record) -> Result<(), StoreError> {
        if record.is_empty() {
            return Err(StoreError::InvalidArgument(
                "an update needs at least the key field".to_string(),
            ));
        }
        let key = record.key().ok_or_else(|| {
            StoreError::InvalidArgument("field 0 of an update must be an integer key".to_string())
        })?;

        let rows = self.read_rows(table).await?;
        let not_found = || StoreError::RecordNotFound {
            table: table.to_string(),
            key,
        };
        let index = rows.iter().position(|r| r.has_key(key)).ok_or_else(not_found)?;
        let row_number = FIRST_DATA_ROW + index as u32;

        // Blank out any trailing cells of a wider old row.
        let mut encoded = encode_record(record);
        let old_width = rows[index].len();
        if encoded.len() < old_width {
            encoded.resize(old_width, Value::String(String::new()));
        }

        self.transport
            .update(&SheetRange::row(table, row_number), vec![encoded])
            .await?;
        debug!(table, key, row = row_number, "updated record");
        Ok(())
    }

    async fn delete(&self, table: &str, keys: &[Key]) -> Result<usize, StoreError> {
        if keys.is_empty() {
            return Err(StoreError::InvalidArgument(
                "delete needs at least one key".to_string(),
            ));
        }
        let doomed: HashSet<Key> = keys.iter().copied().collect();
        let removed = self
            .delete_where(table, |r| r.key().is_some_and(|k| doomed.contains(&k)))
            .await?;
        if removed.is_empty() {
            debug!(table, ?keys, "delete matched no rows");
        }
        Ok(removed.len())
    }

    /// One read, then one overwrite of the whole body. Gaps are never
    /// offered to `doomed`.
    async fn delete_where<P>(&self, table: &str, doomed: P) -> Result<Vec<Record>, StoreError>
    where
        P: Fn(&Record) -> bool,
    {
        let rows = self.read_rows(table).await?;
        let width = rows.iter().map(Record::len).max().unwrap_or(1);

        let (removed, mut kept): (Vec<Record>, Vec<Record>) =
            rows.into_iter().partition(|r| !r.is_gap() && doomed(r));

        // The remote store rejects empty overwrites.
        if removed.is_empty() {
            return Ok(removed);
        }

        // Same height as before, so no stale rows survive below the content.
        kept.extend(std::iter::repeat_with(|| Record::gap(width)).take(removed.len()));

        let end = FIRST_DATA_ROW + kept.len() as u32;
        self.transport
            .update(&SheetRange::rows(table, FIRST_DATA_ROW, end), encode_rows(&kept))
            .await?;
        info!(table, removed = removed.len(), "deleted records");
        Ok(removed)
    }
}

/// Serialized table store handle. Cheap to clone.
pub struct TableStore<T: SheetTransport> {
    tables: Arc<RangeTables<T>>,
    worker: WorkerHandle,
}

impl<T: SheetTransport> Clone for TableStore<T> {
    fn clone(&self) -> Self {
        TableStore {
            tables: self.tables.clone(),
            worker: self.worker.clone(),
        }
    }
}

impl<T: SheetTransport> TableStore<T> {
    pub fn new(transport: T, worker: WorkerHandle) -> Self {
        TableStore {
            tables: Arc::new(RangeTables { transport }),
            worker,
        }
    }

    pub fn worker(&self) -> &WorkerHandle {
        &self.worker
    }

    pub fn transport(&self) -> &T {
        &self.tables.transport
    }

    /// All non-gap records of `table`, header excluded. Empty when the table
    /// holds only its header.
    pub async fn get_all(&self, table: &str) -> Result<Vec<Record>, StoreError> {
        let tables = self.tables.clone();
        let table = table.to_string();
        self.worker
            .run(move || async move { tables.get_all(&table).await })
            .await?
    }

    /// First non-gap record whose field 0 is `key`
    pub async fn find(&self, table: &str, key: Key) -> Result<Option<Record>, StoreError> {
        let tables = self.tables.clone();
        let table = table.to_string();
        self.worker
            .run(move || async move { tables.find(&table, key).await })
            .await?
    }

    /// Append after the table's existing content. Duplicate keys are not
    /// checked.
    pub async fn append(&self, table: &str, record: Record) -> Result<(), StoreError> {
        let tables = self.tables.clone();
        let table = table.to_string();
        self.worker
            .run(move || async move { tables.append(&table, &record).await })
            .await?
    }

    /// Overwrite the row whose key equals `record`'s field 0
    pub async fn update(&self, table: &str, record: Record) -> Result<(), StoreError> {
        let tables = self.tables.clone();
        let table = table.to_string();
        self.worker
            .run(move || async move { tables.update(&table, &record).await })
            .await?
    }

    /// Remove every row keyed by one of `keys`. Returns the number of rows
    /// removed; `0` means nothing matched and no write was issued.
    pub async fn delete(&self, table: &str, keys: &[Key]) -> Result<usize, StoreError> {
        let tables = self.tables.clone();
        let table = table.to_string();
        let keys = keys.to_vec();
        self.worker
            .run(move || async move { tables.delete(&table, &keys).await })
            .await?
    }

    /// Remove every row `doomed` selects as one job on the worker. Returns
    /// the removed rows in table order; empty means no write was issued.
    pub async fn delete_where<P>(&self, table: &str, doomed: P) -> Result<Vec<Record>, StoreError>
    where
        P: Fn(&Record) -> bool + Send + 'static,
    {
        let tables = self.tables.clone();
        let table = table.to_string();
        self.worker
            .run(move || async move { tables.delete_where(&table, doomed).await })
            .await?
    }

    /// Run a composed sequence of store operations as one unit on the worker.
    /// Store calls made through the passed handle run inline, so nothing from
    /// another caller interleaves with them.
    pub async fn serialized<F, Fut, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(TableStore<T>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<R, StoreError>> + Send + 'static,
        R: Send + 'static,
    {
        let store = self.clone();
        self.worker.run(move || f(store)).await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record;
    use crate::sheets::{Cell, InMemorySheets};
    use crate::worker::spawn_serial_worker;

    fn store_with(rows: &[Record]) -> (TableStore<InMemorySheets>, InMemorySheets) {
        let sheets = InMemorySheets::new().with_table("Requests", &["id", "name", "added"]);
        let (worker, _task) = spawn_serial_worker();
        let store = TableStore::new(sheets.clone(), worker);
        let raw: Vec<Vec<Value>> = rows.iter().map(encode_record).collect();
        if !raw.is_empty() {
            let rows_end = FIRST_DATA_ROW + raw.len() as u32 - 1;
            futures::executor::block_on(
                sheets.update(&SheetRange::rows("Requests", FIRST_DATA_ROW, rows_end), raw),
            )
            .unwrap();
        }
        (store, sheets)
    }

    #[tokio::test]
    async fn test_get_all_header_only_is_empty() {
        let (store, _) = store_with(&[]);
        assert!(store.get_all("Requests").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_all_skips_gaps() {
        let (store, _) = store_with(&[
            record![1u64, "a", "2024-01-01T00:00:00"],
            Record::gap(3),
            record![3u64, "c", "2024-01-03T00:00:00"],
        ]);
        let all = store.get_all("Requests").await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].key(), Some(1));
        assert_eq!(all[1].key(), Some(3));
    }

    #[tokio::test]
    async fn test_missing_table_is_remote_unavailable() {
        let (store, _) = store_with(&[]);
        let err = store.get_all("Nope").await.unwrap_err();
        assert!(matches!(err, StoreError::RemoteUnavailable(_)));
    }

    #[tokio::test]
    async fn test_append_rejects_empty_record() {
        let (store, sheets) = store_with(&[]);
        let err = store.append("Requests", Record::default()).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
        assert_eq!(sheets.append_count(), 0);
    }

    #[tokio::test]
    async fn test_update_validates_arguments() {
        let (store, _) = store_with(&[record![1u64, "a", "t"]]);
        let err = store.update("Requests", Record::default()).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));

        let err = store.update("Requests", record!["x", "a"]).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_update_on_empty_table_is_not_found() {
        let (store, _) = store_with(&[]);
        let err = store.update("Requests", record![1u64, "a"]).await.unwrap_err();
        assert_eq!(
            err,
            StoreError::RecordNotFound {
                table: "Requests".into(),
                key: 1
            }
        );
    }

    #[tokio::test]
    async fn test_update_blanks_trailing_cells_of_wider_row() {
        let (store, _) = store_with(&[record![1u64, "a", "extra", "2024-01-01T00:00:00"]]);
        store.update("Requests", record![1u64, "b"]).await.unwrap();
        let found = store.find("Requests", 1).await.unwrap().unwrap();
        assert_eq!(found.cells(), &[Cell::Integer(1), Cell::from("b")]);
    }

    #[tokio::test]
    async fn test_update_skips_gap_rows_when_numbering() {
        let (store, sheets) = store_with(&[
            record![1u64, "a", "t1"],
            Record::gap(3),
            record![3u64, "c", "t3"],
        ]);
        store.update("Requests", record![3u64, "C", "t3"]).await.unwrap();
        let raw = sheets.raw_rows("Requests").unwrap();
        assert_eq!(raw[3][1], Value::String("C".into()));
        assert_eq!(raw[1][1], Value::String("a".into()));
    }

    #[tokio::test]
    async fn test_delete_requires_keys() {
        let (store, _) = store_with(&[record![1u64, "a", "t"]]);
        let err = store.delete("Requests", &[]).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_delete_keeps_existing_gaps_in_place() {
        let (store, sheets) = store_with(&[
            record![1u64, "a", "t1"],
            Record::gap(3),
            record![3u64, "c", "t3"],
            record![4u64, "d", "t4"],
        ]);
        assert_eq!(store.delete("Requests", &[3]).await.unwrap(), 1);

        let raw = sheets.raw_rows("Requests").unwrap();
        assert_eq!(raw[1][0], Value::String("1".into()));
        assert!(raw[2].iter().all(|v| v == &Value::String(String::new())));
        assert_eq!(raw[3][0], Value::String("4".into()));
        assert!(raw[4].iter().all(|v| v == &Value::String(String::new())));
    }

    #[tokio::test]
    async fn test_delete_removes_duplicate_keys() {
        let (store, _) = store_with(&[
            record![1u64, "a", "t1"],
            record![1u64, "a again", "t2"],
            record![2u64, "b", "t3"],
        ]);
        assert_eq!(store.delete("Requests", &[1]).await.unwrap(), 2);
        let all = store.get_all("Requests").await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].key(), Some(2));
    }

    #[tokio::test]
    async fn test_delete_where_removes_only_selected_rows() {
        let (store, sheets) = store_with(&[
            record![1u64, "a", "t1"],
            record![1u64, "a again", "t2"],
            record![2u64, "b", "t1"],
        ]);
        let removed = store
            .delete_where("Requests", |r| r.last() == Some(&Cell::from("t1")))
            .await
            .unwrap();
        assert_eq!(removed, vec![record![1u64, "a", "t1"], record![2u64, "b", "t1"]]);
        assert_eq!(
            store.get_all("Requests").await.unwrap(),
            vec![record![1u64, "a again", "t2"]]
        );

        let updates = sheets.update_count();
        let none = store.delete_where("Requests", |_| false).await.unwrap();
        assert!(none.is_empty());
        assert_eq!(sheets.update_count(), updates);
    }

    #[tokio::test]
    async fn test_serialized_nested_calls_run_inline() {
        let (store, _) = store_with(&[record![1u64, "a", "t1"]]);
        let moved = store
            .serialized(|s| async move {
                let Some(found) = s.find("Requests", 1).await? else {
                    return Ok(false);
                };
                s.delete("Requests", &[1]).await?;
                s.append("Requests", found).await?;
                Ok(true)
            })
            .await
            .unwrap();
        assert!(moved);
        assert_eq!(store.get_all("Requests").await.unwrap().len(), 1);
    }
}
