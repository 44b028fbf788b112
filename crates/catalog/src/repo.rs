//! Repository over the `files` and `storages` tables.
//!
//! The engine never creates or deletes file rows; it only rewrites the
//! `storage` key of a file's `properties` document. Device rows are owned
//! outright.

use crate::Database;
use crate::error::{ErrorKind, Result};
use crate::master::MasterIndex;
use crate::models::{DeviceChanges, DeviceRow, MasterRow, StagedApply, StagedDocument};
use archivist_inventory::{Checksum, FileCopies, PhysicalCopy, StorageDevice};
use exn::ResultExt;
use futures::TryStreamExt;
use rand::Rng;
use rand::distr::Alphanumeric;
use sqlx::{Connection, QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::{debug, instrument, warn};

/// Rows per multi-row insert into a staging table (two binds each, well
/// under SQLite's bind limit).
const STAGING_CHUNK: usize = 1000;
const STAGING_PREFIX: &str = "storage_diff_";

/// A randomised staging table name, so that overlapping runs never share one.
fn staging_table_name() -> String {
    let suffix: String = rand::rng()
        .sample_iter(Alphanumeric)
        .take(8)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    format!("{STAGING_PREFIX}{suffix}")
}

#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
    dry_run: bool,
}
impl From<&Database> for Repository {
    fn from(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
            dry_run: false,
        }
    }
}
impl Repository {
    pub fn new(pool: SqlitePool, dry_run: bool) -> Self {
        Self { pool, dry_run }
    }

    /// In dry-run mode every write is skipped and reported as if it had
    /// succeeded in full.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    // =========================================================================
    // Master index
    // =========================================================================

    /// Load every file with a known checksum together with its recorded copies.
    ///
    /// Rows are streamed from a single cursor into a map pre-sized by a count
    /// query; they are never collected into an intermediate vector.
    #[instrument(skip(self))]
    pub async fn load_master(&self) -> Result<MasterIndex> {
        let count: i64 = sqlx::query_scalar(include_str!("../queries/count_master.sql"))
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let mut master = MasterIndex::with_capacity(usize::try_from(count).unwrap_or_default());

        let mut rows = sqlx::query_as::<_, MasterRow>(include_str!("../queries/load_master.sql")).fetch(&self.pool);
        while let Some(row) = rows.try_next().await.or_raise(|| ErrorKind::Database)? {
            if let Some((checksum, file_id, copies)) = row.decode() {
                master.insert(checksum, file_id, copies);
            }
        }
        debug!(expected = count, loaded = master.len(), "Master index loaded");
        Ok(master)
    }

    // =========================================================================
    // Storage documents
    // =========================================================================

    /// Write complete storage documents for many files with one joined update.
    ///
    /// Documents are staged into a connection-scoped temporary table with
    /// multi-row inserts, applied with a single `UPDATE ... FROM`, and the
    /// table is dropped again whether or not the update succeeded. Files are
    /// matched by checksum; documents for unknown checksums simply match
    /// nothing. An empty document removes the `storage` attribute.
    #[instrument(skip(self, documents), fields(documents = documents.len()))]
    pub async fn apply_staged(&self, documents: &[StagedDocument]) -> Result<StagedApply> {
        let staged = documents.len() as u64;
        if documents.is_empty() {
            return Ok(StagedApply::default());
        }
        if self.dry_run {
            return Ok(StagedApply {
                staged,
                affected: staged,
                written: documents.iter().map(|doc| doc.checksum).collect(),
            });
        }
        let mut rows = Vec::with_capacity(documents.len());
        for doc in documents {
            let json = doc.copies.to_json().or_raise(|| ErrorKind::InvalidData("storage document"))?;
            rows.push((doc.checksum.as_bytes().to_vec(), json));
        }

        let table = staging_table_name();
        // Temporary tables belong to one connection; everything below must
        // run on this one.
        let mut conn = self.pool.acquire().await.or_raise(|| ErrorKind::Database)?;
        sqlx::query(&format!(
            "CREATE TEMP TABLE {table} (sha1 BLOB PRIMARY KEY, storage TEXT NOT NULL)"
        ))
        .execute(&mut *conn)
        .await
        .or_raise(|| ErrorKind::Staging(table.clone()))?;
        debug!(%table, "Staging table created");

        let applied = Self::stage_and_update(&mut conn, &table, &rows).await;
        let dropped = sqlx::query(&format!("DROP TABLE IF EXISTS temp.{table}"))
            .execute(&mut *conn)
            .await
            .or_raise(|| ErrorKind::Staging(table.clone()));
        let (affected, written) = applied?;
        dropped?;

        if affected != staged {
            warn!(%table, staged, affected, "Staged and updated row counts differ");
        }
        Ok(StagedApply {
            staged,
            affected,
            written,
        })
    }

    async fn stage_and_update(
        conn: &mut SqliteConnection,
        table: &str,
        rows: &[(Vec<u8>, String)],
    ) -> Result<(u64, Vec<Checksum>)> {
        let mut tx = conn.begin().await.or_raise(|| ErrorKind::Database)?;
        for chunk in rows.chunks(STAGING_CHUNK) {
            let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!("INSERT INTO {table} (sha1, storage) "));
            builder.push_values(chunk, |mut row, (sha1, storage)| {
                row.push_bind(sha1.clone()).push_bind(storage.clone());
            });
            builder
                .build()
                .execute(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Staging(table.to_string()))?;
        }
        // Same transaction as the update, so this is exactly the set of rows it touches.
        let matched: Vec<Vec<u8>> =
            sqlx::query_scalar(&include_str!("../queries/staged_matches.sql").replace("{table}", table))
                .fetch_all(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Database)?;
        let result = sqlx::query(&include_str!("../queries/apply_staged.sql").replace("{table}", table))
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        let written = matched.iter().filter_map(|sha1| Checksum::from_slice(sha1)).collect();
        Ok((result.rows_affected(), written))
    }

    /// Replace one location's copies in a single file's storage document.
    ///
    /// Reads the current document and writes the merged one inside one short
    /// transaction, leaving every other location untouched. Returns `false`
    /// when no file has this id.
    pub async fn update_file_location(&self, file_id: i64, location: &str, copies: &[PhysicalCopy]) -> Result<bool> {
        if self.dry_run {
            return Ok(true);
        }
        // Take the write lock up front. A deferred transaction that reads
        // first fails with SQLITE_BUSY on upgrade, without waiting, whenever
        // another worker is writing.
        let mut conn = self.pool.acquire().await.or_raise(|| ErrorKind::Database)?;
        let mut tx = conn.begin_with("BEGIN IMMEDIATE").await.or_raise(|| ErrorKind::Database)?;
        let row: Option<(bool, Option<String>)> = sqlx::query_as(include_str!("../queries/get_storage.sql"))
            .bind(file_id)
            .fetch_optional(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let storage = match row {
            None => return Ok(false),
            Some((false, _)) => exn::bail!(ErrorKind::InvalidData("properties")),
            Some((true, storage)) => storage,
        };
        let mut document = match storage {
            Some(json) => FileCopies::from_json(&json).or_raise(|| ErrorKind::InvalidData("storage document"))?,
            None => FileCopies::new(),
        };
        document.set(location, copies.to_vec());

        if document.is_empty() {
            sqlx::query(include_str!("../queries/remove_storage.sql"))
                .bind(file_id)
                .execute(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Database)?;
        } else {
            let json = document.to_json().or_raise(|| ErrorKind::InvalidData("storage document"))?;
            sqlx::query(include_str!("../queries/set_storage.sql"))
                .bind(json)
                .bind(file_id)
                .execute(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Database)?;
        }
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        Ok(true)
    }

    /// Remove the `storage` attribute from every file in `file_ids`, in one
    /// transaction. Returns the number of rows changed.
    pub async fn clear_storage(&self, file_ids: &[i64]) -> Result<u64> {
        if file_ids.is_empty() {
            return Ok(0);
        }
        if self.dry_run {
            return Ok(file_ids.len() as u64);
        }
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("UPDATE files SET properties = json_remove(properties, '$.storage') WHERE id IN (");
        let mut ids = builder.separated(", ");
        for id in file_ids {
            ids.push_bind(*id);
        }
        builder.push(") AND json_valid(properties)");
        let result = builder.build().execute(&mut *tx).await.or_raise(|| ErrorKind::Database)?;
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected())
    }

    // =========================================================================
    // Devices
    // =========================================================================

    pub async fn list_devices(&self) -> Result<Vec<StorageDevice>> {
        let rows: Vec<DeviceRow> = sqlx::query_as(include_str!("../queries/list_devices.sql"))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(StorageDevice::try_from).collect()
    }

    /// Apply a device plan atomically. An empty plan touches nothing.
    #[instrument(skip_all, fields(create = changes.create.len(), update = changes.update.len(), remove = changes.remove.len()))]
    pub async fn apply_device_changes(&self, changes: &DeviceChanges) -> Result<()> {
        if changes.is_empty() || self.dry_run {
            return Ok(());
        }
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        for device in &changes.create {
            sqlx::query(include_str!("../queries/insert_device.sql"))
                .bind(&device.name)
                .bind(&device.country)
                .bind(&device.location)
                .bind(device.status.as_str())
                .bind(&device.access)
                .execute(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Database)?;
        }
        for device in &changes.update {
            sqlx::query(include_str!("../queries/update_device.sql"))
                .bind(&device.country)
                .bind(&device.location)
                .bind(device.status.as_str())
                .bind(&device.access)
                .bind(&device.name)
                .execute(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Database)?;
        }
        for name in &changes.remove {
            sqlx::query(include_str!("../queries/delete_device.sql"))
                .bind(name)
                .execute(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Database)?;
        }
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    // =========================================================================
    // Files
    // =========================================================================

    /// Insert a file row. File rows are normally owned by the wider catalog;
    /// this exists to seed databases for imports and tests.
    pub async fn insert_file(
        &self,
        uid: &str,
        name: &str,
        checksum: Option<Checksum>,
        size: Option<i64>,
        properties: &str,
    ) -> Result<i64> {
        sqlx::query_scalar(include_str!("../queries/insert_file.sql"))
            .bind(uid)
            .bind(name)
            .bind(checksum.map(|c| c.as_bytes().to_vec()))
            .bind(size)
            .bind(properties)
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)
    }

    /// Raw `properties` document of a file, if the file exists.
    pub async fn properties(&self, file_id: i64) -> Result<Option<String>> {
        sqlx::query_scalar(include_str!("../queries/get_properties.sql"))
            .bind(file_id)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)
    }

    /// Decoded storage document of a file, if the file exists.
    pub async fn storage(&self, file_id: i64) -> Result<Option<FileCopies>> {
        let row: Option<(bool, Option<String>)> = sqlx::query_as(include_str!("../queries/get_storage.sql"))
            .bind(file_id)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        match row {
            None => Ok(None),
            Some((false, _)) => exn::bail!(ErrorKind::InvalidData("properties")),
            Some((true, None)) => Ok(Some(FileCopies::new())),
            Some((true, Some(json))) => FileCopies::from_json(&json)
                .map(Some)
                .or_raise(|| ErrorKind::InvalidData("storage document")),
        }
    }
}
