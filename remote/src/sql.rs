use iter_read::IterRead;
use log::{debug, info};
use rusqlite as rs;
use rusqlite::{Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::fs::{create_dir_all, File};
use std::io::{copy, Read};
use std::path::Path;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

// Single threaded but we are on one thread here for now
use std::rc::Rc;

use crate::{DownloadInfo, MetadataStore, RunRow, TransferClient, UploadInfo};

const CHUNK_SIZE: usize = 64 * 1024;

/// Longest param value the tracker side will accept.
pub const MAX_PARAM_VALUE_LEN: usize = 6000;

/// Sqlite stand-in for both the tracker and the file repository.
///
/// Clones share the same connection so one handle can be given to each role.
#[derive(Clone)]
pub struct SqlRemote {
    conn: Rc<Connection>,
}

fn sql_err(err: rs::Error) -> String {
    err.to_string()
}

impl SqlRemote {
    pub fn open(filename: Option<&Path>) -> Result<Self, String> {
        let conn = match filename {
            None => Connection::open_in_memory(),
            Some(f) => Connection::open(f),
        }
        .map_err(sql_err)?;

        // Setup the db
        conn.execute_batch(
            "BEGIN;
             CREATE TABLE IF NOT EXISTS run (
                run_id VARCHAR NOT NULL PRIMARY KEY,
                experiment_id VARCHAR NOT NULL
             );
             CREATE TABLE IF NOT EXISTS param (
                run_id VARCHAR NOT NULL,
                key VARCHAR NOT NULL,
                value VARCHAR NOT NULL,
                UNIQUE(run_id, key)
             );
             CREATE TABLE IF NOT EXISTS file (
                id VARCHAR NOT NULL PRIMARY KEY,
                name VARCHAR NOT NULL,
                size INTEGER NOT NULL,
                uploaded_at VARCHAR NOT NULL
             );
             CREATE TABLE IF NOT EXISTS blob (
                id VARCHAR NOT NULL,
                chunk INTEGER NOT NULL,
                content BLOB NOT NULL,
                UNIQUE(id, chunk)
             );
             COMMIT;",
        )
        .map_err(sql_err)?;

        Ok(SqlRemote {
            conn: Rc::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self, String> {
        Self::open(None)
    }

    /// Registers a new run and returns its 32 hex digit id.
    pub fn create_run(&self, experiment_id: &str) -> Result<String, String> {
        let runs: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM run", [], |row| row.get(0))
            .map_err(sql_err)?;

        let run_id = new_id(&[
            experiment_id.as_bytes(),
            &OffsetDateTime::now_utc().unix_timestamp_nanos().to_le_bytes(),
            &runs.to_le_bytes(),
        ])[..32]
            .to_string();

        self.conn
            .prepare_cached(
                "INSERT INTO run
                 (run_id, experiment_id)
                 VALUES
                 (?, ?)",
            )
            .map_err(sql_err)?
            .execute(rs::params![run_id, experiment_id])
            .map_err(sql_err)?;

        debug!("Created run {} in experiment {}", run_id, experiment_id);
        Ok(run_id)
    }

    fn run_exists(&self, run_id: &str) -> Result<bool, String> {
        self.conn
            .prepare_cached("SELECT 1 FROM run WHERE run_id = ?")
            .map_err(sql_err)?
            .exists(rs::params![run_id])
            .map_err(sql_err)
    }

    fn run_params(&self, run_id: &str) -> Result<BTreeMap<String, String>, String> {
        let mut stmt = self
            .conn
            .prepare_cached(
                "SELECT key, value
                 FROM param
                 WHERE run_id = ?",
            )
            .map_err(sql_err)?;

        let params = stmt
            .query_map(rs::params![run_id], |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(sql_err)?
            .collect::<Result<BTreeMap<String, String>, _>>()
            .map_err(sql_err)?;
        Ok(params)
    }
}

fn new_id(parts: &[&[u8]]) -> String {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().to_hex().to_string()
}

impl MetadataStore for SqlRemote {
    fn search_runs(&self, experiment_id: &str) -> Result<Vec<RunRow>, String> {
        let run_ids = {
            let mut stmt = self
                .conn
                .prepare_cached(
                    "SELECT run_id
                     FROM run
                     WHERE experiment_id = ?
                     ORDER BY rowid ASC",
                )
                .map_err(sql_err)?;
            let ids = stmt
                .query_map(rs::params![experiment_id], |row| row.get::<_, String>(0))
                .map_err(sql_err)?
                .collect::<Result<Vec<String>, _>>()
                .map_err(sql_err)?;
            ids
        };

        run_ids
            .into_iter()
            .map(|run_id| {
                let params = self.run_params(&run_id)?;
                Ok(RunRow {
                    run_id,
                    experiment_id: experiment_id.to_string(),
                    params,
                })
            })
            .collect()
    }

    fn log_param(&self, run_id: &str, key: &str, value: &str) -> Result<(), String> {
        if value.len() > MAX_PARAM_VALUE_LEN {
            return Err(format!(
                "param {} is {} bytes, limit is {}",
                key,
                value.len(),
                MAX_PARAM_VALUE_LEN
            ));
        }
        if !self.run_exists(run_id)? {
            return Err(format!("no run with id {}", run_id));
        }

        let existing: Option<String> = self
            .conn
            .prepare_cached(
                "SELECT value
                 FROM param
                 WHERE run_id = ?
                 AND key = ?",
            )
            .map_err(sql_err)?
            .query_row(rs::params![run_id, key], |row| row.get(0))
            .optional()
            .map_err(sql_err)?;

        match existing {
            Some(old) if old == value => Ok(()),
            Some(old) => Err(format!(
                "param {} of run {} already logged as {:?}, refusing {:?}",
                key, run_id, old, value
            )),
            None => {
                self.conn
                    .prepare_cached(
                        "INSERT INTO param
                         (run_id, key, value)
                         VALUES
                         (?, ?, ?)",
                    )
                    .map_err(sql_err)?
                    .execute(rs::params![run_id, key, value])
                    .map_err(sql_err)?;
                Ok(())
            }
        }
    }
}

impl TransferClient for SqlRemote {
    fn upload(&self, name: &str, local_path: &Path) -> Result<UploadInfo, String> {
        let mut file =
            File::open(local_path).map_err(|e| format!("{}: {}", local_path.display(), e))?;

        let now = OffsetDateTime::now_utc();
        let uploaded_at = now.format(&Rfc3339).map_err(|e| e.to_string())?;
        let files: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM file", [], |row| row.get(0))
            .map_err(sql_err)?;
        let id = new_id(&[
            name.as_bytes(),
            &now.unix_timestamp_nanos().to_le_bytes(),
            &files.to_le_bytes(),
        ]);

        let tx = self.conn.unchecked_transaction().map_err(sql_err)?;
        let mut size: u64 = 0;
        let mut chunk_idx: i64 = 0;

        loop {
            let mut in_buf = Vec::with_capacity(CHUNK_SIZE);
            let len = Read::by_ref(&mut file)
                .take(CHUNK_SIZE as u64)
                .read_to_end(&mut in_buf)
                .map_err(|e| format!("{}: {}", local_path.display(), e))?;
            if len == 0 {
                break;
            }

            tx.prepare_cached(
                "INSERT INTO blob
                 (id, chunk, content)
                 VALUES
                 (?, ?, ?)",
            )
            .map_err(sql_err)?
            .execute(rs::params![id, chunk_idx, in_buf])
            .map_err(sql_err)?;

            size += len as u64;
            chunk_idx += 1;
        }

        tx.prepare_cached(
            "INSERT INTO file
             (id, name, size, uploaded_at)
             VALUES
             (?, ?, ?, ?)",
        )
        .map_err(sql_err)?
        .execute(rs::params![id, name, size as i64, uploaded_at])
        .map_err(sql_err)?;
        tx.commit().map_err(sql_err)?;

        info!("Stored {} as {} ({} bytes, {} chunks)", name, id, size, chunk_idx);
        Ok(UploadInfo {
            id,
            name: name.to_string(),
            size,
            uploaded_at,
        })
    }

    fn download(&self, remote_id: &str, dest_dir: &Path) -> Result<DownloadInfo, String> {
        let name: String = self
            .conn
            .prepare_cached("SELECT name FROM file WHERE id = ?")
            .map_err(sql_err)?
            .query_row(rs::params![remote_id], |row| row.get::<_, String>(0))
            .optional()
            .map_err(sql_err)?
            .ok_or_else(|| format!("no file with id {}", remote_id))?;

        let chunks = {
            let mut stmt = self
                .conn
                .prepare_cached(
                    "SELECT content
                     FROM blob
                     WHERE id = ?
                     ORDER BY chunk ASC",
                )
                .map_err(sql_err)?;
            let chunks = stmt
                .query_map(rs::params![remote_id], |row| row.get::<_, Vec<u8>>(0))
                .map_err(sql_err)?
                .collect::<Result<Vec<Vec<u8>>, _>>()
                .map_err(sql_err)?;
            chunks
        };

        create_dir_all(dest_dir).map_err(|e| format!("{}: {}", dest_dir.display(), e))?;
        let path = dest_dir.join(&name);
        let mut target = File::create(&path).map_err(|e| format!("{}: {}", path.display(), e))?;
        copy(&mut IterRead::new(chunks.into_iter().flatten()), &mut target)
            .map_err(|e| format!("{}: {}", path.display(), e))?;

        info!("Fetched {} into {}", remote_id, path.display());
        Ok(DownloadInfo {
            id: remote_id.to_string(),
            path,
        })
    }
}
