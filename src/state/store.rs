use std::path::Path;

use chrono::{SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::edit::{AdjustmentParameters, OutputMode};
use crate::error::Result;

/// EditStore persists adjustment parameters per image in SQLite.
///
/// One row per image path holds the parameters as a flat JSON object plus the
/// selected output mode. Loading goes through [`AdjustmentParameters::from_json`],
/// so rows written by older versions (missing fields, out-of-range values)
/// still come back valid.
pub struct EditStore {
    conn: Connection,
}

impl EditStore {
    /// Open (or create) the store at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    crate::error::PipelineError::Config(format!(
                        "cannot create {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let conn = Connection::open(path)?;
        log::info!("edit store opened at {}", path.display());
        Self::with_connection(conn)
    }

    /// Store that lives only as long as the value (used by tests and previews)
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let store = EditStore { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS edits (
                image_path      TEXT PRIMARY KEY,
                settings_json   TEXT NOT NULL,
                output_mode     TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    /// Saved parameters for `image_path`, or `None` when the image was never edited
    ///
    /// An unknown output mode name falls back to SDR with a warning.
    pub fn load(&self, image_path: &str) -> Result<Option<(AdjustmentParameters, OutputMode)>> {
        let row: Option<(String, String)> = self
            .conn
            .query_row(
                "SELECT settings_json, output_mode FROM edits WHERE image_path = ?1",
                [image_path],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((json, mode_name)) = row else {
            return Ok(None);
        };

        let params = AdjustmentParameters::from_json(&json)?;
        let mode = OutputMode::from_str_opt(&mode_name).unwrap_or_else(|| {
            log::warn!(
                "unknown output mode '{}' stored for {}, using sdr",
                mode_name,
                image_path
            );
            OutputMode::default()
        });

        Ok(Some((params, mode)))
    }

    /// Insert or replace the edit row for `image_path`
    pub fn save(
        &self,
        image_path: &str,
        params: &AdjustmentParameters,
        mode: OutputMode,
    ) -> Result<()> {
        let json = params.to_json()?;
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);

        self.conn.execute(
            "INSERT INTO edits (image_path, settings_json, output_mode, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(image_path) DO UPDATE SET
                settings_json = excluded.settings_json,
                output_mode = excluded.output_mode,
                updated_at = excluded.updated_at",
            params![image_path, json, mode.as_str(), now],
        )?;

        log::debug!("saved edits for {}", image_path);
        Ok(())
    }

    /// Forget the edits of one image; returns whether a row existed
    pub fn delete(&self, image_path: &str) -> Result<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM edits WHERE image_path = ?1", [image_path])?;
        Ok(removed > 0)
    }

    /// Number of images with saved edits
    pub fn count(&self) -> Result<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM edits", [], |row| row.get(0))?;
        Ok(count)
    }

    /// When the row for `image_path` was last written
    pub fn updated_at(&self, image_path: &str) -> Result<Option<chrono::DateTime<Utc>>> {
        let stamp: Option<String> = self
            .conn
            .query_row(
                "SELECT updated_at FROM edits WHERE image_path = ?1",
                [image_path],
                |row| row.get(0),
            )
            .optional()?;

        Ok(stamp.and_then(|s| {
            chrono::DateTime::parse_from_rfc3339(&s)
                .ok()
                .map(|t| t.with_timezone(&Utc))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_image_loads_none() {
        let store = EditStore::open_in_memory().unwrap();
        assert!(store.load("/photos/none.nef").unwrap().is_none());
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_save_then_load() {
        let store = EditStore::open_in_memory().unwrap();
        let mut params = AdjustmentParameters::new();
        params.set_exposure(1.5);
        params.set_vibrance(40.0);

        store.save("/photos/a.nef", &params, OutputMode::HdrPq).unwrap();
        let (loaded, mode) = store.load("/photos/a.nef").unwrap().unwrap();

        assert_eq!(loaded, params);
        assert_eq!(mode, OutputMode::HdrPq);
        assert!(store.updated_at("/photos/a.nef").unwrap().is_some());
    }

    #[test]
    fn test_save_replaces_existing_row() {
        let store = EditStore::open_in_memory().unwrap();
        let mut params = AdjustmentParameters::new();
        store.save("/photos/a.nef", &params, OutputMode::Sdr).unwrap();

        params.set_contrast(0.5);
        store.save("/photos/a.nef", &params, OutputMode::AcesFull).unwrap();

        assert_eq!(store.count().unwrap(), 1);
        let (loaded, mode) = store.load("/photos/a.nef").unwrap().unwrap();
        assert_eq!(loaded.contrast(), 0.5);
        assert_eq!(mode, OutputMode::AcesFull);
    }

    #[test]
    fn test_legacy_rows_are_clamped_and_defaulted() {
        let store = EditStore::open_in_memory().unwrap();
        store
            .conn
            .execute(
                "INSERT INTO edits VALUES (?1, ?2, ?3, ?4)",
                params!["/old.cr2", r#"{"exposure": 7.0}"#, "plasma", "2020-01-01T00:00:00Z"],
            )
            .unwrap();

        let (loaded, mode) = store.load("/old.cr2").unwrap().unwrap();
        assert_eq!(loaded.exposure(), 3.0);
        assert_eq!(loaded.saturation(), 0.0);
        assert_eq!(mode, OutputMode::Sdr);
    }

    #[test]
    fn test_delete() {
        let store = EditStore::open_in_memory().unwrap();
        store
            .save("/photos/a.nef", &AdjustmentParameters::new(), OutputMode::Sdr)
            .unwrap();
        assert!(store.delete("/photos/a.nef").unwrap());
        assert!(!store.delete("/photos/a.nef").unwrap());
        assert_eq!(store.count().unwrap(), 0);
    }
}
