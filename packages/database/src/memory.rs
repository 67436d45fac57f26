//! In-memory waste storage for tests and dry runs.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tisza_map_waste_models::{UpdateLog, WastePoint};

use crate::{DbError, WasteStore};

#[derive(Default)]
struct Tables {
    wastes: BTreeMap<i64, WastePoint>,
    update_logs: Vec<UpdateLog>,
}

/// [`WasteStore`] that keeps everything in process memory.
#[derive(Default)]
pub struct MemoryWasteStore {
    tables: Mutex<Tables>,
}

impl MemoryWasteStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with `points`.
    #[must_use]
    pub fn with_points(points: impl IntoIterator<Item = WastePoint>) -> Self {
        Self {
            tables: Mutex::new(Tables {
                wastes: points.into_iter().map(|p| (p.id, p)).collect(),
                update_logs: Vec::new(),
            }),
        }
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, DbError> {
        self.tables.lock().map_err(|_| DbError::Poisoned)
    }

    fn filtered(&self, keep: impl Fn(&WastePoint) -> bool) -> Result<Vec<WastePoint>, DbError> {
        Ok(self
            .tables()?
            .wastes
            .values()
            .filter(|p| keep(p))
            .cloned()
            .collect())
    }
}

impl WasteStore for MemoryWasteStore {
    fn get(&self, id: i64) -> Result<Option<WastePoint>, DbError> {
        Ok(self.tables()?.wastes.get(&id).cloned())
    }

    fn save(&self, point: &WastePoint) -> Result<(), DbError> {
        self.tables()?.wastes.insert(point.id, point.clone());
        Ok(())
    }

    fn save_all(&self, points: &[WastePoint]) -> Result<u64, DbError> {
        let mut tables = self.tables()?;
        for point in points {
            tables.wastes.insert(point.id, point.clone());
        }
        Ok(points.len() as u64)
    }

    fn delete(&self, id: i64) -> Result<bool, DbError> {
        Ok(self.tables()?.wastes.remove(&id).is_some())
    }

    fn delete_many(&self, ids: &[i64]) -> Result<u64, DbError> {
        let mut tables = self.tables()?;
        Ok(ids
            .iter()
            .filter(|id| tables.wastes.remove(id).is_some())
            .count() as u64)
    }

    fn find_all(&self) -> Result<Vec<WastePoint>, DbError> {
        self.filtered(|_| true)
    }

    fn find_unenriched(&self) -> Result<Vec<WastePoint>, DbError> {
        self.filtered(|p| p.river.is_unchecked())
    }

    fn find_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<WastePoint>, DbError> {
        self.filtered(|p| p.updated_at < cutoff)
    }

    fn count(&self) -> Result<u64, DbError> {
        Ok(self.tables()?.wastes.len() as u64)
    }

    fn record_update_log(&self, log: &UpdateLog) -> Result<UpdateLog, DbError> {
        let mut tables = self.tables()?;
        let id = i64::try_from(tables.update_logs.len()).unwrap_or(i64::MAX - 1) + 1;
        let stored = UpdateLog {
            id: Some(id),
            ..log.clone()
        };
        tables.update_logs.push(stored.clone());
        Ok(stored)
    }

    fn recent_update_logs(&self, limit: usize) -> Result<Vec<UpdateLog>, DbError> {
        let mut logs = self.tables()?.update_logs.clone();
        logs.sort_by(|a, b| b.update_time.cmp(&a.update_time).then(b.id.cmp(&a.id)));
        logs.truncate(limit);
        Ok(logs)
    }
}
