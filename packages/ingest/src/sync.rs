//! Applies a fetched trash list to the waste store.

use std::collections::BTreeMap;
use std::time::Instant;

use chrono::{DateTime, Months, Utc};
use serde_json::Value;
use tisza_map_database::WasteStore;
use tisza_map_ingest_models::SyncResult;
use tisza_map_waste_models::{RiverAssignment, UpdateLog, WastePoint};

use crate::IngestError;
use crate::parse::parse_waste;

/// Default number of years a report may go without activity before it is
/// pruned.
pub const DEFAULT_RETENTION_YEARS: u32 = 6;

/// Oldest `updated_at` that is still retained.
#[must_use]
pub fn retention_cutoff(now: DateTime<Utc>, retention_years: u32) -> DateTime<Utc> {
    now.checked_sub_months(Months::new(retention_years.saturating_mul(12)))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Prunes stale reports, then saves every new or changed record.
///
/// The locally owned `hidden` flag always survives. The river assignment
/// survives only while the coordinates stay the same; a moved point goes
/// back to unchecked so the next enrichment pass looks at it again.
/// Unparseable records are skipped and counted.
///
/// # Errors
///
/// Returns [`IngestError::Store`] if any store operation fails.
pub fn sync(
    store: &dyn WasteStore,
    records: &[Value],
    now: DateTime<Utc>,
    retention_years: u32,
) -> Result<SyncResult, IngestError> {
    let start = Instant::now();
    let cutoff = retention_cutoff(now, retention_years);

    let stale: Vec<i64> = store
        .find_older_than(cutoff)?
        .iter()
        .map(|p| p.id)
        .collect();
    let records_deleted = store.delete_many(&stale)?;
    if records_deleted > 0 {
        log::info!("Pruned {records_deleted} reports with no activity since {cutoff}");
    }

    let existing: BTreeMap<i64, WastePoint> =
        store.find_all()?.into_iter().map(|p| (p.id, p)).collect();

    let mut records_parsed = 0u64;
    let mut records_skipped = 0u64;
    let mut pending: BTreeMap<i64, WastePoint> = BTreeMap::new();

    for record in records {
        let mut point = match parse_waste(record) {
            Ok(point) => point,
            Err(e) => {
                log::debug!("Skipping record: {e}");
                records_skipped += 1;
                continue;
            }
        };
        records_parsed += 1;

        if point.updated_at <= cutoff {
            continue;
        }

        if let Some(stored) = existing.get(&point.id) {
            point.hidden = stored.hidden;
            point.river = if point.same_location(stored) {
                stored.river.clone()
            } else {
                RiverAssignment::Unchecked
            };
            if point.same_content(stored) {
                pending.remove(&point.id);
                continue;
            }
        }

        pending.insert(point.id, point);
    }

    if records_skipped > 0 {
        log::warn!("Skipped {records_skipped} unparseable records");
    }

    let to_save: Vec<WastePoint> = pending.into_values().collect();
    let records_saved = store.save_all(&to_save)?;
    let total_count = store.count()?;

    store.record_update_log(&UpdateLog {
        id: None,
        update_time: now,
        update_count: records_saved,
        delete_count: records_deleted,
        total_count,
    })?;

    let duration = start.elapsed();
    log::info!(
        "Sync complete: {records_saved} saved, {records_deleted} deleted, {total_count} total ({:.1}s)",
        duration.as_secs_f64(),
    );

    Ok(SyncResult {
        synced_at: now,
        records_fetched: records.len() as u64,
        records_parsed,
        records_skipped,
        records_saved,
        records_deleted,
        total_count,
        duration,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::TimeZone as _;
    use serde_json::json;
    use tisza_map_database::MemoryWasteStore;
    use tisza_map_waste_models::{WasteSize, WasteStatus};

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn record(id: i64, lat: f64, updated: &str) -> Value {
        json!({
            "id": id,
            "gps": {"lat": lat, "long": 20.15, "area": {"country": "hungary"}},
            "types": ["plastic"],
            "size": "bag",
            "status": "stillHere",
            "created": "2020-01-01T00:00:00Z",
            "updateTime": updated
        })
    }

    fn stored(id: i64, lat: f64, updated: DateTime<Utc>) -> WastePoint {
        WastePoint {
            id,
            latitude: lat,
            longitude: 20.15,
            country: None,
            locality: None,
            sublocality: None,
            size: WasteSize::Bag,
            status: WasteStatus::StillHere,
            types: BTreeSet::new(),
            created_at: updated,
            updated_at: updated,
            image_url: None,
            note: None,
            hidden: false,
            river: RiverAssignment::Unchecked,
        }
    }

    #[test]
    fn cutoff_is_whole_years_back() {
        let cutoff = retention_cutoff(now(), 6);
        assert_eq!(cutoff, Utc.with_ymd_and_hms(2019, 6, 1, 12, 0, 0).unwrap());
    }

    #[test]
    fn new_records_are_saved_and_logged() {
        let store = MemoryWasteStore::new();
        let records = vec![
            record(1, 46.25, "2025-01-01T00:00:00Z"),
            record(2, 46.30, "2025-02-01T00:00:00Z"),
        ];

        let result = sync(&store, &records, now(), 6).unwrap();

        assert_eq!(result.records_fetched, 2);
        assert_eq!(result.records_saved, 2);
        assert_eq!(result.total_count, 2);

        let logs = store.recent_update_logs(1).unwrap();
        assert_eq!(logs[0].update_count, 2);
        assert_eq!(logs[0].total_count, 2);
        assert_eq!(logs[0].update_time, now());
    }

    #[test]
    fn unchanged_records_are_not_rewritten() {
        let store = MemoryWasteStore::new();
        let records = vec![record(1, 46.25, "2025-01-01T00:00:00Z")];

        sync(&store, &records, now(), 6).unwrap();
        let second = sync(&store, &records, now(), 6).unwrap();

        assert_eq!(second.records_saved, 0);
        assert_eq!(second.total_count, 1);
    }

    #[test]
    fn stale_reports_are_pruned_and_not_reinserted() {
        let old = Utc.with_ymd_and_hms(2018, 1, 1, 0, 0, 0).unwrap();
        let store = MemoryWasteStore::with_points([stored(9, 46.0, old)]);
        let records = vec![record(9, 46.0, "2018-01-01T00:00:00Z")];

        let result = sync(&store, &records, now(), 6).unwrap();

        assert_eq!(result.records_deleted, 1);
        assert_eq!(result.records_saved, 0);
        assert!(store.get(9).unwrap().is_none());
    }

    #[test]
    fn hidden_flag_and_river_survive_a_content_change() {
        let updated = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut point = stored(1, 46.25, updated);
        point.hidden = true;
        point.river = RiverAssignment::Matched("TISZA".to_string());
        let store = MemoryWasteStore::with_points([point]);

        // same place, newer activity
        let records = vec![record(1, 46.25, "2025-01-01T00:00:00Z")];
        let result = sync(&store, &records, now(), 6).unwrap();

        assert_eq!(result.records_saved, 1);
        let saved = store.get(1).unwrap().unwrap();
        assert!(saved.hidden);
        assert_eq!(saved.river.river_name(), Some("TISZA"));
    }

    #[test]
    fn moved_points_go_back_to_unchecked() {
        let updated = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut point = stored(1, 46.25, updated);
        point.river = RiverAssignment::NoMatch;
        let store = MemoryWasteStore::with_points([point]);

        let records = vec![record(1, 47.00, "2025-01-01T00:00:00Z")];
        sync(&store, &records, now(), 6).unwrap();

        assert!(store.get(1).unwrap().unwrap().river.is_unchecked());
    }

    #[test]
    fn unparseable_records_are_counted_and_skipped() {
        let store = MemoryWasteStore::new();
        let mut bad = record(2, 46.0, "2025-01-01T00:00:00Z");
        bad["size"] = json!("truck");
        let records = vec![record(1, 46.0, "2025-01-01T00:00:00Z"), bad];

        let result = sync(&store, &records, now(), 6).unwrap();

        assert_eq!(result.records_parsed, 1);
        assert_eq!(result.records_skipped, 1);
        assert_eq!(result.records_saved, 1);
    }

    #[test]
    fn duplicate_ids_in_one_feed_keep_the_last_record() {
        let store = MemoryWasteStore::new();
        let records = vec![
            record(1, 46.0, "2025-01-01T00:00:00Z"),
            record(1, 46.5, "2025-02-01T00:00:00Z"),
        ];

        let result = sync(&store, &records, now(), 6).unwrap();

        assert_eq!(result.records_saved, 1);
        assert!((store.get(1).unwrap().unwrap().latitude - 46.5).abs() < 1e-12);
    }
}
