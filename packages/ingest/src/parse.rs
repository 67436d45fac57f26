//! Parsing of raw TrashOut trash records into [`WastePoint`]s.

use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::{DateTime, SubsecRound as _, Utc};
use serde_json::Value;
use tisza_map_waste_models::{
    RiverAssignment, WasteCountry, WastePoint, WasteSize, WasteStatus, WasteType,
};

use crate::IngestError;

/// Parses one record of the trash list.
///
/// Timestamps are truncated to microseconds so that a point read back from
/// the database compares equal to the same record parsed again.
///
/// # Errors
///
/// Returns [`IngestError::Parse`] if a required field is missing or an
/// enumerated field holds a value the waste model does not know.
pub fn parse_waste(value: &Value) -> Result<WastePoint, IngestError> {
    let id = value["id"].as_i64();
    let fail = |message: String| IngestError::Parse { id, message };
    let id = id.ok_or_else(|| fail("missing id".to_string()))?;

    let gps = &value["gps"];
    let latitude = gps["lat"]
        .as_f64()
        .ok_or_else(|| fail("missing gps.lat".to_string()))?;
    let longitude = gps["long"]
        .as_f64()
        .ok_or_else(|| fail("missing gps.long".to_string()))?;

    let area = &gps["area"];
    let country = optional_str(&area["country"])
        .map(|s| parse_enum::<WasteCountry>(s, "country").map_err(&fail))
        .transpose()?;

    let types = value["types"]
        .as_array()
        .ok_or_else(|| fail("missing types".to_string()))?
        .iter()
        .map(|t| {
            t.as_str()
                .ok_or_else(|| format!("non-string type {t}"))
                .and_then(|s| parse_enum::<WasteType>(s, "type"))
                .map_err(&fail)
        })
        .collect::<Result<BTreeSet<_>, _>>()?;

    let size = required_str(&value["size"], "size")
        .and_then(|s| parse_enum::<WasteSize>(s, "size"))
        .map_err(&fail)?;
    let status = required_str(&value["status"], "status")
        .and_then(|s| parse_enum::<WasteStatus>(s, "status"))
        .map_err(&fail)?;

    let created_at = timestamp(&value["created"], "created").map_err(&fail)?;
    let updated_at = timestamp(&value["updateTime"], "updateTime").map_err(&fail)?;

    Ok(WastePoint {
        id,
        latitude,
        longitude,
        country,
        locality: optional_str(&area["locality"]).map(ToString::to_string),
        sublocality: optional_str(&area["subLocality"]).map(ToString::to_string),
        size,
        status,
        types,
        created_at,
        updated_at,
        image_url: optional_str(&value["images"][0]["fullDownloadUrl"])
            .map(ToString::to_string),
        note: optional_str(&value["note"]).map(ToString::to_string),
        hidden: false,
        river: RiverAssignment::Unchecked,
    })
}

/// Non-empty string value, treating `null` and `""` as absent.
fn optional_str(value: &Value) -> Option<&str> {
    value.as_str().map(str::trim).filter(|s| !s.is_empty())
}

fn required_str<'a>(value: &'a Value, field: &str) -> Result<&'a str, String> {
    optional_str(value).ok_or_else(|| format!("missing {field}"))
}

fn parse_enum<T: FromStr>(raw: &str, field: &str) -> Result<T, String> {
    raw.parse()
        .map_err(|_| format!("unknown {field} {raw:?}"))
}

fn timestamp(value: &Value, field: &str) -> Result<DateTime<Utc>, String> {
    let raw = required_str(value, field)?;
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc).trunc_subsecs(6))
        .map_err(|e| format!("invalid {field} {raw:?}: {e}"))
}
