#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Waste report types shared across the tisza-map system.
//!
//! A [`WastePoint`] is one reported waste location as ingested from the
//! TrashOut feed. Its [`RiverAssignment`] starts out
//! [`Unchecked`](RiverAssignment::Unchecked) and is set exactly once by the
//! river enrichment pass.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Country a waste report was filed in.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum WasteCountry {
    Hungary,
    Ukraine,
    Romania,
    Serbia,
    Slovakia,
}

/// Estimated amount of waste at a location.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum WasteSize {
    /// Fits in a bag.
    Bag,
    /// Fits in a wheelbarrow.
    Wheelbarrow,
    /// Needs a car.
    Car,
}

/// Cleanup status of a waste report.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[strum(ascii_case_insensitive)]
pub enum WasteStatus {
    /// The waste is still there.
    #[serde(rename = "STILLHERE")]
    #[strum(serialize = "STILLHERE")]
    StillHere,
    /// The waste has been cleaned up.
    #[serde(rename = "CLEANED")]
    #[strum(serialize = "CLEANED")]
    Cleaned,
    /// More waste was reported at the same spot.
    #[serde(rename = "MORE")]
    #[strum(serialize = "MORE")]
    More,
}

/// Material category of a waste report.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum WasteType {
    Plastic,
    Metal,
    Glass,
    Domestic,
    Construction,
    Liquid,
    Dangerous,
    Automotive,
    Electronic,
    Organic,
    #[serde(rename = "DEADANIMALS")]
    #[strum(serialize = "DEADANIMALS")]
    DeadAnimals,
}

/// Outcome of the nearest-river lookup for a single waste point.
///
/// Transitions only `Unchecked -> NoMatch | Matched`. Once checked, a point
/// is never re-enriched automatically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "state", content = "river", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiverAssignment {
    /// Not yet looked at by an enrichment pass.
    #[default]
    Unchecked,
    /// Checked, but no river lies within the threshold.
    NoMatch,
    /// Checked, and this river is the nearest within the threshold.
    Matched(String),
}

impl RiverAssignment {
    /// Returns `true` while the point still needs enrichment.
    #[must_use]
    pub const fn is_unchecked(&self) -> bool {
        matches!(self, Self::Unchecked)
    }

    /// Returns the matched river name, if any.
    #[must_use]
    pub fn river_name(&self) -> Option<&str> {
        match self {
            Self::Matched(name) => Some(name),
            Self::Unchecked | Self::NoMatch => None,
        }
    }

    /// Builds an assignment from a lookup result.
    #[must_use]
    pub fn from_lookup(nearest: Option<String>) -> Self {
        nearest.map_or(Self::NoMatch, Self::Matched)
    }

    /// Encodes the assignment as a nullable text column.
    ///
    /// `NULL` means unchecked and the empty string means no match.
    #[must_use]
    pub fn to_column(&self) -> Option<&str> {
        match self {
            Self::Unchecked => None,
            Self::NoMatch => Some(""),
            Self::Matched(name) => Some(name),
        }
    }

    /// Decodes the nullable text column written by [`Self::to_column`].
    #[must_use]
    pub fn from_column(value: Option<String>) -> Self {
        match value {
            None => Self::Unchecked,
            Some(name) if name.is_empty() => Self::NoMatch,
            Some(name) => Self::Matched(name),
        }
    }
}

/// One reported waste location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WastePoint {
    /// TrashOut identifier.
    pub id: i64,
    /// Latitude in decimal degrees (-90..=90).
    pub latitude: f64,
    /// Longitude in decimal degrees (-180..=180).
    pub longitude: f64,
    pub country: Option<WasteCountry>,
    pub locality: Option<String>,
    pub sublocality: Option<String>,
    pub size: WasteSize,
    pub status: WasteStatus,
    pub types: BTreeSet<WasteType>,
    pub created_at: DateTime<Utc>,
    /// Last activity reported by the feed. Drives retention pruning.
    pub updated_at: DateTime<Utc>,
    pub image_url: Option<String>,
    pub note: Option<String>,
    /// Moderation flag owned locally; survives re-ingestion.
    pub hidden: bool,
    pub river: RiverAssignment,
}

impl WastePoint {
    /// Returns `true` if both points carry the same feed-owned content.
    ///
    /// The locally owned `hidden` flag and river assignment are ignored.
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn same_content(&self, other: &Self) -> bool {
        self.id == other.id
            && self.latitude == other.latitude
            && self.longitude == other.longitude
            && self.country == other.country
            && self.locality == other.locality
            && self.sublocality == other.sublocality
            && self.size == other.size
            && self.status == other.status
            && self.types == other.types
            && self.created_at == other.created_at
            && self.updated_at == other.updated_at
            && self.image_url == other.image_url
            && self.note == other.note
    }

    /// Returns `true` if both points sit at exactly the same coordinates.
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn same_location(&self, other: &Self) -> bool {
        self.latitude == other.latitude && self.longitude == other.longitude
    }
}

/// A record of one ingestion run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLog {
    /// Database primary key, `None` until stored.
    pub id: Option<i64>,
    pub update_time: DateTime<Utc>,
    /// Number of new or changed records saved.
    pub update_count: u64,
    /// Number of records pruned for inactivity.
    pub delete_count: u64,
    /// Records in the store after the run.
    pub total_count: u64,
}

#[cfg(test)]
mod tests {
    use std::str::FromStr as _;

    use chrono::TimeZone as _;

    use super::*;

    fn sample() -> WastePoint {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        WastePoint {
            id: 42,
            latitude: 47.5,
            longitude: 20.1,
            country: Some(WasteCountry::Hungary),
            locality: Some("Szolnok".to_string()),
            sublocality: None,
            size: WasteSize::Bag,
            status: WasteStatus::StillHere,
            types: BTreeSet::from([WasteType::Plastic]),
            created_at: ts,
            updated_at: ts,
            image_url: None,
            note: None,
            hidden: false,
            river: RiverAssignment::Unchecked,
        }
    }

    #[test]
    fn parses_feed_enum_spellings() {
        assert_eq!(WasteStatus::from_str("stillHere").unwrap(), WasteStatus::StillHere);
        assert_eq!(WasteStatus::from_str("cleaned").unwrap(), WasteStatus::Cleaned);
        assert_eq!(WasteType::from_str("deadAnimals").unwrap(), WasteType::DeadAnimals);
        assert_eq!(WasteSize::from_str("wheelbarrow").unwrap(), WasteSize::Wheelbarrow);
        assert_eq!(WasteCountry::from_str("hungary").unwrap(), WasteCountry::Hungary);
        assert!(WasteCountry::from_str("austria").is_err());
    }

    #[test]
    fn enum_names_are_screaming() {
        assert_eq!(WasteType::DeadAnimals.as_ref(), "DEADANIMALS");
        assert_eq!(WasteStatus::StillHere.as_ref(), "STILLHERE");
        assert_eq!(WasteType::Construction.as_ref(), "CONSTRUCTION");
    }

    #[test]
    fn river_column_encoding_distinguishes_unchecked_from_no_match() {
        assert_eq!(RiverAssignment::Unchecked.to_column(), None);
        assert_eq!(RiverAssignment::NoMatch.to_column(), Some(""));
        assert_eq!(
            RiverAssignment::Matched("TISZA".to_string()).to_column(),
            Some("TISZA")
        );

        assert_eq!(RiverAssignment::from_column(None), RiverAssignment::Unchecked);
        assert_eq!(
            RiverAssignment::from_column(Some(String::new())),
            RiverAssignment::NoMatch
        );
        assert_eq!(
            RiverAssignment::from_column(Some("MAROS".to_string())),
            RiverAssignment::Matched("MAROS".to_string())
        );
    }

    #[test]
    fn lookup_result_maps_to_assignment() {
        assert_eq!(RiverAssignment::from_lookup(None), RiverAssignment::NoMatch);
        assert_eq!(
            RiverAssignment::from_lookup(Some("TISZA".to_string())).river_name(),
            Some("TISZA")
        );
        assert!(RiverAssignment::default().is_unchecked());
    }

    #[test]
    fn same_content_ignores_local_fields() {
        let a = sample();
        let mut b = sample();
        b.hidden = true;
        b.river = RiverAssignment::Matched("TISZA".to_string());
        assert!(a.same_content(&b));

        b.status = WasteStatus::Cleaned;
        assert!(!a.same_content(&b));
    }
}
