//! Address matching against a built locator.
//!
//! Addresses are normalized (uppercased, punctuation dropped, directionals
//! and street types reduced to their USPS abbreviations) before lookup.
//! Exact matches score 100; otherwise the closest reference address by
//! Jaro-Winkler similarity is accepted when it reaches the locator's
//! minimum score.

use std::collections::BTreeSet;

use geo::Centroid;
use geo_types::{Geometry, Point};
use geosync_core_common::{DatasetSchema, Feature, FieldDef, GeometryType, Table, Value};
use serde::{Deserialize, Serialize};

use crate::derive::require_field;
use crate::error::{DerivationError, Result};
use crate::tables::{street_directionals, street_types};
use crate::translate::CodeTable;

pub const STATUS_FIELD: &str = "Status";
pub const SCORE_FIELD: &str = "Score";
pub const MATCH_ADDR_FIELD: &str = "Match_addr";
pub const X_FIELD: &str = "X";
pub const Y_FIELD: &str = "Y";

/// Default minimum score for a fuzzy match.
pub const DEFAULT_MIN_SCORE: f64 = 85.0;

/// Outcome of matching one address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStatus {
    /// One location found.
    Matched,
    /// Several equally good locations; the first is used.
    Tied,
    /// Nothing good enough.
    Unmatched,
}

impl MatchStatus {
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            MatchStatus::Matched => "M",
            MatchStatus::Tied => "T",
            MatchStatus::Unmatched => "U",
        }
    }

    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "M" | "m" => Some(MatchStatus::Matched),
            "T" | "t" => Some(MatchStatus::Tied),
            "U" | "u" => Some(MatchStatus::Unmatched),
            _ => None,
        }
    }
}

/// Standardizes address text before matching.
#[derive(Debug, Clone)]
pub struct AddressNormalizer {
    directionals: CodeTable,
    street_types: CodeTable,
}

impl AddressNormalizer {
    /// Normalizer built from the shipped street tables.
    ///
    /// # Errors
    ///
    /// Returns a lookup table error if a shipped table cannot be inverted.
    pub fn standard() -> Result<Self> {
        Ok(Self {
            directionals: street_directionals()?.inverted("directional_words")?,
            street_types: street_types()?.inverted("street_type_words")?,
        })
    }

    /// Uppercases, strips punctuation and abbreviates known words.
    #[must_use]
    pub fn normalize(&self, address: &str) -> String {
        let cleaned: String = address
            .chars()
            .map(|c| {
                if c.is_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    ' '
                }
            })
            .collect();
        cleaned
            .split_whitespace()
            .map(|token| {
                self.directionals
                    .lookup(token)
                    .or_else(|| self.street_types.lookup(token))
                    .unwrap_or(token)
                    .to_string()
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A reference address with its location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocatorEntry {
    /// Normalized address
    pub key: String,
    /// Address as written in the reference data
    pub label: String,
    pub x: f64,
    pub y: f64,
}

/// Searchable set of reference addresses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Locator {
    pub name: String,
    pub min_score: f64,
    /// Reference dataset the locator was built from
    pub reference: String,
    /// Entries sorted by key
    entries: Vec<LocatorEntry>,
}

/// Result of matching one address.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub status: MatchStatus,
    pub score: f64,
    pub matched_address: Option<String>,
    pub location: Option<Point<f64>>,
}

impl MatchResult {
    fn unmatched(score: f64) -> Self {
        Self {
            status: MatchStatus::Unmatched,
            score,
            matched_address: None,
            location: None,
        }
    }
}

fn location_of(geometry: &Geometry<f64>) -> Option<Point<f64>> {
    match geometry {
        Geometry::Point(p) => Some(*p),
        other => other.centroid(),
    }
}

impl Locator {
    /// Builds a locator from reference features.
    ///
    /// The address is the non-empty values of `address_fields` joined by
    /// spaces. Features without geometry or address are skipped; polygons
    /// are located at their centroid.
    ///
    /// # Errors
    ///
    /// Returns a missing-field error when an address field is absent.
    pub fn build(
        name: impl Into<String>,
        reference: impl Into<String>,
        table: &Table,
        address_fields: &[String],
        min_score: f64,
        normalizer: &AddressNormalizer,
    ) -> Result<Self> {
        let fields = address_fields
            .iter()
            .map(|f| require_field(&table.schema, f, "locator reference").map(|d| d.name.clone()))
            .collect::<Result<Vec<_>>>()?;

        let mut entries = Vec::with_capacity(table.len());
        for feature in &table.features {
            let Some(point) = feature.geometry.as_ref().and_then(location_of) else {
                continue;
            };
            let label = address_text(feature, &fields);
            let key = normalizer.normalize(&label);
            if key.is_empty() {
                continue;
            }
            entries.push(LocatorEntry {
                key,
                label,
                x: point.x(),
                y: point.y(),
            });
        }
        entries.sort_by(|a, b| a.key.cmp(&b.key));

        Ok(Self {
            name: name.into(),
            min_score,
            reference: reference.into(),
            entries,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn resolve(candidates: &[&LocatorEntry], score: f64) -> MatchResult {
        let distinct: BTreeSet<(u64, u64)> = candidates
            .iter()
            .map(|e| (e.x.to_bits(), e.y.to_bits()))
            .collect();
        let Some(best) = candidates.first() else {
            return MatchResult::unmatched(score);
        };
        MatchResult {
            status: if distinct.len() > 1 {
                MatchStatus::Tied
            } else {
                MatchStatus::Matched
            },
            score,
            matched_address: Some(best.label.clone()),
            location: Some(Point::new(best.x, best.y)),
        }
    }

    /// Matches one address.
    #[must_use]
    pub fn find(&self, address: &str, normalizer: &AddressNormalizer) -> MatchResult {
        let key = normalizer.normalize(address);
        if key.is_empty() {
            return MatchResult::unmatched(0.0);
        }

        let start = self.entries.partition_point(|e| e.key < key);
        let exact: Vec<&LocatorEntry> = self.entries[start..]
            .iter()
            .take_while(|e| e.key == key)
            .collect();
        if !exact.is_empty() {
            return Self::resolve(&exact, 100.0);
        }

        let scored: Vec<(f64, &LocatorEntry)> = self
            .entries
            .iter()
            .map(|e| (strsim::jaro_winkler(&key, &e.key) * 100.0, e))
            .collect();
        let best = scored.iter().map(|(s, _)| *s).fold(0.0_f64, f64::max);
        if best < self.min_score {
            return MatchResult::unmatched(best);
        }
        let candidates: Vec<&LocatorEntry> = scored
            .iter()
            .filter(|(s, _)| (best - s).abs() < 1e-9)
            .map(|(_, e)| *e)
            .collect();
        Self::resolve(&candidates, best)
    }
}

fn address_text(feature: &Feature, fields: &[String]) -> String {
    fields
        .iter()
        .filter_map(|f| feature.get(f).as_text())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Geocodes every row of `table`.
///
/// The output has the input fields followed by `Status`, `Score`,
/// `Match_addr`, `X` and `Y`, and a point geometry at the matched location
/// (none for unmatched rows).
///
/// # Errors
///
/// Returns a missing-field error for absent address fields and
/// [`DerivationError::FieldCollision`] when the input already has one of
/// the result fields.
pub fn geocode(
    table: &Table,
    locator: &Locator,
    address_fields: &[String],
    normalizer: &AddressNormalizer,
) -> Result<Table> {
    let fields = address_fields
        .iter()
        .map(|f| require_field(&table.schema, f, "geocode input").map(|d| d.name.clone()))
        .collect::<Result<Vec<_>>>()?;

    let mut schema_fields = table.schema.fields.clone();
    for def in [
        FieldDef::text(STATUS_FIELD, 1),
        FieldDef::double(SCORE_FIELD),
        FieldDef::text(MATCH_ADDR_FIELD, 120),
        FieldDef::double(X_FIELD),
        FieldDef::double(Y_FIELD),
    ] {
        if table.schema.has_field(&def.name) {
            return Err(DerivationError::FieldCollision { field: def.name }.into());
        }
        schema_fields.push(def);
    }
    let mut output = Table::new(DatasetSchema::new(GeometryType::Point, schema_fields)?);

    for feature in &table.features {
        let result = locator.find(&address_text(feature, &fields), normalizer);
        let mut row = Feature {
            attributes: feature.attributes.clone(),
            geometry: result.location.map(Geometry::Point),
        };
        row.set(STATUS_FIELD, result.status.code());
        row.set(SCORE_FIELD, (result.score * 100.0).round() / 100.0);
        row.set(MATCH_ADDR_FIELD, result.matched_address);
        row.set(X_FIELD, result.location.map(|p| p.x()));
        row.set(Y_FIELD, result.location.map(|p| p.y()));
        output.push(row)?;
    }
    Ok(output)
}

/// Splits geocoded rows into those that proceed (matched or tied) and
/// those needing review (unmatched).
///
/// # Errors
///
/// Returns a missing-field error when the table has no `Status` field.
pub fn split_by_status(table: &Table) -> Result<(Table, Table)> {
    let status = require_field(&table.schema, STATUS_FIELD, "geocode result")?
        .name
        .clone();
    let (unmatched, proceed): (Vec<usize>, Vec<usize>) = (0..table.len()).partition(|&row| {
        table.features[row]
            .get(&status)
            .as_text()
            .and_then(|code| MatchStatus::from_code(&code))
            .is_none_or(|s| s == MatchStatus::Unmatched)
    });
    Ok((table.select(&proceed), table.select(&unmatched)))
}

/// Counts rows per status, in `(matched, tied, unmatched)` order.
#[must_use]
pub fn status_counts(table: &Table) -> (usize, usize, usize) {
    let mut counts = (0, 0, 0);
    for feature in &table.features {
        match feature
            .get(STATUS_FIELD)
            .as_text()
            .and_then(|code| MatchStatus::from_code(&code))
        {
            Some(MatchStatus::Matched) => counts.0 += 1,
            Some(MatchStatus::Tied) => counts.1 += 1,
            _ => counts.2 += 1,
        }
    }
    counts
}

/// Wraps a plain value list as a one-field address table, used by the CLI
/// and tests.
///
/// # Errors
///
/// Returns a schema error if `field` is empty.
pub fn address_table(field: &str, addresses: &[&str]) -> Result<Table> {
    let schema = DatasetSchema::table(vec![FieldDef::text(field, 120)])?;
    Ok(Table::from_features(
        schema,
        addresses
            .iter()
            .map(|a| Feature::new().with(field, Value::from(*a)))
            .collect(),
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference() -> Table {
        let schema = DatasetSchema::new(
            GeometryType::Point,
            vec![FieldDef::text("FULLADDR", 60)],
        )
        .unwrap();
        Table::from_features(
            schema,
            vec![
                Feature::new()
                    .with("FULLADDR", "10 North Main Street")
                    .with_geometry(Point::new(1.0, 1.0)),
                Feature::new()
                    .with("FULLADDR", "12 N MAIN ST")
                    .with_geometry(Point::new(2.0, 1.0)),
                Feature::new()
                    .with("FULLADDR", "400 PARK AVE")
                    .with_geometry(Point::new(5.0, 5.0)),
                Feature::new()
                    .with("FULLADDR", "400 PARK AVENUE")
                    .with_geometry(Point::new(6.0, 5.0)),
                Feature::new().with("FULLADDR", "NO LOCATION RD"),
            ],
        )
        .unwrap()
    }

    fn locator() -> Locator {
        Locator::build(
            "addresses",
            "county/Addresses",
            &reference(),
            &["FULLADDR".to_string()],
            DEFAULT_MIN_SCORE,
            &AddressNormalizer::standard().unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_normalize() {
        let normalizer = AddressNormalizer::standard().unwrap();
        assert_eq!(normalizer.normalize("10 north main street"), "10 N MAIN ST");
        assert_eq!(normalizer.normalize(" 4-B  Park Ave. "), "4 B PARK AVE");
        assert_eq!(normalizer.normalize("..."), "");
    }

    #[test]
    fn test_build_skips_rows_without_location() {
        assert_eq!(locator().len(), 4);
    }

    #[test]
    fn test_exact_match_and_tie() {
        let normalizer = AddressNormalizer::standard().unwrap();
        let locator = locator();

        let exact = locator.find("10 N Main St", &normalizer);
        assert_eq!(exact.status, MatchStatus::Matched);
        assert_eq!(exact.score, 100.0);
        assert_eq!(exact.location, Some(Point::new(1.0, 1.0)));

        let tie = locator.find("400 Park Avenue", &normalizer);
        assert_eq!(tie.status, MatchStatus::Tied);
        assert!(tie.location.is_some());
    }

    #[test]
    fn test_fuzzy_and_unmatched() {
        let normalizer = AddressNormalizer::standard().unwrap();
        let locator = locator();

        let close = locator.find("12 N MAIN STT", &normalizer);
        assert_eq!(close.status, MatchStatus::Matched);
        assert!(close.score >= DEFAULT_MIN_SCORE && close.score < 100.0);
        assert_eq!(close.location, Some(Point::new(2.0, 1.0)));

        let none = locator.find("999 ZEPHYR WAY", &normalizer);
        assert_eq!(none.status, MatchStatus::Unmatched);
        assert!(none.location.is_none());
    }

    #[test]
    fn test_geocode_and_split() {
        let normalizer = AddressNormalizer::standard().unwrap();
        let input = address_table(
            "SITE_ADDR",
            &["10 N MAIN ST", "400 PARK AVE", "77 NOWHERE BLVD"],
        )
        .unwrap();
        let geocoded =
            geocode(&input, &locator(), &["SITE_ADDR".to_string()], &normalizer).unwrap();

        assert_eq!(geocoded.schema.geometry_type, GeometryType::Point);
        assert_eq!(status_counts(&geocoded), (1, 1, 1));
        assert_eq!(geocoded.features[0].get(X_FIELD), &Value::Float(1.0));

        let (proceed, unmatched) = split_by_status(&geocoded).unwrap();
        assert_eq!(proceed.len(), 2);
        assert_eq!(unmatched.len(), 1);
        assert_eq!(
            unmatched.features[0].get("SITE_ADDR"),
            &Value::from("77 NOWHERE BLVD")
        );
        assert!(unmatched.features[0].geometry.is_none());
    }

    #[test]
    fn test_result_field_collision() {
        let normalizer = AddressNormalizer::standard().unwrap();
        let input = address_table("Status", &["10 N MAIN ST"]).unwrap();
        let err = geocode(&input, &locator(), &["Status".to_string()], &normalizer).unwrap_err();
        assert!(err.to_string().contains("Status"));
    }

    #[test]
    fn test_locator_json_round_trip() {
        let locator = locator();
        let json = serde_json::to_string(&locator).unwrap();
        let back: Locator = serde_json::from_str(&json).unwrap();
        assert_eq!(back, locator);
    }
}
