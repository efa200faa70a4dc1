//! Lookup tables shipped with the pipeline.
//!
//! Sites extend or override these from the `lookup_tables` section of the
//! pipeline file.

use crate::error::TranslateError;
use crate::translate::{CodeTable, LookupTables};

pub const MUNICIPAL_DISTRICTS: &str = "municipal_districts";
pub const PERMIT_TYPES: &str = "permit_types";
pub const POLICE_ORI: &str = "police_ori";
pub const STREET_DIRECTIONALS: &str = "street_directionals";
pub const STREET_TYPES: &str = "street_types";

/// Label used by tables that name missing input explicitly.
pub const UNSPECIFIED: &str = "UNSPECIFIED";

const MUNICIPAL_DISTRICT_ENTRIES: &[(&str, &str)] = &[
    ("22", "MEADVILLE CITY"),
    ("23", "MEADVILLE CITY"),
    ("24", "MEADVILLE CITY"),
];

const PERMIT_TYPE_ENTRIES: &[(&str, &str)] = &[
    ("10", "NEW RESIDENTIAL"),
    ("11", "NEW COMMERCIAL"),
    ("12", "RESIDENTIAL ADDITION"),
    ("13", "COMMERCIAL ADDITION"),
    ("14", "ALTERATION"),
    ("15", "ACCESSORY STRUCTURE"),
    ("16", "DEMOLITION"),
    ("17", "SWIMMING POOL"),
    ("18", "DECK OR PORCH"),
    ("19", "MOBILE HOME PLACEMENT"),
    ("20", "SIGN"),
    ("21", "ZONING VARIANCE"),
];

const POLICE_ORI_ENTRIES: &[(&str, &str)] = &[
    ("CAMBRIDGE SPRINGS PD", "PA0200100"),
    ("COCHRANTON PD", "PA0200200"),
    ("CONNEAUT LAKE PD", "PA0200800"),
    ("LINESVILLE PD", "PA0201000"),
    ("MEADVILLE PD", "PA0200300"),
    ("SAEGERTOWN PD", "PA0200500"),
    ("TITUSVILLE PD", "PA0200600"),
    ("VERNON TWP PD", "PA0201500"),
    ("WEST MEAD TWP PD", "PA0201600"),
    ("PSP MEADVILLE", "PAPSP1100"),
];

const STREET_DIRECTIONAL_ENTRIES: &[(&str, &str)] = &[
    ("N", "NORTH"),
    ("S", "SOUTH"),
    ("E", "EAST"),
    ("W", "WEST"),
    ("NE", "NORTHEAST"),
    ("NW", "NORTHWEST"),
    ("SE", "SOUTHEAST"),
    ("SW", "SOUTHWEST"),
];

const STREET_TYPE_ENTRIES: &[(&str, &str)] = &[
    ("ALY", "ALLEY"),
    ("AVE", "AVENUE"),
    ("BLVD", "BOULEVARD"),
    ("CIR", "CIRCLE"),
    ("CT", "COURT"),
    ("DR", "DRIVE"),
    ("EXT", "EXTENSION"),
    ("HWY", "HIGHWAY"),
    ("LN", "LANE"),
    ("PKWY", "PARKWAY"),
    ("PL", "PLACE"),
    ("RD", "ROAD"),
    ("SQ", "SQUARE"),
    ("ST", "STREET"),
    ("TER", "TERRACE"),
    ("TRL", "TRAIL"),
];

/// District number to municipality name.
///
/// # Errors
///
/// Returns [`TranslateError::DuplicateCode`] if the table is malformed.
pub fn municipal_districts() -> Result<CodeTable, TranslateError> {
    CodeTable::from_pairs(MUNICIPAL_DISTRICTS, MUNICIPAL_DISTRICT_ENTRIES.iter().copied())
}

/// Permit type code to description. Missing codes read `UNSPECIFIED`.
///
/// # Errors
///
/// Returns [`TranslateError::DuplicateCode`] if the table is malformed.
pub fn permit_types() -> Result<CodeTable, TranslateError> {
    Ok(
        CodeTable::from_pairs(PERMIT_TYPES, PERMIT_TYPE_ENTRIES.iter().copied())?
            .with_null_label(UNSPECIFIED),
    )
}

/// Police department name to the agency's ORI code.
///
/// # Errors
///
/// Returns [`TranslateError::DuplicateCode`] if the table is malformed.
pub fn police_ori() -> Result<CodeTable, TranslateError> {
    CodeTable::from_pairs(POLICE_ORI, POLICE_ORI_ENTRIES.iter().copied())
}

/// USPS directional abbreviation to full word.
///
/// # Errors
///
/// Returns [`TranslateError::DuplicateCode`] if the table is malformed.
pub fn street_directionals() -> Result<CodeTable, TranslateError> {
    CodeTable::from_pairs(STREET_DIRECTIONALS, STREET_DIRECTIONAL_ENTRIES.iter().copied())
}

/// USPS street suffix abbreviation to full word.
///
/// # Errors
///
/// Returns [`TranslateError::DuplicateCode`] if the table is malformed.
pub fn street_types() -> Result<CodeTable, TranslateError> {
    CodeTable::from_pairs(STREET_TYPES, STREET_TYPE_ENTRIES.iter().copied())
}

/// All shipped tables, keyed by name.
///
/// # Errors
///
/// Returns the first construction error of any shipped table.
pub fn shipped_tables() -> Result<LookupTables, TranslateError> {
    let mut tables = LookupTables::new();
    tables.insert(municipal_districts()?);
    tables.insert(permit_types()?);
    tables.insert(police_ori()?);
    tables.insert(street_directionals()?);
    tables.insert(street_types()?);
    Ok(tables)
}
