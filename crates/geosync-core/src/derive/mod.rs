//! Derivation operations.
//!
//! Each operation takes materialized input tables and returns a new table;
//! reading inputs and storing outputs is left to the step that calls it.

mod calculate;
mod copy;
mod join;
mod spatial;

pub use calculate::{Calculation, ConcatPart, calculate_field};
pub use copy::filtered_copy;
pub use join::{JoinSpec, JoinedTable, attribute_join};
pub use spatial::{
    DissolveSpec, JoinMode, JOIN_COUNT_FIELD, SpatialJoinSpec, SpatialRelation, StatField,
    Statistic, dissolve, intersect, spatial_join,
};

use geosync_core_common::{DatasetSchema, FieldDef};

use crate::error::{DerivationError, Result};

/// Looks up `name` in `schema`, reporting `dataset` when it is missing.
pub(crate) fn require_field<'a>(
    schema: &'a DatasetSchema,
    name: &str,
    dataset: &str,
) -> Result<&'a FieldDef> {
    schema.field(name).ok_or_else(|| {
        DerivationError::MissingField {
            dataset: dataset.to_string(),
            field: name.to_string(),
        }
        .into()
    })
}

/// Returns `name`, or `name_1`, `name_2`, ... if it is already taken.
pub(crate) fn unique_name(schema: &DatasetSchema, name: &str) -> String {
    if !schema.has_field(name) {
        return name.to_string();
    }
    (1..)
        .map(|n| format!("{name}_{n}"))
        .find(|candidate| !schema.has_field(candidate))
        .unwrap_or_else(|| name.to_string())
}
