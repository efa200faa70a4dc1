//! Geometry-driven derivations: spatial join, dissolve and intersect.

use std::collections::HashMap;

use geo::{Area, BooleanOps, BoundingRect, Intersects, Relate};
use geo_types::{Geometry, LineString, MultiLineString, MultiPoint, MultiPolygon, Point, Rect};
use geosync_core_common::{DatasetSchema, Feature, FieldDef, GeometryType, Table, Value};

use super::{require_field, unique_name};
use crate::error::{DerivationError, Result};

/// Field added by [`spatial_join`] holding the number of related features.
pub const JOIN_COUNT_FIELD: &str = "Join_Count";

/// Spatial predicate between a target feature and a join feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpatialRelation {
    #[default]
    Intersects,
    /// The target contains the join feature.
    Contains,
    /// The target lies within the join feature.
    Within,
}

impl SpatialRelation {
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "intersects" | "intersect" => Some(Self::Intersects),
            "contains" => Some(Self::Contains),
            "within" => Some(Self::Within),
            _ => None,
        }
    }

    fn holds(self, target: &Geometry<f64>, join: &Geometry<f64>) -> bool {
        match self {
            Self::Intersects => target.intersects(join),
            Self::Contains => target.relate(join).is_contains(),
            Self::Within => target.relate(join).is_within(),
        }
    }
}

/// How many output rows a target feature produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinMode {
    /// One row per target; attributes from the first related feature.
    #[default]
    OneToOne,
    /// One row per related pair.
    OneToMany,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SpatialJoinSpec {
    pub relation: SpatialRelation,
    pub mode: JoinMode,
    /// Join-layer fields to carry; empty carries all of them.
    pub fields: Vec<String>,
    /// Keep targets that relate to nothing.
    pub keep_unmatched: bool,
}

fn bbox(geometry: &Geometry<f64>) -> Option<Rect<f64>> {
    geometry.bounding_rect()
}

fn boxes_overlap(a: Option<Rect<f64>>, b: Option<Rect<f64>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => {
            a.min().x <= b.max().x
                && b.min().x <= a.max().x
                && a.min().y <= b.max().y
                && b.min().y <= a.max().y
        },
        _ => false,
    }
}

/// Appends `fields` of `source` to `schema`, returning `(source, output)` names.
fn carry_fields(
    schema: &mut DatasetSchema,
    source: &DatasetSchema,
    fields: &[String],
    dataset: &str,
) -> Result<Vec<(String, String)>> {
    let defs = if fields.is_empty() {
        source.fields.clone()
    } else {
        fields
            .iter()
            .map(|name| require_field(source, name, dataset).cloned())
            .collect::<Result<Vec<_>>>()?
    };
    let mut renames = Vec::with_capacity(defs.len());
    for def in defs {
        let output = unique_name(schema, &def.name);
        renames.push((def.name.clone(), output.clone()));
        schema.push_field(def.renamed(output))?;
    }
    Ok(renames)
}

/// Transfers attributes from `join` onto `target` by spatial relationship.
///
/// The output keeps the target geometry and schema, followed by
/// [`JOIN_COUNT_FIELD`] and the carried join fields.
///
/// # Errors
///
/// Returns missing-field errors for carried fields and conformance errors
/// for the output rows.
pub fn spatial_join(target: &Table, join: &Table, spec: &SpatialJoinSpec) -> Result<Table> {
    let mut schema = target.schema.clone();
    let count_field = unique_name(&schema, JOIN_COUNT_FIELD);
    schema.push_field(FieldDef::integer(count_field.clone()))?;
    let renames = carry_fields(&mut schema, &join.schema, &spec.fields, "spatial join features")?;

    let join_boxes: Vec<Option<Rect<f64>>> = join
        .features
        .iter()
        .map(|f| f.geometry.as_ref().and_then(bbox))
        .collect();

    let mut output = Table::new(schema);
    for feature in &target.features {
        let matches: Vec<&Feature> = match &feature.geometry {
            Some(geometry) => {
                let target_box = bbox(geometry);
                join.features
                    .iter()
                    .zip(&join_boxes)
                    .filter(|(_, join_box)| boxes_overlap(target_box, **join_box))
                    .filter_map(|(candidate, _)| {
                        candidate
                            .geometry
                            .as_ref()
                            .filter(|g| spec.relation.holds(geometry, g))
                            .map(|_| candidate)
                    })
                    .collect()
            },
            None => Vec::new(),
        };

        let joined = |source: Option<&Feature>, count: i64| -> Feature {
            let mut row = feature.clone();
            row.set(count_field.clone(), count);
            if let Some(source) = source {
                for (from, to) in &renames {
                    row.set(to.clone(), source.get(from).clone());
                }
            }
            row
        };

        match (spec.mode, matches.as_slice()) {
            (_, []) => {
                if spec.keep_unmatched {
                    output.push(joined(None, 0))?;
                }
            },
            (JoinMode::OneToOne, [first, ..]) => {
                output.push(joined(Some(*first), matches.len() as i64))?;
            },
            (JoinMode::OneToMany, all) => {
                for source in all {
                    output.push(joined(Some(*source), 1))?;
                }
            },
        }
    }
    Ok(output)
}

/// Summary statistic computed per dissolve group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Statistic {
    First,
    Count,
    Sum,
}

impl Statistic {
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "first" => Some(Self::First),
            "count" => Some(Self::Count),
            "sum" => Some(Self::Sum),
            _ => None,
        }
    }

    fn prefix(self) -> &'static str {
        match self {
            Self::First => "FIRST",
            Self::Count => "COUNT",
            Self::Sum => "SUM",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatField {
    pub field: String,
    pub statistic: Statistic,
    /// Output name; defaults to `<STATISTIC>_<field>`.
    pub output: Option<String>,
}

impl StatField {
    #[must_use]
    pub fn new(field: impl Into<String>, statistic: Statistic) -> Self {
        Self {
            field: field.into(),
            statistic,
            output: None,
        }
    }

    fn output_name(&self) -> String {
        self.output
            .clone()
            .unwrap_or_else(|| format!("{}_{}", self.statistic.prefix(), self.field))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DissolveSpec {
    /// Fields whose shared values define a group; empty merges everything.
    pub fields: Vec<String>,
    pub statistics: Vec<StatField>,
}

fn as_multipolygon(geometry: &Geometry<f64>) -> Option<MultiPolygon<f64>> {
    match geometry {
        Geometry::Polygon(p) => Some(MultiPolygon::new(vec![p.clone()])),
        Geometry::MultiPolygon(mp) => Some(mp.clone()),
        Geometry::Rect(r) => Some(MultiPolygon::new(vec![r.to_polygon()])),
        Geometry::Triangle(t) => Some(MultiPolygon::new(vec![t.to_polygon()])),
        _ => None,
    }
}

/// Collapses a multipolygon with one part to a plain polygon.
fn simplify_polygons(mut mp: MultiPolygon<f64>) -> Option<Geometry<f64>> {
    match mp.0.len() {
        0 => None,
        1 => mp.0.pop().map(Geometry::Polygon),
        _ => Some(Geometry::MultiPolygon(mp)),
    }
}

fn merge_geometries(
    geometry_type: GeometryType,
    geometries: &[&Geometry<f64>],
) -> Result<Option<Geometry<f64>>> {
    let invalid = |g: &Geometry<f64>| DerivationError::Geometry {
        operation: "dissolve".to_string(),
        message: format!(
            "cannot merge {} geometry into {geometry_type} output",
            GeometryType::of(g).map_or("mixed", |t| t.as_str())
        ),
    };
    let merged = match geometry_type {
        GeometryType::None => None,
        GeometryType::Polygon => {
            let mut union = MultiPolygon::<f64>::new(Vec::new());
            for geometry in geometries.iter().copied() {
                let part = as_multipolygon(geometry).ok_or_else(|| invalid(geometry))?;
                union = if union.0.is_empty() {
                    part
                } else {
                    union.union(&part)
                };
            }
            simplify_polygons(union)
        },
        GeometryType::Line => {
            let mut lines: Vec<LineString<f64>> = Vec::new();
            for geometry in geometries.iter().copied() {
                match geometry {
                    Geometry::LineString(l) => lines.push(l.clone()),
                    Geometry::MultiLineString(ml) => lines.extend(ml.0.iter().cloned()),
                    Geometry::Line(l) => lines.push(LineString::from(vec![l.start, l.end])),
                    other => return Err(invalid(other).into()),
                }
            }
            (!lines.is_empty()).then(|| Geometry::MultiLineString(MultiLineString::new(lines)))
        },
        GeometryType::Point => {
            let mut points: Vec<Point<f64>> = Vec::new();
            for geometry in geometries.iter().copied() {
                match geometry {
                    Geometry::Point(p) => points.push(*p),
                    Geometry::MultiPoint(mp) => points.extend(mp.0.iter().copied()),
                    other => return Err(invalid(other).into()),
                }
            }
            (!points.is_empty()).then(|| Geometry::MultiPoint(MultiPoint::new(points)))
        },
    };
    Ok(merged)
}

/// Merges features sharing the same values of the dissolve fields.
///
/// Groups appear in order of their first feature. Polygon geometry is
/// unioned; lines and points are gathered into multi-part geometries.
///
/// # Errors
///
/// Returns missing-field errors, [`DerivationError::Geometry`] for geometry
/// that cannot be merged, and conformance errors for the output rows.
pub fn dissolve(table: &Table, spec: &DissolveSpec) -> Result<Table> {
    let group_fields = spec
        .fields
        .iter()
        .map(|name| require_field(&table.schema, name, "dissolve input").cloned())
        .collect::<Result<Vec<_>>>()?;

    let mut schema = DatasetSchema::new(table.schema.geometry_type, group_fields.clone())?;
    let mut stats = Vec::with_capacity(spec.statistics.len());
    for stat in &spec.statistics {
        let source = require_field(&table.schema, &stat.field, "dissolve input")?.clone();
        let output = stat.output_name();
        let def = match stat.statistic {
            Statistic::First => source.clone().renamed(&output),
            Statistic::Count => FieldDef::integer(&output),
            Statistic::Sum => FieldDef::double(&output),
        };
        schema.push_field(def)?;
        stats.push((stat.statistic, source.name, output));
    }

    let mut order: Vec<Vec<Option<String>>> = Vec::new();
    let mut groups: HashMap<Vec<Option<String>>, Vec<&Feature>> = HashMap::new();
    for feature in &table.features {
        let key: Vec<Option<String>> = group_fields
            .iter()
            .map(|f| feature.get(&f.name).key())
            .collect();
        groups
            .entry(key.clone())
            .or_insert_with(|| {
                order.push(key);
                Vec::new()
            })
            .push(feature);
    }

    let mut output = Table::new(schema);
    for key in &order {
        let Some(members) = groups.get(key) else {
            continue;
        };
        let Some(first) = members.first() else {
            continue;
        };
        let mut row = Feature::new();
        for field in &group_fields {
            row.set(field.name.clone(), first.get(&field.name).clone());
        }
        for (statistic, source, output_name) in &stats {
            let values = members.iter().map(|m| m.get(source));
            let value = match statistic {
                Statistic::First => first.get(source).clone(),
                Statistic::Count => Value::Int(values.filter(|v| !v.is_null()).count() as i64),
                Statistic::Sum => Value::Float(values.filter_map(Value::as_f64).sum()),
            };
            row.set(output_name.clone(), value);
        }
        let geometries: Vec<&Geometry<f64>> =
            members.iter().filter_map(|m| m.geometry.as_ref()).collect();
        row.geometry = merge_geometries(table.schema.geometry_type, &geometries)?;
        output.push(row)?;
    }
    Ok(output)
}

/// Overlays two polygon tables, keeping only the areas they share.
///
/// Each output row carries the attributes of both inputs; overlay fields
/// whose names collide with input fields get a `_1` suffix.
///
/// # Errors
///
/// Returns [`DerivationError::GeometryType`] unless both inputs are polygon
/// datasets.
pub fn intersect(input: &Table, overlay: &Table) -> Result<Table> {
    for table in [input, overlay] {
        if table.schema.geometry_type != GeometryType::Polygon {
            return Err(DerivationError::GeometryType {
                operation: "intersect".to_string(),
                expected: GeometryType::Polygon.to_string(),
                found: table.schema.geometry_type.to_string(),
            }
            .into());
        }
    }

    let mut schema = input.schema.clone();
    let renames = carry_fields(&mut schema, &overlay.schema, &[], "intersect overlay")?;

    let overlay_parts: Vec<Option<(MultiPolygon<f64>, Rect<f64>)>> = overlay
        .features
        .iter()
        .map(|f| {
            let mp = f.geometry.as_ref().and_then(as_multipolygon)?;
            let rect = mp.bounding_rect()?;
            Some((mp, rect))
        })
        .collect();

    let mut output = Table::new(schema);
    for feature in &input.features {
        let Some(part) = feature.geometry.as_ref().and_then(as_multipolygon) else {
            continue;
        };
        let part_box = part.bounding_rect();
        for (other, overlay_part) in overlay.features.iter().zip(&overlay_parts) {
            let Some((other_mp, other_box)) = overlay_part else {
                continue;
            };
            if !boxes_overlap(part_box, Some(*other_box)) {
                continue;
            }
            let shared = part.intersection(other_mp);
            if shared.unsigned_area() <= 0.0 {
                continue;
            }
            let mut row = feature.clone();
            for (from, to) in &renames {
                row.set(to.clone(), other.get(from).clone());
            }
            row.geometry = simplify_polygons(shared);
            output.push(row)?;
        }
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{Polygon, polygon};

    fn square(x: f64, y: f64, size: f64) -> Polygon<f64> {
        polygon![
            (x: x, y: y),
            (x: x + size, y: y),
            (x: x + size, y: y + size),
            (x: x, y: y + size),
            (x: x, y: y),
        ]
    }

    fn municipalities() -> Table {
        let schema =
            DatasetSchema::new(GeometryType::Polygon, vec![FieldDef::text("MUNI", 30)]).unwrap();
        Table::from_features(
            schema,
            vec![
                Feature::new()
                    .with("MUNI", "MEADVILLE CITY")
                    .with_geometry(square(0.0, 0.0, 10.0)),
                Feature::new()
                    .with("MUNI", "VERNON TWP")
                    .with_geometry(square(10.0, 0.0, 10.0)),
            ],
        )
        .unwrap()
    }

    fn addresses() -> Table {
        let schema =
            DatasetSchema::new(GeometryType::Point, vec![FieldDef::text("ADDR", 30)]).unwrap();
        Table::from_features(
            schema,
            vec![
                Feature::new()
                    .with("ADDR", "1 MAIN ST")
                    .with_geometry(Point::new(5.0, 5.0)),
                Feature::new()
                    .with("ADDR", "2 PARK AVE")
                    .with_geometry(Point::new(15.0, 5.0)),
                Feature::new()
                    .with("ADDR", "3 LAKE RD")
                    .with_geometry(Point::new(50.0, 50.0)),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_points_within_polygons() {
        let spec = SpatialJoinSpec {
            relation: SpatialRelation::Within,
            keep_unmatched: true,
            ..Default::default()
        };
        let joined = spatial_join(&addresses(), &municipalities(), &spec).unwrap();

        assert_eq!(joined.len(), 3);
        assert_eq!(joined.features[0].get("MUNI"), &Value::from("MEADVILLE CITY"));
        assert_eq!(joined.features[1].get("MUNI"), &Value::from("VERNON TWP"));
        assert!(joined.features[2].get("MUNI").is_null());
        assert_eq!(joined.features[2].get(JOIN_COUNT_FIELD), &Value::Int(0));
        assert_eq!(joined.schema.geometry_type, GeometryType::Point);
    }

    #[test]
    fn test_polygon_contains_counts() {
        let spec = SpatialJoinSpec {
            relation: SpatialRelation::Contains,
            fields: vec!["ADDR".to_string()],
            keep_unmatched: false,
            ..Default::default()
        };
        let joined = spatial_join(&municipalities(), &addresses(), &spec).unwrap();
        assert_eq!(joined.len(), 2);
        assert_eq!(joined.features[0].get(JOIN_COUNT_FIELD), &Value::Int(1));
        assert_eq!(joined.features[0].get("ADDR"), &Value::from("1 MAIN ST"));
    }

    #[test]
    fn test_one_to_many_rows() {
        let wide = Table::from_features(
            municipalities().schema,
            vec![Feature::new()
                .with("MUNI", "COUNTY")
                .with_geometry(square(0.0, 0.0, 20.0))],
        )
        .unwrap();
        let spec = SpatialJoinSpec {
            mode: JoinMode::OneToMany,
            ..Default::default()
        };
        let joined = spatial_join(&wide, &addresses(), &spec).unwrap();
        assert_eq!(joined.len(), 2);
        assert_eq!(joined.features[1].get("ADDR"), &Value::from("2 PARK AVE"));
    }

    #[test]
    fn test_dissolve_unions_and_counts() {
        let schema = DatasetSchema::new(
            GeometryType::Polygon,
            vec![FieldDef::text("WARD", 4), FieldDef::double("ACRES")],
        )
        .unwrap();
        let parcels = Table::from_features(
            schema,
            vec![
                Feature::new()
                    .with("WARD", "22")
                    .with("ACRES", 1.5)
                    .with_geometry(square(0.0, 0.0, 1.0)),
                Feature::new()
                    .with("WARD", "23")
                    .with("ACRES", 4.0)
                    .with_geometry(square(5.0, 5.0, 1.0)),
                Feature::new()
                    .with("WARD", "22")
                    .with("ACRES", 2.5)
                    .with_geometry(square(1.0, 0.0, 1.0)),
            ],
        )
        .unwrap();
        let spec = DissolveSpec {
            fields: vec!["ward".to_string()],
            statistics: vec![
                StatField::new("ACRES", Statistic::Sum),
                StatField::new("ACRES", Statistic::Count),
            ],
        };
        let wards = dissolve(&parcels, &spec).unwrap();

        assert_eq!(wards.len(), 2);
        assert_eq!(wards.schema.field_names(), vec!["WARD", "SUM_ACRES", "COUNT_ACRES"]);
        assert_eq!(wards.features[0].get("WARD"), &Value::from("22"));
        assert_eq!(wards.features[0].get("SUM_ACRES"), &Value::Float(4.0));
        assert_eq!(wards.features[0].get("COUNT_ACRES"), &Value::Int(2));

        let merged = wards.features[0].geometry.as_ref().unwrap();
        let area = as_multipolygon(merged).unwrap().unsigned_area();
        assert!((area - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_dissolve_everything() {
        let all = dissolve(&municipalities(), &DissolveSpec::default()).unwrap();
        assert_eq!(all.len(), 1);
        assert!(all.schema.fields.is_empty());
        let area = as_multipolygon(all.features[0].geometry.as_ref().unwrap())
            .unwrap()
            .unsigned_area();
        assert!((area - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_intersect_keeps_shared_area() {
        let schema =
            DatasetSchema::new(GeometryType::Polygon, vec![FieldDef::text("ZONE", 8)]).unwrap();
        let zones = Table::from_features(
            schema,
            vec![Feature::new()
                .with("ZONE", "R1")
                .with_geometry(square(5.0, 0.0, 10.0))],
        )
        .unwrap();

        let pieces = intersect(&municipalities(), &zones).unwrap();
        assert_eq!(pieces.len(), 2);
        assert_eq!(pieces.schema.field_names(), vec!["MUNI", "ZONE"]);
        for piece in &pieces.features {
            let area = as_multipolygon(piece.geometry.as_ref().unwrap())
                .unwrap()
                .unsigned_area();
            assert!((area - 50.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_intersect_requires_polygons() {
        let err = intersect(&addresses(), &municipalities()).unwrap_err();
        assert!(err.to_string().contains("polygon"));
    }
}
