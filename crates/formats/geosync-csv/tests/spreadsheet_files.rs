use geo_types::Point;
use geosync_core_common::{DatasetSchema, Feature, FieldDef, GeometryType, Table, Value};
use geosync_csv::{CsvReaderOptions, CsvWriterOptions, GeometryColumns, read_csv_file, write_csv_file};
use tempfile::TempDir;

fn unmatched_addresses() -> Table {
    let schema = DatasetSchema::new(
        GeometryType::Point,
        vec![
            FieldDef::text("PID", 20),
            FieldDef::text("SITE_ADDR", 60),
            FieldDef::text("Status", 1),
        ],
    )
    .unwrap();
    Table::from_features(
        schema,
        vec![
            Feature::new()
                .with("PID", "0101-001")
                .with("SITE_ADDR", "10 MAIN, ST")
                .with("Status", "U"),
            Feature::new()
                .with("PID", "0101-002")
                .with("SITE_ADDR", "400 PARK AVE")
                .with("Status", "U")
                .with_geometry(Point::new(-80.15, 41.64)),
        ],
    )
    .unwrap()
}

/// Test that an exported review spreadsheet can be read back by operators' tools
#[test]
fn test_export_creates_parent_and_reads_back() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("review").join("unmatched.csv");

    let options = CsvWriterOptions::default().with_geometry(GeometryColumns::PointXy);
    write_csv_file(&path, &unmatched_addresses(), &options).unwrap();
    assert!(path.is_file());

    let read_options = CsvReaderOptions::default().with_point_columns("X", "Y");
    let table = read_csv_file(&path, &read_options).unwrap();

    assert_eq!(table.len(), 2);
    assert_eq!(table.features[0].get("SITE_ADDR"), &Value::from("10 MAIN, ST"));
    assert_eq!(table.features[0].get("PID"), &Value::from("0101-001"));
    assert!(table.features[0].geometry.is_none());
    assert_eq!(
        table.features[1].geometry,
        Some(Point::new(-80.15, 41.64).into())
    );
}

/// Test that exporting over an existing spreadsheet replaces it
#[test]
fn test_export_overwrites_previous_run() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("unmatched.csv");
    std::fs::write(&path, "stale,content\n1,2\n3,4\n5,6\n").unwrap();

    write_csv_file(&path, &unmatched_addresses(), &CsvWriterOptions::default()).unwrap();
    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.starts_with("PID,SITE_ADDR,Status\n"));
    assert_eq!(content.lines().count(), 3);
}

#[test]
fn test_missing_file() {
    let dir = TempDir::new().unwrap();
    let err = read_csv_file(dir.path().join("nope.csv"), &CsvReaderOptions::default()).unwrap_err();
    assert!(err.to_string().contains("nope.csv"));
}
