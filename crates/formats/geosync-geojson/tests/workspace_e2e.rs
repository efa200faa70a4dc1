use geo_types::{Point, polygon};
use geosync_core_common::{
    DatasetSchema, Feature, FieldDef, GeometryType, Table, Value, Workspace, WorkspaceError,
};
use geosync_geojson::GeoJsonWorkspace;
use tempfile::TempDir;

fn address_schema() -> DatasetSchema {
    DatasetSchema::new(
        GeometryType::Point,
        vec![FieldDef::text("FULLADDR", 60), FieldDef::integer("ADDNUM")],
    )
    .unwrap()
}

fn address(num: i64, street: &str, x: f64, y: f64) -> Feature {
    Feature::new()
        .with("FULLADDR", format!("{num} {street}"))
        .with("ADDNUM", num)
        .with_geometry(Point::new(x, y))
}

/// Test that a dataset written by one workspace handle is visible to another
#[tokio::test]
async fn test_create_append_and_reopen() {
    let dir = TempDir::new().unwrap();
    let ws = GeoJsonWorkspace::open("staging", dir.path()).unwrap();

    ws.create("Addresses", &address_schema(), false).await.unwrap();
    let count = ws
        .append(
            "Addresses",
            vec![
                address(10, "MAIN ST", 1.0, 1.0),
                address(12, "MAIN ST", 2.0, 1.0),
            ],
        )
        .await
        .unwrap();
    assert_eq!(count, 2);
    assert!(dir.path().join("Addresses.geojson").is_file());

    let reopened = GeoJsonWorkspace::open("staging", dir.path()).unwrap();
    let table = reopened.read("Addresses").await.unwrap();
    assert_eq!(table.schema, address_schema());
    assert_eq!(table.features[1].get("ADDNUM"), &Value::Int(12));
    assert_eq!(reopened.list().await.unwrap(), vec!["Addresses".to_string()]);
}

/// Test that replace swaps the full content and leaves no staging file behind
#[tokio::test]
async fn test_replace_swaps_content() {
    let dir = TempDir::new().unwrap();
    let ws = GeoJsonWorkspace::open("web", dir.path()).unwrap();
    ws.create("Addresses", &address_schema(), false).await.unwrap();
    ws.append("Addresses", vec![address(1, "OLD RD", 0.0, 0.0)])
        .await
        .unwrap();

    let count = ws
        .replace(
            "Addresses",
            vec![
                address(5, "NEW RD", 0.0, 0.0),
                address(7, "NEW RD", 0.0, 0.0),
            ],
        )
        .await
        .unwrap();

    assert_eq!(count, 2);
    assert!(!dir.path().join("Addresses.geojson.tmp").exists());
    let table = ws.read("Addresses").await.unwrap();
    assert!(
        table
            .features
            .iter()
            .all(|f| f.get("FULLADDR").to_string().ends_with("NEW RD"))
    );
}

/// Test that a failed replace keeps the previous rows
#[tokio::test]
async fn test_failed_replace_keeps_previous_rows() {
    let dir = TempDir::new().unwrap();
    let ws = GeoJsonWorkspace::open("web", dir.path()).unwrap();
    ws.create("Addresses", &address_schema(), false).await.unwrap();
    ws.append("Addresses", vec![address(1, "OLD RD", 0.0, 0.0)])
        .await
        .unwrap();

    let bad = Feature::new().with("ADDNUM", "twelve");
    let err = ws.replace("Addresses", vec![bad]).await.unwrap_err();
    assert!(matches!(err, WorkspaceError::SchemaMismatch { .. }));
    assert_eq!(ws.count("Addresses").await.unwrap(), 1);
}

/// Test that an existing lock file is reported as a lock held by another session
#[tokio::test]
async fn test_lock_file_blocks_writers() {
    let dir = TempDir::new().unwrap();
    let ws = GeoJsonWorkspace::open("web", dir.path()).unwrap();
    ws.create("Addresses", &address_schema(), false).await.unwrap();

    std::fs::write(dir.path().join("Addresses.geojson.lock"), b"").unwrap();
    let err = ws.truncate("Addresses").await.unwrap_err();
    match err {
        WorkspaceError::Locked { lock_file, .. } => {
            assert_eq!(lock_file, Some(dir.path().join("Addresses.geojson.lock")));
        },
        other => panic!("expected a lock error, got {other:?}"),
    }

    // Readers are not blocked.
    assert_eq!(ws.count("Addresses").await.unwrap(), 0);

    std::fs::remove_file(dir.path().join("Addresses.geojson.lock")).unwrap();
    ws.truncate("Addresses").await.unwrap();
    assert!(!dir.path().join("Addresses.geojson.lock").exists());
}

/// Test that a missing directory surfaces as a connectivity failure
#[tokio::test]
async fn test_unreachable_directory() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("not-mounted");
    let err = GeoJsonWorkspace::open("county", &missing).unwrap_err();
    assert!(matches!(err, WorkspaceError::Unavailable { .. }));

    std::fs::create_dir(&missing).unwrap();
    let ws = GeoJsonWorkspace::open("county", &missing).unwrap();
    std::fs::remove_dir(&missing).unwrap();
    let err = ws.read("Parcels").await.unwrap_err();
    assert!(matches!(err, WorkspaceError::Unavailable { .. }));
}

#[tokio::test]
async fn test_missing_dataset_and_invalid_names() {
    let dir = TempDir::new().unwrap();
    let ws = GeoJsonWorkspace::open("web", dir.path()).unwrap();

    assert!(matches!(
        ws.read("Parcels").await.unwrap_err(),
        WorkspaceError::NotFound { .. }
    ));
    assert!(ws.read("../escape").await.is_err());
    assert!(!ws.exists("Parcels").await.unwrap());
}

#[tokio::test]
async fn test_create_refuses_overwrite_unless_asked() {
    let dir = TempDir::new().unwrap();
    let ws = GeoJsonWorkspace::open("web", dir.path()).unwrap();
    ws.create("Addresses", &address_schema(), false).await.unwrap();
    ws.append("Addresses", vec![address(1, "A ST", 0.0, 0.0)])
        .await
        .unwrap();

    assert!(matches!(
        ws.create("Addresses", &address_schema(), false)
            .await
            .unwrap_err(),
        WorkspaceError::AlreadyExists { .. }
    ));
    ws.create("Addresses", &address_schema(), true).await.unwrap();
    assert_eq!(ws.count("Addresses").await.unwrap(), 0);

    ws.delete("Addresses").await.unwrap();
    assert!(ws.list().await.unwrap().is_empty());
}

fn zone(code: &str, offset: f64) -> Feature {
    Feature::new().with("ZONE", code).with_geometry(polygon![
        (x: offset, y: 0.0),
        (x: offset + 1.0, y: 0.0),
        (x: offset + 1.0, y: 1.0),
        (x: offset, y: 0.0),
    ])
}

/// Test that a rejected store leaves the previous dataset untouched
#[tokio::test]
async fn test_failed_store_keeps_previous_dataset() {
    let dir = TempDir::new().unwrap();
    let ws = GeoJsonWorkspace::open("web", dir.path()).unwrap();
    let zone_schema =
        DatasetSchema::new(GeometryType::Polygon, vec![FieldDef::text("ZONE", 8)]).unwrap();

    let zones = Table::from_features(zone_schema.clone(), vec![zone("R1", 0.0), zone("C2", 2.0)])
        .unwrap();
    assert_eq!(ws.store("Zones", zones).await.unwrap(), 2);

    let mut misplaced = Table::new(zone_schema);
    misplaced.features.push(
        Feature::new()
            .with("ZONE", "R3")
            .with_geometry(Point::new(5.0, 5.0)),
    );
    let err = ws.store("Zones", misplaced).await.unwrap_err();
    assert!(matches!(err, WorkspaceError::Geometry { .. }));

    let table = ws.read("Zones").await.unwrap();
    assert_eq!(table.len(), 2);
    assert_eq!(table.features[0].get("ZONE"), &Value::from("R1"));
    assert!(!dir.path().join("Zones.geojson.tmp").exists());
    assert!(!dir.path().join("Zones.geojson.lock").exists());
}

/// Test that store replaces the schema as well as the rows
#[tokio::test]
async fn test_store_replaces_schema() {
    let dir = TempDir::new().unwrap();
    let ws = GeoJsonWorkspace::open("scratch", dir.path()).unwrap();
    ws.create("Addresses", &address_schema(), false).await.unwrap();
    ws.append("Addresses", vec![address(10, "MAIN ST", 1.0, 1.0)])
        .await
        .unwrap();

    let permits = DatasetSchema::table(vec![FieldDef::text("PERMIT_NO", 10)]).unwrap();
    let table = Table::from_features(permits, vec![Feature::new().with("PERMIT_NO", "P-1")])
        .unwrap();
    assert_eq!(ws.store("Addresses", table).await.unwrap(), 1);

    let schema = ws.describe("Addresses").await.unwrap();
    assert_eq!(schema.geometry_type, GeometryType::None);
    assert_eq!(schema.fields.len(), 1);
}
