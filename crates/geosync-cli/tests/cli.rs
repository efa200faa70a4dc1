use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const PARCELS: &str = r#"{"type":"FeatureCollection","features":[
{"type":"Feature","properties":{"PIN":"0101-001","DISTRICT":"23"},"geometry":{"type":"Point","coordinates":[1.0,1.0]}},
{"type":"Feature","properties":{"PIN":"0101-002","DISTRICT":"99"},"geometry":{"type":"Point","coordinates":[2.0,1.0]}}
]}"#;

fn geosync() -> Command {
    Command::cargo_bin("geosync").unwrap()
}

fn write_pipeline(dir: &TempDir, destination: &str) -> std::path::PathBuf {
    fs::create_dir_all(dir.path().join("county")).unwrap();
    fs::create_dir_all(dir.path().join("web")).unwrap();
    fs::write(dir.path().join("county/Parcels.geojson"), PARCELS).unwrap();
    let yaml = format!(
        r"
name: parcels
log: {{ path: parcels.log }}
workspaces:
  county: {{ driver: geojson, path: county }}
  web: {{ driver: geojson, path: web }}
stages:
  - name: Parcels
    steps:
      - op: copy
        source: county/Parcels
        destination: {destination}
"
    );
    let path = dir.path().join("pipeline.yaml");
    fs::write(&path, yaml).unwrap();
    path
}

#[test]
fn test_drivers_lists_geojson() {
    geosync()
        .arg("drivers")
        .assert()
        .success()
        .stdout(predicate::str::contains("GeoJSON"))
        .stdout(predicate::str::contains("Memory"));
}

#[test]
fn test_translate_value() {
    geosync()
        .args(["translate", "permit_types", "16"])
        .assert()
        .success()
        .stdout(predicate::str::contains("DEMOLITION"));
}

#[test]
fn test_translate_unknown_code_passes_through() {
    geosync()
        .args(["translate", "municipal_districts", "99"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("99"));
}

#[test]
fn test_validate_reports_stage_count() {
    let dir = TempDir::new().unwrap();
    let pipeline = write_pipeline(&dir, "web/Parcels");
    geosync()
        .arg("validate")
        .arg(&pipeline)
        .assert()
        .success()
        .stdout(predicate::str::contains("1 stage(s), 1 step(s)"));
}

#[test]
fn test_validate_rejects_unknown_workspace() {
    let dir = TempDir::new().unwrap();
    let pipeline = write_pipeline(&dir, "gis/Parcels");
    geosync()
        .arg("validate")
        .arg(&pipeline)
        .assert()
        .failure()
        .stderr(predicate::str::contains("gis"));
}

#[test]
fn test_run_then_info() {
    let dir = TempDir::new().unwrap();
    let pipeline = write_pipeline(&dir, "web/Parcels");
    geosync()
        .arg("run")
        .arg(&pipeline)
        .assert()
        .success()
        .stdout(predicate::str::contains("succeeded"));

    let log = fs::read_to_string(dir.path().join("parcels.log")).unwrap();
    assert!(log.contains("Run completed in"));

    geosync()
        .arg("info")
        .arg(dir.path().join("web"))
        .arg("Parcels")
        .assert()
        .success()
        .stdout(predicate::str::contains("Rows: 2"))
        .stdout(predicate::str::contains("PIN"));
}

#[test]
fn test_run_reports_stage_progress_without_verbose() {
    let dir = TempDir::new().unwrap();
    let pipeline = write_pipeline(&dir, "web/Parcels");
    geosync()
        .arg("run")
        .arg(&pipeline)
        .assert()
        .success()
        .stderr(predicate::str::contains("Starting stage: Parcels"))
        .stderr(predicate::str::contains("Run completed in"));
}

#[test]
fn test_run_exits_non_zero_on_abort() {
    let dir = TempDir::new().unwrap();
    let pipeline = write_pipeline(&dir, "web/Parcels");
    fs::remove_file(dir.path().join("county/Parcels.geojson")).unwrap();
    geosync()
        .arg("run")
        .arg(&pipeline)
        .assert()
        .failure()
        .stderr(predicate::str::contains("aborted at 'Copy county/Parcels -> web/Parcels'"));
}

#[test]
fn test_translate_null_uses_null_label() {
    geosync()
        .args(["translate", "permit_types"])
        .assert()
        .success()
        .stdout(predicate::str::contains("UNSPECIFIED"));
}

#[test]
fn test_translate_blank_uses_null_label() {
    geosync()
        .args(["translate", "permit_types", ""])
        .assert()
        .success()
        .stdout(predicate::str::contains("UNSPECIFIED"));
}

#[test]
fn test_tables_lists_police_ori() {
    geosync()
        .arg("tables")
        .assert()
        .success()
        .stdout(predicate::str::contains("police_ori"))
        .stdout(predicate::str::contains("street_types"));
}

#[test]
fn test_translate_police_department() {
    geosync()
        .args(["translate", "police_ori", "Meadville PD"])
        .assert()
        .success()
        .stdout(predicate::str::contains("PA0200300"));
}

#[test]
fn test_translate_list() {
    geosync()
        .args(["translate", "street_directionals", "--list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("NORTH"));
}
