//! Locator rebuild and service publishing.
//!
//! Built locators are stored as `<name>.loc.json` under the locator
//! directory. Publishing wraps a locator in a service definition package
//! (`<service>.sd`) and hands it to a [`ServiceHost`].

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Local;
use geosync_core_common::DatasetRef;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::context::Catalog;
use crate::error::{GeocodeError, IoResultExt, PublishError, Result};
use crate::geocode::{AddressNormalizer, Locator};

const LOCATOR_EXTENSION: &str = "loc.json";
const PACKAGE_EXTENSION: &str = "sd";

/// Where a locator's reference addresses come from.
#[derive(Debug, Clone, PartialEq)]
pub struct LocatorDefinition {
    pub name: String,
    pub reference: DatasetRef,
    pub address_fields: Vec<String>,
    pub min_score: f64,
}

/// Writes `bytes` next to `path` and renames it into place.
fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).with_path(parent)?;
    }
    let staging = path.with_extension("tmp");
    fs::write(&staging, bytes).with_path(&staging)?;
    fs::rename(&staging, path).with_path(path)
}

/// Directory of built locators with an in-process cache.
#[derive(Debug)]
pub struct LocatorStore {
    dir: PathBuf,
    cache: Mutex<BTreeMap<String, Arc<Locator>>>,
}

impl LocatorStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cache: Mutex::new(BTreeMap::new()),
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.{LOCATOR_EXTENSION}"))
    }

    fn cached(&self, name: &str) -> Option<Arc<Locator>> {
        self.cache.lock().ok()?.get(name).cloned()
    }

    fn remember(&self, locator: Arc<Locator>) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(locator.name.clone(), locator);
        }
    }

    /// Persists a locator, replacing any previous build.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Io`](crate::SyncError::Io) when the file cannot
    /// be written.
    pub fn save(&self, locator: Locator) -> Result<Arc<Locator>> {
        let path = self.path(&locator.name);
        let json = serde_json::to_vec(&locator).map_err(|e| GeocodeError::Corrupt {
            path: path.clone(),
            message: e.to_string(),
        })?;
        write_atomically(&path, &json)?;
        debug!("Saved locator {} to {}", locator.name, path.display());
        let locator = Arc::new(locator);
        self.remember(locator.clone());
        Ok(locator)
    }

    /// Loads a built locator.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError::NotBuilt`] when no build exists and
    /// [`GeocodeError::Corrupt`] when the file does not parse.
    pub fn load(&self, name: &str) -> Result<Arc<Locator>> {
        if let Some(locator) = self.cached(name) {
            return Ok(locator);
        }
        let path = self.path(name);
        if !path.is_file() {
            return Err(GeocodeError::NotBuilt {
                name: name.to_string(),
                path,
            }
            .into());
        }
        let bytes = fs::read(&path).with_path(&path)?;
        let locator: Locator =
            serde_json::from_slice(&bytes).map_err(|e| GeocodeError::Corrupt {
                path: path.clone(),
                message: e.to_string(),
            })?;
        let locator = Arc::new(locator);
        self.remember(locator.clone());
        Ok(locator)
    }
}

/// Rebuilds a locator from the current reference data and persists it.
///
/// # Errors
///
/// Returns reference read errors, missing address fields and locator file
/// write errors. A failed rebuild leaves the previous build in place.
pub async fn rebuild(
    definition: &LocatorDefinition,
    catalog: &Catalog,
    store: &LocatorStore,
    normalizer: &AddressNormalizer,
) -> Result<Arc<Locator>> {
    let reference = catalog.read(&definition.reference).await?;
    let locator = Locator::build(
        &definition.name,
        definition.reference.to_string(),
        &reference,
        &definition.address_fields,
        definition.min_score,
        normalizer,
    )?;
    info!(
        "Rebuilt locator {} from {} ({} addresses)",
        definition.name,
        definition.reference,
        locator.len()
    );
    store.save(locator)
}

/// Target of a locator publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDefinition {
    pub service_name: String,
    /// Where the package is assembled before upload
    pub staging_dir: PathBuf,
}

/// Contents of a service definition package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServicePackage {
    pub service_name: String,
    pub packaged_at: String,
    pub locator: Locator,
}

/// Builds the service definition package in the staging directory.
///
/// # Errors
///
/// Returns [`PublishError::Packaging`] when the package cannot be written.
pub fn package(locator: &Locator, definition: &ServiceDefinition) -> Result<PathBuf> {
    let packaging = |message: String| PublishError::Packaging {
        locator: locator.name.clone(),
        message,
    };
    let package = ServicePackage {
        service_name: definition.service_name.clone(),
        packaged_at: Local::now().to_rfc3339(),
        locator: locator.clone(),
    };
    let json = serde_json::to_vec_pretty(&package).map_err(|e| packaging(e.to_string()))?;
    let path = definition
        .staging_dir
        .join(format!("{}.{PACKAGE_EXTENSION}", definition.service_name));
    write_atomically(&path, &json).map_err(|e| packaging(e.to_string()))?;
    Ok(path)
}

/// A server that accepts service definition packages.
#[async_trait]
pub trait ServiceHost: Send + Sync + Debug {
    /// Host name shown in logs.
    fn name(&self) -> &str;

    /// Uploads `package` as `service_name`, replacing the running service.
    async fn upload(&self, service_name: &str, package: &Path) -> Result<()>;
}

/// Service host backed by a published-services directory.
#[derive(Debug, Clone)]
pub struct DirectoryServiceHost {
    root: PathBuf,
}

impl DirectoryServiceHost {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Path of a published service.
    #[must_use]
    pub fn service_path(&self, service_name: &str) -> PathBuf {
        self.root.join(format!("{service_name}.{PACKAGE_EXTENSION}"))
    }
}

#[async_trait]
impl ServiceHost for DirectoryServiceHost {
    fn name(&self) -> &str {
        self.root.to_str().unwrap_or("service directory")
    }

    async fn upload(&self, service_name: &str, package: &Path) -> Result<()> {
        let upload_error = |message: String| PublishError::Upload {
            service: service_name.to_string(),
            host: self.root.display().to_string(),
            message,
        };
        if !self.root.is_dir() {
            return Err(upload_error("host directory is not reachable".to_string()).into());
        }
        let bytes = fs::read(package).map_err(|e| upload_error(e.to_string()))?;
        write_atomically(&self.service_path(service_name), &bytes)
            .map_err(|e| upload_error(e.to_string()))?;
        Ok(())
    }
}

/// Packages a locator and uploads it to `host`.
///
/// # Errors
///
/// Returns [`PublishError`] for packaging or upload failures.
pub async fn publish(
    locator: &Locator,
    definition: &ServiceDefinition,
    host: &dyn ServiceHost,
) -> Result<PathBuf> {
    let package = package(locator, definition)?;
    host.upload(&definition.service_name, &package).await?;
    info!(
        "Published locator {} as service {} on {}",
        locator.name,
        definition.service_name,
        host.name()
    );
    Ok(package)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SyncError;
    use geo_types::Point;
    use geosync_core_common::{
        DatasetSchema, Feature, FieldDef, GeometryType, MemoryWorkspace, Table,
    };
    use tempfile::TempDir;

    fn catalog() -> Catalog {
        let ws = MemoryWorkspace::new("county");
        let schema =
            DatasetSchema::new(GeometryType::Point, vec![FieldDef::text("FULLADDR", 60)]).unwrap();
        ws.insert(
            "Addresses",
            Table::from_features(
                schema,
                vec![
                    Feature::new()
                        .with("FULLADDR", "10 MAIN ST")
                        .with_geometry(Point::new(1.0, 1.0)),
                ],
            )
            .unwrap(),
        )
        .unwrap();
        let mut catalog = Catalog::new();
        catalog.register(Arc::new(ws));
        catalog
    }

    fn definition() -> LocatorDefinition {
        LocatorDefinition {
            name: "county_addresses".to_string(),
            reference: DatasetRef::new("county", "Addresses"),
            address_fields: vec!["FULLADDR".to_string()],
            min_score: 85.0,
        }
    }

    #[tokio::test]
    async fn test_rebuild_persists_and_loads() {
        let dir = TempDir::new().unwrap();
        let store = LocatorStore::new(dir.path());
        let normalizer = AddressNormalizer::standard().unwrap();

        let built = rebuild(&definition(), &catalog(), &store, &normalizer)
            .await
            .unwrap();
        assert_eq!(built.len(), 1);
        assert!(store.path("county_addresses").is_file());

        let fresh = LocatorStore::new(dir.path());
        let loaded = fresh.load("county_addresses").unwrap();
        assert_eq!(*loaded, *built);
    }

    #[test]
    fn test_load_missing_locator() {
        let dir = TempDir::new().unwrap();
        let err = LocatorStore::new(dir.path()).load("nope").unwrap_err();
        assert!(matches!(err, SyncError::Geocode(GeocodeError::NotBuilt { .. })));
    }

    #[tokio::test]
    async fn test_publish_to_directory_host() {
        let dir = TempDir::new().unwrap();
        let host_dir = dir.path().join("services");
        std::fs::create_dir(&host_dir).unwrap();
        let store = LocatorStore::new(dir.path().join("locators"));
        let normalizer = AddressNormalizer::standard().unwrap();
        let locator = rebuild(&definition(), &catalog(), &store, &normalizer)
            .await
            .unwrap();

        let host = DirectoryServiceHost::new(&host_dir);
        let service = ServiceDefinition {
            service_name: "CountyAddresses".to_string(),
            staging_dir: dir.path().join("staging"),
        };
        publish(&locator, &service, &host).await.unwrap();

        let published = std::fs::read(host.service_path("CountyAddresses")).unwrap();
        let package: ServicePackage = serde_json::from_slice(&published).unwrap();
        assert_eq!(package.service_name, "CountyAddresses");
        assert_eq!(package.locator, *locator);
    }

    #[tokio::test]
    async fn test_publish_to_unreachable_host() {
        let dir = TempDir::new().unwrap();
        let store = LocatorStore::new(dir.path());
        let normalizer = AddressNormalizer::standard().unwrap();
        let locator = rebuild(&definition(), &catalog(), &store, &normalizer)
            .await
            .unwrap();

        let host = DirectoryServiceHost::new(dir.path().join("offline"));
        let service = ServiceDefinition {
            service_name: "CountyAddresses".to_string(),
            staging_dir: dir.path().join("staging"),
        };
        let err = publish(&locator, &service, &host).await.unwrap_err();
        assert!(matches!(err, SyncError::Publish(PublishError::Upload { .. })));
    }
}
