//! Storage driver registry.
//!
//! Lists the workspace kinds `geosync` can talk to and what each of them can
//! do. Pipeline validation resolves configured workspace kinds through
//! [`find_driver`], and the CLI prints the table with `geosync drivers`.

/// Support status for a specific driver operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupportStatus {
    /// The operation is implemented.
    Supported,
    /// The driver cannot perform the operation.
    NotSupported,
}

impl SupportStatus {
    /// Returns `true` if the operation is implemented.
    #[must_use]
    pub fn is_supported(&self) -> bool {
        matches!(self, SupportStatus::Supported)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            SupportStatus::Supported => "Supported",
            SupportStatus::NotSupported => "Not Supported",
        }
    }
}

/// Operations a storage driver can perform.
#[derive(Debug, Clone, Copy)]
pub struct DriverCapabilities {
    /// Datasets can be read, either as a workspace or as an import source.
    pub read: SupportStatus,
    /// The driver backs a writable workspace (truncate, append, swap).
    pub write: SupportStatus,
    /// Datasets can be exported to this format for delivery outside the pipeline.
    pub export: SupportStatus,
}

impl DriverCapabilities {
    /// Returns `true` when the driver can back a pipeline workspace.
    #[must_use]
    pub fn is_workspace(&self) -> bool {
        self.read.is_supported() && self.write.is_supported()
    }
}

/// A storage driver definition.
#[derive(Debug, Clone)]
pub struct StorageDriver {
    /// Short name used in configuration (e.g. `"GeoJSON"`).
    pub short_name: &'static str,
    /// Descriptive name for display.
    pub long_name: &'static str,
    pub capabilities: DriverCapabilities,
}

impl StorageDriver {
    #[must_use]
    pub const fn new(
        short_name: &'static str,
        long_name: &'static str,
        read: SupportStatus,
        write: SupportStatus,
        export: SupportStatus,
    ) -> Self {
        Self {
            short_name,
            long_name,
            capabilities: DriverCapabilities {
                read,
                write,
                export,
            },
        }
    }
}

use SupportStatus::{NotSupported, Supported};

static DRIVERS: &[StorageDriver] = &[
    StorageDriver::new(
        "GeoJSON",
        "Directory of GeoJSON feature collections",
        Supported,
        Supported,
        Supported,
    ),
    StorageDriver::new(
        "Memory",
        "In-process scratch workspace",
        Supported,
        Supported,
        NotSupported,
    ),
    StorageDriver::new(
        "CSV",
        "Comma Separated Value spreadsheet (.csv)",
        Supported,
        NotSupported,
        Supported,
    ),
];

/// Returns every registered storage driver.
#[must_use]
pub fn storage_drivers() -> &'static [StorageDriver] {
    DRIVERS
}

/// Finds a driver by short name, ignoring case.
#[must_use]
pub fn find_driver(name: &str) -> Option<&'static StorageDriver> {
    DRIVERS
        .iter()
        .find(|driver| driver.short_name.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_driver_ignores_case() {
        let driver = find_driver("geojson").expect("GeoJSON driver should exist");
        assert_eq!(driver.short_name, "GeoJSON");
        assert!(driver.capabilities.is_workspace());
    }

    #[test]
    fn test_csv_is_not_a_workspace() {
        let csv = find_driver("CSV").unwrap();
        assert!(!csv.capabilities.is_workspace());
        assert!(csv.capabilities.export.is_supported());
    }

    #[test]
    fn test_unknown_driver() {
        assert!(find_driver("FileGDB").is_none());
    }

    #[test]
    fn test_support_status_strings() {
        assert_eq!(Supported.as_str(), "Supported");
        assert_eq!(NotSupported.as_str(), "Not Supported");
    }
}
