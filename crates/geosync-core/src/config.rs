//! YAML pipeline definitions.
//!
//! A pipeline file names its workspaces, lookup tables, locators and
//! services, then lists stages of steps. Dataset references are written
//! `workspace/dataset`; the `scratch` workspace always exists. Relative
//! paths are resolved against the directory holding the pipeline file.
//!
//! ```yaml
//! name: nightly
//! log: { path: logs/nightly.log, mode: overwrite }
//! workspaces:
//!   county: { driver: geojson, path: data/county }
//!   web: { driver: geojson, path: data/web, create: true }
//! stages:
//!   - name: Parcels
//!     steps:
//!       - op: replicate
//!         source: county/Parcels
//!         destination: web/Parcels
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use geosync_core_common::{
    DatasetRef, FieldDef, FieldType, MemoryWorkspace, Value, Workspace, find_driver,
};
use geosync_csv::{CsvReaderOptions, GeometryColumns};
use geosync_geojson::GeoJsonWorkspace;
use serde::Deserialize;

use crate::context::{Catalog, RunContext, SCRATCH_WORKSPACE};
use crate::derive::{
    Calculation, ConcatPart, DissolveSpec, JoinMode, JoinSpec, SpatialJoinSpec, SpatialRelation,
    StatField, Statistic,
};
use crate::error::{ConfigError, IoResultExt, Result, SyncError};
use crate::export::PackageExport;
use crate::filter::AttributeFilter;
use crate::geocode::{AddressNormalizer, DEFAULT_MIN_SCORE};
use crate::locator::{DirectoryServiceHost, LocatorDefinition, LocatorStore, ServiceDefinition};
use crate::mapping::{FieldMap, FieldMapping};
use crate::replicate::Replication;
use crate::runlog::{LogMode, RunLog};
use crate::stage::{RunAborted, RunSummary, Stage, StageRunner};
use crate::steps::Operation;
use crate::tables::shipped_tables;
use crate::translate::{CodeTable, LookupTables};

fn default_true() -> bool {
    true
}

fn default_min_score() -> f64 {
    DEFAULT_MIN_SCORE
}

fn default_locator_dir() -> PathBuf {
    PathBuf::from("locators")
}

fn default_placeholder() -> String {
    "package_in_progress".to_string()
}

fn default_separator() -> String {
    " ".to_string()
}

fn default_field_type() -> String {
    "text".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub mode: LogMode,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkspaceConfig {
    /// Storage driver short name (`geojson` or `memory`)
    pub driver: String,
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Create the directory if it does not exist
    #[serde(default)]
    pub create: bool,
}

/// A lookup table given either as a map or as parallel lists.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LookupTableConfig {
    #[serde(default)]
    pub entries: BTreeMap<String, String>,
    #[serde(default)]
    pub codes: Vec<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub null_label: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocatorConfig {
    pub reference: String,
    pub address_fields: Vec<String>,
    #[serde(default = "default_min_score")]
    pub min_score: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Directory the service host publishes from
    pub host_dir: PathBuf,
    /// Directory where packages are assembled
    pub staging_dir: PathBuf,
    /// Service name; defaults to the key of this entry
    #[serde(default)]
    pub service_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub continue_on_failure: bool,
    pub steps: Vec<StepConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldConfig {
    pub name: String,
    #[serde(rename = "type", default = "default_field_type")]
    pub field_type: String,
    #[serde(default)]
    pub length: Option<usize>,
    /// Source field for mappings
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatisticConfig {
    pub field: String,
    pub statistic: String,
    #[serde(default)]
    pub output: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcatPartConfig {
    Field(String),
    Text(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalculationConfig {
    Constant(String),
    Copy(String),
    Translate {
        field: String,
        table: String,
    },
    Concat {
        parts: Vec<ConcatPartConfig>,
        #[serde(default = "default_separator")]
        separator: String,
    },
    Upper(String),
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeometryConfig {
    #[default]
    Omit,
    Wkt,
    Xy,
}

impl From<GeometryConfig> for GeometryColumns {
    fn from(value: GeometryConfig) -> Self {
        match value {
            GeometryConfig::Omit => GeometryColumns::Omit,
            GeometryConfig::Wkt => GeometryColumns::Wkt,
            GeometryConfig::Xy => GeometryColumns::PointXy,
        }
    }
}

/// One step as written in the pipeline file.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum StepConfig {
    Replicate {
        source: String,
        destination: String,
        #[serde(default)]
        mapping: Vec<FieldConfig>,
        #[serde(default)]
        filter: Option<String>,
    },
    Copy {
        source: String,
        destination: String,
        #[serde(default)]
        filter: Option<String>,
        #[serde(default)]
        mapping: Vec<FieldConfig>,
        #[serde(default)]
        append: bool,
    },
    Join {
        primary: String,
        secondary: String,
        output: String,
        primary_key: String,
        secondary_key: String,
        #[serde(default)]
        fields: Vec<String>,
        #[serde(default)]
        secondary_filter: Option<String>,
        #[serde(default = "default_true")]
        keep_unmatched: bool,
    },
    SpatialJoin {
        target: String,
        join: String,
        output: String,
        #[serde(default)]
        relation: Option<String>,
        #[serde(default)]
        one_to_many: bool,
        #[serde(default)]
        fields: Vec<String>,
        #[serde(default = "default_true")]
        keep_unmatched: bool,
    },
    Dissolve {
        input: String,
        output: String,
        #[serde(default)]
        fields: Vec<String>,
        #[serde(default)]
        statistics: Vec<StatisticConfig>,
    },
    Intersect {
        input: String,
        overlay: String,
        output: String,
    },
    Calculate {
        dataset: String,
        field: FieldConfig,
        expression: CalculationConfig,
    },
    Geocode {
        input: String,
        locator: String,
        address_fields: Vec<String>,
        output: String,
        #[serde(default)]
        unmatched_spreadsheet: Option<PathBuf>,
    },
    ExportSpreadsheet {
        dataset: String,
        path: PathBuf,
        #[serde(default)]
        filter: Option<String>,
        #[serde(default)]
        geometry: GeometryConfig,
    },
    ExportPackage {
        datasets: Vec<String>,
        target_dir: PathBuf,
        prefix: String,
        #[serde(default = "default_placeholder")]
        placeholder: String,
    },
    ImportTable {
        path: PathBuf,
        destination: String,
        #[serde(default)]
        text_columns: Vec<String>,
        #[serde(default)]
        x_column: Option<String>,
        #[serde(default)]
        y_column: Option<String>,
    },
    RebuildLocator {
        locator: String,
    },
    PublishLocator {
        locator: String,
        service: String,
    },
    Delete {
        dataset: String,
    },
    Wait {
        seconds: u64,
    },
}

/// A parsed pipeline file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    pub name: String,
    pub log: LogConfig,
    #[serde(default)]
    pub workspaces: BTreeMap<String, WorkspaceConfig>,
    #[serde(default)]
    pub lookup_tables: BTreeMap<String, LookupTableConfig>,
    #[serde(default = "default_locator_dir")]
    pub locator_dir: PathBuf,
    #[serde(default)]
    pub locators: BTreeMap<String, LocatorConfig>,
    #[serde(default)]
    pub services: BTreeMap<String, ServiceConfig>,
    pub stages: Vec<StageConfig>,
    #[serde(skip)]
    base_dir: PathBuf,
}

fn invalid(option: impl Into<String>, message: impl Into<String>) -> SyncError {
    ConfigError::InvalidOption {
        option: option.into(),
        message: message.into(),
    }
    .into()
}

fn parse_field(config: &FieldConfig) -> Result<FieldDef> {
    let field_type = FieldType::parse(&config.field_type).ok_or_else(|| {
        invalid(
            format!("field '{}' type", config.name),
            format!("'{}' is not text, integer, double or boolean", config.field_type),
        )
    })?;
    let mut field = FieldDef::new(&config.name, field_type);
    field.length = config.length;
    Ok(field)
}

fn parse_mapping(configs: &[FieldConfig]) -> Result<Option<FieldMapping>> {
    if configs.is_empty() {
        return Ok(None);
    }
    let entries = configs
        .iter()
        .map(|c| Ok(FieldMap::new(parse_field(c)?, c.source.clone())))
        .collect::<Result<Vec<_>>>()?;
    Ok(Some(FieldMapping::new(entries)))
}

fn parse_filter(filter: Option<&String>) -> Option<AttributeFilter> {
    filter.map(AttributeFilter::new)
}

impl PipelineConfig {
    /// Parses a pipeline from YAML text. Relative paths resolve against
    /// `base_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed YAML or unknown keys.
    pub fn from_yaml_str(yaml: &str, base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        let mut config: Self = serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse {
            path: base_dir.clone(),
            message: e.to_string(),
        })?;
        config.base_dir = base_dir;
        Ok(config)
    }

    /// Reads and parses a pipeline file.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Io`] when the file cannot be read and
    /// [`ConfigError::Parse`] when it does not parse.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).with_path(path)?;
        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self::from_yaml_str(&yaml, base_dir).map_err(|e| match e {
            SyncError::Config(ConfigError::Parse { message, .. }) => ConfigError::Parse {
                path: path.to_path_buf(),
                message,
            }
            .into(),
            other => other,
        })
    }

    /// Resolves a configured path against the pipeline file's directory.
    #[must_use]
    pub fn resolve(&self, path: &Path) -> PathBuf {
        self.base_dir.join(path)
    }

    fn workspace_names(&self) -> BTreeSet<&str> {
        let mut names: BTreeSet<&str> = self.workspaces.keys().map(String::as_str).collect();
        names.insert(SCRATCH_WORKSPACE);
        names
    }

    fn dataset(&self, reference: &str) -> Result<DatasetRef> {
        let dataset = reference
            .parse::<DatasetRef>()
            .map_err(ConfigError::from)?;
        if !self.workspace_names().contains(dataset.workspace.as_str()) {
            return Err(ConfigError::UnknownWorkspace {
                name: dataset.workspace,
            }
            .into());
        }
        Ok(dataset)
    }

    /// Shipped lookup tables plus the ones defined in the file.
    ///
    /// # Errors
    ///
    /// Returns duplicate-code and length-mismatch errors.
    pub fn lookup_tables(&self) -> Result<LookupTables> {
        let mut tables = shipped_tables()?;
        for (name, config) in &self.lookup_tables {
            let mut table = if config.codes.is_empty() && config.labels.is_empty() {
                CodeTable::from_pairs(name, &config.entries)?
            } else {
                if !config.entries.is_empty() {
                    return Err(invalid(
                        format!("lookup table '{name}'"),
                        "use either entries or codes/labels, not both",
                    ));
                }
                CodeTable::from_parallel(name, config.codes.as_slice(), config.labels.as_slice())?
            };
            if let Some(label) = &config.null_label {
                table = table.with_null_label(label);
            }
            tables.insert(table);
        }
        Ok(tables)
    }

    fn locator_definition(&self, name: &str) -> Result<LocatorDefinition> {
        let config = self.locators.get(name).ok_or_else(|| {
            SyncError::from(crate::error::GeocodeError::UnknownLocator {
                name: name.to_string(),
            })
        })?;
        Ok(LocatorDefinition {
            name: name.to_string(),
            reference: self.dataset(&config.reference)?,
            address_fields: config.address_fields.clone(),
            min_score: config.min_score,
        })
    }

    fn operation(&self, step: &StepConfig, tables: &LookupTables) -> Result<Operation> {
        let op = match step {
            StepConfig::Replicate {
                source,
                destination,
                mapping,
                filter,
            } => Operation::Replicate(Replication {
                source: self.dataset(source)?,
                destination: self.dataset(destination)?,
                mapping: parse_mapping(mapping)?,
                filter: parse_filter(filter.as_ref()),
            }),
            StepConfig::Copy {
                source,
                destination,
                filter,
                mapping,
                append,
            } => Operation::FilteredCopy {
                source: self.dataset(source)?,
                destination: self.dataset(destination)?,
                filter: parse_filter(filter.as_ref()),
                mapping: parse_mapping(mapping)?,
                append: *append,
            },
            StepConfig::Join {
                primary,
                secondary,
                output,
                primary_key,
                secondary_key,
                fields,
                secondary_filter,
                keep_unmatched,
            } => Operation::Join {
                primary: self.dataset(primary)?,
                secondary: self.dataset(secondary)?,
                secondary_filter: parse_filter(secondary_filter.as_ref()),
                output: self.dataset(output)?,
                spec: JoinSpec::new(primary_key, secondary_key)
                    .with_fields(fields.clone())
                    .with_keep_unmatched(*keep_unmatched),
            },
            StepConfig::SpatialJoin {
                target,
                join,
                output,
                relation,
                one_to_many,
                fields,
                keep_unmatched,
            } => {
                let relation = match relation {
                    Some(name) => SpatialRelation::parse(name).ok_or_else(|| {
                        invalid(
                            "spatial_join relation",
                            format!("'{name}' is not intersects, contains or within"),
                        )
                    })?,
                    None => SpatialRelation::default(),
                };
                Operation::SpatialJoin {
                    target: self.dataset(target)?,
                    join: self.dataset(join)?,
                    output: self.dataset(output)?,
                    spec: SpatialJoinSpec {
                        relation,
                        mode: if *one_to_many {
                            JoinMode::OneToMany
                        } else {
                            JoinMode::OneToOne
                        },
                        fields: fields.clone(),
                        keep_unmatched: *keep_unmatched,
                    },
                }
            },
            StepConfig::Dissolve {
                input,
                output,
                fields,
                statistics,
            } => {
                let statistics = statistics
                    .iter()
                    .map(|s| {
                        let statistic = Statistic::parse(&s.statistic).ok_or_else(|| {
                            invalid(
                                "dissolve statistic",
                                format!("'{}' is not first, count or sum", s.statistic),
                            )
                        })?;
                        Ok(StatField {
                            field: s.field.clone(),
                            statistic,
                            output: s.output.clone(),
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Operation::Dissolve {
                    input: self.dataset(input)?,
                    output: self.dataset(output)?,
                    spec: DissolveSpec {
                        fields: fields.clone(),
                        statistics,
                    },
                }
            },
            StepConfig::Intersect {
                input,
                overlay,
                output,
            } => Operation::Intersect {
                input: self.dataset(input)?,
                overlay: self.dataset(overlay)?,
                output: self.dataset(output)?,
            },
            StepConfig::Calculate {
                dataset,
                field,
                expression,
            } => {
                let calculation = match expression {
                    CalculationConfig::Constant(value) => {
                        Calculation::Constant(Value::from(value.as_str()))
                    },
                    CalculationConfig::Copy(field) => Calculation::Copy {
                        field: field.clone(),
                    },
                    CalculationConfig::Translate { field, table } => {
                        tables.get(table)?;
                        Calculation::Translate {
                            field: field.clone(),
                            table: table.clone(),
                        }
                    },
                    CalculationConfig::Concat { parts, separator } => Calculation::Concat {
                        parts: parts
                            .iter()
                            .map(|p| match p {
                                ConcatPartConfig::Field(name) => ConcatPart::Field(name.clone()),
                                ConcatPartConfig::Text(text) => ConcatPart::Literal(text.clone()),
                            })
                            .collect(),
                        separator: separator.clone(),
                    },
                    CalculationConfig::Upper(field) => Calculation::Upper {
                        field: field.clone(),
                    },
                };
                Operation::Calculate {
                    dataset: self.dataset(dataset)?,
                    field: parse_field(field)?,
                    calculation,
                }
            },
            StepConfig::Geocode {
                input,
                locator,
                address_fields,
                output,
                unmatched_spreadsheet,
            } => {
                self.locator_definition(locator)?;
                Operation::Geocode {
                    input: self.dataset(input)?,
                    locator: locator.clone(),
                    address_fields: address_fields.clone(),
                    output: self.dataset(output)?,
                    unmatched_spreadsheet: unmatched_spreadsheet.as_deref().map(|p| self.resolve(p)),
                }
            },
            StepConfig::ExportSpreadsheet {
                dataset,
                path,
                filter,
                geometry,
            } => Operation::ExportSpreadsheet {
                dataset: self.dataset(dataset)?,
                filter: parse_filter(filter.as_ref()),
                path: self.resolve(path),
                geometry: (*geometry).into(),
            },
            StepConfig::ExportPackage {
                datasets,
                target_dir,
                prefix,
                placeholder,
            } => {
                let datasets = datasets
                    .iter()
                    .map(|d| self.dataset(d))
                    .collect::<Result<Vec<_>>>()?;
                let mut names = BTreeSet::new();
                for dataset in &datasets {
                    if !names.insert(dataset.name.to_ascii_lowercase()) {
                        return Err(invalid(
                            "export_package",
                            format!("more than one dataset named '{}'", dataset.name),
                        ));
                    }
                }
                Operation::ExportPackage(PackageExport {
                    datasets,
                    target_dir: self.resolve(target_dir),
                    placeholder: placeholder.clone(),
                    prefix: prefix.clone(),
                })
            },
            StepConfig::ImportTable {
                path,
                destination,
                text_columns,
                x_column,
                y_column,
            } => {
                let mut options = CsvReaderOptions::default();
                for column in text_columns {
                    options = options.with_text_column(column);
                }
                match (x_column, y_column) {
                    (Some(x), Some(y)) => options = options.with_point_columns(x, y),
                    (None, None) => {},
                    _ => {
                        return Err(invalid(
                            "import_table",
                            "x_column and y_column must be given together",
                        ));
                    },
                }
                Operation::ImportTable {
                    path: self.resolve(path),
                    destination: self.dataset(destination)?,
                    options,
                }
            },
            StepConfig::RebuildLocator { locator } => {
                Operation::RebuildLocator(self.locator_definition(locator)?)
            },
            StepConfig::PublishLocator { locator, service } => {
                self.locator_definition(locator)?;
                let config = self.services.get(service).ok_or_else(|| {
                    invalid("publish_locator service", format!("service '{service}' is not defined"))
                })?;
                Operation::PublishLocator {
                    locator: locator.clone(),
                    service: ServiceDefinition {
                        service_name: config.service_name.clone().unwrap_or_else(|| service.clone()),
                        staging_dir: self.resolve(&config.staging_dir),
                    },
                    host: Arc::new(DirectoryServiceHost::new(self.resolve(&config.host_dir))),
                }
            },
            StepConfig::Delete { dataset } => Operation::Delete {
                dataset: self.dataset(dataset)?,
            },
            StepConfig::Wait { seconds } => Operation::Wait {
                duration: Duration::from_secs(*seconds),
            },
        };
        Ok(op)
    }

    /// Builds the stages without touching any workspace.
    ///
    /// # Errors
    ///
    /// Returns the first configuration error, prefixed with its stage.
    pub fn stages(&self, tables: &LookupTables) -> Result<Vec<Stage>> {
        self.stages
            .iter()
            .map(|stage| {
                let steps = stage
                    .steps
                    .iter()
                    .enumerate()
                    .map(|(index, step)| {
                        self.operation(step, tables).map_err(|e| {
                            invalid(
                                format!("stage '{}' step {}", stage.name, index + 1),
                                e.to_string(),
                            )
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                let mut built = Stage::new(&stage.name)
                    .with_description(&stage.description)
                    .with_continue_on_failure(stage.continue_on_failure);
                for step in steps {
                    built = built.with_step(step);
                }
                Ok(built)
            })
            .collect()
    }

    /// Checks the whole file without opening workspaces or the run log.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                option: "name".to_string(),
            }
            .into());
        }
        for (name, config) in &self.workspaces {
            if name == SCRATCH_WORKSPACE {
                return Err(invalid(
                    format!("workspace '{name}'"),
                    "the scratch workspace is reserved",
                ));
            }
            let driver = find_driver(&config.driver).ok_or_else(|| {
                invalid(
                    format!("workspace '{name}' driver"),
                    format!("unknown driver '{}'", config.driver),
                )
            })?;
            if !driver.capabilities.is_workspace() {
                return Err(invalid(
                    format!("workspace '{name}' driver"),
                    format!("{} cannot hold a workspace", driver.short_name),
                ));
            }
            if driver.short_name == "GeoJSON" && config.path.is_none() {
                return Err(ConfigError::MissingRequired {
                    option: format!("workspaces.{name}.path"),
                }
                .into());
            }
        }
        for name in self.locators.keys() {
            self.locator_definition(name)?;
        }
        let tables = self.lookup_tables()?;
        self.stages(&tables)?;
        Ok(())
    }

    /// Opens every configured workspace.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::Unavailable`](geosync_core_common::WorkspaceError::Unavailable)
    /// for unreachable directories and configuration errors for unknown
    /// drivers.
    pub fn open_catalog(&self) -> Result<Catalog> {
        let mut catalog = Catalog::new();
        for (name, config) in &self.workspaces {
            let workspace: Arc<dyn Workspace> = match find_driver(&config.driver)
                .map(|d| d.short_name)
            {
                Some("GeoJSON") => {
                    let path = config.path.as_deref().ok_or_else(|| ConfigError::MissingRequired {
                        option: format!("workspaces.{name}.path"),
                    })?;
                    let root = self.resolve(path);
                    if config.create {
                        Arc::new(GeoJsonWorkspace::create_dir(name, root)?)
                    } else {
                        Arc::new(GeoJsonWorkspace::open(name, root)?)
                    }
                },
                Some("Memory") => Arc::new(MemoryWorkspace::new(name)),
                _ => {
                    return Err(invalid(
                        format!("workspace '{name}' driver"),
                        format!("'{}' cannot hold a workspace", config.driver),
                    ));
                },
            };
            catalog.register(workspace);
        }
        Ok(catalog)
    }

    /// Opens the run log and workspaces and builds the stages.
    ///
    /// Failures after the log is open are written to it before returning.
    ///
    /// # Errors
    ///
    /// Returns log, workspace and configuration errors.
    pub fn build(&self) -> Result<Pipeline> {
        self.validate()?;
        let log = RunLog::open(self.resolve(&self.log.path), self.log.mode)?;
        let prepared = self.lookup_tables().and_then(|tables| {
            let stages = self.stages(&tables)?;
            let catalog = self.open_catalog()?;
            let normalizer = AddressNormalizer::standard()?;
            Ok((tables, stages, catalog, normalizer))
        });
        let (tables, stages, catalog, normalizer) = match prepared {
            Ok(parts) => parts,
            Err(e) => {
                let _ = log.error(format!("Pipeline '{}' could not start: {}", self.name, e.user_message()));
                return Err(e);
            },
        };

        let context = RunContext::new(
            &self.name,
            log,
            catalog,
            tables,
            LocatorStore::new(self.resolve(&self.locator_dir)),
            normalizer,
        );
        Ok(Pipeline { context, stages })
    }
}

/// A pipeline ready to run.
#[derive(Debug)]
pub struct Pipeline {
    pub context: RunContext,
    pub stages: Vec<Stage>,
}

impl Pipeline {
    /// Runs every stage; see [`StageRunner::run`].
    ///
    /// # Errors
    ///
    /// Returns [`RunAborted`] when a stage aborts the run.
    pub async fn run(&self) -> std::result::Result<RunSummary, RunAborted> {
        StageRunner::new().run(&self.stages, &self.context).await
    }
}
