use anyhow::{ensure, Context};
use clap::ArgMatches;
use propheus_core::config::{Configuration, Tables};
use propheus_core::mass::Tolerance;
use propheus_core::search::{Builder, Parameters};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Paths to user-supplied configuration tables. Missing entries fall back
/// to the built-in tables
#[derive(Serialize, Deserialize, Default, Clone, Debug)]
pub struct TablePaths {
    pub amino_acids: Option<String>,
    pub modifications: Option<String>,
    pub proteases: Option<String>,
    pub product_caps: Option<String>,
}

impl TablePaths {
    fn read(path: &Option<String>) -> anyhow::Result<Option<String>> {
        path.as_ref()
            .map(|path| {
                std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read table `{path}`"))
            })
            .transpose()
    }

    pub fn load(&self) -> anyhow::Result<Configuration> {
        let tables = Tables {
            amino_acids: Self::read(&self.amino_acids)?,
            modifications: Self::read(&self.modifications)?,
            proteases: Self::read(&self.proteases)?,
            product_caps: Self::read(&self.product_caps)?,
        };
        tables
            .load()
            .context("Failed to load configuration tables")
    }
}

#[derive(Serialize)]
/// Actual search settings - may include overrides not set by the user
pub struct Search {
    pub version: String,
    pub search: Builder,
    pub tables: TablePaths,
    pub fasta: String,
    pub mgf_paths: Vec<String>,
    pub write_all: bool,
    pub output_paths: Vec<String>,

    #[serde(skip_serializing)]
    pub output_directory: PathBuf,

    #[serde(skip_serializing)]
    pub configuration: Arc<Configuration>,

    #[serde(skip_serializing)]
    pub parameters: Parameters,
}

#[derive(Deserialize)]
/// Input search parameters deserialized from JSON file
pub struct Input {
    #[serde(default)]
    search: Builder,
    tables: Option<TablePaths>,
    fasta: Option<String>,
    mgf_paths: Option<Vec<String>>,
    output_directory: Option<String>,
    /// Report every identification, not just those within the desired FDR
    write_all: Option<bool>,
}

impl Input {
    pub fn from_arguments(matches: ArgMatches) -> anyhow::Result<Self> {
        let path = matches
            .get_one::<String>("parameters")
            .context("missing required `parameters` argument")?;
        let mut input = Input::load(path)
            .with_context(|| format!("Failed to read parameters from `{path}`"))?;

        // Handle JSON configuration overrides
        if let Some(output_directory) = matches.get_one::<String>("output_directory") {
            log::trace!("overriding `output_directory` parameter.");
            input.output_directory = Some(output_directory.into());
        }
        if let Some(fasta) = matches.get_one::<String>("fasta") {
            log::trace!("overriding `fasta` parameter.");
            input.fasta = Some(fasta.into());
        }
        if let Some(mgf_paths) = matches.get_many::<String>("mgf_paths") {
            log::trace!("overriding `mgf_paths` parameter.");
            input.mgf_paths = Some(mgf_paths.into_iter().map(|p| p.into()).collect());
        }
        if matches.get_flag("write-all") {
            input.write_all = Some(true);
        }

        ensure!(
            input.fasta.is_some(),
            "`fasta` must be set. For more information try '--help'"
        );
        ensure!(
            input.mgf_paths.is_some(),
            "`mgf_paths` must be set. For more information try '--help'"
        );

        Ok(input)
    }

    pub fn load<S: AsRef<std::path::Path>>(path: S) -> anyhow::Result<Self> {
        propheus_core::read_json(path).map_err(anyhow::Error::from)
    }

    fn check_tolerance(name: &str, tolerance: &Tolerance) {
        match tolerance {
            Tolerance::Ppm(ppm) if *ppm > 100.0 => {
                log::warn!("{} of {} ppm is wider than expected", name, ppm)
            }
            Tolerance::Da(da) if *da > 1.0 => {
                log::warn!("{} of {} Da is wider than expected", name, da)
            }
            tol if tol.value() <= 0.0 => {
                log::warn!("{} is zero: only exact matches will be accepted", name)
            }
            _ => {}
        }
    }

    pub fn build(self) -> anyhow::Result<Search> {
        let tables = self.tables.unwrap_or_default();
        let configuration = tables.load()?;
        let parameters = self
            .search
            .clone()
            .make_parameters(&configuration)
            .context("Invalid search parameters")?;

        Self::check_tolerance("precursor_tol", &parameters.precursor_tol);
        Self::check_tolerance("product_tol", &parameters.product_tol);
        let (min_z, max_z) = (
            parameters.query.min_precursor_charge,
            parameters.query.max_precursor_charge,
        );
        if max_z > 6 {
            log::warn!("precursor charges up to {} will be tried ({}..={})", max_z, min_z, max_z);
        }

        let fasta = self.fasta.context("'fasta' must be provided!")?;
        let mgf_paths = self.mgf_paths.context("'mgf_paths' must be provided!")?;

        let output_directory = match self.output_directory {
            Some(path) => {
                let path = PathBuf::from(path);
                std::fs::create_dir_all(&path).with_context(|| {
                    format!("Failed to create output directory `{}`", path.display())
                })?;
                path
            }
            None => std::env::current_dir()?,
        };

        Ok(Search {
            version: clap::crate_version!().into(),
            search: self.search,
            tables,
            fasta,
            mgf_paths,
            write_all: self.write_all.unwrap_or(false),
            output_paths: Vec::new(),
            output_directory,
            configuration: Arc::new(configuration),
            parameters,
        })
    }
}
