use crate::input::Search;
use crate::output::TsvSink;
use anyhow::Context;
use log::info;
use propheus_core::fasta::Fasta;
use propheus_core::search::{self, SearchResult};
use propheus_core::spectrum::ProductSpectrum;
use rayon::prelude::*;
use std::path::PathBuf;
use std::time::Instant;

pub struct Runner {
    pub fasta: Fasta,
    pub parameters: Search,
    start: Instant,
}

/// Summary of a finished run
#[derive(Copy, Clone, Debug)]
pub struct Summary {
    pub spectra: usize,
    pub identifications: usize,
    pub passing: usize,
    pub written: usize,
}

impl Runner {
    pub fn new(parameters: Search) -> anyhow::Result<Self> {
        let start = Instant::now();
        let fasta = propheus_core::read_fasta(&parameters.fasta, &parameters.parameters.decoy_tag)
            .with_context(|| format!("Failed to read FASTA from `{}`", parameters.fasta))?;
        info!(
            "read {} proteins ({} decoys) in {:#?}",
            fasta.proteins.len(),
            fasta.decoys(),
            start.elapsed()
        );
        Ok(Self {
            fasta,
            parameters,
            start,
        })
    }

    // Create a path for `file_name` in the output directory
    fn make_path<S: AsRef<str>>(&self, file_name: S) -> PathBuf {
        self.parameters.output_directory.join(file_name.as_ref())
    }

    /// Read and process every MGF file. Files are read in parallel and
    /// spectra keep the index of the file they came from
    fn read_spectra(&self) -> anyhow::Result<Vec<ProductSpectrum>> {
        let start = Instant::now();
        let processor = self.parameters.parameters.processor;
        let spectra = self
            .parameters
            .mgf_paths
            .par_iter()
            .enumerate()
            .map(|(file_id, path)| {
                propheus_core::read_mgf(path, file_id, processor)
                    .with_context(|| format!("Failed to read spectra from `{path}`"))
            })
            .collect::<anyhow::Result<Vec<_>>>()?
            .into_iter()
            .flatten()
            .collect::<Vec<_>>();

        let duration = Instant::now().duration_since(start).as_millis() as usize;
        let rate = spectra.len() * 1000 / (duration + 1);
        info!(
            "- file IO: {:8} ms ({} spectra/s) {} spectra from {} files",
            duration,
            rate,
            spectra.len(),
            self.parameters.mgf_paths.len()
        );
        Ok(spectra)
    }

    fn write_results(&self, result: &SearchResult) -> anyhow::Result<(String, usize)> {
        let path = self.make_path("results.propheus.tsv");
        let file = std::fs::File::create(&path)
            .with_context(|| format!("Failed to create `{}`", path.display()))?;
        let mut sink = TsvSink::new(std::io::BufWriter::new(file))?;
        let written = result.export(&mut sink, !self.parameters.write_all)?;
        sink.into_inner()?;
        Ok((path.display().to_string(), written))
    }

    pub fn run(mut self) -> anyhow::Result<Summary> {
        let spectra = self.read_spectra()?;
        let n_spectra = spectra.len();

        let search = search::Search::new(
            self.parameters.configuration.clone(),
            self.parameters.parameters.clone(),
        );
        let result = search.run(&self.fasta, spectra)?;

        log::info!(
            "discovered {} target peptide-spectrum matches at {}% FDR",
            result.passing().iter().filter(|id| !id.psm.decoy).count(),
            search.parameters.desired_fdr * 100.0
        );
        log::trace!("writing outputs");

        let (path, written) = self.write_results(&result)?;
        self.parameters.output_paths.push(path);

        let path = self.make_path("results.json");
        self.parameters.output_paths.push(path.display().to_string());
        println!("{}", serde_json::to_string_pretty(&self.parameters)?);

        let bytes = serde_json::to_vec_pretty(&self.parameters)?;
        std::fs::write(&path, bytes)
            .with_context(|| format!("Failed to write `{}`", path.display()))?;

        let run_time = (Instant::now() - self.start).as_secs();
        info!("finished in {}s", run_time);

        Ok(Summary {
            spectra: n_spectra,
            identifications: result.identifications.len(),
            passing: result.passing,
            written,
        })
    }
}
