use serde::Serialize;

use crate::fdr::Identification;
use crate::query::Precursor;
use crate::scoring::PeptideSpectrumMatch;
use crate::spectrum::ProductSpectrum;
use crate::Error;

/// A flattened, reportable match
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MatchRecord {
    pub file_id: usize,
    pub scan_id: String,
    pub scan: Option<usize>,
    pub retention_time: f64,
    pub precursor_mz: f64,
    pub charge: u8,
    pub precursor_mass: f64,
    pub calculated_mass: f64,
    pub precursor_error: f64,
    pub rank: usize,
    pub peptide: String,
    pub proteins: String,
    pub decoy: bool,
    pub missed_cleavages: u8,
    pub matched_fragments: usize,
    pub theoretical_fragments: usize,
    pub intensity_score: f64,
    pub intensity_fraction: f64,
    pub product_score: f64,
    pub precursor_score: f64,
    pub matched_fraction: f64,
    pub matched_weight_score: f64,
    pub protein_score: f64,
    pub peptide_score: f64,
    pub fragment_score: f64,
    pub probability_score: f64,
    pub q_value: f64,
}

impl MatchRecord {
    pub fn new(
        spectrum: &ProductSpectrum,
        precursor: &Precursor,
        psm: &PeptideSpectrumMatch,
        rank: usize,
        q_value: f64,
    ) -> Self {
        MatchRecord {
            file_id: spectrum.file_id,
            scan_id: spectrum.id.clone(),
            scan: spectrum.scan,
            retention_time: spectrum.retention_time,
            precursor_mz: precursor.mz,
            charge: precursor.charge,
            precursor_mass: precursor.mass,
            calculated_mass: psm.calculated_mass,
            precursor_error: psm.precursor_error,
            rank,
            peptide: psm.sequence.to_string(),
            proteins: psm.accession().to_string(),
            decoy: psm.decoy,
            missed_cleavages: psm.peptide.missed_cleavages,
            matched_fragments: psm.matched_fragments,
            theoretical_fragments: psm.theoretical_fragments,
            intensity_score: psm.intensity_score,
            intensity_fraction: psm.intensity_fraction,
            product_score: psm.product_score,
            precursor_score: psm.precursor_score,
            matched_fraction: psm.matched_fraction,
            matched_weight_score: psm.matched_weight_score,
            protein_score: psm.protein_score,
            peptide_score: psm.peptide_score,
            fragment_score: psm.fragment_score,
            probability_score: psm.probability_score,
            q_value,
        }
    }
}

/// Destination for scored matches
pub trait PsmSink {
    fn accept(&mut self, record: &MatchRecord) -> Result<(), Error>;

    fn finish(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

impl PsmSink for Vec<MatchRecord> {
    fn accept(&mut self, record: &MatchRecord) -> Result<(), Error> {
        self.push(record.clone());
        Ok(())
    }
}

/// Send every retained match of each identified precursor to `sink`, in
/// identification order. Returns the number of records written
pub fn export<S: PsmSink + ?Sized>(
    spectra: &[ProductSpectrum],
    precursors: &[Precursor],
    ids: &[Identification],
    sink: &mut S,
) -> Result<usize, Error> {
    let mut written = 0;
    for id in ids {
        let precursor = &precursors[id.precursor];
        for (rank, psm) in precursor.psms.iter().enumerate() {
            let spectrum = &spectra[psm.spectrum];
            sink.accept(&MatchRecord::new(
                spectrum,
                precursor,
                psm,
                rank + 1,
                id.q_value,
            ))?;
            written += 1;
        }
    }
    sink.finish()?;
    Ok(written)
}
