use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;

use crate::config::Configuration;
use crate::ion_series::{IonSeries, Kind};
use crate::mass::{mz, MassType, Tolerance};
use crate::peptide::Peptide;
use crate::query::Query;
use crate::spectrum::{select_closest_peak, ProductSpectrum};

/// Weights of the composite score. They are used as given, never
/// normalized to sum to one
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub intensity: f64,
    pub intensity_fraction: f64,
    pub product: f64,
    pub precursor: f64,
    pub matched_fraction: f64,
    pub matched_weight: f64,
    pub protein: f64,
    pub peptide: f64,
    pub fragment: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            intensity: 0.5,
            intensity_fraction: 1.0,
            product: 0.5,
            precursor: 0.5,
            matched_fraction: 2.0,
            matched_weight: 1.0,
            protein: 0.25,
            peptide: 0.25,
            fragment: 1.0,
        }
    }
}

/// Observed peak explaining a theoretical fragment
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct ProductMatch {
    pub kind: Kind,
    pub position: usize,
    pub charge: u8,
    pub theoretical_mz: f64,
    pub observed_mz: f64,
    /// Signed, in the product tolerance's unit
    pub error: f64,
    /// Summed intensity of every peak in the window
    pub intensity: f64,
    pub weight: f64,
}

/// A peptide ready to be scored: masses are computed once and shared by
/// every query in its precursor window
#[derive(Clone, Debug)]
pub struct Candidate {
    pub peptide: Arc<Peptide>,
    pub sequence: Arc<str>,
    pub monoisotopic: f64,
    pub residue_masses: Vec<f64>,
}

impl Candidate {
    /// `None` if the peptide holds a residue missing from the amino acid table
    pub fn new(peptide: Peptide, config: &Configuration) -> Option<Self> {
        let monoisotopic = peptide.monoisotopic(config)?;
        let residue_masses = peptide.residue_masses(config, MassType::Monoisotopic)?;
        Some(Candidate {
            sequence: peptide.key().into(),
            peptide: Arc::new(peptide),
            monoisotopic,
            residue_masses,
        })
    }
}

#[derive(Clone, Debug)]
pub struct PeptideSpectrumMatch {
    pub peptide: Arc<Peptide>,
    /// Modified sequence
    pub sequence: Arc<str>,
    pub decoy: bool,
    pub spectrum: usize,
    pub precursor: usize,
    pub charge: u8,
    /// Observed
    pub precursor_mz: f64,
    /// Observed neutral mass
    pub precursor_mass: f64,
    /// Theoretical neutral mass
    pub calculated_mass: f64,
    /// In the precursor tolerance's unit
    pub precursor_error: f64,
    pub matched_fragments: usize,
    pub theoretical_fragments: usize,
    pub matched_weight: f64,
    pub theoretical_weight: f64,
    pub matched_intensity: f64,

    pub intensity_score: f64,
    pub intensity_fraction: f64,
    pub product_score: f64,
    pub precursor_score: f64,
    pub matched_fraction: f64,
    pub matched_weight_score: f64,
    pub protein_score: f64,
    pub peptide_score: f64,
    pub fragment_score: f64,
    /// Weighted sum of the sub-scores
    pub probability_score: f64,

    pub matches: Vec<ProductMatch>,
}

impl PeptideSpectrumMatch {
    pub fn accession(&self) -> &str {
        &self.peptide.protein.accession
    }

    pub fn label(&self) -> i32 {
        match self.decoy {
            true => -1,
            false => 1,
        }
    }

    /// Recompute the composite score, e.g. after evidence scores change
    pub fn rescore(&mut self, weights: &ScoreWeights) {
        self.probability_score = weights.intensity * self.intensity_score
            + weights.intensity_fraction * self.intensity_fraction
            + weights.product * self.product_score
            + weights.precursor * self.precursor_score
            + weights.matched_fraction * self.matched_fraction
            + weights.matched_weight * self.matched_weight_score
            + weights.protein * self.protein_score
            + weights.peptide * self.peptide_score
            + weights.fragment * self.fragment_score;
    }

    /// Total order used everywhere matches are ranked: higher score first,
    /// then targets before decoys, then sequence, protein and location
    pub fn rank_cmp(&self, other: &Self) -> Ordering {
        other
            .probability_score
            .total_cmp(&self.probability_score)
            .then(self.decoy.cmp(&other.decoy))
            .then_with(|| self.sequence.cmp(&other.sequence))
            .then_with(|| self.accession().cmp(other.accession()))
            .then(self.peptide.start.cmp(&other.peptide.start))
            .then(self.spectrum.cmp(&other.spectrum))
            .then(self.precursor.cmp(&other.precursor))
    }
}

pub struct Scorer<'a> {
    pub ion_series: &'a IonSeries,
    pub precursor_tol: Tolerance,
    pub product_tol: Tolerance,
    /// Reject peaks whose known charge differs from the fragment's
    pub match_fragment_charge: bool,
    pub weights: ScoreWeights,
}

impl<'a> Scorer<'a> {
    pub fn score(
        &self,
        query: &Query,
        spectrum: &ProductSpectrum,
        candidate: &Candidate,
    ) -> PeptideSpectrumMatch {
        let theoretical_mz = mz(candidate.monoisotopic, query.charge);
        let precursor_error = self.precursor_tol.error(theoretical_mz, query.precursor_mz);
        let precursor_score = closeness(precursor_error, self.precursor_tol.value());

        let fragments = self
            .ion_series
            .compute_fragments(&candidate.residue_masses, query.charge);

        let product_tol = self.product_tol.value();
        let mut matches = Vec::new();
        let mut matched_weight = 0.0;
        let mut matched_intensity = 0.0;
        let mut error_sum = 0.0;
        let mut theoretical_weight = 0.0;

        for frag in &fragments {
            theoretical_weight += frag.weight;

            let charge_ok = |z: Option<u8>| match (self.match_fragment_charge, z) {
                (true, Some(z)) => z == frag.charge,
                _ => true,
            };

            let window = spectrum.peaks_within(frag.mz, self.product_tol);
            let best = match self.match_fragment_charge {
                false => select_closest_peak(window, frag.mz, self.product_tol),
                true => window
                    .iter()
                    .filter(|peak| charge_ok(peak.charge))
                    .min_by(|a, b| (a.mz - frag.mz).abs().total_cmp(&(b.mz - frag.mz).abs())),
            };

            if let Some(best) = best {
                let intensity = window
                    .iter()
                    .filter(|peak| charge_ok(peak.charge))
                    .map(|peak| peak.intensity)
                    .sum::<f64>();
                let error = self.product_tol.error(frag.mz, best.mz);

                matched_weight += frag.weight;
                matched_intensity += intensity;
                error_sum += frag.weight * error.abs().min(product_tol);
                matches.push(ProductMatch {
                    kind: frag.kind,
                    position: frag.position,
                    charge: frag.charge,
                    theoretical_mz: frag.mz,
                    observed_mz: best.mz,
                    error,
                    intensity,
                    weight: frag.weight,
                });
            }
        }

        let matched = matches.len();
        let theoretical = fragments.len();
        let product_score = match matched > 0 && product_tol > 0.0 {
            true => 1.0 - error_sum / (matched as f64 * product_tol),
            false => 0.0,
        };
        let intensity_fraction = ratio(matched_intensity, spectrum.most_intense).min(1.0);
        let intensity_score = ratio(matched_intensity, spectrum.total_intensity).min(1.0);

        let mut psm = PeptideSpectrumMatch {
            peptide: candidate.peptide.clone(),
            sequence: candidate.sequence.clone(),
            decoy: candidate.peptide.is_decoy(),
            spectrum: query.spectrum,
            precursor: query.precursor,
            charge: query.charge,
            precursor_mz: query.precursor_mz,
            precursor_mass: query.precursor_mass,
            calculated_mass: candidate.monoisotopic,
            precursor_error,
            matched_fragments: matched,
            theoretical_fragments: theoretical,
            matched_weight,
            theoretical_weight,
            matched_intensity,
            intensity_score,
            intensity_fraction,
            product_score,
            precursor_score,
            matched_fraction: ratio(matched as f64, theoretical as f64),
            matched_weight_score: ratio(matched_weight, theoretical_weight),
            protein_score: 0.0,
            peptide_score: 0.0,
            fragment_score: fragment_score(
                &matches,
                candidate.residue_masses.len(),
                spectrum.most_intense,
            ),
            probability_score: 0.0,
            matches,
        };
        psm.rescore(&self.weights);
        psm
    }
}

fn ratio(num: f64, den: f64) -> f64 {
    match den > 0.0 {
        true => num / den,
        false => 0.0,
    }
}

/// `1` for a perfect hit, falling linearly to `0` at the tolerance edge
fn closeness(error: f64, tolerance: f64) -> f64 {
    match tolerance > 0.0 {
        true => (tolerance - error.abs().min(tolerance)) / tolerance,
        false => (error == 0.0) as u8 as f64,
    }
}

/// Sequence coverage by matched fragments. Each residue collects the
/// normalized intensity of every fragment containing it; residues covered
/// by a single ion series are trusted more than residues covered by many
pub fn fragment_score(matches: &[ProductMatch], len: usize, most_intense: f64) -> f64 {
    if len == 0 || most_intense <= 0.0 {
        return 0.0;
    }
    let mut intensity = vec![0.0; len];
    let mut series = vec![0u16; len];
    for m in matches {
        let covered = match m.kind.is_reverse() {
            true => len.saturating_sub(m.position)..len,
            false => 0..m.position.min(len),
        };
        for idx in covered {
            intensity[idx] += m.intensity / most_intense;
            series[idx] |= 1 << (m.kind as u16);
        }
    }

    let total = intensity
        .iter()
        .zip(series.iter())
        .map(|(&int, &bits)| {
            let factor = match bits.count_ones() {
                0 => 0.0,
                1 => 1.0,
                2 => 0.5,
                _ => 0.25,
            };
            factor * int.min(1.0)
        })
        .sum::<f64>();
    total / len as f64
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::fasta::Protein;
    use crate::mass::PROTON;
    use crate::query::{Precursor, Query};
    use crate::spectrum::{RawSpectrum, SpectrumProcessor};

    fn candidate(sequence: &str, decoy: bool) -> Candidate {
        let config = Configuration::builtin().unwrap();
        let protein = Arc::new(Protein {
            accession: "P1".into(),
            description: String::new(),
            sequence: sequence.into(),
            decoy: false,
        });
        let peptide = Peptide::new(protein, 0, sequence.len(), 0, false);
        let peptide = if decoy { peptide.reverse() } else { peptide };
        Candidate::new(peptide, &config).unwrap()
    }

    fn query(mass: f64, charge: u8) -> Query {
        let precursor = Precursor {
            mz: mz(mass, charge),
            mass,
            charge,
            ..Default::default()
        };
        Query::new(0, 0, &precursor)
    }

    fn spectrum_for(candidate: &Candidate, ions: &IonSeries, charge: u8) -> ProductSpectrum {
        let fragments = ions.compute_fragments(&candidate.residue_masses, charge);
        let raw = RawSpectrum {
            id: "synthetic".into(),
            precursor_mz: mz(candidate.monoisotopic, charge),
            precursor_charge: charge as i32,
            mz: fragments.iter().map(|f| f.mz).collect(),
            intensity: vec![100.0; fragments.len()],
            ..Default::default()
        };
        SpectrumProcessor::default().process(raw)
    }

    fn scorer(ions: &IonSeries) -> Scorer<'_> {
        Scorer {
            ion_series: ions,
            precursor_tol: Tolerance::Ppm(10.0),
            product_tol: Tolerance::Da(0.02),
            match_fragment_charge: false,
            weights: ScoreWeights::default(),
        }
    }

    fn ions() -> IonSeries {
        let config = Configuration::builtin().unwrap();
        IonSeries::new(&[Kind::B, Kind::Y], &config, MassType::Monoisotopic)
    }

    #[test]
    fn perfect_match() {
        let ions = ions();
        let target = candidate("PEPTIDEK", false);
        let spectrum = spectrum_for(&target, &ions, 2);
        let psm = scorer(&ions).score(&query(target.monoisotopic, 2), &spectrum, &target);

        assert_eq!(psm.matched_fragments, 14);
        assert_eq!(psm.theoretical_fragments, 14);
        assert!((psm.precursor_score - 1.0).abs() < 1E-6);
        assert!((psm.product_score - 1.0).abs() < 1E-6);
        assert!((psm.matched_fraction - 1.0).abs() < 1E-12);
        assert_eq!(psm.intensity_fraction, 1.0);
        assert!((psm.intensity_score - 1.0).abs() < 1E-12);
        assert!(psm.fragment_score > 0.0 && psm.fragment_score <= 1.0);
        assert!(!psm.decoy);

        // The reversed sequence explains far less of the spectrum
        let decoy = candidate("PEPTIDEK", true);
        let dpsm = scorer(&ions).score(&query(target.monoisotopic, 2), &spectrum, &decoy);
        assert!(dpsm.decoy);
        assert!(dpsm.matched_fragments < psm.matched_fragments);
        assert!(dpsm.probability_score < psm.probability_score);
    }

    #[test]
    fn precursor_error_is_clamped() {
        let ions = ions();
        let target = candidate("PEPTIDEK", false);
        let spectrum = spectrum_for(&target, &ions, 2);
        let q = query(target.monoisotopic + 1.0, 2);
        let psm = scorer(&ions).score(&q, &spectrum, &target);
        assert!(psm.precursor_error > 10.0);
        assert_eq!(psm.precursor_score, 0.0);

        // 5 ppm off scores halfway
        let shifted = mz(target.monoisotopic, 2) * (1.0 + 5E-6);
        let q = query((shifted - PROTON) * 2.0, 2);
        let psm = scorer(&ions).score(&q, &spectrum, &target);
        assert!((psm.precursor_error - 5.0).abs() < 1E-6);
        assert!((psm.precursor_score - 0.5).abs() < 1E-6);
    }

    #[test]
    fn product_errors_are_weighted() {
        let config = Configuration::builtin().unwrap();
        let ions = IonSeries::new(&[Kind::A], &config, MassType::Monoisotopic);
        assert_eq!(ions.series[0].weight, 0.5);

        let target = candidate("PEPTIDEK", false);
        let mut spectrum = spectrum_for(&target, &ions, 2);
        for peak in spectrum.peaks.iter_mut() {
            peak.mz += 0.01;
        }
        let psm = scorer(&ions).score(&query(target.monoisotopic, 2), &spectrum, &target);
        assert_eq!(psm.matched_fragments, 7);
        // Half of the plain error average of 0.01 / 0.02
        assert!((psm.product_score - 0.75).abs() < 1E-6);
    }

    #[test]
    fn fragment_charge_filter() {
        let ions = ions();
        let target = candidate("PEPTIDEK", false);
        let mut spectrum = spectrum_for(&target, &ions, 2);
        for peak in spectrum.peaks.iter_mut() {
            peak.charge = Some(3);
        }
        let mut s = scorer(&ions);
        let q = query(target.monoisotopic, 2);
        assert_eq!(s.score(&q, &spectrum, &target).matched_fragments, 14);
        s.match_fragment_charge = true;
        assert_eq!(s.score(&q, &spectrum, &target).matched_fragments, 0);
    }

    #[test]
    fn weights_are_not_normalized() {
        let ions = ions();
        let target = candidate("PEPTIDEK", false);
        let spectrum = spectrum_for(&target, &ions, 2);
        let mut psm = scorer(&ions).score(&query(target.monoisotopic, 2), &spectrum, &target);
        let base = psm.probability_score;
        let doubled = ScoreWeights {
            intensity: 1.0,
            intensity_fraction: 2.0,
            product: 1.0,
            precursor: 1.0,
            matched_fraction: 4.0,
            matched_weight: 2.0,
            protein: 0.5,
            peptide: 0.5,
            fragment: 2.0,
        };
        psm.rescore(&doubled);
        assert!((psm.probability_score - 2.0 * base).abs() < 1E-9);
    }

    #[test]
    fn coverage() {
        let m = |kind, position, intensity| ProductMatch {
            kind,
            position,
            charge: 1,
            theoretical_mz: 0.0,
            observed_mz: 0.0,
            error: 0.0,
            intensity,
            weight: 1.0,
        };
        // b2 covers residues 0, 1; y1 covers residue 3
        let score = fragment_score(&[m(Kind::B, 2, 10.0), m(Kind::Y, 1, 10.0)], 4, 10.0);
        assert!((score - 0.75).abs() < 1E-12);
        // b3 and y2 overlap on residue 2
        let score = fragment_score(&[m(Kind::B, 3, 10.0), m(Kind::Y, 2, 10.0)], 4, 10.0);
        assert!((score - (1.0 + 1.0 + 0.5 + 1.0) / 4.0).abs() < 1E-12);
        assert_eq!(fragment_score(&[], 4, 10.0), 0.0);
        assert_eq!(fragment_score(&[m(Kind::B, 1, 1.0)], 0, 10.0), 0.0);
    }

    #[test]
    fn ranking_prefers_targets_on_ties() {
        let ions = ions();
        let target = candidate("PEPTIDEK", false);
        let spectrum = spectrum_for(&target, &ions, 2);
        let a = scorer(&ions).score(&query(target.monoisotopic, 2), &spectrum, &target);
        let mut b = a.clone();
        b.decoy = true;
        assert_eq!(a.rank_cmp(&b), Ordering::Less);
        assert_eq!(b.rank_cmp(&a), Ordering::Greater);
        assert_eq!(a.rank_cmp(&a), Ordering::Equal);
    }
}
