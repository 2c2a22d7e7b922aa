//! Result aggregation and target-decoy false discovery rate control

use fnv::FnvHashMap;
use std::cmp::Ordering;

use crate::query::{Precursor, Queries};
use crate::scoring::{PeptideSpectrumMatch, ScoreWeights};
use crate::spectrum::ProductSpectrum;

/// Anything that competes in a target-decoy ranking
pub trait TargetDecoy {
    fn score(&self) -> f64;
    fn is_decoy(&self) -> bool;
}

impl TargetDecoy for PeptideSpectrumMatch {
    fn score(&self) -> f64 {
        self.probability_score
    }

    fn is_decoy(&self) -> bool {
        self.decoy
    }
}

/// Best match of a precursor that survived sibling competition
#[derive(Clone, Debug)]
pub struct Identification {
    pub precursor: usize,
    pub psm: PeptideSpectrumMatch,
    pub q_value: f64,
}

impl TargetDecoy for Identification {
    fn score(&self) -> f64 {
        self.psm.probability_score
    }

    fn is_decoy(&self) -> bool {
        self.psm.decoy
    }
}

/// Sort descending by score, targets ahead of decoys on ties
pub fn sort_for_fdr<T: TargetDecoy>(items: &mut [T]) {
    items.sort_by(|a, b| {
        b.score()
            .total_cmp(&a.score())
            .then(a.is_decoy().cmp(&b.is_decoy()))
    });
}

/// Move every query's retained matches onto its precursor. Each precursor
/// keeps every match in `all_psms` and its best `psms_per_precursor` in `psms`
pub fn aggregate(
    queries: Queries,
    psms_per_precursor: usize,
) -> (Vec<ProductSpectrum>, Vec<Precursor>) {
    let Queries {
        spectra,
        mut precursors,
        queries,
    } = queries;

    for query in queries {
        let precursor = query.precursor;
        precursors[precursor].all_psms.extend(query.into_psms());
    }

    for precursor in precursors.iter_mut() {
        finalize(precursor, psms_per_precursor);
    }
    (spectra, precursors)
}

/// Sort `all_psms` and rebuild the de-duplicated top list from it
fn finalize(precursor: &mut Precursor, n: usize) {
    precursor.all_psms.sort_by(|a, b| a.rank_cmp(b));
    let mut top: Vec<PeptideSpectrumMatch> = Vec::with_capacity(n);
    for psm in &precursor.all_psms {
        if top.len() == n {
            break;
        }
        if !top
            .iter()
            .any(|p| p.decoy == psm.decoy && p.sequence == psm.sequence)
        {
            top.push(psm.clone());
        }
    }
    precursor.psms = top;
}

/// Reward peptides and proteins that are the best match of several
/// precursors: with `n` such precursors the evidence score is `(n - 1) / n`.
/// Composite scores are recomputed and every list re-ranked
pub fn rescore_with_evidence(
    precursors: &mut [Precursor],
    weights: &ScoreWeights,
    psms_per_precursor: usize,
) {
    let mut peptides: FnvHashMap<(bool, String), usize> = FnvHashMap::default();
    let mut proteins: FnvHashMap<(bool, String), usize> = FnvHashMap::default();
    for best in precursors.iter().filter_map(|p| p.best()) {
        *peptides
            .entry((best.decoy, best.sequence.to_string()))
            .or_default() += 1;
        *proteins
            .entry((best.decoy, best.accession().to_string()))
            .or_default() += 1;
    }

    let evidence = |n: Option<&usize>| match n {
        Some(&n) if n > 0 => (n - 1) as f64 / n as f64,
        _ => 0.0,
    };

    for precursor in precursors.iter_mut() {
        for psm in precursor.all_psms.iter_mut() {
            psm.peptide_score =
                evidence(peptides.get(&(psm.decoy, psm.sequence.to_string())));
            psm.protein_score =
                evidence(proteins.get(&(psm.decoy, psm.accession().to_string())));
            psm.rescore(weights);
        }
        finalize(precursor, psms_per_precursor);
    }
}

/// Highest scoring match; ties go to a target, then to the deterministic
/// ranking order
pub fn best_psm(psms: &[PeptideSpectrumMatch]) -> Option<&PeptideSpectrumMatch> {
    psms.iter().min_by(|a, b| a.rank_cmp(b))
}

/// One identification per precursor. A precursor is dropped when one of its
/// siblings (other charge states, isotopes) has a better best match, so each
/// observed ion is counted once
pub fn identifications(precursors: &[Precursor]) -> Vec<Identification> {
    let mut ids = precursors
        .iter()
        .enumerate()
        .filter_map(|(idx, precursor)| {
            let best = precursor.best()?;
            let beaten = precursor
                .other_charges
                .iter()
                .chain(precursor.isotopes.iter())
                .filter_map(|&sibling| precursors.get(sibling)?.best())
                .any(|other| other.rank_cmp(best) == Ordering::Less);
            match beaten {
                true => None,
                false => Some(Identification {
                    precursor: idx,
                    psm: best.clone(),
                    q_value: 1.0,
                }),
            }
        })
        .collect::<Vec<_>>();
    ids.sort_by(|a, b| a.psm.rank_cmp(&b.psm));
    ids
}

/// Length of the longest prefix of `sorted` (descending by score, targets
/// first on ties) whose decoy/target ratio is within `desired_fdr`.
/// `None` if no prefix qualifies
pub fn compute_at_fdr<T: TargetDecoy>(sorted: &[T], desired_fdr: f64) -> Option<usize> {
    let mut decoys = 0usize;
    let mut targets = 0usize;
    let mut cutoff = None;
    for (idx, item) in sorted.iter().enumerate() {
        match item.is_decoy() {
            true => decoys += 1,
            false => targets += 1,
        }
        if targets > 0 && decoys as f64 / targets as f64 <= desired_fdr {
            cutoff = Some(idx + 1);
        }
    }
    cutoff
}

/// Identifications (targets and decoys) in the passing prefix. Empty if
/// nothing qualifies
pub fn filter_at_fdr(mut ids: Vec<Identification>, desired_fdr: f64) -> Vec<Identification> {
    sort_for_fdr(&mut ids);
    match compute_at_fdr(&ids, desired_fdr) {
        Some(cutoff) => {
            ids.truncate(cutoff);
            ids
        }
        None => Vec::new(),
    }
}

/// Assign q-values in place, returning how many are within `desired_fdr`
///
/// # Invariants
/// * `ids` must be sorted in descending order (e.g. best match is first)
pub fn assign_q_values(ids: &mut [Identification], desired_fdr: f64) -> usize {
    let mut decoy = 0;
    let mut target = 0;

    for id in ids.iter_mut() {
        match id.psm.decoy {
            true => decoy += 1,
            false => target += 1,
        }
        id.q_value = match target {
            0 => f64::INFINITY,
            _ => decoy as f64 / target as f64,
        };
    }

    // Reverse slice, and calculate the cumulative minimum
    let mut q_min = f64::INFINITY;
    let mut passing = 0;
    for id in ids.iter_mut().rev() {
        q_min = q_min.min(id.q_value);
        if q_min <= desired_fdr {
            passing += 1;
        }
        id.q_value = q_min.min(1.0);
    }
    passing
}
