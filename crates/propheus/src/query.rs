use std::cmp::Ordering;
use std::ops::Range;
use std::sync::{Mutex, PoisonError};

use crate::mass::{neutral_mass, Tolerance, NEUTRON};
use crate::scoring::PeptideSpectrumMatch;
use crate::spectrum::ProductSpectrum;

/// A precursor ion hypothesis: one observed m/z under one charge state
#[derive(Clone, Debug, Default)]
pub struct Precursor {
    /// Spectrum this precursor was read from
    pub spectrum: usize,
    pub mz: f64,
    /// Neutral mass
    pub mass: f64,
    pub charge: u8,
    pub retention_time: f64,
    pub intensity: f64,
    /// Same ion, shifted by a whole number of neutrons
    pub isotopes: Vec<usize>,
    /// Same m/z in the same spectrum, under a different charge
    pub other_charges: Vec<usize>,
    /// Top matches, best first
    pub psms: Vec<PeptideSpectrumMatch>,
    /// Every match retained by any query on this precursor, best first
    pub all_psms: Vec<PeptideSpectrumMatch>,
}

impl Precursor {
    pub fn best(&self) -> Option<&PeptideSpectrumMatch> {
        self.psms.first()
    }

    /// Target/decoy status of the best match. Unmatched precursors are
    /// neither
    pub fn is_decoy(&self) -> Option<bool> {
        self.best().map(|psm| psm.decoy)
    }
}

/// A spectrum paired with one precursor that falls in its isolation window
#[derive(Debug)]
pub struct Query {
    pub spectrum: usize,
    pub precursor: usize,
    pub precursor_mz: f64,
    pub precursor_mass: f64,
    pub charge: u8,
    psms: Mutex<Vec<PeptideSpectrumMatch>>,
}

impl Query {
    pub fn new(spectrum: usize, precursor: usize, p: &Precursor) -> Self {
        Query {
            spectrum,
            precursor,
            precursor_mz: p.mz,
            precursor_mass: p.mass,
            charge: p.charge,
            psms: Mutex::new(Vec::new()),
        }
    }

    /// Offer a match to this query's top-`capacity` list. Returns true if it
    /// was retained
    pub fn insert(&self, psm: PeptideSpectrumMatch, capacity: usize, min_matched: usize) -> bool {
        if capacity == 0 || psm.matched_fragments < min_matched {
            return false;
        }
        let mut psms = self.psms.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(idx) = psms
            .iter()
            .position(|p| p.decoy == psm.decoy && p.sequence == psm.sequence)
        {
            match psm.rank_cmp(&psms[idx]) {
                Ordering::Less => {
                    psms.remove(idx);
                }
                _ => return false,
            }
        }

        if psms.len() >= capacity {
            match psms.last() {
                Some(worst) if psm.rank_cmp(worst) != Ordering::Less => return false,
                _ => {}
            }
        }

        let idx = psms.partition_point(|p| p.rank_cmp(&psm) == Ordering::Less);
        psms.insert(idx, psm);
        psms.truncate(capacity);
        true
    }

    /// Snapshot of the current list, best first
    pub fn psms(&self) -> Vec<PeptideSpectrumMatch> {
        self.psms
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn into_psms(self) -> Vec<PeptideSpectrumMatch> {
        self.psms
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct QuerySettings {
    /// Charges tried when a spectrum does not declare one (inclusive)
    pub min_precursor_charge: u8,
    pub max_precursor_charge: u8,
    /// Co-isolated precursors within this window of a spectrum's precursor
    /// m/z are searched against that spectrum too
    pub isolation_window: Option<Tolerance>,
    /// Used to recognise isotopic siblings
    pub precursor_tol: Tolerance,
    /// Maximum retention time difference (minutes) for two precursors to be
    /// considered simultaneous
    pub rt_tolerance: f64,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            min_precursor_charge: 2,
            max_precursor_charge: 4,
            isolation_window: None,
            precursor_tol: Tolerance::Ppm(10.0),
            rt_tolerance: 0.0,
        }
    }
}

/// Precursor index: every query, sorted by precursor mass
pub struct Queries {
    pub spectra: Vec<ProductSpectrum>,
    pub precursors: Vec<Precursor>,
    pub queries: Vec<Query>,
}

impl Queries {
    pub fn build(spectra: Vec<ProductSpectrum>, settings: &QuerySettings) -> Self {
        let min_z = settings.min_precursor_charge.max(1);
        let max_z = settings.max_precursor_charge.max(min_z);

        let mut precursors = Vec::new();
        for (idx, spectrum) in spectra.iter().enumerate() {
            if !spectrum.precursor_mz.is_finite() || spectrum.precursor_mz <= 0.0 {
                log::error!("{}: invalid precursor m/z, skipping spectrum", spectrum.id);
                continue;
            }
            let charges = match spectrum.precursor_charge {
                Some(z) => z..=z,
                None => min_z..=max_z,
            };
            let first = precursors.len();
            for z in charges {
                precursors.push(Precursor {
                    spectrum: idx,
                    mz: spectrum.precursor_mz,
                    mass: neutral_mass(spectrum.precursor_mz, z),
                    charge: z,
                    retention_time: spectrum.retention_time,
                    intensity: spectrum.precursor_intensity,
                    ..Default::default()
                });
            }
            let last = precursors.len();
            for i in first..last {
                precursors[i].other_charges = (first..last).filter(|&j| j != i).collect();
            }
        }

        link_isotopes(&mut precursors, settings);

        // Precursor indices ordered by m/z, for co-isolation lookups
        let mut by_mz = (0..precursors.len()).collect::<Vec<_>>();
        by_mz.sort_by(|&a, &b| precursors[a].mz.total_cmp(&precursors[b].mz).then(a.cmp(&b)));

        let mut queries = Vec::with_capacity(precursors.len());
        for (idx, spectrum) in spectra.iter().enumerate() {
            match settings.isolation_window {
                Some(window) => {
                    let (lo, hi) = window.bounds(spectrum.precursor_mz);
                    let start = by_mz.partition_point(|&p| precursors[p].mz < lo);
                    for &p in by_mz[start..]
                        .iter()
                        .take_while(|&&p| precursors[p].mz <= hi)
                    {
                        let precursor = &precursors[p];
                        let same_time = (precursor.retention_time - spectrum.retention_time).abs()
                            <= settings.rt_tolerance;
                        if same_time || precursor.spectrum == idx {
                            queries.push(Query::new(idx, p, precursor));
                        }
                    }
                }
                None => queries.extend(
                    precursors
                        .iter()
                        .enumerate()
                        .filter(|(_, p)| p.spectrum == idx)
                        .map(|(p, precursor)| Query::new(idx, p, precursor)),
                ),
            }
        }

        queries.sort_by(|a, b| {
            a.precursor_mass
                .total_cmp(&b.precursor_mass)
                .then(a.spectrum.cmp(&b.spectrum))
                .then(a.precursor.cmp(&b.precursor))
        });

        log::trace!(
            "indexed {} spectra into {} precursors and {} queries",
            spectra.len(),
            precursors.len(),
            queries.len()
        );

        Queries {
            spectra,
            precursors,
            queries,
        }
    }

    /// Indices of queries whose precursor mass is within `tolerance` of `mass`
    pub fn window(&self, mass: f64, tolerance: Tolerance) -> Range<usize> {
        let (lo, hi) = tolerance.bounds(mass);
        let (left, right) = binary_search_slice(
            &self.queries,
            |query, bound| query.precursor_mass.total_cmp(bound),
            lo,
            hi,
        );
        let start = left
            + self.queries[left..right]
                .iter()
                .take_while(|query| query.precursor_mass < lo)
                .count();
        let mut end = start;
        while end < right && self.queries[end].precursor_mass <= hi {
            end += 1;
        }
        start..end
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }
}

/// Link precursors of equal charge, observed at the same time, whose masses
/// differ by one or two neutrons
fn link_isotopes(precursors: &mut [Precursor], settings: &QuerySettings) {
    let mut by_mass = (0..precursors.len()).collect::<Vec<_>>();
    by_mass.sort_by(|&a, &b| precursors[a].mass.total_cmp(&precursors[b].mass));

    let mut links = Vec::new();
    for &i in &by_mass {
        for k in 1..=2 {
            let target = precursors[i].mass + k as f64 * NEUTRON;
            let (lo, hi) = settings.precursor_tol.bounds(target);
            let start = by_mass.partition_point(|&j| precursors[j].mass < lo);
            for &j in by_mass[start..]
                .iter()
                .take_while(|&&j| precursors[j].mass <= hi)
            {
                let (a, b) = (&precursors[i], &precursors[j]);
                if a.charge == b.charge
                    && a.spectrum != b.spectrum
                    && (a.retention_time - b.retention_time).abs() <= settings.rt_tolerance
                {
                    links.push((i, j));
                }
            }
        }
    }

    for (i, j) in links {
        precursors[i].isotopes.push(j);
        precursors[j].isotopes.push(i);
    }
    for precursor in precursors.iter_mut() {
        precursor.isotopes.sort_unstable();
        precursor.isotopes.dedup();
    }
}

/// Return the widest `left` and `right` indices into a `slice` (sorted by the
/// function `key`) such that all values between `low` and `high` are
/// contained in `slice[left..right]`
pub fn binary_search_slice<T, F, S>(slice: &[T], key: F, low: S, high: S) -> (usize, usize)
where
    F: Fn(&T, &S) -> Ordering,
{
    let left_idx = match slice.binary_search_by(|a| key(a, &low)) {
        Ok(idx) | Err(idx) => {
            let mut idx = idx.saturating_sub(1);
            while idx > 0 && key(&slice[idx], &low) != Ordering::Less {
                idx -= 1;
            }
            idx
        }
    };

    let right_idx = match slice[left_idx..].binary_search_by(|a| key(a, &high)) {
        Ok(idx) | Err(idx) => {
            let mut idx = idx + left_idx;
            while idx < slice.len() && key(&slice[idx], &high) != Ordering::Greater {
                idx = idx.saturating_add(1);
            }
            idx.min(slice.len())
        }
    };
    (left_idx, right_idx)
}
