use serde::Serialize;

use crate::mass::Tolerance;
use crate::query::binary_search_slice;

/// A centroided fragment peak, with charge if the instrument assigned one
#[derive(PartialEq, PartialOrd, Copy, Clone, Default, Debug, Serialize)]
pub struct Peak {
    pub mz: f64,
    pub intensity: f64,
    pub charge: Option<u8>,
}

impl Peak {
    /// Charges of zero or below mean "unknown"
    pub fn new(mz: f64, intensity: f64, charge: i32) -> Self {
        Peak {
            mz,
            intensity,
            charge: u8::try_from(charge).ok().filter(|&z| z > 0),
        }
    }
}

/// An MS2 spectrum as handed over by a reader, before any processing
#[derive(Clone, Default, Debug)]
pub struct RawSpectrum {
    pub file_id: usize,
    pub id: String,
    pub scan: Option<usize>,
    /// Minutes
    pub retention_time: f64,
    pub injection_time: f64,
    pub precursor_mz: f64,
    /// Zero or below if unknown
    pub precursor_charge: i32,
    pub precursor_intensity: f64,
    pub mz: Vec<f64>,
    pub intensity: Vec<f64>,
    /// Either empty, or one charge per peak
    pub charge: Vec<i32>,
}

#[derive(Clone, Default, Debug, Serialize)]
pub struct ProductSpectrum {
    pub file_id: usize,
    pub id: String,
    pub scan: Option<usize>,
    pub retention_time: f64,
    pub injection_time: f64,
    pub precursor_mz: f64,
    pub precursor_charge: Option<u8>,
    pub precursor_intensity: f64,
    /// Sorted by m/z, ascending
    pub peaks: Vec<Peak>,
    pub most_intense: f64,
    pub total_intensity: f64,
}

impl ProductSpectrum {
    /// Peaks within `tolerance` of `mz`
    pub fn peaks_within(&self, mz: f64, tolerance: Tolerance) -> &[Peak] {
        let (lo, hi) = tolerance.bounds(mz);
        let (i, j) = binary_search_slice(&self.peaks, |peak, query| peak.mz.total_cmp(query), lo, hi);
        let window = &self.peaks[i..j];
        let left = window.partition_point(|peak| peak.mz < lo);
        let right = window.partition_point(|peak| peak.mz <= hi);
        &window[left..right]
    }
}

/// Binary search followed by linear search to select the closest peak to `mz` within `tolerance` window
pub fn select_closest_peak(peaks: &[Peak], mz: f64, tolerance: Tolerance) -> Option<&Peak> {
    let (lo, hi) = tolerance.bounds(mz);
    let (i, j) = binary_search_slice(peaks, |peak, query| peak.mz.total_cmp(query), lo, hi);

    let mut best_peak = None;
    let mut min_eps = f64::MAX;
    for peak in peaks[i..j]
        .iter()
        .filter(|peak| peak.mz >= lo && peak.mz <= hi)
    {
        let eps = (peak.mz - mz).abs();
        if eps < min_eps {
            min_eps = eps;
            best_peak = Some(peak);
        }
    }
    best_peak
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SpectrumProcessor {
    /// Keep only this many of the most intense peaks
    pub take_top_n: usize,
    pub min_fragment_mz: f64,
    pub max_fragment_mz: f64,
}

impl Default for SpectrumProcessor {
    fn default() -> Self {
        Self {
            take_top_n: usize::MAX,
            min_fragment_mz: 0.0,
            max_fragment_mz: f64::MAX,
        }
    }
}

impl SpectrumProcessor {
    pub fn new(take_top_n: usize, min_fragment_mz: f64, max_fragment_mz: f64) -> Self {
        Self {
            take_top_n,
            min_fragment_mz,
            max_fragment_mz,
        }
    }

    pub fn process(&self, raw: RawSpectrum) -> ProductSpectrum {
        let charges = match raw.charge.len() == raw.mz.len() {
            true => raw.charge,
            false => {
                if !raw.charge.is_empty() {
                    log::warn!(
                        "{}: peak charge array length does not match m/z array, ignoring charges",
                        raw.id
                    );
                }
                vec![0; raw.mz.len()]
            }
        };

        let total = raw.mz.len().max(raw.intensity.len());
        let mut peaks = raw
            .mz
            .iter()
            .zip(raw.intensity.iter())
            .zip(charges.iter())
            .filter(|((mz, int), _)| {
                mz.is_finite() && int.is_finite() && **mz > 0.0 && **int > 0.0
            })
            .map(|((&mz, &intensity), &charge)| Peak::new(mz, intensity, charge))
            .collect::<Vec<_>>();

        let dropped = total - peaks.len();
        if dropped > 0 {
            log::warn!("{}: dropped {} invalid peaks", raw.id, dropped);
        }

        peaks.retain(|peak| peak.mz >= self.min_fragment_mz && peak.mz <= self.max_fragment_mz);

        if peaks.len() > self.take_top_n {
            peaks.sort_unstable_by(|a, b| b.intensity.total_cmp(&a.intensity));
            peaks.truncate(self.take_top_n);
        }
        peaks.sort_unstable_by(|a, b| a.mz.total_cmp(&b.mz));

        let most_intense = peaks.iter().map(|p| p.intensity).fold(0.0, f64::max);
        let total_intensity = peaks.iter().map(|p| p.intensity).sum();

        let precursor_charge = u8::try_from(raw.precursor_charge)
            .ok()
            .filter(|&z| z > 0);

        ProductSpectrum {
            file_id: raw.file_id,
            id: raw.id,
            scan: raw.scan,
            retention_time: raw.retention_time,
            injection_time: raw.injection_time,
            precursor_mz: raw.precursor_mz,
            precursor_charge,
            precursor_intensity: raw.precursor_intensity,
            peaks,
            most_intense,
            total_intensity,
        }
    }
}
