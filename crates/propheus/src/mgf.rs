//! Mascot generic format (MGF) peak lists
//!
//! Header lines before the first `BEGIN IONS` set defaults (currently only
//! `CHARGE=`) for every spectrum in the file.

use regex::Regex;

use crate::spectrum::{ProductSpectrum, RawSpectrum, SpectrumProcessor};

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum MgfError {
    #[error("line {line}: unreadable peak `{text}`")]
    Peak { line: usize, text: String },
    #[error("line {line}: unreadable precursor mass `{text}`")]
    Pepmass { line: usize, text: String },
    #[error("spectrum `{0}` has no precursor m/z")]
    MissingPrecursor(String),
}

#[derive(Default)]
struct QueryData {
    id: String,
    scan: Option<usize>,
    precursor_mz: Option<f64>,
    precursor_intensity: f64,
    charges: Option<Vec<u8>>,
    rt_in_minutes: f64,
    mz: Vec<f64>,
    intensity: Vec<f64>,
    charge: Vec<i32>,
}

type Parser = fn(&MgfReader, &str, usize, &mut QueryData) -> Result<bool, MgfError>;

pub struct MgfReader {
    file_id: usize,
    regex_for_charge: Regex,
    processor: SpectrumProcessor,
}

impl MgfReader {
    pub fn with_file_id(file_id: usize) -> Self {
        Self {
            file_id,
            regex_for_charge: Regex::new(r"(\d+)\s*([+-]?)").expect("static regex"),
            processor: SpectrumProcessor::default(),
        }
    }

    pub fn with_processor(mut self, processor: SpectrumProcessor) -> Self {
        self.processor = processor;
        self
    }

    fn parse_charges(&self, text: &str) -> Vec<u8> {
        self.regex_for_charge
            .captures_iter(text)
            .filter(|cap| cap.get(2).map(|s| s.as_str()) != Some("-"))
            .filter_map(|cap| cap[1].parse::<u8>().ok())
            .filter(|&z| z > 0)
            .collect()
    }

    fn parse_title(&self, line: &str, _: usize, query: &mut QueryData) -> Result<bool, MgfError> {
        if let Some(id) = line.strip_prefix("TITLE=") {
            query.id = id.trim().to_string();
            return Ok(true);
        }
        Ok(false)
    }

    fn parse_scans(&self, line: &str, _: usize, query: &mut QueryData) -> Result<bool, MgfError> {
        if let Some(scans) = line.strip_prefix("SCANS=") {
            query.scan = scans
                .split(|c: char| !c.is_ascii_digit())
                .next()
                .and_then(|s| s.parse().ok());
            return Ok(true);
        }
        Ok(false)
    }

    fn parse_pepmass(&self, line: &str, n: usize, query: &mut QueryData) -> Result<bool, MgfError> {
        if let Some(pepmass) = line.strip_prefix("PEPMASS=") {
            let mut fields = pepmass.split_ascii_whitespace();
            let mz = fields
                .next()
                .and_then(|s| s.parse::<f64>().ok())
                .filter(|mz| mz.is_finite() && *mz > 0.0)
                .ok_or_else(|| MgfError::Pepmass {
                    line: n,
                    text: pepmass.into(),
                })?;
            query.precursor_mz = Some(mz);
            if let Some(intensity) = fields.next().and_then(|s| s.parse::<f64>().ok()) {
                query.precursor_intensity = intensity;
            }
            return Ok(true);
        }
        Ok(false)
    }

    fn parse_charge(&self, line: &str, _: usize, query: &mut QueryData) -> Result<bool, MgfError> {
        if let Some(charge) = line.strip_prefix("CHARGE=") {
            query.charges = Some(self.parse_charges(charge));
            return Ok(true);
        }
        Ok(false)
    }

    fn parse_rt(&self, line: &str, _: usize, query: &mut QueryData) -> Result<bool, MgfError> {
        if let Some(rt) = line.strip_prefix("RTINSECONDS=") {
            if let Ok(seconds) = rt.trim().parse::<f64>() {
                query.rt_in_minutes = seconds / 60.0;
            }
            return Ok(true);
        }
        Ok(false)
    }

    fn parse_peak(&self, line: &str, n: usize, query: &mut QueryData) -> Result<bool, MgfError> {
        if !line.starts_with(|c: char| c.is_ascii_digit() || c == '.') {
            return Ok(false);
        }
        let mut fields = line.split_ascii_whitespace();
        let err = || MgfError::Peak {
            line: n,
            text: line.into(),
        };
        let mz = fields
            .next()
            .and_then(|s| s.parse::<f64>().ok())
            .ok_or_else(err)?;
        let intensity = match fields.next() {
            Some(s) => s.parse::<f64>().map_err(|_| err())?,
            None => 1.0,
        };
        let charge = match fields.next() {
            Some(s) => self.parse_charges(s).first().copied().unwrap_or(0) as i32,
            None => 0,
        };
        query.mz.push(mz);
        query.intensity.push(intensity);
        query.charge.push(charge);
        Ok(true)
    }

    fn finish(&self, query: QueryData, default_charges: &Option<Vec<u8>>) -> Result<ProductSpectrum, MgfError> {
        let precursor_mz = query
            .precursor_mz
            .ok_or_else(|| MgfError::MissingPrecursor(query.id.clone()))?;

        // A single declared charge is trusted; several are treated as unknown
        let precursor_charge = match query.charges.as_ref().or(default_charges.as_ref()) {
            Some(charges) if charges.len() == 1 => charges[0] as i32,
            _ => 0,
        };

        let charge = match query.charge.iter().any(|&z| z > 0) {
            true => query.charge,
            false => Vec::new(),
        };

        let raw = RawSpectrum {
            file_id: self.file_id,
            id: query.id,
            scan: query.scan,
            retention_time: query.rt_in_minutes,
            injection_time: 0.0,
            precursor_mz,
            precursor_charge,
            precursor_intensity: query.precursor_intensity,
            mz: query.mz,
            intensity: query.intensity,
            charge,
        };
        Ok(self.processor.process(raw))
    }

    pub fn parse(&self, contents: &str) -> Vec<ProductSpectrum> {
        let parsers: [Parser; 6] = [
            Self::parse_peak,
            Self::parse_title,
            Self::parse_pepmass,
            Self::parse_charge,
            Self::parse_rt,
            Self::parse_scans,
        ];

        let mut spectra = Vec::new();
        let mut default_charges = None;
        let mut query: Option<QueryData> = None;

        for (n, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with(['#', ';', '!', '/']) {
                continue;
            }

            if line.starts_with("BEGIN IONS") {
                if query.is_some() {
                    log::warn!("line {}: BEGIN IONS inside an open spectrum", n + 1);
                }
                query = Some(QueryData::default());
                continue;
            }

            let current = match query.as_mut() {
                Some(current) => current,
                None => {
                    // File-level parameters
                    if let Some(charge) = line.strip_prefix("CHARGE=") {
                        default_charges = Some(self.parse_charges(charge));
                    }
                    continue;
                }
            };

            if line.starts_with("END IONS") {
                if let Some(data) = query.take() {
                    match self.finish(data, &default_charges) {
                        Ok(spectrum) => spectra.push(spectrum),
                        Err(err) => log::error!("{}", err),
                    }
                }
                continue;
            }

            for parser in &parsers {
                match parser(self, line, n + 1, current) {
                    Ok(true) => break,
                    Ok(false) => {}
                    Err(err) => {
                        log::warn!("{}", err);
                        break;
                    }
                }
            }
        }

        if query.is_some() {
            log::warn!("MGF file ended inside an open spectrum, discarding it");
        }
        spectra
    }
}
