pub mod config;
pub mod digest;
pub mod enzyme;
pub mod fasta;
pub mod fdr;
pub mod ion_series;
pub mod mass;
pub mod mgf;
pub mod modification;
pub mod peptide;
pub mod query;
pub mod scoring;
pub mod search;
pub mod sink;
pub mod spectrum;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("malformed {table} table (line {line}): {reason}")]
    Table {
        table: &'static str,
        line: u64,
        reason: String,
    },
    #[error("protein `{0}` is already a decoy, but decoy generation is enabled")]
    DecoyContradiction(String),
    #[error("unknown protease `{0}`")]
    UnknownProtease(String),
    #[error("unknown modification `{0}`")]
    UnknownModification(String),
    #[error("invalid parameter: {0}")]
    Parameter(String),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    IO(#[from] std::io::Error),
}

pub fn read_json<P, T>(path: P) -> Result<T, Error>
where
    P: AsRef<std::path::Path>,
    T: for<'de> serde::Deserialize<'de>,
{
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

pub fn read_fasta<P, S>(path: P, decoy_tag: S) -> Result<fasta::Fasta, Error>
where
    P: AsRef<std::path::Path>,
    S: Into<String>,
{
    let contents = std::fs::read_to_string(path)?;
    Ok(fasta::Fasta::parse(&contents, decoy_tag))
}

pub fn read_mgf<P: AsRef<std::path::Path>>(
    path: P,
    file_id: usize,
    processor: spectrum::SpectrumProcessor,
) -> Result<Vec<spectrum::ProductSpectrum>, Error> {
    let contents = std::fs::read_to_string(path)?;
    Ok(mgf::MgfReader::with_file_id(file_id)
        .with_processor(processor)
        .parse(&contents))
}
