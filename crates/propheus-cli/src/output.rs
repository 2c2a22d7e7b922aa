use propheus_core::sink::{MatchRecord, PsmSink};
use std::io::Write;

const HEADERS: [&str; 27] = [
    "file_id",
    "scan_id",
    "scan",
    "retention_time",
    "precursor_mz",
    "charge",
    "precursor_mass",
    "calculated_mass",
    "precursor_error",
    "rank",
    "peptide",
    "proteins",
    "label",
    "missed_cleavages",
    "matched_fragments",
    "theoretical_fragments",
    "intensity_score",
    "intensity_fraction",
    "product_score",
    "precursor_score",
    "matched_fraction",
    "matched_weight_score",
    "protein_score",
    "peptide_score",
    "fragment_score",
    "probability_score",
    "q_value",
];

/// Tab-separated match report
pub struct TsvSink<W: Write> {
    wtr: csv::Writer<W>,
}

impl<W: Write> TsvSink<W> {
    pub fn new(writer: W) -> Result<Self, propheus_core::Error> {
        let mut wtr = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_writer(writer);
        wtr.write_byte_record(&csv::ByteRecord::from(HEADERS.to_vec()))?;
        Ok(Self { wtr })
    }

    pub fn into_inner(self) -> anyhow::Result<W> {
        self.wtr
            .into_inner()
            .map_err(|err| anyhow::anyhow!("failed to flush report: {}", err.error()))
    }
}

pub fn serialize_record(record: &MatchRecord) -> csv::ByteRecord {
    let mut row = csv::ByteRecord::new();
    row.push_field(itoa::Buffer::new().format(record.file_id).as_bytes());
    row.push_field(record.scan_id.as_bytes());
    match record.scan {
        Some(scan) => row.push_field(itoa::Buffer::new().format(scan).as_bytes()),
        None => row.push_field(b""),
    }
    row.push_field(ryu::Buffer::new().format(record.retention_time).as_bytes());
    row.push_field(ryu::Buffer::new().format(record.precursor_mz).as_bytes());
    row.push_field(itoa::Buffer::new().format(record.charge).as_bytes());
    row.push_field(ryu::Buffer::new().format(record.precursor_mass).as_bytes());
    row.push_field(ryu::Buffer::new().format(record.calculated_mass).as_bytes());
    row.push_field(ryu::Buffer::new().format(record.precursor_error).as_bytes());
    row.push_field(itoa::Buffer::new().format(record.rank).as_bytes());
    row.push_field(record.peptide.as_bytes());
    row.push_field(record.proteins.as_bytes());
    let label: i8 = match record.decoy {
        true => -1,
        false => 1,
    };
    row.push_field(itoa::Buffer::new().format(label).as_bytes());
    row.push_field(itoa::Buffer::new().format(record.missed_cleavages).as_bytes());
    row.push_field(itoa::Buffer::new().format(record.matched_fragments).as_bytes());
    row.push_field(
        itoa::Buffer::new()
            .format(record.theoretical_fragments)
            .as_bytes(),
    );
    for score in [
        record.intensity_score,
        record.intensity_fraction,
        record.product_score,
        record.precursor_score,
        record.matched_fraction,
        record.matched_weight_score,
        record.protein_score,
        record.peptide_score,
        record.fragment_score,
        record.probability_score,
        record.q_value,
    ] {
        row.push_field(ryu::Buffer::new().format(score).as_bytes());
    }
    row
}

impl<W: Write> PsmSink for TsvSink<W> {
    fn accept(&mut self, record: &MatchRecord) -> Result<(), propheus_core::Error> {
        self.wtr.write_byte_record(&serialize_record(record))?;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), propheus_core::Error> {
        self.wtr.flush()?;
        Ok(())
    }
}
