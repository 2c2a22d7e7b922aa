//! Immutable lookup tables shared by every stage of a search
//!
//! Each table is a CSV file with a header row. The built-in tables are
//! compiled into the binary; any of them can be replaced by a user file.

use crate::enzyme::{Protease, Specificity, Terminus};
use crate::ion_series::Kind;
use crate::mass::MassType;
use crate::modification::{ModUsage, Modification, ModificationKind};
use crate::Error;
use fnv::FnvHashMap;
use serde::Deserialize;
use std::sync::Arc;

const AMINO_ACIDS: &str = include_str!("../data/amino_acids.csv");
const MODIFICATIONS: &str = include_str!("../data/modifications.csv");
const PROTEASES: &str = include_str!("../data/proteases.csv");
const PRODUCT_CAPS: &str = include_str!("../data/product_caps.csv");

#[derive(Clone, Debug, PartialEq)]
pub struct AminoAcid {
    pub code: u8,
    pub name: String,
    pub monoisotopic: f64,
    pub average: f64,
}

/// Mass offset and weight of a fragment ion series
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ProductCap {
    pub kind: Kind,
    pub mass_type: MassType,
    pub cap: f64,
    pub weight: f64,
}

#[derive(Deserialize)]
struct AminoAcidRow {
    code: String,
    name: String,
    monoisotopic: f64,
    average: f64,
}

#[derive(Deserialize)]
struct ModificationRow {
    description: String,
    #[serde(rename = "type")]
    kind: String,
    target: String,
    monoisotopic: f64,
    average: f64,
    usage: String,
}

#[derive(Deserialize)]
struct ProteaseRow {
    name: String,
    inducing: String,
    preventing: String,
    terminus: String,
    specificity: String,
}

#[derive(Deserialize)]
struct ProductCapRow {
    series: String,
    mass_type: MassType,
    cap: f64,
    weight: f64,
}

/// Raw CSV contents for each table. `None` selects the built-in table
#[derive(Default, Clone, Debug)]
pub struct Tables {
    pub amino_acids: Option<String>,
    pub modifications: Option<String>,
    pub proteases: Option<String>,
    pub product_caps: Option<String>,
}

#[derive(Clone, Debug)]
pub struct Configuration {
    amino_acids: Vec<AminoAcid>,
    // Index into `amino_acids` by residue code
    residues: [Option<usize>; 256],
    modifications: Vec<Arc<Modification>>,
    proteases: Vec<Protease>,
    product_caps: FnvHashMap<(Kind, MassType), ProductCap>,
}

/// Parse every row of `contents` into `T`, remembering the line number so
/// that semantic errors can be reported against the right row
fn read_rows<T>(table: &'static str, contents: &str) -> Result<Vec<(u64, T)>, Error>
where
    T: for<'de> Deserialize<'de>,
{
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .from_reader(contents.as_bytes());

    let headers = rdr.headers()?.clone();
    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record.map_err(|e| Error::Table {
            table,
            line: e.position().map(|p| p.line()).unwrap_or_default(),
            reason: e.to_string(),
        })?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();
        let row = record
            .deserialize::<T>(Some(&headers))
            .map_err(|e| Error::Table {
                table,
                line,
                reason: e.to_string(),
            })?;
        rows.push((line, row));
    }
    Ok(rows)
}

fn parse_amino_acids(contents: &str) -> Result<Vec<AminoAcid>, Error> {
    const TABLE: &str = "amino acid";
    let mut seen = FnvHashMap::default();
    let mut out = Vec::new();
    for (line, row) in read_rows::<AminoAcidRow>(TABLE, contents)? {
        let fail = |reason: String| Error::Table {
            table: TABLE,
            line,
            reason,
        };
        let code = match row.code.as_bytes() {
            [c] if c.is_ascii_uppercase() => *c,
            _ => return Err(fail(format!("invalid residue code `{}`", row.code))),
        };
        if seen.insert(code, line).is_some() {
            return Err(fail(format!("duplicate residue `{}`", row.code)));
        }
        if !row.monoisotopic.is_finite() || !row.average.is_finite() {
            return Err(fail("residue masses must be finite".into()));
        }
        out.push(AminoAcid {
            code,
            name: row.name,
            monoisotopic: row.monoisotopic,
            average: row.average,
        });
    }
    Ok(out)
}

fn parse_modifications(contents: &str) -> Result<Vec<Arc<Modification>>, Error> {
    const TABLE: &str = "modification";
    let mut seen = FnvHashMap::default();
    let mut out = Vec::new();
    for (line, row) in read_rows::<ModificationRow>(TABLE, contents)? {
        let fail = |reason: String| Error::Table {
            table: TABLE,
            line,
            reason,
        };
        if row.description.is_empty() {
            return Err(fail("missing description".into()));
        }
        let kind = row
            .kind
            .parse::<ModificationKind>()
            .map_err(|e| fail(e.to_string()))?;
        let usage = row
            .usage
            .parse::<ModUsage>()
            .map_err(|e| fail(e.to_string()))?;
        let target = match row.target.as_bytes() {
            [] => None,
            [c] if c.is_ascii_uppercase() => Some(*c),
            _ => return Err(fail(format!("invalid target residue `{}`", row.target))),
        };
        let modification = Modification::new(
            row.description,
            kind,
            target,
            row.monoisotopic,
            row.average,
            usage,
        )
        .map_err(|e| fail(e.to_string()))?;

        if seen.insert(modification.description.clone(), line).is_some() {
            return Err(fail(format!(
                "duplicate modification `{}`",
                modification.description
            )));
        }
        out.push(Arc::new(modification));
    }
    Ok(out)
}

fn parse_proteases(contents: &str) -> Result<Vec<Protease>, Error> {
    const TABLE: &str = "protease";
    let mut seen = FnvHashMap::default();
    let mut out = Vec::new();
    for (line, row) in read_rows::<ProteaseRow>(TABLE, contents)? {
        let fail = |reason: String| Error::Table {
            table: TABLE,
            line,
            reason,
        };
        let terminus = row.terminus.parse::<Terminus>().map_err(fail)?;
        let specificity = row.specificity.parse::<Specificity>().map_err(fail)?;
        if seen.insert(row.name.to_ascii_lowercase(), line).is_some() {
            return Err(fail(format!("duplicate protease `{}`", row.name)));
        }
        out.push(
            Protease::new(
                row.name,
                &row.inducing,
                &row.preventing,
                terminus,
                specificity,
            )
            .map_err(fail)?,
        );
    }
    Ok(out)
}

fn parse_product_caps(contents: &str) -> Result<FnvHashMap<(Kind, MassType), ProductCap>, Error> {
    const TABLE: &str = "product cap";
    let mut out = FnvHashMap::default();
    for (line, row) in read_rows::<ProductCapRow>(TABLE, contents)? {
        let fail = |reason: String| Error::Table {
            table: TABLE,
            line,
            reason,
        };
        let kind = row.series.parse::<Kind>().map_err(fail)?;
        if !row.cap.is_finite() || !row.weight.is_finite() || row.weight < 0.0 {
            return Err(fail("cap must be finite and weight non-negative".into()));
        }
        let cap = ProductCap {
            kind,
            mass_type: row.mass_type,
            cap: row.cap,
            weight: row.weight,
        };
        if out.insert((kind, row.mass_type), cap).is_some() {
            return Err(fail(format!("duplicate series `{}`", row.series)));
        }
    }
    Ok(out)
}

impl Tables {
    pub fn load(&self) -> Result<Configuration, Error> {
        let amino_acids =
            parse_amino_acids(self.amino_acids.as_deref().unwrap_or(AMINO_ACIDS))?;
        let modifications =
            parse_modifications(self.modifications.as_deref().unwrap_or(MODIFICATIONS))?;
        let proteases = parse_proteases(self.proteases.as_deref().unwrap_or(PROTEASES))?;
        let product_caps =
            parse_product_caps(self.product_caps.as_deref().unwrap_or(PRODUCT_CAPS))?;

        let mut residues = [None; 256];
        for (idx, aa) in amino_acids.iter().enumerate() {
            residues[aa.code as usize] = Some(idx);
        }

        log::trace!(
            "loaded {} residues, {} modifications, {} proteases, {} product caps",
            amino_acids.len(),
            modifications.len(),
            proteases.len(),
            product_caps.len()
        );

        Ok(Configuration {
            amino_acids,
            residues,
            modifications,
            proteases,
            product_caps,
        })
    }
}

impl Configuration {
    /// Configuration built from the compiled-in tables
    pub fn builtin() -> Result<Self, Error> {
        Tables::default().load()
    }

    pub fn amino_acid(&self, residue: u8) -> Option<&AminoAcid> {
        self.residues[residue as usize].map(|idx| &self.amino_acids[idx])
    }

    pub fn residue_mass(&self, residue: u8, mass_type: MassType) -> Option<f64> {
        self.amino_acid(residue).map(|aa| match mass_type {
            MassType::Monoisotopic => aa.monoisotopic,
            MassType::Average => aa.average,
        })
    }

    pub fn amino_acids(&self) -> &[AminoAcid] {
        &self.amino_acids
    }

    pub fn modification(&self, description: &str) -> Option<Arc<Modification>> {
        self.modifications
            .iter()
            .find(|m| m.description == description)
            .cloned()
    }

    pub fn modifications(&self) -> &[Arc<Modification>] {
        &self.modifications
    }

    /// Modifications whose table entry marks them with `usage`, in table order
    pub fn modifications_by_usage(&self, usage: ModUsage) -> Vec<Arc<Modification>> {
        self.modifications
            .iter()
            .filter(|m| m.usage == usage)
            .cloned()
            .collect()
    }

    /// Case-insensitive protease lookup
    pub fn protease(&self, name: &str) -> Option<&Protease> {
        self.proteases
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    pub fn product_cap(&self, kind: Kind, mass_type: MassType) -> Option<&ProductCap> {
        self.product_caps.get(&(kind, mass_type))
    }
}
