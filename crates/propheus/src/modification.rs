use std::{fmt::Display, str::FromStr};

use serde::Serialize;

use crate::mass::MassType;

/// Where on a peptide a modification may be placed
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModificationKind {
    Residue,
    PeptideN,
    PeptideC,
    ProteinN,
    ProteinC,
}

/// Default usage of a modification when the user does not list it explicitly
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModUsage {
    Fixed,
    Variable,
    Auto,
    None,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum InvalidModification {
    Empty,
    UnknownKind(String),
    UnknownUsage(String),
    InvalidResidue(String),
    MissingResidue,
}

impl Display for InvalidModification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvalidModification::Empty => f.write_str("empty modification field"),
            InvalidModification::UnknownKind(s) => write!(f, "unknown modification type `{}`", s),
            InvalidModification::UnknownUsage(s) => {
                write!(f, "unknown modification usage `{}`", s)
            }
            InvalidModification::InvalidResidue(s) => write!(f, "invalid target residue `{}`", s),
            InvalidModification::MissingResidue => {
                f.write_str("residue modifications require a target residue")
            }
        }
    }
}

impl FromStr for ModificationKind {
    type Err = InvalidModification;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" => Err(InvalidModification::Empty),
            "residue" | "aminoacid" => Ok(ModificationKind::Residue),
            "peptide_n" | "peptiden" | "^" => Ok(ModificationKind::PeptideN),
            "peptide_c" | "peptidec" | "$" => Ok(ModificationKind::PeptideC),
            "protein_n" | "proteinn" | "[" => Ok(ModificationKind::ProteinN),
            "protein_c" | "proteinc" | "]" => Ok(ModificationKind::ProteinC),
            other => Err(InvalidModification::UnknownKind(other.into())),
        }
    }
}

impl FromStr for ModUsage {
    type Err = InvalidModification;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fixed" => Ok(ModUsage::Fixed),
            "variable" => Ok(ModUsage::Variable),
            "auto" => Ok(ModUsage::Auto),
            "" | "none" => Ok(ModUsage::None),
            other => Err(InvalidModification::UnknownUsage(other.into())),
        }
    }
}

impl Display for ModificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ModificationKind::Residue => "residue",
            ModificationKind::PeptideN => "peptide_n",
            ModificationKind::PeptideC => "peptide_c",
            ModificationKind::ProteinN => "protein_n",
            ModificationKind::ProteinC => "protein_c",
        })
    }
}

/// A named mass shift, loaded once from the modification table and shared
/// by reference between every peptide that carries it
///
/// Two modifications are the same modification if their descriptions match
#[derive(Clone, Debug, Serialize)]
pub struct Modification {
    pub description: String,
    pub kind: ModificationKind,
    /// Residue this modification targets. Mandatory for residue mods,
    /// an optional restriction for terminal mods
    pub target: Option<u8>,
    pub monoisotopic: f64,
    pub average: f64,
    pub usage: ModUsage,
}

impl PartialEq for Modification {
    fn eq(&self, other: &Self) -> bool {
        self.description == other.description
    }
}

impl Eq for Modification {}

impl std::hash::Hash for Modification {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.description.hash(state);
    }
}

impl Modification {
    pub fn new(
        description: impl Into<String>,
        kind: ModificationKind,
        target: Option<u8>,
        monoisotopic: f64,
        average: f64,
        usage: ModUsage,
    ) -> Result<Self, InvalidModification> {
        if kind == ModificationKind::Residue && target.is_none() {
            return Err(InvalidModification::MissingResidue);
        }
        Ok(Self {
            description: description.into(),
            kind,
            target,
            monoisotopic,
            average,
            usage,
        })
    }

    pub fn mass(&self, mass_type: MassType) -> f64 {
        match mass_type {
            MassType::Monoisotopic => self.monoisotopic,
            MassType::Average => self.average,
        }
    }

    /// Can this modification occupy `position` of a peptide of length `len`?
    ///
    /// `residue` is the amino acid at the peptide terminus (for terminal
    /// positions) or at the residue position itself
    pub fn applies_at(
        &self,
        position: usize,
        len: usize,
        residue: u8,
        protein_n: bool,
        protein_c: bool,
    ) -> bool {
        let target_ok = self.target.map(|t| t == residue).unwrap_or(true);
        let site_ok = match self.kind {
            ModificationKind::ProteinN => position == 0 && protein_n,
            ModificationKind::PeptideN => position == 1,
            ModificationKind::Residue => position >= 2 && position <= len + 1,
            ModificationKind::PeptideC => position == len + 2,
            ModificationKind::ProteinC => position == len + 3 && protein_c,
        };
        site_ok && target_ok
    }
}
