use std::collections::BTreeMap;
use std::fmt::{Display, Write};
use std::sync::{Arc, OnceLock};

use crate::config::Configuration;
use crate::fasta::Protein;
use crate::mass::{MassType, H2O};
use crate::modification::Modification;

/// A stretch of a protein, optionally read backwards, plus the
/// modifications placed on it
///
/// Modification positions: 0 = protein N-term, 1 = peptide N-term,
/// `2..=len + 1` = residues, `len + 2` = peptide C-term, `len + 3` =
/// protein C-term. Positions follow reading order, so decoys are
/// annotated in reversed coordinates
#[derive(Clone, Debug)]
pub struct Peptide {
    pub protein: Arc<Protein>,
    /// Inclusive start within the protein sequence
    pub start: usize,
    /// Exclusive end within the protein sequence
    pub end: usize,
    /// Residues are read C- to N-terminal
    pub decoy: bool,
    pub missed_cleavages: u8,
    fixed: BTreeMap<usize, Vec<Arc<Modification>>>,
    variable: BTreeMap<usize, Arc<Modification>>,
    // Depends only on residues and modifications, reset by the setters
    monoisotopic: OnceLock<Option<f64>>,
}

impl Peptide {
    pub fn new(
        protein: Arc<Protein>,
        start: usize,
        end: usize,
        missed_cleavages: u8,
        decoy: bool,
    ) -> Self {
        let end = end.min(protein.sequence.len());
        Peptide {
            protein,
            start: start.min(end),
            end,
            decoy,
            missed_cleavages,
            fixed: BTreeMap::new(),
            variable: BTreeMap::new(),
            monoisotopic: OnceLock::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Either a reversed peptide or a peptide of a decoy protein
    pub fn is_decoy(&self) -> bool {
        self.decoy || self.protein.decoy
    }

    pub fn label(&self) -> i32 {
        match self.is_decoy() {
            true => -1,
            false => 1,
        }
    }

    /// Residue `idx` in reading order
    pub fn residue(&self, idx: usize) -> u8 {
        let bytes = self.protein.sequence.as_bytes();
        match self.decoy {
            true => bytes[self.end - 1 - idx],
            false => bytes[self.start + idx],
        }
    }

    pub fn residues(&self) -> impl Iterator<Item = u8> + '_ {
        (0..self.len()).map(move |idx| self.residue(idx))
    }

    /// Unmodified sequence, in reading order
    pub fn sequence(&self) -> String {
        self.residues().map(char::from).collect()
    }

    pub fn protein_n(&self) -> bool {
        self.start == 0
    }

    pub fn protein_c(&self) -> bool {
        self.end == self.protein.sequence.len()
    }

    /// Residue a modification at `position` is attached to
    pub fn residue_at(&self, position: usize) -> Option<u8> {
        let len = self.len();
        if len == 0 || position > len + 3 {
            return None;
        }
        Some(match position {
            0 | 1 => self.residue(0),
            p if p <= len + 1 => self.residue(p - 2),
            _ => self.residue(len - 1),
        })
    }

    pub fn fixed_modifications(&self) -> &BTreeMap<usize, Vec<Arc<Modification>>> {
        &self.fixed
    }

    pub fn variable_modifications(&self) -> &BTreeMap<usize, Arc<Modification>> {
        &self.variable
    }

    pub fn set_fixed_modifications(&mut self, fixed: BTreeMap<usize, Vec<Arc<Modification>>>) {
        self.fixed = fixed;
        self.monoisotopic = OnceLock::new();
    }

    pub fn set_variable_modifications(&mut self, variable: BTreeMap<usize, Arc<Modification>>) {
        self.variable = variable;
        self.monoisotopic = OnceLock::new();
    }

    /// Every modification occupying `position`, fixed ones first
    pub fn modifications_at(&self, position: usize) -> impl Iterator<Item = &Arc<Modification>> {
        self.fixed
            .get(&position)
            .into_iter()
            .flatten()
            .chain(self.variable.get(&position))
    }

    fn modifications(&self) -> impl Iterator<Item = (usize, &Arc<Modification>)> {
        self.fixed
            .iter()
            .flat_map(|(&p, mods)| mods.iter().map(move |m| (p, m)))
            .chain(self.variable.iter().map(|(&p, m)| (p, m)))
    }

    /// Per-residue masses with modifications added. Terminal modifications
    /// are folded into the first or last residue. `None` if any residue is
    /// missing from the amino acid table
    pub fn residue_masses(&self, config: &Configuration, mass_type: MassType) -> Option<Vec<f64>> {
        let len = self.len();
        if len == 0 {
            return None;
        }
        let mut masses = self
            .residues()
            .map(|r| config.residue_mass(r, mass_type))
            .collect::<Option<Vec<f64>>>()?;

        for (position, m) in self.modifications() {
            let idx = match position {
                0 | 1 => 0,
                p if p <= len + 1 => p - 2,
                _ => len - 1,
            };
            masses[idx] += m.mass(mass_type);
        }
        Some(masses)
    }

    /// Neutral mass, independent of reading orientation: residues are summed
    /// in protein order and modification shifts in ascending order
    pub fn mass(&self, config: &Configuration, mass_type: MassType) -> Option<f64> {
        if self.is_empty() {
            return None;
        }
        let residues = self.protein.sequence.as_bytes()[self.start..self.end]
            .iter()
            .map(|&r| config.residue_mass(r, mass_type))
            .sum::<Option<f64>>()?;
        let mut shifts = self
            .modifications()
            .map(|(_, m)| m.mass(mass_type))
            .collect::<Vec<_>>();
        shifts.sort_by(|a, b| a.total_cmp(b));
        Some(residues + shifts.iter().sum::<f64>() + H2O)
    }

    /// Neutral monoisotopic mass, computed once
    pub fn monoisotopic(&self, config: &Configuration) -> Option<f64> {
        *self
            .monoisotopic
            .get_or_init(|| self.mass(config, MassType::Monoisotopic))
    }

    /// Flip reading orientation. Residue modifications follow their
    /// residue; terminal modifications stay at their terminus
    pub fn reverse(&self) -> Peptide {
        let len = self.len();
        let remap = |p: usize| match p {
            p if (2..=len + 1).contains(&p) => len + 3 - p,
            p => p,
        };
        Peptide {
            protein: self.protein.clone(),
            start: self.start,
            end: self.end,
            decoy: !self.decoy,
            missed_cleavages: self.missed_cleavages,
            fixed: self
                .fixed
                .iter()
                .map(|(&p, mods)| (remap(p), mods.clone()))
                .collect(),
            variable: self
                .variable
                .iter()
                .map(|(&p, m)| (remap(p), m.clone()))
                .collect(),
            monoisotopic: self.monoisotopic.clone(),
        }
    }

    /// Modified sequence identity
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl Display for Peptide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let len = self.len();
        for position in 0..=1 {
            for m in self.modifications_at(position) {
                write!(f, "[{}]-", m.description)?;
            }
        }
        for idx in 0..len {
            f.write_char(char::from(self.residue(idx)))?;
            for m in self.modifications_at(idx + 2) {
                write!(f, "[{}]", m.description)?;
            }
        }
        for position in len + 2..=len + 3 {
            for m in self.modifications_at(position) {
                write!(f, "-[{}]", m.description)?;
            }
        }
        Ok(())
    }
}
