use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::enzyme::{Protease, Specificity};
use crate::fasta::Protein;
use crate::modification::Modification;
use crate::peptide::Peptide;

/// Treatment of a protein's initiator methionine
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InitiatorMethionine {
    Retain,
    Cleave,
    #[default]
    Either,
}

#[derive(Clone, Debug)]
pub struct Digester {
    pub protease: Protease,
    pub missed_cleavages: u8,
    /// Inclusive
    pub min_len: usize,
    /// Inclusive
    pub max_len: usize,
    pub initiator_methionine: InitiatorMethionine,
    /// Emit a reversed copy of every peptide
    pub generate_decoys: bool,
}

impl Digester {
    /// Lazily cut `protein` into peptides, ordered by missed cleavages and
    /// then start position
    pub fn digest(&self, protein: &Arc<Protein>) -> Digest<'_> {
        let mut sites = vec![-1];
        sites.extend(self.protease.cleavage_sites(&protein.sequence));
        sites.push(protein.sequence.len() as isize - 1);

        let max_missed = match self.protease.specificity {
            Specificity::Full => self.missed_cleavages as usize,
            Specificity::None => self.max_len.saturating_sub(1),
        };

        Digest {
            digester: self,
            protein: protein.clone(),
            sites,
            max_missed,
            missed: 0,
            idx: 0,
            pending: Vec::new(),
        }
    }

    fn len_ok(&self, len: usize) -> bool {
        len > 0 && len >= self.min_len && len <= self.max_len
    }
}

/// Iterator over the peptides of a single protein
pub struct Digest<'d> {
    digester: &'d Digester,
    protein: Arc<Protein>,
    // Boundaries, including the virtual ones at -1 and len - 1
    sites: Vec<isize>,
    max_missed: usize,
    missed: usize,
    idx: usize,
    // Peptides for the current boundary pair, in reverse emission order
    pending: Vec<Peptide>,
}

impl<'d> Digest<'d> {
    /// Fill `pending` with the peptides of the next boundary pair. Returns
    /// false once every pair has been visited
    fn advance(&mut self) -> bool {
        loop {
            if self.protein.sequence.is_empty() || self.missed > self.max_missed {
                return false;
            }
            let right = self.idx + self.missed + 1;
            if right >= self.sites.len() {
                self.missed += 1;
                self.idx = 0;
                continue;
            }

            let start = (self.sites[self.idx] + 1) as usize;
            let end = (self.sites[right] + 1) as usize;
            self.idx += 1;

            let digester = self.digester;
            let missed = self.missed.min(u8::MAX as usize) as u8;
            let mut batch = Vec::with_capacity(4);
            let mut emit = |start: usize| {
                if digester.len_ok(end - start) {
                    let target = Peptide::new(self.protein.clone(), start, end, missed, false);
                    if digester.generate_decoys {
                        let decoy = target.reverse();
                        batch.push(target);
                        batch.push(decoy);
                    } else {
                        batch.push(target);
                    }
                }
            };

            let initiator = start == 0 && self.protein.sequence.starts_with('M');
            // A cut right after the Met already yields every Met-less range
            let cut_after_met = self.sites.get(1) == Some(&0);
            match (initiator, digester.initiator_methionine) {
                (true, InitiatorMethionine::Cleave) if !cut_after_met => emit(1),
                (true, InitiatorMethionine::Cleave) => {}
                (true, InitiatorMethionine::Either) => {
                    emit(0);
                    if !cut_after_met {
                        emit(1);
                    }
                }
                _ => emit(start),
            }

            if !batch.is_empty() {
                batch.reverse();
                self.pending = batch;
                return true;
            }
        }
    }
}

impl<'d> Iterator for Digest<'d> {
    type Item = Peptide;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(peptide) = self.pending.pop() {
            return Some(peptide);
        }
        match self.advance() {
            true => self.pending.pop(),
            false => None,
        }
    }
}

/// Place every applicable fixed modification on `peptide`. Several fixed
/// modifications may share a position
pub fn apply_fixed(peptide: &mut Peptide, fixed_mods: &[Arc<Modification>]) {
    let len = peptide.len();
    let (protein_n, protein_c) = (peptide.protein_n(), peptide.protein_c());
    let mut fixed: BTreeMap<usize, Vec<Arc<Modification>>> = BTreeMap::new();
    for position in 0..=len + 3 {
        let residue = match peptide.residue_at(position) {
            Some(r) => r,
            None => continue,
        };
        for m in fixed_mods {
            if m.applies_at(position, len, residue, protein_n, protein_c) {
                fixed.entry(position).or_default().push(m.clone());
            }
        }
    }
    peptide.set_fixed_modifications(fixed);
}

/// Lazily enumerate modified forms of `peptide`. The unmodified form comes
/// first; at most `max_mods` positions are occupied by a variable
/// modification and at most `max_isoforms` forms are produced
pub fn variable_isoforms(
    peptide: &Peptide,
    variable_mods: &[Arc<Modification>],
    max_mods: usize,
    max_isoforms: usize,
) -> VariableIsoforms {
    let len = peptide.len();
    let (protein_n, protein_c) = (peptide.protein_n(), peptide.protein_c());
    let mut sites = Vec::new();
    for position in 0..=len + 3 {
        if peptide.fixed_modifications().contains_key(&position) {
            continue;
        }
        let residue = match peptide.residue_at(position) {
            Some(r) => r,
            None => continue,
        };
        let candidates = variable_mods
            .iter()
            .filter(|m| m.applies_at(position, len, residue, protein_n, protein_c))
            .cloned()
            .collect::<Vec<_>>();
        if !candidates.is_empty() {
            sites.push((position, candidates));
        }
    }

    VariableIsoforms {
        base: peptide.clone(),
        digits: vec![0; sites.len()],
        sites,
        modified: 0,
        max_mods,
        remaining: max_isoforms,
        done: false,
    }
}

/// Odometer over candidate sites: digit 0 leaves a site unmodified, digit
/// `k` places the `k`th candidate. The first site is the most significant
pub struct VariableIsoforms {
    base: Peptide,
    sites: Vec<(usize, Vec<Arc<Modification>>)>,
    digits: Vec<usize>,
    // Number of non-zero digits
    modified: usize,
    max_mods: usize,
    remaining: usize,
    done: bool,
}

impl VariableIsoforms {
    /// Step to the next assignment with at most `max_mods` modified sites
    fn step(&mut self) -> bool {
        let mut i = self.digits.len();
        while i > 0 {
            i -= 1;
            let n = self.sites[i].1.len();
            if self.digits[i] < n {
                if self.digits[i] == 0 {
                    if self.modified == self.max_mods {
                        // Carry past a site that would exceed the limit
                        continue;
                    }
                    self.modified += 1;
                }
                self.digits[i] += 1;
                return true;
            }
            self.digits[i] = 0;
            self.modified -= 1;
        }
        false
    }
}

impl Iterator for VariableIsoforms {
    type Item = Peptide;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let mut peptide = self.base.clone();
        if self.modified > 0 {
            let variable = self
                .digits
                .iter()
                .zip(&self.sites)
                .filter(|(&d, _)| d > 0)
                .map(|(&d, (position, candidates))| (*position, candidates[d - 1].clone()))
                .collect();
            peptide.set_variable_modifications(variable);
        }

        if !self.step() {
            self.done = true;
        }
        Some(peptide)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::Configuration;
    use crate::enzyme::Terminus;

    fn protein(sequence: &str) -> Arc<Protein> {
        Arc::new(Protein {
            accession: "P1".into(),
            description: String::new(),
            sequence: sequence.into(),
            decoy: false,
        })
    }

    fn trypsin(missed_cleavages: u8) -> Digester {
        Digester {
            protease: Protease::new("trypsin", "KR", "P", Terminus::C, Specificity::Full)
                .unwrap(),
            missed_cleavages,
            min_len: 1,
            max_len: 50,
            initiator_methionine: InitiatorMethionine::Either,
            generate_decoys: false,
        }
    }

    fn sequences(digester: &Digester, sequence: &str) -> Vec<String> {
        digester
            .digest(&protein(sequence))
            .map(|p| p.sequence())
            .collect()
    }

    #[test]
    fn initiator_methionine() {
        let mut digester = trypsin(0);
        assert_eq!(
            sequences(&digester, "MABCKDEFK"),
            vec!["MABCK", "ABCK", "DEFK"]
        );
        let peptides = digester.digest(&protein("MABCKDEFK")).collect::<Vec<_>>();
        assert_eq!((peptides[0].start, peptides[0].end), (0, 5));
        assert_eq!((peptides[1].start, peptides[1].end), (1, 5));
        assert_eq!((peptides[2].start, peptides[2].end), (5, 9));

        digester.initiator_methionine = InitiatorMethionine::Cleave;
        assert_eq!(sequences(&digester, "MABCKDEFK"), vec!["ABCK", "DEFK"]);
        digester.initiator_methionine = InitiatorMethionine::Retain;
        assert_eq!(sequences(&digester, "MABCKDEFK"), vec!["MABCK", "DEFK"]);
    }

    #[test]
    fn missed_cleavages() {
        let digester = trypsin(2);
        assert_eq!(
            sequences(&digester, "AKBRCKD"),
            vec!["AK", "BR", "CK", "D", "AKBR", "BRCK", "CKD", "AKBRCK", "BRCKD"]
        );
        let peptides = digester.digest(&protein("AKBRCKD")).collect::<Vec<_>>();
        assert_eq!(peptides[4].missed_cleavages, 1);
        assert_eq!(peptides[8].missed_cleavages, 2);
    }

    #[test]
    fn length_limits() {
        let mut digester = trypsin(1);
        digester.min_len = 3;
        digester.max_len = 4;
        assert_eq!(sequences(&digester, "AKBRCKD"), vec!["AKBR", "BRCK", "CKD"]);
    }

    #[test]
    fn decoys_follow_targets() {
        let mut digester = trypsin(0);
        digester.generate_decoys = true;
        let peptides = digester.digest(&protein("MABCKDEFK")).collect::<Vec<_>>();
        let seqs = peptides
            .iter()
            .map(|p| (p.sequence(), p.decoy))
            .collect::<Vec<_>>();
        assert_eq!(
            seqs,
            vec![
                ("MABCK".into(), false),
                ("KCBAM".into(), true),
                ("ABCK".into(), false),
                ("KCBA".into(), true),
                ("DEFK".into(), false),
                ("KFED".into(), true),
            ]
        );
    }

    #[test]
    fn nonspecific() {
        let digester = Digester {
            protease: Protease::new("no enzyme", "", "", Terminus::C, Specificity::None)
                .unwrap(),
            missed_cleavages: 0,
            min_len: 2,
            max_len: 3,
            initiator_methionine: InitiatorMethionine::Retain,
            generate_decoys: false,
        };
        assert_eq!(
            sequences(&digester, "ABCD"),
            vec!["AB", "BC", "CD", "ABC", "BCD"]
        );
    }

    #[test]
    fn met_cleavage_without_duplicates() {
        let config = Configuration::builtin().unwrap();
        let ranges = |digester: &Digester, sequence: &str| {
            let ranges = digester
                .digest(&protein(sequence))
                .map(|p| (p.start, p.end))
                .collect::<Vec<_>>();
            let mut unique = ranges.clone();
            unique.sort_unstable();
            unique.dedup();
            assert_eq!(unique.len(), ranges.len(), "{:?}", ranges);
            ranges
        };

        let cnbr = Digester {
            protease: config.protease("CNBr").unwrap().clone(),
            missed_cleavages: 1,
            min_len: 2,
            max_len: 50,
            initiator_methionine: InitiatorMethionine::Either,
            generate_decoys: false,
        };
        let found = ranges(&cnbr, "MAKMPEPTIDEK");
        assert!(found.contains(&(1, 4)));
        assert!(!found.contains(&(0, 1)));

        let nonspecific = Digester {
            protease: config.protease("no enzyme").unwrap().clone(),
            missed_cleavages: 0,
            min_len: 2,
            max_len: 3,
            initiator_methionine: InitiatorMethionine::Either,
            generate_decoys: false,
        };
        assert_eq!(
            ranges(&nonspecific, "MABCDE"),
            vec![(0, 2), (1, 3), (2, 4), (3, 5), (4, 6), (0, 3), (1, 4), (2, 5), (3, 6)]
        );

        let mut cleave = nonspecific.clone();
        cleave.initiator_methionine = InitiatorMethionine::Cleave;
        assert_eq!(ranges(&cleave, "MABC"), vec![(1, 3), (2, 4), (1, 4)]);
    }

    #[test]
    fn degenerate_sequences() {
        let digester = trypsin(3);
        assert!(sequences(&digester, "").is_empty());
        assert_eq!(sequences(&digester, "K"), vec!["K"]);
        assert_eq!(sequences(&digester, "M"), vec!["M"]);
    }

    #[test]
    fn fixed_and_variable() {
        let config = Configuration::builtin().unwrap();
        let cam = config.modification("Carbamidomethyl (C)").unwrap();
        let ox = config.modification("Oxidation (M)").unwrap();
        let acetyl = config.modification("Acetyl (Protein N-term)").unwrap();

        let mut peptide = Peptide::new(protein("MCMK"), 0, 4, 0, false);
        apply_fixed(&mut peptide, &[cam.clone()]);
        assert_eq!(peptide.to_string(), "MC[Carbamidomethyl (C)]MK");

        let variable = [ox.clone(), acetyl.clone()];
        let forms = variable_isoforms(&peptide, &variable, 2, 100)
            .map(|p| p.to_string())
            .collect::<Vec<_>>();
        // Sites: protein N-term (0), M (2), M (4)
        assert_eq!(
            forms,
            vec![
                "MC[Carbamidomethyl (C)]MK",
                "MC[Carbamidomethyl (C)]M[Oxidation (M)]K",
                "M[Oxidation (M)]C[Carbamidomethyl (C)]MK",
                "M[Oxidation (M)]C[Carbamidomethyl (C)]M[Oxidation (M)]K",
                "[Acetyl (Protein N-term)]-MC[Carbamidomethyl (C)]MK",
                "[Acetyl (Protein N-term)]-MC[Carbamidomethyl (C)]M[Oxidation (M)]K",
                "[Acetyl (Protein N-term)]-M[Oxidation (M)]C[Carbamidomethyl (C)]MK",
            ]
        );

        let single = variable_isoforms(&peptide, &variable, 1, 100).count();
        assert_eq!(single, 4);
        let capped = variable_isoforms(&peptide, &variable, 3, 5).count();
        assert_eq!(capped, 5);
        let none = variable_isoforms(&peptide, &[], 3, 5).collect::<Vec<_>>();
        assert_eq!(none.len(), 1);
        assert!(none[0].variable_modifications().is_empty());
    }

    #[test]
    fn fixed_sites_are_not_variable() {
        let config = Configuration::builtin().unwrap();
        let cam = config.modification("Carbamidomethyl (C)").unwrap();
        let mut peptide = Peptide::new(protein("PCK"), 0, 3, 0, false);
        apply_fixed(&mut peptide, &[cam.clone()]);
        let forms = variable_isoforms(&peptide, &[cam], 2, 10).count();
        assert_eq!(forms, 1);
    }
}
