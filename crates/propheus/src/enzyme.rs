use fnv::FnvHashSet;
use regex::Regex;
use serde::Serialize;
use std::{fmt::Display, str::FromStr};

/// Which side of the inducing residue is cut
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash, Serialize)]
pub enum Terminus {
    N,
    C,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Specificity {
    Full,
    None,
}

impl FromStr for Terminus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "N" | "n" => Ok(Terminus::N),
            "C" | "c" => Ok(Terminus::C),
            other => Err(format!("cleavage terminus must be `N` or `C`, got `{}`", other)),
        }
    }
}

impl FromStr for Specificity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(Specificity::Full),
            "none" => Ok(Specificity::None),
            other => Err(format!(
                "specificity must be `full` or `none`, got `{}`",
                other
            )),
        }
    }
}

impl Display for Terminus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Terminus::N => f.write_str("N"),
            Terminus::C => f.write_str("C"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Protease {
    pub name: String,
    pub terminus: Terminus,
    pub specificity: Specificity,
    // Residues that induce a cleavage
    inducing: Option<Regex>,
    // Residues that block a cleavage when adjacent on the far side of the cut
    preventing: FnvHashSet<u8>,
}

impl Protease {
    pub fn new(
        name: impl Into<String>,
        inducing: &str,
        preventing: &str,
        terminus: Terminus,
        specificity: Specificity,
    ) -> Result<Self, String> {
        let valid = |s: &str| s.bytes().all(|c| c.is_ascii_uppercase());
        if !valid(inducing) {
            return Err(format!(
                "inducing residues contain non-amino acid characters: `{}`",
                inducing
            ));
        }
        if !valid(preventing) {
            return Err(format!(
                "preventing residues contain non-amino acid characters: `{}`",
                preventing
            ));
        }

        let inducing = match inducing {
            "" => None,
            residues => {
                Some(Regex::new(&format!("[{}]", residues)).map_err(|e| e.to_string())?)
            }
        };

        Ok(Protease {
            name: name.into(),
            terminus,
            specificity,
            inducing,
            preventing: preventing.bytes().collect(),
        })
    }

    /// Ordered cleavage sites of `sequence`: index `i` means "cut after
    /// residue `i`". The protein termini are not included
    pub fn cleavage_sites(&self, sequence: &str) -> Vec<isize> {
        let len = sequence.len();
        if len < 2 {
            return Vec::new();
        }

        if self.specificity == Specificity::None {
            return (0..len as isize - 1).collect();
        }

        let bytes = sequence.as_bytes();
        let mut sites = Vec::new();
        let regex = match &self.inducing {
            Some(regex) => regex,
            None => return sites,
        };

        for mat in regex.find_iter(sequence) {
            let site = match self.terminus {
                // Cut between `start` and `start + 1`
                Terminus::C => {
                    let next = mat.end();
                    if next >= len || self.preventing.contains(&bytes[next]) {
                        continue;
                    }
                    mat.start() as isize
                }
                // Cut between `start - 1` and `start`
                Terminus::N => {
                    if mat.start() == 0 || self.preventing.contains(&bytes[mat.start() - 1]) {
                        continue;
                    }
                    mat.start() as isize - 1
                }
            };
            sites.push(site);
        }
        sites
    }
}
