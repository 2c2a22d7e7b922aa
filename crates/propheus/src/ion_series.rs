use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::config::Configuration;
use crate::mass::{MassType, CO, H2O, HYDROGEN, NH3};

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
pub enum Kind {
    #[serde(rename = "a")]
    A,
    #[serde(rename = "b")]
    B,
    #[serde(rename = "c")]
    C,
    #[serde(rename = "x")]
    X,
    #[serde(rename = "y")]
    Y,
    #[serde(rename = "z")]
    Z,
    #[serde(rename = "b-h2o")]
    BH2O,
    #[serde(rename = "b-nh3")]
    BNH3,
    #[serde(rename = "y-h2o")]
    YH2O,
    #[serde(rename = "y-nh3")]
    YNH3,
}

impl Kind {
    pub const ALL: [Kind; 10] = [
        Kind::A,
        Kind::B,
        Kind::C,
        Kind::X,
        Kind::Y,
        Kind::Z,
        Kind::BH2O,
        Kind::BNH3,
        Kind::YH2O,
        Kind::YNH3,
    ];

    /// Does this series extend from the C-terminus?
    pub fn is_reverse(&self) -> bool {
        matches!(
            self,
            Kind::X | Kind::Y | Kind::Z | Kind::YH2O | Kind::YNH3
        )
    }

    /// Monoisotopic mass added to the summed residue masses of a fragment
    pub fn offset(&self) -> f64 {
        match self {
            Kind::A => -CO,
            Kind::B => 0.0,
            Kind::C => NH3,
            Kind::X => H2O + CO - 2.0 * HYDROGEN,
            Kind::Y => H2O,
            Kind::Z => H2O - NH3 + HYDROGEN,
            Kind::BH2O => -H2O,
            Kind::BNH3 => -NH3,
            Kind::YH2O => 0.0,
            Kind::YNH3 => H2O - NH3,
        }
    }

    pub fn default_weight(&self) -> f64 {
        match self {
            Kind::B | Kind::C | Kind::Y | Kind::Z => 1.0,
            Kind::A | Kind::X => 0.5,
            Kind::BH2O | Kind::BNH3 | Kind::YH2O | Kind::YNH3 => 0.25,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Kind::A => "a",
            Kind::B => "b",
            Kind::C => "c",
            Kind::X => "x",
            Kind::Y => "y",
            Kind::Z => "z",
            Kind::BH2O => "b-h2o",
            Kind::BNH3 => "b-nh3",
            Kind::YH2O => "y-h2o",
            Kind::YNH3 => "y-nh3",
        }
    }
}

impl FromStr for Kind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        Kind::ALL
            .iter()
            .find(|k| k.symbol() == s)
            .copied()
            .ok_or_else(|| format!("unknown ion series `{}`", s))
    }
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Series {
    pub kind: Kind,
    pub offset: f64,
    pub weight: f64,
}

/// Theoretical fragment ion
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Fragment {
    pub mz: f64,
    pub kind: Kind,
    /// Number of residues contained in the fragment
    pub position: usize,
    pub charge: u8,
    pub weight: f64,
}

/// The set of ion series generated for every candidate peptide
#[derive(Clone, Debug)]
pub struct IonSeries {
    pub series: Vec<Series>,
}

impl IonSeries {
    /// Resolve offsets and weights for `kinds`, preferring the product cap
    /// table over built-in values
    pub fn new(kinds: &[Kind], config: &Configuration, mass_type: MassType) -> Self {
        let series = kinds
            .iter()
            .map(|&kind| match config.product_cap(kind, mass_type) {
                Some(cap) => Series {
                    kind,
                    offset: cap.cap,
                    weight: cap.weight,
                },
                None => Series {
                    kind,
                    offset: kind.offset(),
                    weight: kind.default_weight(),
                },
            })
            .collect();
        Self { series }
    }

    /// Theoretical fragments for a peptide given its per-residue masses
    /// (terminal modifications already folded in). Fragments are ordered by
    /// position, then series, then charge from highest to lowest
    pub fn compute_fragments(&self, residue_masses: &[f64], precursor_charge: u8) -> Vec<Fragment> {
        let n = residue_masses.len();
        if n < 2 {
            return Vec::new();
        }
        let max_charge = precursor_charge.saturating_sub(1).max(1);
        let mut fragments =
            Vec::with_capacity((n - 1) * self.series.len() * max_charge as usize);

        // Dynamic programming: cumulative mass from each terminus
        let mut nterm = 0.0;
        let mut cterm = 0.0;
        for r in 1..n {
            nterm += residue_masses[r - 1];
            cterm += residue_masses[n - r];

            for series in &self.series {
                let mass = match series.kind.is_reverse() {
                    true => cterm,
                    false => nterm,
                } + series.offset;

                for charge in (1..=max_charge).rev() {
                    fragments.push(Fragment {
                        mz: crate::mass::mz(mass, charge),
                        kind: series.kind,
                        position: r,
                        charge,
                        weight: series.weight,
                    });
                }
            }
        }
        fragments
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn masses(s: &str) -> Vec<f64> {
        let config = Configuration::builtin().unwrap();
        s.bytes()
            .map(|r| config.residue_mass(r, MassType::Monoisotopic).unwrap())
            .collect()
    }

    fn series(kind: Kind) -> IonSeries {
        IonSeries {
            series: vec![Series {
                kind,
                offset: kind.offset(),
                weight: kind.default_weight(),
            }],
        }
    }

    fn check_within(kind: Kind, residues: &[f64], expected_mz: &[f64]) {
        let observed = series(kind)
            .compute_fragments(residues, 2)
            .into_iter()
            .map(|frag| frag.mz)
            .collect::<Vec<f64>>();
        assert_eq!(expected_mz.len(), observed.len());
        assert!(
            expected_mz
                .iter()
                .zip(observed.iter())
                .all(|(a, b)| (a - b).abs() < 0.005),
            "{:?}",
            expected_mz
                .iter()
                .zip(observed.iter())
                .map(|(a, b)| a - b)
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn abc_xyz() {
        let residues = masses("PEPTIDE");
        // Fragments are generated by size, so C-terminal series run short to long
        let expected_a = [70.065, 199.108, 296.160, 397.208, 510.292, 625.32];
        let expected_b = [98.0600, 227.1026, 324.155, 425.2030, 538.287, 653.314];
        let expected_c = [115.086, 244.129, 341.182, 442.229, 555.314, 670.341];
        let expected_x = [174.039, 289.066, 402.151, 503.198, 600.251, 729.294];
        let expected_y = [148.0604, 263.0874, 376.171, 477.219, 574.2719, 703.314];
        let expected_z = [132.0417, 247.0687, 360.1523, 461.2003, 558.2532, 687.2953];

        check_within(Kind::A, &residues, &expected_a);
        check_within(Kind::B, &residues, &expected_b);
        check_within(Kind::C, &residues, &expected_c);
        check_within(Kind::X, &residues, &expected_x);
        check_within(Kind::Y, &residues, &expected_y);
        check_within(Kind::Z, &residues, &expected_z);
    }

    #[test]
    fn neutral_losses() {
        let residues = masses("PEPTIDE");
        let b = series(Kind::B).compute_fragments(&residues, 2);
        let b_h2o = series(Kind::BH2O).compute_fragments(&residues, 2);
        let y = series(Kind::Y).compute_fragments(&residues, 2);
        let y_nh3 = series(Kind::YNH3).compute_fragments(&residues, 2);
        for (a, b) in b.iter().zip(b_h2o.iter()) {
            assert!((a.mz - b.mz - H2O).abs() < 1E-6);
        }
        for (a, b) in y.iter().zip(y_nh3.iter()) {
            assert!((a.mz - b.mz - NH3).abs() < 1E-6);
        }
    }

    #[test]
    fn fragment_order_and_charges() {
        let residues = masses("PEP");
        let ions = IonSeries {
            series: vec![series(Kind::B).series[0], series(Kind::Y).series[0]],
        };

        // Singly charged precursor still produces 1+ fragments
        let frags = ions.compute_fragments(&residues, 1);
        let expected = [
            (Kind::B, 1, 98.06004),
            (Kind::Y, 1, 116.07060),
            (Kind::B, 2, 227.10263),
            (Kind::Y, 2, 245.11320),
        ];
        assert_eq!(frags.len(), expected.len());
        for (frag, (kind, position, mz)) in frags.iter().zip(expected.iter()) {
            assert_eq!(frag.kind, *kind);
            assert_eq!(frag.position, *position);
            assert_eq!(frag.charge, 1);
            assert!((frag.mz - mz).abs() < 0.001, "{:?}", frag);
        }

        // Precursor 3+ yields 2+ then 1+ for each series and position
        let frags = ions.compute_fragments(&residues, 3);
        assert_eq!(frags.len(), 8);
        let charges = frags.iter().map(|f| f.charge).collect::<Vec<_>>();
        assert_eq!(charges, vec![2, 1, 2, 1, 2, 1, 2, 1]);
        assert!((frags[0].mz - (98.06004 + crate::mass::PROTON) / 2.0).abs() < 0.001);
    }

    #[test]
    fn too_short() {
        let residues = masses("K");
        assert!(series(Kind::B).compute_fragments(&residues, 2).is_empty());
        assert!(series(Kind::B).compute_fragments(&[], 2).is_empty());
    }

    #[test]
    fn product_caps_override() {
        let config = Configuration::builtin().unwrap();
        let ions = IonSeries::new(&[Kind::B, Kind::Y], &config, MassType::Monoisotopic);
        assert_eq!(ions.series[0].weight, 1.0);
        assert!((ions.series[1].offset - H2O).abs() < 1E-9);
        assert_eq!("Y-NH3".parse::<Kind>(), Ok(Kind::YNH3));
        assert!("w".parse::<Kind>().is_err());
    }
}
