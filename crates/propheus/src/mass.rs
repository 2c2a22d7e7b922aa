use serde::{Deserialize, Serialize};

pub const H2O: f64 = 18.0105646837;
pub const PROTON: f64 = 1.00727646688;
pub const NEUTRON: f64 = 1.003354835;
pub const NH3: f64 = 17.0265491015;
pub const CO: f64 = 27.9949146221;
pub const HYDROGEN: f64 = 1.00782503207;

#[derive(Copy, Clone, Serialize, Deserialize, Debug, PartialEq, PartialOrd)]
#[serde(rename_all = "lowercase")]
pub enum Tolerance {
    Ppm(f64),
    Da(f64),
}

impl Tolerance {
    /// Compute the (`lower`, `upper`) window (in Da) for for a monoisotopic
    /// mass and a given tolerance
    pub fn bounds(&self, center: f64) -> (f64, f64) {
        let delta = self.delta(center);
        (center - delta, center + delta)
    }

    /// Half-width of the window, in Da, around `center`
    pub fn delta(&self, center: f64) -> f64 {
        match self {
            Tolerance::Ppm(ppm) => Self::ppm_to_delta_mass(center, ppm.abs()),
            Tolerance::Da(da) => da.abs(),
        }
    }

    pub fn contains(&self, center: f64, rhs: f64) -> bool {
        let (lo, hi) = self.bounds(center);
        rhs >= lo && rhs <= hi
    }

    /// Signed error of `observed` relative to `theoretical`, expressed in
    /// the unit of this tolerance
    pub fn error(&self, theoretical: f64, observed: f64) -> f64 {
        match self {
            Tolerance::Ppm(_) => (observed - theoretical) / theoretical * 1E6,
            Tolerance::Da(_) => observed - theoretical,
        }
    }

    /// Magnitude of the window, in its own unit
    pub fn value(&self) -> f64 {
        match self {
            Tolerance::Ppm(v) | Tolerance::Da(v) => v.abs(),
        }
    }

    pub fn ppm_to_delta_mass(center: f64, ppm: f64) -> f64 {
        ppm * center / 1_000_000.0
    }
}

impl std::fmt::Display for Tolerance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tolerance::Ppm(v) => write!(f, "{} ppm", v),
            Tolerance::Da(v) => write!(f, "{} Da", v),
        }
    }
}

#[derive(Copy, Clone, Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum MassType {
    #[default]
    Monoisotopic,
    Average,
}

/// m/z of a neutral `mass` carrying `charge` protons
pub fn mz(mass: f64, charge: u8) -> f64 {
    let z = charge.max(1) as f64;
    (mass + z * PROTON) / z
}

/// Neutral mass of an ion observed at `mz` with `charge` protons
pub fn neutral_mass(mz: f64, charge: u8) -> f64 {
    let z = charge.max(1) as f64;
    (mz - PROTON) * z
}
