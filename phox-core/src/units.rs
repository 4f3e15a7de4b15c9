//! Runtime unit tags and explicit conversions.
//!
//! Every column that crosses a crate boundary carries a [`Unit`]. Conversions
//! go through CGS factors and are only permitted within one [`Dimension`].

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Proton mass in grams.
pub const PROTON_MASS_G: f64 = 1.672_621_923_69e-24;
/// Speed of light in cm/s.
pub const CLIGHT_CM_S: f64 = 2.997_924_58e10;
/// Speed of light in km/s.
pub const CLIGHT_KM_S: f64 = CLIGHT_CM_S / 1.0e5;
/// Kiloparsec in cm.
pub const KPC_CM: f64 = 3.085_677_581_491_367e21;
/// Megaparsec in cm.
pub const MPC_CM: f64 = 3.085_677_581_491_367e24;
/// keV in erg.
pub const KEV_ERG: f64 = 1.602_176_634e-9;
/// Boltzmann constant in erg/K.
pub const KBOLTZ_ERG_K: f64 = 1.380_649e-16;

/// Physical dimension of a unit. Conversions never cross dimensions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Dimension {
    Length,
    Velocity,
    /// Energy, including temperature expressed as `k_B T`.
    Energy,
    MassDensity,
    Volume,
    Time,
    Area,
    /// Photon emissivity per unit volume.
    Emissivity,
    /// Photon rate per unit energy.
    SpectralRate,
    Dimensionless,
}

/// A physical unit understood by phox.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(try_from = "String", into = "String")
)]
pub enum Unit {
    Centimeter,
    Meter,
    Kilometer,
    Kiloparsec,
    Megaparsec,
    CentimeterPerSecond,
    KilometerPerSecond,
    KeV,
    ElectronVolt,
    Erg,
    Kelvin,
    GramPerCubicCentimeter,
    CubicCentimeter,
    CubicKiloparsec,
    Second,
    Kilosecond,
    SquareCentimeter,
    SquareMeter,
    PhotonsPerSecondPerCubicCentimeter,
    PhotonsPerSecondPerKeV,
    Dimensionless,
}

impl Unit {
    const ALL: [Unit; 21] = [
        Unit::Centimeter,
        Unit::Meter,
        Unit::Kilometer,
        Unit::Kiloparsec,
        Unit::Megaparsec,
        Unit::CentimeterPerSecond,
        Unit::KilometerPerSecond,
        Unit::KeV,
        Unit::ElectronVolt,
        Unit::Erg,
        Unit::Kelvin,
        Unit::GramPerCubicCentimeter,
        Unit::CubicCentimeter,
        Unit::CubicKiloparsec,
        Unit::Second,
        Unit::Kilosecond,
        Unit::SquareCentimeter,
        Unit::SquareMeter,
        Unit::PhotonsPerSecondPerCubicCentimeter,
        Unit::PhotonsPerSecondPerKeV,
        Unit::Dimensionless,
    ];

    /// Dimension this unit measures.
    #[must_use]
    pub fn dimension(self) -> Dimension {
        match self {
            Unit::Centimeter
            | Unit::Meter
            | Unit::Kilometer
            | Unit::Kiloparsec
            | Unit::Megaparsec => Dimension::Length,
            Unit::CentimeterPerSecond | Unit::KilometerPerSecond => Dimension::Velocity,
            Unit::KeV | Unit::ElectronVolt | Unit::Erg | Unit::Kelvin => Dimension::Energy,
            Unit::GramPerCubicCentimeter => Dimension::MassDensity,
            Unit::CubicCentimeter | Unit::CubicKiloparsec => Dimension::Volume,
            Unit::Second | Unit::Kilosecond => Dimension::Time,
            Unit::SquareCentimeter | Unit::SquareMeter => Dimension::Area,
            Unit::PhotonsPerSecondPerCubicCentimeter => Dimension::Emissivity,
            Unit::PhotonsPerSecondPerKeV => Dimension::SpectralRate,
            Unit::Dimensionless => Dimension::Dimensionless,
        }
    }

    /// Multiplicative factor from this unit to the CGS base of its dimension.
    #[must_use]
    pub fn cgs_factor(self) -> f64 {
        match self {
            Unit::Centimeter
            | Unit::CentimeterPerSecond
            | Unit::Erg
            | Unit::GramPerCubicCentimeter
            | Unit::CubicCentimeter
            | Unit::Second
            | Unit::SquareCentimeter
            | Unit::PhotonsPerSecondPerCubicCentimeter
            | Unit::PhotonsPerSecondPerKeV
            | Unit::Dimensionless => 1.0,
            Unit::Meter => 1.0e2,
            Unit::Kilometer | Unit::KilometerPerSecond => 1.0e5,
            Unit::Kiloparsec => KPC_CM,
            Unit::Megaparsec => MPC_CM,
            Unit::KeV => KEV_ERG,
            Unit::ElectronVolt => KEV_ERG * 1.0e-3,
            Unit::Kelvin => KBOLTZ_ERG_K,
            Unit::CubicKiloparsec => KPC_CM * KPC_CM * KPC_CM,
            Unit::Kilosecond => 1.0e3,
            Unit::SquareMeter => 1.0e4,
        }
    }

    /// Canonical symbol, also accepted by [`Unit::from_str`].
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Unit::Centimeter => "cm",
            Unit::Meter => "m",
            Unit::Kilometer => "km",
            Unit::Kiloparsec => "kpc",
            Unit::Megaparsec => "Mpc",
            Unit::CentimeterPerSecond => "cm/s",
            Unit::KilometerPerSecond => "km/s",
            Unit::KeV => "keV",
            Unit::ElectronVolt => "eV",
            Unit::Erg => "erg",
            Unit::Kelvin => "K",
            Unit::GramPerCubicCentimeter => "g/cm**3",
            Unit::CubicCentimeter => "cm**3",
            Unit::CubicKiloparsec => "kpc**3",
            Unit::Second => "s",
            Unit::Kilosecond => "ks",
            Unit::SquareCentimeter => "cm**2",
            Unit::SquareMeter => "m**2",
            Unit::PhotonsPerSecondPerCubicCentimeter => "photons/s/cm**3",
            Unit::PhotonsPerSecondPerKeV => "photons/s/keV",
            Unit::Dimensionless => "dimensionless",
        }
    }

    /// Returns true if values in `self` can be converted to `other`.
    #[must_use]
    pub fn is_compatible(self, other: Unit) -> bool {
        self.dimension() == other.dimension()
    }

    /// Factor `f` such that `value_in_self * f == value_in_target`.
    ///
    /// # Errors
    /// Returns [`Error::UnitMismatch`] if the dimensions differ.
    pub fn conversion_factor(self, target: Unit) -> Result<f64> {
        if !self.is_compatible(target) {
            return Err(Error::UnitMismatch {
                from: self.symbol().to_string(),
                to: target.symbol().to_string(),
            });
        }
        if self == target {
            return Ok(1.0);
        }
        Ok(self.cgs_factor() / target.cgs_factor())
    }

    /// Convert a single value from `self` to `target`.
    ///
    /// # Errors
    /// Returns [`Error::UnitMismatch`] if the dimensions differ.
    pub fn convert(self, value: f64, target: Unit) -> Result<f64> {
        Ok(value * self.conversion_factor(target)?)
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Unit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed == "1" {
            return Ok(Unit::Dimensionless);
        }
        let normalized = trimmed.replace('^', "**");
        if let Some(unit) = Unit::ALL.iter().find(|u| u.symbol() == normalized) {
            return Ok(*unit);
        }
        match normalized.as_str() {
            "g/cm3" => Ok(Unit::GramPerCubicCentimeter),
            "cm3" => Ok(Unit::CubicCentimeter),
            "kpc3" => Ok(Unit::CubicKiloparsec),
            "cm2" => Ok(Unit::SquareCentimeter),
            "Zsun" | "Zsolar" => Ok(Unit::Dimensionless),
            _ => Err(Error::UnknownUnit(trimmed.to_string())),
        }
    }
}

impl TryFrom<String> for Unit {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Unit> for String {
    fn from(unit: Unit) -> Self {
        unit.symbol().to_string()
    }
}

/// A flat array of values tagged with a unit.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Column {
    pub values: Vec<f64>,
    pub unit: Unit,
}

impl Column {
    #[must_use]
    pub fn new(values: Vec<f64>, unit: Unit) -> Self {
        Self { values, unit }
    }

    /// A zero-length column that still carries its unit.
    #[must_use]
    pub fn empty(unit: Unit) -> Self {
        Self {
            values: Vec::new(),
            unit,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Values converted to `target`.
    ///
    /// # Errors
    /// Returns [`Error::UnitMismatch`] if the dimensions differ.
    pub fn to_unit(&self, target: Unit) -> Result<Vec<f64>> {
        let factor = self.unit.conversion_factor(target)?;
        if (factor - 1.0).abs() < f64::EPSILON {
            return Ok(self.values.clone());
        }
        Ok(self.values.iter().map(|v| v * factor).collect())
    }

    /// Consume the column and return it expressed in `target`.
    ///
    /// # Errors
    /// Returns [`Error::UnitMismatch`] if the dimensions differ.
    pub fn into_unit(mut self, target: Unit) -> Result<Self> {
        let factor = self.unit.conversion_factor(target)?;
        if (factor - 1.0).abs() >= f64::EPSILON {
            for v in &mut self.values {
                *v *= factor;
            }
        }
        self.unit = target;
        Ok(self)
    }

    /// Minimum and maximum of the finite values, or `None` if there are none.
    #[must_use]
    pub fn extrema(&self) -> Option<(f64, f64)> {
        self.values
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }
}
