//! Observation parameters and distance normalisation.

use crate::error::{Error, Result};
use crate::units::{CLIGHT_KM_S, MPC_CM};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Number of Simpson intervals for the comoving distance integral.
const DISTANCE_INTERVALS: usize = 2000;

/// A Friedmann-Lemaitre cosmology used to turn a redshift into a distance.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Cosmology {
    /// Hubble constant in km/s/Mpc.
    pub hubble_constant: f64,
    pub omega_matter: f64,
    pub omega_lambda: f64,
}

impl Default for Cosmology {
    fn default() -> Self {
        Self {
            hubble_constant: 71.0,
            omega_matter: 0.27,
            omega_lambda: 0.73,
        }
    }
}

impl Cosmology {
    fn hubble_distance_mpc(&self) -> f64 {
        CLIGHT_KM_S / self.hubble_constant
    }

    fn omega_curvature(&self) -> f64 {
        1.0 - self.omega_matter - self.omega_lambda
    }

    fn inverse_efunc(&self, z: f64) -> f64 {
        let a = 1.0 + z;
        let e2 = self.omega_matter * a * a * a + self.omega_curvature() * a * a + self.omega_lambda;
        1.0 / e2.sqrt()
    }

    /// Line-of-sight comoving distance to `z` in Mpc.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn comoving_distance_mpc(&self, z: f64) -> f64 {
        if z <= 0.0 {
            return 0.0;
        }
        let n = DISTANCE_INTERVALS;
        let h = z / n as f64;
        let interior: f64 = (1..n)
            .map(|i| {
                let weight = if i % 2 == 1 { 4.0 } else { 2.0 };
                weight * self.inverse_efunc(h * i as f64)
            })
            .sum();
        let integral = h / 3.0 * (self.inverse_efunc(0.0) + interior + self.inverse_efunc(z));
        self.hubble_distance_mpc() * integral
    }

    /// Angular diameter distance to `z` in Mpc, including curvature.
    #[must_use]
    pub fn angular_diameter_distance_mpc(&self, z: f64) -> f64 {
        let dc = self.comoving_distance_mpc(z);
        let dh = self.hubble_distance_mpc();
        let ok = self.omega_curvature();
        let transverse = if ok > 1e-10 {
            let root = ok.sqrt();
            dh / root * (root * dc / dh).sinh()
        } else if ok < -1e-10 {
            let root = (-ok).sqrt();
            dh / root * (root * dc / dh).sin()
        } else {
            dc
        };
        transverse / (1.0 + z)
    }

    fn validate(&self) -> Result<()> {
        if !(self.hubble_constant.is_finite() && self.hubble_constant > 0.0) {
            return Err(Error::ConfigError(
                "hubble_constant must be positive".to_string(),
            ));
        }
        if self.omega_matter < 0.0 || self.omega_lambda < 0.0 {
            return Err(Error::ConfigError(
                "density parameters must be non-negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// User-facing observation settings, resolved into [`ObservationParams`].
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ObservationConfig {
    /// Exposure time in seconds.
    pub exposure_time_s: f64,
    /// Collecting area in cm^2.
    pub area_cm2: f64,
    pub redshift: f64,
    /// Explicit angular diameter distance in Mpc; derived from the cosmology when absent.
    pub distance_mpc: Option<f64>,
    /// Source centre in kpc; photon positions are reported relative to it.
    pub center_kpc: [f64; 3],
    pub cosmology: Cosmology,
}

impl Default for ObservationConfig {
    fn default() -> Self {
        Self {
            exposure_time_s: 1.0e5,
            area_cm2: 3000.0,
            redshift: 0.05,
            distance_mpc: None,
            center_kpc: [0.0; 3],
            cosmology: Cosmology::default(),
        }
    }
}

impl ObservationConfig {
    #[must_use]
    pub fn with_exposure_time_s(mut self, seconds: f64) -> Self {
        self.exposure_time_s = seconds;
        self
    }

    #[must_use]
    pub fn with_area_cm2(mut self, area: f64) -> Self {
        self.area_cm2 = area;
        self
    }

    #[must_use]
    pub fn with_redshift(mut self, redshift: f64) -> Self {
        self.redshift = redshift;
        self
    }

    #[must_use]
    pub fn with_distance_mpc(mut self, distance: f64) -> Self {
        self.distance_mpc = Some(distance);
        self
    }

    #[must_use]
    pub fn with_center_kpc(mut self, center: [f64; 3]) -> Self {
        self.center_kpc = center;
        self
    }

    #[must_use]
    pub fn with_cosmology(mut self, cosmology: Cosmology) -> Self {
        self.cosmology = cosmology;
        self
    }

    /// Validate the settings and compute the distance.
    ///
    /// # Errors
    /// Returns [`Error::ConfigError`] for non-positive exposure, area or
    /// distance, a negative redshift, or a zero redshift without an
    /// explicit distance.
    pub fn resolve(&self) -> Result<ObservationParams> {
        if !(self.exposure_time_s.is_finite() && self.exposure_time_s > 0.0) {
            return Err(Error::ConfigError("exposure time must be positive".to_string()));
        }
        if !(self.area_cm2.is_finite() && self.area_cm2 > 0.0) {
            return Err(Error::ConfigError("collecting area must be positive".to_string()));
        }
        if !(self.redshift.is_finite() && self.redshift >= 0.0) {
            return Err(Error::ConfigError("redshift must be non-negative".to_string()));
        }
        let distance_mpc = match self.distance_mpc {
            Some(d) if d.is_finite() && d > 0.0 => d,
            Some(d) => {
                return Err(Error::ConfigError(format!(
                    "distance must be positive, got {d} Mpc"
                )))
            }
            None if self.redshift <= 0.0 => {
                return Err(Error::ConfigError(
                    "a source at redshift 0 needs an explicit distance".to_string(),
                ))
            }
            None => {
                self.cosmology.validate()?;
                self.cosmology.angular_diameter_distance_mpc(self.redshift)
            }
        };
        Ok(ObservationParams {
            exposure_time_s: self.exposure_time_s,
            area_cm2: self.area_cm2,
            redshift: self.redshift,
            angular_diameter_distance_cm: distance_mpc * MPC_CM,
            center_kpc: self.center_kpc,
        })
    }
}

/// Resolved, validated observation parameters shared by every model.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ObservationParams {
    pub exposure_time_s: f64,
    pub area_cm2: f64,
    pub redshift: f64,
    pub angular_diameter_distance_cm: f64,
    pub center_kpc: [f64; 3],
}

impl ObservationParams {
    /// `1 / (4 pi D_A^2 (1+z)^2)` in cm^-2.
    #[must_use]
    pub fn dist_fac(&self) -> f64 {
        let d = self.angular_diameter_distance_cm;
        let a = 1.0 + self.redshift;
        1.0 / (4.0 * std::f64::consts::PI * d * d * a * a)
    }

    /// `area * exposure * dist_fac`, in s.
    #[must_use]
    pub fn spectral_norm(&self) -> f64 {
        self.area_cm2 * self.exposure_time_s * self.dist_fac()
    }

    /// Angular diameter distance in Mpc.
    #[must_use]
    pub fn angular_diameter_distance_mpc(&self) -> f64 {
        self.angular_diameter_distance_cm / MPC_CM
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn distance_matches_reference() {
        let cosmo = Cosmology::default();
        let near = cosmo.angular_diameter_distance_mpc(0.05);
        let far = cosmo.angular_diameter_distance_mpc(0.5);
        assert_relative_eq!(near, 199.007, max_relative = 1e-4);
        assert_relative_eq!(far, 1254.54, max_relative = 1e-4);
        assert_relative_eq!(cosmo.comoving_distance_mpc(0.0), 0.0);
    }

    #[test]
    fn dist_fac_and_norm() {
        let params = ObservationConfig::default()
            .with_redshift(0.0)
            .with_distance_mpc(10.0)
            .with_exposure_time_s(2.0)
            .with_area_cm2(5.0)
            .resolve()
            .unwrap();
        let d = 10.0 * MPC_CM;
        let expected = 1.0 / (4.0 * std::f64::consts::PI * d * d);
        assert_relative_eq!(params.dist_fac(), expected, max_relative = 1e-12);
        assert_relative_eq!(params.spectral_norm(), 10.0 * expected, max_relative = 1e-12);
        assert_relative_eq!(params.angular_diameter_distance_mpc(), 10.0, max_relative = 1e-12);
    }

    #[test]
    fn zero_redshift_needs_distance() {
        let err = ObservationConfig::default().with_redshift(0.0).resolve();
        assert!(matches!(err, Err(Error::ConfigError(_))));
    }

    #[test]
    fn invalid_settings_are_rejected() {
        assert!(ObservationConfig::default().with_area_cm2(0.0).resolve().is_err());
        assert!(ObservationConfig::default().with_exposure_time_s(-1.0).resolve().is_err());
        assert!(ObservationConfig::default().with_redshift(-0.1).resolve().is_err());
        assert!(ObservationConfig::default().with_distance_mpc(0.0).resolve().is_err());
    }
}
