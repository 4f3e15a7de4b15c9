//! Synthetic isothermal cluster for trying the pipeline without simulation data.

use phox_core::cells::fields;
use phox_core::{CellChunk, Result, Unit};

/// An isothermal beta-model sphere sampled on a uniform cubic grid.
#[derive(Clone, Debug)]
pub struct SyntheticSphere {
    /// Cells along each axis.
    pub cells_per_side: usize,
    /// Box side in kpc.
    pub box_kpc: f64,
    pub kt_kev: f64,
    /// Central gas density in g/cm^3.
    pub central_density: f64,
    pub core_radius_kpc: f64,
    pub beta: f64,
    pub metallicity: f64,
    /// Solid-body rotation about the z axis, km/s per kpc.
    pub rotation: f64,
}

impl Default for SyntheticSphere {
    fn default() -> Self {
        Self {
            cells_per_side: 32,
            box_kpc: 2000.0,
            kt_kev: 5.0,
            central_density: 1.0e-25,
            core_radius_kpc: 150.0,
            beta: 2.0 / 3.0,
            metallicity: 0.3,
            rotation: 0.5,
        }
    }
}

impl SyntheticSphere {
    #[allow(clippy::cast_precision_loss)]
    pub fn build(&self) -> Result<CellChunk> {
        let n = self.cells_per_side.max(1);
        let total = n * n * n;
        let dx = self.box_kpc / n as f64;
        let half = 0.5 * self.box_kpc;
        let centre = |i: usize| (i as f64 + 0.5) * dx - half;
        let core2 = self.core_radius_kpc * self.core_radius_kpc;

        let mut x = Vec::with_capacity(total);
        let mut y = Vec::with_capacity(total);
        let mut z = Vec::with_capacity(total);
        let mut density = Vec::with_capacity(total);
        let mut vx = Vec::with_capacity(total);
        let mut vy = Vec::with_capacity(total);
        for i in 0..n {
            for j in 0..n {
                for k in 0..n {
                    let (cx, cy, cz) = (centre(i), centre(j), centre(k));
                    let r2 = (cx * cx + cy * cy + cz * cz) / core2;
                    density.push(self.central_density * (1.0 + r2).powf(-1.5 * self.beta));
                    vx.push(-self.rotation * cy);
                    vy.push(self.rotation * cx);
                    x.push(cx);
                    y.push(cy);
                    z.push(cz);
                }
            }
        }

        CellChunk::new(total)
            .with_field(fields::TEMPERATURE, vec![self.kt_kev; total], Unit::KeV)?
            .with_field(fields::DENSITY, density, Unit::GramPerCubicCentimeter)?
            .with_field(fields::CELL_VOLUME, vec![dx * dx * dx; total], Unit::CubicKiloparsec)?
            .with_field(fields::METALLICITY, vec![self.metallicity; total], Unit::Dimensionless)?
            .with_field(fields::X, x, Unit::Kiloparsec)?
            .with_field(fields::Y, y, Unit::Kiloparsec)?
            .with_field(fields::Z, z, Unit::Kiloparsec)?
            .with_field(fields::VELOCITY_X, vx, Unit::KilometerPerSecond)?
            .with_field(fields::VELOCITY_Y, vy, Unit::KilometerPerSecond)?
            .with_field(fields::VELOCITY_Z, vec![0.0; total], Unit::KilometerPerSecond)?
            .with_field(fields::DX, vec![dx; total], Unit::Kiloparsec)
    }
}
