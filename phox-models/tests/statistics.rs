mod common;

use common::{bremsstrahlung, isothermal_cells, ks_critical, ks_statistic, params};
use phox_core::{EnergyMethod, InMemorySource};
use phox_models::{
    generate_photons, GenerationConfig, PhotonModel, ThermalConfig, ThermalPhotonModel,
};

fn thermal(method: EnergyMethod) -> PhotonModel {
    ThermalPhotonModel::new(
        bremsstrahlung(),
        ThermalConfig::default().with_method(method),
    )
    .unwrap()
    .into()
}

#[test]
#[allow(clippy::cast_precision_loss)]
fn chunked_run_matches_single_chunk() {
    let params = params();
    let cells = isothermal_cells(400, 3.0);
    let mut model = thermal(EnergyMethod::InvertCdf);

    let single = generate_photons(
        &mut model,
        &InMemorySource::single(cells.clone()),
        &params,
        &GenerationConfig::default().with_seed(100),
    )
    .unwrap();
    let chunked = generate_photons(
        &mut model,
        &InMemorySource::split(&cells, 37),
        &params,
        &GenerationConfig::default().with_seed(200),
    )
    .unwrap();

    assert!(single.validate().is_ok());
    assert!(chunked.validate().is_ok());
    let (n1, n2) = (single.num_photons() as f64, chunked.num_photons() as f64);
    assert!(n1 > 5_000.0);
    // Rounding variance is at most 0.25 per cell; allow a wide margin.
    assert!((n1 - n2).abs() < 5.0 * (2.0 * 0.25 * 400.0_f64).sqrt() + 1.0);

    let d = ks_statistic(single.energy(), chunked.energy());
    assert!(d < ks_critical(single.num_photons(), chunked.num_photons()), "D = {d}");

    // Expanding restores one row per photon with the owning cell's position.
    let expanded = chunked.expand();
    assert_eq!(expanded.len(), chunked.num_photons());
    for (cell, range) in chunked.cell_ranges().into_iter().enumerate() {
        let x = chunked.values("x").unwrap()[cell];
        assert!(expanded.x[range].iter().all(|&v| v.to_bits() == x.to_bits()));
    }
}

#[test]
fn energy_methods_agree() {
    let params = params();
    let source = InMemorySource::single(isothermal_cells(400, 3.0));

    let cdf = generate_photons(
        &mut thermal(EnergyMethod::InvertCdf),
        &source,
        &params,
        &GenerationConfig::default().with_seed(7),
    )
    .unwrap();
    let categorical = generate_photons(
        &mut thermal(EnergyMethod::Categorical),
        &source,
        &params,
        &GenerationConfig::default().with_seed(8),
    )
    .unwrap();

    let d = ks_statistic(cdf.energy(), categorical.energy());
    assert!(
        d < ks_critical(cdf.num_photons(), categorical.num_photons()),
        "D = {d}"
    );
}

#[test]
#[allow(clippy::cast_precision_loss)]
fn hotter_plasma_has_harder_spectrum() {
    let params = params();
    let mean = |kt: f64| {
        let table = generate_photons(
            &mut thermal(EnergyMethod::InvertCdf),
            &InMemorySource::single(isothermal_cells(200, kt)),
            &params,
            &GenerationConfig::default().with_seed(9),
        )
        .unwrap();
        table.energy().iter().sum::<f64>() / table.num_photons() as f64
    };
    assert!(mean(8.0) > mean(1.0));
}

#[test]
fn zero_emission_gives_empty_table_with_units() {
    let params = params();
    let cells = isothermal_cells(50, 3.0);
    let mut dark = phox_core::CellChunk::new(50);
    for name in cells.field_names() {
        let column = cells.field(name).unwrap();
        let values = if name == phox_core::fields::DENSITY {
            vec![0.0; 50]
        } else {
            column.values.clone()
        };
        dark.insert(name, values, column.unit).unwrap();
    }

    let table = generate_photons(
        &mut thermal(EnergyMethod::InvertCdf),
        &InMemorySource::split(&dark, 10),
        &params,
        &GenerationConfig::default().with_seed(1),
    )
    .unwrap();
    assert!(table.is_empty());
    assert_eq!(table.num_cells(), 0);
    for key in table.keys() {
        let column = table.column(key).unwrap();
        assert!(column.is_empty());
        assert_eq!(Some(column.unit), phox_core::photons::unit_of(key));
    }
}
