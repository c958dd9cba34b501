//! End-to-end open, identification and metadata behavior against
//! synthetic bundles.

mod common;

use common::{write_bundle, FixtureOptions};
use ndarray::Array2;
use num_complex::Complex32;
use rcmdata::{
    Access, Block, Calibration, MemoryImage, MemoryOpener, PixelType, Product, RcmError,
};

fn complex_image(width: usize, height: usize) -> MemoryImage {
    MemoryImage::new(vec![Block::CFloat32(Array2::from_elem(
        (height, width),
        Complex32::new(1.0, 0.0),
    ))])
    .unwrap()
}

fn uint16_image(width: usize, height: usize, value: u16) -> MemoryImage {
    MemoryImage::new(vec![Block::UInt16(Array2::from_elem((height, width), value))]).unwrap()
}

#[test]
fn open_uncalibrated_complex_product() {
    let fixture = write_bundle(&FixtureOptions::default());
    let mut opener = MemoryOpener::new();
    opener.insert(fixture.image_path("HH"), complex_image(4, 2));

    let product = Product::open(fixture.root().to_str().unwrap(), &opener).unwrap();
    assert_eq!(product.width(), 4);
    assert_eq!(product.height(), 2);
    assert_eq!(product.calibration(), Calibration::None);
    assert_eq!(product.data_type(), PixelType::CFloat32);
    assert!(product.is_complex());
    assert_eq!(product.polarizations(), ["HH"]);
    assert_eq!(product.band_count(), 1);

    let band = product.band(0).unwrap();
    assert_eq!(band.pole(), "HH");
    assert_eq!(band.data_type(), PixelType::CFloat32);
    assert_eq!(band.calibration(), Calibration::Uncalib);

    assert_eq!(product.metadata_item("PRODUCT_TYPE"), Some("SLC"));
    assert_eq!(product.metadata_item("POLARIZATIONS"), Some("HH"));
    assert_eq!(product.metadata_item("SATELLITE_IDENTIFIER"), Some("RCM-3"));
    assert_eq!(product.metadata_item("SAMPLE_TYPE"), Some("Complex"));
    assert_eq!(product.metadata_item("BITS_PER_SAMPLE"), Some("32"));
    assert_eq!(product.metadata_item("ORBIT_DIRECTION"), Some("Descending"));
    assert!(product.metadata_item("SIGMA_NOUGHT_LUT").is_some());

    // All four views are published for the unselected dataset.
    let subdatasets = product.metadata_domain("SUBDATASETS").unwrap();
    assert_eq!(subdatasets.len(), 8);
    let first = subdatasets.get("SUBDATASET_1_NAME").unwrap();
    assert!(first.starts_with("RCM_CALIB:UNCALIB:"));
    assert_eq!(
        subdatasets.get("SUBDATASET_2_DESC").map(String::as_str),
        Some("Sigma Nought calibrated")
    );
    assert_eq!(
        subdatasets.get("SUBDATASET_4_DESC").map(String::as_str),
        Some("Gamma calibrated")
    );

    assert_eq!(product.metadata_domains(), vec!["", "SUBDATASETS"]);
    assert_eq!(product.description(), fixture.product_xml_str());
    assert!(product.geo_transform().is_none());
}

#[test]
fn open_through_metadata_subdirectory() {
    let fixture = write_bundle(&FixtureOptions {
        metadata_layout: true,
        ..Default::default()
    });
    let mut opener = MemoryOpener::new();
    opener.insert(fixture.image_path("HH"), complex_image(4, 2));

    assert!(Product::identify(fixture.root().to_str().unwrap()));
    let product = Product::open(fixture.root().to_str().unwrap(), &opener).unwrap();
    assert_eq!(product.band_count(), 1);
}

#[test]
fn identify_accepts_bundles_and_rejects_foreign_namespaces() {
    let fixture = write_bundle(&FixtureOptions::default());
    assert!(Product::identify(fixture.root().to_str().unwrap()));
    assert!(Product::identify(&fixture.product_xml_str()));

    let foreign = write_bundle(&FixtureOptions {
        xmlns: "rs2prod",
        ..Default::default()
    });
    assert!(!Product::identify(foreign.root().to_str().unwrap()));
    assert!(!Product::identify(&foreign.product_xml_str()));
}

#[test]
fn update_access_is_refused() {
    let fixture = write_bundle(&FixtureOptions::default());
    let opener = MemoryOpener::new();
    let err = Product::open_with_access(
        fixture.root().to_str().unwrap(),
        Access::Update,
        &opener,
    )
    .unwrap_err();
    assert!(matches!(err, RcmError::ReadOnly));
}

#[test]
fn gamma0_alias_selects_the_gamma_view() {
    let fixture = write_bundle(&FixtureOptions::default());
    let mut opener = MemoryOpener::new();
    opener.insert(fixture.image_path("HH"), complex_image(4, 2));

    let product = Product::open(&fixture.subdataset_ref("GAMMA0"), &opener).unwrap();
    assert_eq!(product.calibration(), Calibration::Gamma);
    // The description echoes the canonical tag.
    assert_eq!(product.description(), fixture.subdataset_ref("GAMMA"));
    // A selected view suppresses subdataset publication.
    assert!(product.metadata_domain("SUBDATASETS").is_none());

    assert_eq!(product.metadata_item("LUT_TYPE_1"), Some("GAMMA"));
    let band = product.band(0).unwrap();
    let lut = band.lut().unwrap();
    assert_eq!(
        product.metadata_item("LUT_SIZE_1"),
        Some(lut.len().to_string().as_str())
    );
    assert!(lut.len() >= product.width());
}

#[test]
fn calibrated_magnitude_band_reports_float32() {
    let fixture = write_bundle(&FixtureOptions {
        sample_type: "Magnitude Detected",
        bits_per_sample: 16,
        ..Default::default()
    });
    let mut opener = MemoryOpener::new();
    opener.insert(fixture.image_path("HH"), uint16_image(4, 2, 7));

    let product = Product::open(&fixture.subdataset_ref("SIGMA0"), &opener).unwrap();
    let band = product.band(0).unwrap();
    assert_eq!(band.calibration(), Calibration::Sigma0);
    assert_eq!(band.data_type(), PixelType::Float32);
    assert!(!band.is_complex());
    // Noise table for Sigma Nought came along.
    assert_eq!(band.noise_level(0), Some(-30.0));
    assert_eq!(band.noise_levels().map(|t| t.len()), Some(4));
}

#[test]
fn consistent_corners_produce_a_geotransform() {
    let fixture = write_bundle(&FixtureOptions {
        corners: Some([
            (500000.0, 5000020.0),
            (500030.0, 5000020.0),
            (500000.0, 5000000.0),
            (500030.0, 5000000.0),
        ]),
        ..Default::default()
    });
    let mut opener = MemoryOpener::new();
    opener.insert(fixture.image_path("HH"), complex_image(4, 2));

    let product = Product::open(fixture.root().to_str().unwrap(), &opener).unwrap();
    let gt = product.geo_transform().expect("corners are consistent");
    assert!((gt[1] - 10.0).abs() < 1e-9);
    assert!((gt[5] + 20.0).abs() < 1e-9);
    assert!(product.projection().unwrap().contains("+proj=utm +zone=18"));
}

#[test]
fn inconsistent_corners_invalidate_the_geotransform() {
    let fixture = write_bundle(&FixtureOptions {
        corners: Some([
            (500000.0, 5000020.0),
            (500030.0, 5000020.0),
            (500000.0, 5000000.0),
            (500090.0, 5000000.0),
        ]),
        ..Default::default()
    });
    let mut opener = MemoryOpener::new();
    opener.insert(fixture.image_path("HH"), complex_image(4, 2));

    let product = Product::open(fixture.root().to_str().unwrap(), &opener).unwrap();
    assert!(product.geo_transform().is_none());
    // The descriptor metadata still carries the projection name.
    assert_eq!(product.metadata_item("MAP_PROJECTION_DESCRIPTOR"), Some("UTM"));
}

#[test]
fn selected_calibration_without_luts_is_a_missing_sibling() {
    let fixture = write_bundle(&FixtureOptions {
        with_luts: false,
        ..Default::default()
    });
    let mut opener = MemoryOpener::new();
    opener.insert(fixture.image_path("HH"), complex_image(4, 2));

    let err = Product::open(&fixture.subdataset_ref("SIGMA0"), &opener).unwrap_err();
    assert!(matches!(err, RcmError::MissingSibling(_)));
}

#[test]
fn geocoded_products_publish_no_calibration_views() {
    let fixture = write_bundle(&FixtureOptions {
        product_type: "GCD",
        ..Default::default()
    });
    let mut opener = MemoryOpener::new();
    opener.insert(fixture.image_path("HH"), complex_image(4, 2));

    let product = Product::open(fixture.root().to_str().unwrap(), &opener).unwrap();
    assert!(product.metadata_domain("SUBDATASETS").is_none());
    assert!(product.metadata_item("SIGMA_NOUGHT_LUT").is_none());
}

#[test]
fn quad_pol_complex_reports_scattering_matrix() {
    let poles = ["HH", "HV", "VH", "VV"];
    let fixture = write_bundle(&FixtureOptions {
        polarizations: poles.to_vec(),
        ..Default::default()
    });
    let mut opener = MemoryOpener::new();
    for pole in poles {
        opener.insert(fixture.image_path(pole), complex_image(4, 2));
    }

    let product = Product::open(fixture.root().to_str().unwrap(), &opener).unwrap();
    assert_eq!(product.band_count(), 4);
    let order: Vec<&str> = product.bands().iter().map(|b| b.pole()).collect();
    assert_eq!(order, poles);
    assert_eq!(
        product.metadata_item("MATRIX_REPRESENTATION"),
        Some("SCATTERING")
    );
}

#[test]
fn dropping_the_product_releases_the_image_handles() {
    let fixture = write_bundle(&FixtureOptions::default());
    let image = complex_image(4, 2);
    let mut opener = MemoryOpener::new();
    opener.insert(fixture.image_path("HH"), image.clone());
    assert_eq!(image.handle_count(), 2);

    let product = Product::open(fixture.root().to_str().unwrap(), &opener).unwrap();
    assert_eq!(image.handle_count(), 3);
    drop(product);
    assert_eq!(image.handle_count(), 2);
}

#[test]
fn partial_lut_updates_band_and_metadata_together() {
    let fixture = write_bundle(&FixtureOptions {
        lut_gains: vec![2.0, 4.0, 8.0, 16.0],
        ..Default::default()
    });
    let mut opener = MemoryOpener::new();
    opener.insert(fixture.image_path("HH"), complex_image(4, 2));

    let mut product = Product::open(&fixture.subdataset_ref("SIGMA0"), &opener).unwrap();
    assert_eq!(product.metadata_item("LUT_SIZE_1"), Some("4"));

    product.set_partial_lut(0, 1, 2).unwrap();
    assert_eq!(product.metadata_item("LUT_SIZE_1"), Some("2"));
    assert_eq!(product.metadata_item("LUT_GAINS_1"), Some("4e0 8e0"));
    let band = product.band(0).unwrap();
    assert_eq!(band.lut().unwrap().gains, vec![4.0, 8.0]);
}

#[test]
fn incidence_angle_table_is_densified_per_column() {
    let fixture = write_bundle(&FixtureOptions {
        incidence_angles: Some(vec![30.0, 31.0, 32.0, 33.0]),
        ..Default::default()
    });
    let mut opener = MemoryOpener::new();
    opener.insert(fixture.image_path("HH"), complex_image(4, 2));

    let product = Product::open(fixture.root().to_str().unwrap(), &opener).unwrap();
    let angles = product.incidence_angles().unwrap();
    assert_eq!(angles, &[30.0, 31.0, 32.0, 33.0][..]);
}

#[test]
fn file_list_covers_descriptor_imagery_and_luts() {
    let fixture = write_bundle(&FixtureOptions::default());
    let mut opener = MemoryOpener::new();
    opener.insert(fixture.image_path("HH"), complex_image(4, 2));

    let product = Product::open(fixture.root().to_str().unwrap(), &opener).unwrap();
    let files = product.file_list();
    assert!(files.contains(&fixture.product_xml));
    assert!(files.contains(&fixture.image_path("HH")));
    assert!(files.iter().any(|f| f.ends_with("lutSigma_HH.xml")));
}
