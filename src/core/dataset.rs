//! The RCM product dataset: identification, opening, band assembly and
//! metadata publication.
//!
//! A product is opened from a directory holding `product.xml` (at the
//! root or under `metadata/`), from the descriptor path itself, or from
//! a subdataset reference of the form
//! `RCM_CALIB:<SIGMA0|BETA0|GAMMA|GAMMA0|UNCALIB>:<path>`.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::band::{CalibBand, RawBand, RcmBand};
use crate::core::lut::format_gains;
use crate::io::annotation::{self, ProductDescriptor};
use crate::io::calibration::{
    is_valid_xml_file, read_incidence_angles, read_lut, read_noise_levels,
};
use crate::io::image::{probe_band_mapping, ImageOpener};
use crate::types::{
    Access, Calibration, Gcp, GeoTransform, Packaging, PixelType, RcmError, RcmResult,
};

/// Layer name opening every subdataset reference.
const LAYER_CALIBRATION: &str = "RCM_CALIB";
/// Separator between the layer name, the calibration tag and the path.
const LAYER_SEPARATOR: char = ':';
/// Folder under the bundle root holding LUT, noise and incidence files.
const CALIBRATION_FOLDER: &str = "calibration";

fn strip_prefix_ci<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &text[prefix.len()..])
}

/// Format a subdataset reference for a calibration tag and descriptor
/// path.
fn format_calibration(tag: &str, descriptor_path: &Path) -> String {
    format!(
        "{}{}{}{}{}",
        LAYER_CALIBRATION,
        LAYER_SEPARATOR,
        tag,
        LAYER_SEPARATOR,
        descriptor_path.display()
    )
}

/// Split a subdataset reference into its calibration view and the
/// descriptor path. Tags are matched case-insensitively and `GAMMA0` is
/// accepted as an alias for `GAMMA`; an unknown tag yields
/// [`Calibration::None`].
pub fn parse_subdataset_ref(reference: &str) -> Option<(Calibration, &str)> {
    let rest = strip_prefix_ci(reference, "RCM_CALIB:")?;
    let (tag, path) = rest.split_once(LAYER_SEPARATOR)?;
    let calibration = match tag.to_ascii_uppercase().as_str() {
        "SIGMA0" => Calibration::Sigma0,
        "BETA0" => Calibration::Beta0,
        "GAMMA" | "GAMMA0" => Calibration::Gamma,
        "UNCALIB" => Calibration::Uncalib,
        _ => Calibration::None,
    };
    Some((calibration, path))
}

fn calibration_from_lut_type(lut_type: &str) -> Option<Calibration> {
    if lut_type.eq_ignore_ascii_case("Beta Nought") {
        Some(Calibration::Beta0)
    } else if lut_type.eq_ignore_ascii_case("Sigma Nought") {
        Some(Calibration::Sigma0)
    } else if lut_type.eq_ignore_ascii_case("Gamma") {
        Some(Calibration::Gamma)
    } else {
        None
    }
}

fn lut_list_metadata_key(calibration: Calibration) -> &'static str {
    match calibration {
        Calibration::Beta0 => "BETA_NOUGHT_LUT",
        Calibration::Sigma0 => "SIGMA_NOUGHT_LUT",
        _ => "GAMMA_LUT",
    }
}

fn subdataset_slot(calibration: Calibration) -> (usize, &'static str) {
    match calibration {
        Calibration::Sigma0 => (2, "Sigma Nought calibrated"),
        Calibration::Beta0 => (3, "Beta Nought calibrated"),
        _ => (4, "Gamma calibrated"),
    }
}

/// An opened RCM product.
#[derive(Debug)]
pub struct Product {
    width: usize,
    height: usize,
    data_type: PixelType,
    is_complex: bool,
    calibration: Calibration,
    polarizations: Vec<String>,
    packaging: Packaging,
    bands: Vec<RcmBand>,
    metadata: HashMap<String, String>,
    subdatasets: HashMap<String, String>,
    rpc: HashMap<String, String>,
    geo_transform: GeoTransform,
    have_geo_transform: bool,
    projection: Option<String>,
    gcp_projection: String,
    gcps: Vec<Gcp>,
    incidence_angles: Option<Vec<f64>>,
    acquisition_start: Option<DateTime<Utc>>,
    description: String,
    file_list: Vec<PathBuf>,
    lut_applied: String,
    per_polarization_scaling: bool,
}

impl Product {
    /// Does the path look like something this reader can open? Accepts
    /// subdataset references, bundle directories and direct
    /// `product.xml` paths.
    pub fn identify(path: &str) -> bool {
        if parse_subdataset_ref(path).is_some() {
            return true;
        }
        Self::identify_filesystem(Path::new(path))
    }

    fn identify_filesystem(path: &Path) -> bool {
        if path.is_dir() {
            for candidate in [
                path.join("product.xml"),
                path.join("metadata").join("product.xml"),
            ] {
                if candidate.is_file() {
                    return fs::read_to_string(&candidate)
                        .map(|xml| annotation::is_rcm_product_xml(&xml))
                        .unwrap_or(false);
                }
            }
            return false;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        if !name.eq_ignore_ascii_case("product.xml") {
            return false;
        }
        fs::read_to_string(path)
            .map(|xml| annotation::is_rcm_product_xml(&xml))
            .unwrap_or(false)
    }

    /// Open a product read-only.
    pub fn open(path: &str, opener: &dyn ImageOpener) -> RcmResult<Product> {
        Self::open_with_access(path, Access::ReadOnly, opener)
    }

    /// Open a product with an explicit access request. Update access is
    /// always refused.
    pub fn open_with_access(
        path: &str,
        access: Access,
        opener: &dyn ImageOpener,
    ) -> RcmResult<Product> {
        if access == Access::Update {
            return Err(RcmError::ReadOnly);
        }

        let (calibration, fs_path) = match parse_subdataset_ref(path) {
            Some((calibration, rest)) => (calibration, rest),
            None => (Calibration::None, path),
        };

        let descriptor_path = Self::resolve_descriptor_path(Path::new(fs_path))?;
        let xml = fs::read_to_string(&descriptor_path)
            .map_err(|_| RcmError::NotRecognized(descriptor_path.display().to_string()))?;
        let descriptor = annotation::parse_product(&xml)?;
        log::debug!(
            "opening {} ({}x{}, {:?}, view {})",
            descriptor_path.display(),
            descriptor.width,
            descriptor.height,
            descriptor.data_type,
            calibration
        );

        Self::assemble(descriptor, descriptor_path, calibration, opener)
    }

    fn resolve_descriptor_path(path: &Path) -> RcmResult<PathBuf> {
        if path.is_dir() {
            for candidate in [
                path.join("product.xml"),
                path.join("metadata").join("product.xml"),
            ] {
                if candidate.is_file() {
                    return Ok(candidate);
                }
            }
            return Err(RcmError::NotRecognized(path.display().to_string()));
        }
        Ok(path.to_path_buf())
    }

    fn assemble(
        descriptor: ProductDescriptor,
        descriptor_path: PathBuf,
        calibration: Calibration,
        opener: &dyn ImageOpener,
    ) -> RcmResult<Product> {
        let base = descriptor_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let raster_size = (descriptor.width, descriptor.height);
        let is_nitf = descriptor.packaging == Packaging::SingleNitf;

        let mut metadata: HashMap<String, String> = descriptor.metadata.iter().cloned().collect();
        let mut subdatasets: HashMap<String, String> = HashMap::new();
        let mut file_list = vec![descriptor_path.clone()];
        let mut bands: Vec<RcmBand> = Vec::new();

        // Incidence angles live in their own calibration-folder file.
        let incidence_angles = descriptor.incidence_angle_file.as_deref().and_then(|name| {
            let path = base.join(CALIBRATION_FOLDER).join(name);
            if !is_valid_xml_file(&path) {
                return None;
            }
            match read_incidence_angles(&path) {
                Ok(table) => Some(table),
                Err(e) => {
                    log::warn!("skipping incidence angle file {}: {}", path.display(), e);
                    None
                }
            }
        });

        for (pole_index, pole) in descriptor.polarizations.iter().enumerate() {
            // Per-polarization LUT and noise discovery; publishes the
            // calibrated subdatasets as a side effect.
            let mut lut_paths: HashMap<&'static str, PathBuf> = HashMap::new();
            let mut noise_path: Option<PathBuf> = None;

            if descriptor.can_calibrate {
                for lut_ref in descriptor.lut_files.iter().filter(|l| &l.pole == pole) {
                    let Some(kind) = calibration_from_lut_type(&lut_ref.calibration_type) else {
                        continue;
                    };
                    let relative = Path::new(CALIBRATION_FOLDER).join(&lut_ref.filename);
                    let full = base.join(&relative);
                    if !is_valid_xml_file(&full) {
                        continue;
                    }
                    file_list.push(full.clone());

                    let list_key = lut_list_metadata_key(kind);
                    let relative_text = relative.display().to_string();
                    metadata
                        .entry(list_key.to_string())
                        .and_modify(|list| {
                            list.push(',');
                            list.push_str(&relative_text);
                        })
                        .or_insert(relative_text);

                    let tag = kind.tag().expect("calibrated kinds carry a tag");
                    let (slot, desc) = subdataset_slot(kind);
                    subdatasets.insert(
                        format!("SUBDATASET_{}_NAME", slot),
                        format_calibration(tag, &descriptor_path),
                    );
                    subdatasets.insert(format!("SUBDATASET_{}_DESC", slot), desc.to_string());

                    lut_paths.insert(tag, full);
                }

                noise_path = descriptor
                    .noise_files
                    .iter()
                    .find(|n| &n.pole == pole)
                    .map(|n| base.join(CALIBRATION_FOLDER).join(&n.filename))
                    .filter(|path| is_valid_xml_file(path));
            }

            // Locate and open the image file for this polarization.
            let image_ref = match descriptor.packaging {
                Packaging::SingleNitf => descriptor.image_files.first(),
                Packaging::OneFilePerPolarization => descriptor
                    .image_files
                    .iter()
                    .find(|f| f.pole.as_deref() == Some(pole.as_str())),
            }
            .ok_or_else(|| {
                RcmError::MalformedXml(format!("no image file listed for polarization {}", pole))
            })?;

            let image_path = base.join(&image_ref.filename);
            let band_file = opener.open(&image_path)?;
            if band_file.band_count() == 0 {
                log::warn!(
                    "image file {} exposes no bands, skipping {}",
                    image_path.display(),
                    pole
                );
                continue;
            }
            file_list.push(image_path);

            // Some CFloat32 NITF files report 16 bits per sample and
            // would be misread as CInt16; trust the underlying file.
            let mut data_type = descriptor.data_type;
            if band_file.pixel_type(0)? == PixelType::CFloat32 {
                data_type = PixelType::CFloat32;
            }

            let mapping = probe_band_mapping(data_type, band_file.as_ref(), is_nitf)?;
            let source_band = if descriptor.one_file_per_pol {
                0
            } else {
                pole_index
            };

            match calibration {
                Calibration::None | Calibration::Uncalib => {
                    bands.push(RcmBand::Raw(RawBand::new(
                        pole,
                        data_type,
                        mapping,
                        source_band,
                        is_nitf,
                        band_file,
                        raster_size,
                    )));
                }
                kind => {
                    let tag = kind.tag().expect("selected views carry a tag");
                    let lut_path = lut_paths.remove(tag).ok_or_else(|| {
                        RcmError::MissingSibling(
                            base.join(CALIBRATION_FOLDER)
                                .join(format!("{} LUT for {}", tag, pole)),
                        )
                    })?;
                    let lut = read_lut(&lut_path, descriptor.width)?;
                    let noise_levels = match &noise_path {
                        Some(path) => read_noise_levels(path, kind)?,
                        None => None,
                    };
                    let band = CalibBand::new(
                        pole,
                        kind,
                        data_type,
                        source_band,
                        band_file,
                        lut,
                        noise_levels,
                        lut_path,
                        noise_path.clone(),
                        raster_size,
                    );
                    Self::publish_lut_metadata(&mut metadata, bands.len() + 1, &band);
                    bands.push(RcmBand::Calibrated(band));
                }
            }
        }

        // The uncalibrated view is subdataset 1; a selected view
        // suppresses the whole list.
        if calibration == Calibration::None {
            if !subdatasets.is_empty() {
                subdatasets.insert(
                    "SUBDATASET_1_NAME".to_string(),
                    format_calibration("UNCALIB", &descriptor_path),
                );
                subdatasets.insert(
                    "SUBDATASET_1_DESC".to_string(),
                    "Uncalibrated digital numbers".to_string(),
                );
            }
        } else {
            subdatasets.clear();
        }

        if bands.len() == 4
            && matches!(descriptor.data_type, PixelType::CInt16 | PixelType::CFloat32)
        {
            metadata.insert("MATRIX_REPRESENTATION".to_string(), "SCATTERING".to_string());
        }

        let description = match calibration.tag() {
            Some(tag) => format_calibration(tag, &descriptor_path),
            None => descriptor_path.display().to_string(),
        };

        log::debug!(
            "assembled {} band(s) for polarizations [{}]",
            bands.len(),
            descriptor.polarizations.join(" ")
        );

        Ok(Product {
            width: descriptor.width,
            height: descriptor.height,
            data_type: descriptor.data_type,
            is_complex: descriptor.is_complex,
            calibration,
            polarizations: descriptor.polarizations,
            packaging: descriptor.packaging,
            bands,
            metadata,
            subdatasets,
            rpc: descriptor.rpc.into_iter().collect(),
            geo_transform: descriptor.geo_transform,
            have_geo_transform: descriptor.geo_transform_valid,
            projection: descriptor.projection,
            gcp_projection: descriptor.gcp_projection,
            gcps: descriptor.gcps,
            incidence_angles,
            acquisition_start: descriptor.acquisition_start,
            description,
            file_list,
            lut_applied: descriptor.lut_applied,
            per_polarization_scaling: descriptor.per_polarization_scaling,
        })
    }

    fn publish_lut_metadata(
        metadata: &mut HashMap<String, String>,
        band_number: usize,
        band: &CalibBand,
    ) {
        let lut = band.lut();
        metadata.insert(
            format!("LUT_GAINS_{}", band_number),
            format_gains(&lut.gains),
        );
        if let Some(tag) = band.calibration_tag() {
            metadata.insert(format!("LUT_TYPE_{}", band_number), tag.to_string());
        }
        metadata.insert(format!("LUT_SIZE_{}", band_number), lut.len().to_string());
        metadata.insert(
            format!("LUT_OFFSET_{}", band_number),
            format!("{:.6}", lut.offset),
        );
    }

    /// Narrow the LUT of a calibrated band to a pixel range and refresh
    /// the published `LUT_GAINS_n` / `LUT_SIZE_n` items. A no-op on raw
    /// bands and on requests that clamp to nothing; the on-disk file is
    /// never touched.
    pub fn set_partial_lut(
        &mut self,
        band_index: usize,
        pixel_offset: isize,
        pixel_width: usize,
    ) -> RcmResult<()> {
        let band_number = band_index + 1;
        match self.bands.get_mut(band_index) {
            Some(RcmBand::Calibrated(band)) => {
                if band.narrow_lut(pixel_offset, pixel_width) {
                    let lut = band.lut();
                    self.metadata.insert(
                        format!("LUT_GAINS_{}", band_number),
                        format_gains(&lut.gains),
                    );
                    self.metadata
                        .insert(format!("LUT_SIZE_{}", band_number), lut.len().to_string());
                }
                Ok(())
            }
            Some(RcmBand::Raw(_)) => Ok(()),
            None => Err(RcmError::Unreachable("band index out of range")),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Element type of the uncalibrated samples.
    pub fn data_type(&self) -> PixelType {
        self.data_type
    }

    pub fn is_complex(&self) -> bool {
        self.is_complex
    }

    pub fn calibration(&self) -> Calibration {
        self.calibration
    }

    pub fn polarizations(&self) -> &[String] {
        &self.polarizations
    }

    pub fn packaging(&self) -> Packaging {
        self.packaging
    }

    pub fn bands(&self) -> &[RcmBand] {
        &self.bands
    }

    pub fn band(&self, index: usize) -> Option<&RcmBand> {
        self.bands.get(index)
    }

    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    /// The affine geotransform, when the descriptor corners were
    /// self-consistent.
    pub fn geo_transform(&self) -> Option<&GeoTransform> {
        self.have_geo_transform.then_some(&self.geo_transform)
    }

    /// The computed transform regardless of its validity flag.
    pub fn raw_geo_transform(&self) -> &GeoTransform {
        &self.geo_transform
    }

    /// Projected coordinate system, when interpretable.
    pub fn projection(&self) -> Option<&str> {
        self.projection.as_deref()
    }

    /// Geographic coordinate system the GCPs are expressed in; empty
    /// when the descriptor carries no ellipsoid parameters.
    pub fn gcp_projection(&self) -> &str {
        &self.gcp_projection
    }

    pub fn gcps(&self) -> &[Gcp] {
        &self.gcps
    }

    pub fn incidence_angles(&self) -> Option<&[f64]> {
        self.incidence_angles.as_deref()
    }

    /// Acquisition start, when `rawDataStartTime` parsed as a timestamp.
    pub fn acquisition_start(&self) -> Option<DateTime<Utc>> {
        self.acquisition_start
    }

    /// Root-domain metadata.
    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.metadata
    }

    pub fn metadata_item(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// Metadata for a named domain: `""` (root), `SUBDATASETS`, `RPC`.
    pub fn metadata_domain(&self, domain: &str) -> Option<&HashMap<String, String>> {
        match domain {
            "" => Some(&self.metadata),
            "SUBDATASETS" => (!self.subdatasets.is_empty()).then_some(&self.subdatasets),
            "RPC" => (!self.rpc.is_empty()).then_some(&self.rpc),
            _ => None,
        }
    }

    pub fn metadata_domains(&self) -> Vec<&'static str> {
        let mut domains = vec![""];
        if !self.subdatasets.is_empty() {
            domains.push("SUBDATASETS");
        }
        if !self.rpc.is_empty() {
            domains.push("RPC");
        }
        domains
    }

    /// Subdataset reference echo (or the descriptor path when no view
    /// is selected).
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Every file that participated in the open.
    pub fn file_list(&self) -> &[PathBuf] {
        &self.file_list
    }

    pub fn lut_applied(&self) -> &str {
        &self.lut_applied
    }

    pub fn per_polarization_scaling(&self) -> bool {
        self.per_polarization_scaling
    }
}
