//! Parser for the RCM bundle descriptor `product.xml`.
//!
//! The descriptor is deserialized into typed structs covering the subset
//! of the document the reader consumes, then flattened into a
//! [`ProductDescriptor`]: raster geometry, sample family, polarization
//! list, image/LUT/noise file references, projection, GCPs, RPC and the
//! best-effort metadata items.

use chrono::{DateTime, Utc};
use quick_xml::events::Event;
use serde::Deserialize;
use std::collections::HashMap;

use crate::types::{Gcp, GeoTransform, Packaging, PixelType, RcmError, RcmResult};

/// Reference to one image product data file (`ipdf`).
#[derive(Debug, Clone, PartialEq)]
pub struct ImageFileRef {
    /// Uppercased `pole` attribute; `None` for the single-NITF flavor.
    pub pole: Option<String>,
    /// Path relative to the product.xml directory, separators normalized.
    pub filename: String,
}

/// Reference to one per-polarization calibration LUT file.
#[derive(Debug, Clone, PartialEq)]
pub struct LutFileRef {
    pub pole: String,
    /// `sarCalibrationType` as written in the descriptor.
    pub calibration_type: String,
    pub filename: String,
}

/// Reference to one per-polarization noise-level file.
#[derive(Debug, Clone, PartialEq)]
pub struct NoiseFileRef {
    pub pole: String,
    pub filename: String,
}

/// Everything the reader extracts from product.xml.
#[derive(Debug, Clone)]
pub struct ProductDescriptor {
    pub width: usize,
    pub height: usize,
    /// Reported element type per the sampleType/bitsPerSample table.
    pub data_type: PixelType,
    pub is_complex: bool,
    pub bits_per_sample: u32,
    /// False for UNK/GCD/GCC product types, which carry no usable LUTs.
    pub can_calibrate: bool,
    pub product_type: String,
    /// Ordered, uppercased polarization list.
    pub polarizations: Vec<String>,
    pub packaging: Packaging,
    /// True when every polarization has its own image file.
    pub one_file_per_pol: bool,
    pub image_files: Vec<ImageFileRef>,
    pub lut_files: Vec<LutFileRef>,
    pub noise_files: Vec<NoiseFileRef>,
    pub incidence_angle_file: Option<String>,
    pub lut_applied: String,
    pub per_polarization_scaling: bool,
    pub acquisition_start: Option<DateTime<Utc>>,
    /// Affine transform computed from the corner coordinates. Always
    /// populated; `geo_transform_valid` records whether it survived the
    /// quarter-pixel consistency check.
    pub geo_transform: GeoTransform,
    pub geo_transform_valid: bool,
    /// Projected coordinate system, opaque string, when interpretable.
    pub projection: Option<String>,
    /// Geographic coordinate system used by the GCPs; empty when the
    /// descriptor carries no ellipsoid parameters at all.
    pub gcp_projection: String,
    pub gcps: Vec<Gcp>,
    /// RPC fields keyed by the host framework's names (`ERR_BIAS`, ...).
    pub rpc: Vec<(String, String)>,
    /// Best-effort metadata items, in publication order.
    pub metadata: Vec<(String, String)>,
}

// ---------------------------------------------------------------------------
// serde mirror of the document
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ProductXml {
    #[serde(rename = "@xmlns")]
    xmlns: Option<String>,
    #[serde(rename = "productId")]
    product_id: Option<String>,
    #[serde(rename = "securityAttributes")]
    security_attributes: Option<SecurityAttributesXml>,
    #[serde(rename = "sourceAttributes")]
    source_attributes: Option<SourceAttributesXml>,
    #[serde(rename = "imageGenerationParameters")]
    image_generation_parameters: Option<ImageGenerationParametersXml>,
    #[serde(rename = "imageReferenceAttributes")]
    image_reference_attributes: Option<ImageReferenceAttributesXml>,
    #[serde(rename = "sceneAttributes")]
    scene_attributes: Option<SceneAttributesXml>,
}

#[derive(Debug, Deserialize)]
struct SecurityAttributesXml {
    #[serde(rename = "securityClassification")]
    security_classification: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SourceAttributesXml {
    satellite: Option<String>,
    sensor: Option<String>,
    #[serde(rename = "beamMode")]
    beam_mode: Option<String>,
    #[serde(rename = "beamModeMnemonic")]
    beam_mode_mnemonic: Option<String>,
    #[serde(rename = "beamModeDefinitionId")]
    beam_mode_definition_id: Option<String>,
    #[serde(rename = "rawDataStartTime")]
    raw_data_start_time: Option<String>,
    #[serde(rename = "inputDatasetFacilityId")]
    input_dataset_facility_id: Option<String>,
    #[serde(rename = "polarizationDataMode")]
    polarization_data_mode: Option<String>,
    #[serde(rename = "radarParameters")]
    radar_parameters: Option<RadarParametersXml>,
    #[serde(rename = "orbitAndAttitude")]
    orbit_and_attitude: Option<OrbitAndAttitudeXml>,
}

#[derive(Debug, Deserialize)]
struct RadarParametersXml {
    polarizations: Option<String>,
    #[serde(rename = "acquisitionType")]
    acquisition_type: Option<String>,
    beams: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrbitAndAttitudeXml {
    #[serde(rename = "orbitInformation")]
    orbit_information: Option<OrbitInformationXml>,
}

#[derive(Debug, Deserialize)]
struct OrbitInformationXml {
    #[serde(rename = "passDirection")]
    pass_direction: Option<String>,
    #[serde(rename = "orbitDataSource")]
    orbit_data_source: Option<String>,
    #[serde(rename = "orbitDataFileName")]
    orbit_data_file_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImageGenerationParametersXml {
    #[serde(rename = "generalProcessingInformation")]
    general_processing_information: Option<GeneralProcessingInformationXml>,
    #[serde(rename = "sarProcessingInformation")]
    sar_processing_information: Option<SarProcessingInformationXml>,
}

#[derive(Debug, Deserialize)]
struct GeneralProcessingInformationXml {
    #[serde(rename = "productType")]
    product_type: Option<String>,
    #[serde(rename = "processingFacility")]
    processing_facility: Option<String>,
    #[serde(rename = "processingTime")]
    processing_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SarProcessingInformationXml {
    #[serde(rename = "lutApplied")]
    lut_applied: Option<String>,
    #[serde(rename = "perPolarizationScaling")]
    per_polarization_scaling: Option<String>,
    #[serde(rename = "satelliteHeight")]
    satellite_height: Option<String>,
    #[serde(rename = "zeroDopplerTimeFirstLine")]
    zero_doppler_time_first_line: Option<String>,
    #[serde(rename = "zeroDopplerTimeLastLine")]
    zero_doppler_time_last_line: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImageReferenceAttributesXml {
    #[serde(rename = "rasterAttributes")]
    raster_attributes: Option<RasterAttributesXml>,
    #[serde(rename = "incidenceAngleFileName")]
    incidence_angle_file_name: Option<String>,
    #[serde(rename = "lookupTableFileName", default)]
    lookup_table_file_names: Vec<LutFileXml>,
    #[serde(rename = "noiseLevelFileName", default)]
    noise_level_file_names: Vec<NoiseFileXml>,
    #[serde(rename = "geographicInformation")]
    geographic_information: Option<GeographicInformationXml>,
}

#[derive(Debug, Deserialize)]
struct RasterAttributesXml {
    #[serde(rename = "sampleType")]
    sample_type: Option<String>,
    #[serde(rename = "dataType")]
    data_type: Option<String>,
    #[serde(rename = "bitsPerSample")]
    bits_per_sample: Option<String>,
    #[serde(rename = "sampledPixelSpacing")]
    sampled_pixel_spacing: Option<String>,
    #[serde(rename = "sampledLineSpacing")]
    sampled_line_spacing: Option<String>,
    #[serde(rename = "sampledPixelSpacingTime")]
    sampled_pixel_spacing_time: Option<String>,
    #[serde(rename = "sampledLineSpacingTime")]
    sampled_line_spacing_time: Option<String>,
    #[serde(rename = "pixelTimeOrdering")]
    pixel_time_ordering: Option<String>,
    #[serde(rename = "lineTimeOrdering")]
    line_time_ordering: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LutFileXml {
    #[serde(rename = "@sarCalibrationType")]
    sar_calibration_type: Option<String>,
    #[serde(rename = "@pole")]
    pole: Option<String>,
    #[serde(rename = "$text")]
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NoiseFileXml {
    #[serde(rename = "@pole")]
    pole: Option<String>,
    #[serde(rename = "$text")]
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeographicInformationXml {
    #[serde(rename = "geolocationGrid")]
    geolocation_grid: Option<GeolocationGridXml>,
    #[serde(rename = "rationalFunctions")]
    rational_functions: Option<RationalFunctionsXml>,
    #[serde(rename = "ellipsoidParameters")]
    ellipsoid_parameters: Option<EllipsoidParametersXml>,
    #[serde(rename = "mapProjection")]
    map_projection: Option<MapProjectionXml>,
}

#[derive(Debug, Deserialize)]
struct GeolocationGridXml {
    #[serde(rename = "imageTiePoint", default)]
    image_tie_points: Vec<ImageTiePointXml>,
}

#[derive(Debug, Deserialize)]
struct ImageTiePointXml {
    #[serde(rename = "imageCoordinate")]
    image_coordinate: Option<ImageCoordinateXml>,
    #[serde(rename = "geodeticCoordinate")]
    geodetic_coordinate: Option<GeodeticCoordinateXml>,
}

#[derive(Debug, Deserialize)]
struct ImageCoordinateXml {
    line: Option<String>,
    pixel: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeodeticCoordinateXml {
    latitude: Option<String>,
    longitude: Option<String>,
    height: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EllipsoidParametersXml {
    #[serde(rename = "ellipsoidName")]
    ellipsoid_name: Option<String>,
    #[serde(rename = "semiMajorAxis")]
    semi_major_axis: Option<String>,
    #[serde(rename = "semiMinorAxis")]
    semi_minor_axis: Option<String>,
    #[serde(rename = "geodeticTerrainHeight")]
    geodetic_terrain_height: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MapProjectionXml {
    #[serde(rename = "mapProjectionDescriptor")]
    map_projection_descriptor: Option<String>,
    #[serde(rename = "mapProjectionOrientation")]
    map_projection_orientation: Option<String>,
    #[serde(rename = "resamplingKernel")]
    resampling_kernel: Option<String>,
    #[serde(rename = "satelliteHeading")]
    satellite_heading: Option<String>,
    #[serde(rename = "positioningInformation")]
    positioning_information: Option<PositioningInformationXml>,
    #[serde(rename = "utmProjectionParameters")]
    utm_projection_parameters: Option<UtmProjectionParametersXml>,
    #[serde(rename = "nspProjectionParameters")]
    nsp_projection_parameters: Option<NspProjectionParametersXml>,
}

#[derive(Debug, Deserialize)]
struct PositioningInformationXml {
    #[serde(rename = "upperLeftCorner")]
    upper_left_corner: Option<CornerXml>,
    #[serde(rename = "upperRightCorner")]
    upper_right_corner: Option<CornerXml>,
    #[serde(rename = "lowerLeftCorner")]
    lower_left_corner: Option<CornerXml>,
    #[serde(rename = "lowerRightCorner")]
    lower_right_corner: Option<CornerXml>,
}

#[derive(Debug, Deserialize)]
struct CornerXml {
    #[serde(rename = "mapCoordinate")]
    map_coordinate: Option<MapCoordinateXml>,
}

#[derive(Debug, Deserialize)]
struct MapCoordinateXml {
    easting: Option<String>,
    northing: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UtmProjectionParametersXml {
    #[serde(rename = "utmZone")]
    utm_zone: Option<String>,
    hemisphere: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NspProjectionParametersXml {
    #[serde(rename = "mapOriginFalseEasting")]
    map_origin_false_easting: Option<String>,
    #[serde(rename = "mapOriginFalseNorthing")]
    map_origin_false_northing: Option<String>,
    #[serde(rename = "centerOfProjectionLongitude")]
    center_of_projection_longitude: Option<String>,
    #[serde(rename = "centerOfProjectionLatitude")]
    center_of_projection_latitude: Option<String>,
    #[serde(rename = "standardParallels1")]
    standard_parallels1: Option<String>,
    #[serde(rename = "standardParallels2")]
    standard_parallels2: Option<String>,
    zone: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RationalFunctionsXml {
    #[serde(rename = "biasError")]
    bias_error: Option<String>,
    #[serde(rename = "randomError")]
    random_error: Option<String>,
    #[serde(rename = "lineOffset")]
    line_offset: Option<String>,
    #[serde(rename = "pixelOffset")]
    pixel_offset: Option<String>,
    #[serde(rename = "latitudeOffset")]
    latitude_offset: Option<String>,
    #[serde(rename = "longitudeOffset")]
    longitude_offset: Option<String>,
    #[serde(rename = "heightOffset")]
    height_offset: Option<String>,
    #[serde(rename = "lineScale")]
    line_scale: Option<String>,
    #[serde(rename = "pixelScale")]
    pixel_scale: Option<String>,
    #[serde(rename = "latitudeScale")]
    latitude_scale: Option<String>,
    #[serde(rename = "longitudeScale")]
    longitude_scale: Option<String>,
    #[serde(rename = "heightScale")]
    height_scale: Option<String>,
    #[serde(rename = "lineNumeratorCoefficients")]
    line_numerator_coefficients: Option<String>,
    #[serde(rename = "lineDenominatorCoefficients")]
    line_denominator_coefficients: Option<String>,
    #[serde(rename = "pixelNumeratorCoefficients")]
    pixel_numerator_coefficients: Option<String>,
    #[serde(rename = "pixelDenominatorCoefficients")]
    pixel_denominator_coefficients: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SceneAttributesXml {
    #[serde(rename = "numberOfEntries")]
    number_of_entries: Option<String>,
    #[serde(rename = "imageAttributes")]
    image_attributes: Option<ImageAttributesXml>,
}

#[derive(Debug, Deserialize)]
struct ImageAttributesXml {
    #[serde(rename = "samplesPerLine")]
    samples_per_line: Option<String>,
    #[serde(rename = "numLines")]
    num_lines: Option<String>,
    #[serde(rename = "incAngNearRng")]
    inc_ang_near_rng: Option<String>,
    #[serde(rename = "incAngFarRng")]
    inc_ang_far_rng: Option<String>,
    #[serde(rename = "slantRangeNearEdge")]
    slant_range_near_edge: Option<String>,
    #[serde(rename = "slantRangeFarEdge")]
    slant_range_far_edge: Option<String>,
    #[serde(rename = "ipdf", default)]
    ipdfs: Vec<IpdfXml>,
}

#[derive(Debug, Deserialize)]
struct IpdfXml {
    #[serde(rename = "@pole")]
    pole: Option<String>,
    #[serde(rename = "$text")]
    value: Option<String>,
}

// ---------------------------------------------------------------------------
// helpers
// ---------------------------------------------------------------------------

fn atoi(value: &Option<String>, default: i64) -> i64 {
    match value {
        Some(text) => text.trim().parse::<i64>().unwrap_or(default),
        None => default,
    }
}

fn atof(value: &Option<String>) -> f64 {
    value
        .as_deref()
        .and_then(|text| text.trim().parse::<f64>().ok())
        .unwrap_or(0.0)
}

fn item(value: &Option<String>, default: &str) -> String {
    value.clone().unwrap_or_else(|| default.to_string())
}

/// Replace either path separator with the host separator.
pub fn normalize_separators(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c == '/' || c == '\\' {
                std::path::MAIN_SEPARATOR
            } else {
                c
            }
        })
        .collect()
}

/// Cheap identification sniff: the root element must be `product` and
/// its `xmlns` attribute must mention the RCM schema.
pub fn is_rcm_product_xml(xml: &str) -> bool {
    let mut reader = quick_xml::Reader::from_str(xml);
    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => {
                let name = start.name();
                let local = name.local_name();
                if local.as_ref() != b"product" {
                    return false;
                }
                for attr in start.attributes().flatten() {
                    if attr.key.as_ref() == b"xmlns" {
                        let value = String::from_utf8_lossy(&attr.value);
                        return value.contains("rcm");
                    }
                }
                return false;
            }
            Ok(Event::Eof) | Err(_) => return false,
            Ok(_) => {}
        }
    }
}

// ---------------------------------------------------------------------------
// descriptor extraction
// ---------------------------------------------------------------------------

/// Parse a product.xml document into a [`ProductDescriptor`].
pub fn parse_product(xml: &str) -> RcmResult<ProductDescriptor> {
    if !is_rcm_product_xml(xml) {
        return Err(RcmError::NotRecognized(
            "root element is not an RCM <product>".into(),
        ));
    }

    let doc: ProductXml = quick_xml::de::from_str(xml)
        .map_err(|e| RcmError::MalformedXml(format!("product.xml: {}", e)))?;

    if !doc.xmlns.as_deref().unwrap_or("").contains("rcm") {
        return Err(RcmError::NotRecognized(
            "product namespace is not the RCM schema".into(),
        ));
    }

    let scene = doc
        .scene_attributes
        .as_ref()
        .ok_or_else(|| RcmError::MalformedXml("missing <sceneAttributes>".into()))?;
    let image_attrs = scene
        .image_attributes
        .as_ref()
        .ok_or_else(|| RcmError::MalformedXml("missing <sceneAttributes.imageAttributes>".into()))?;
    let reference = doc
        .image_reference_attributes
        .as_ref()
        .ok_or_else(|| RcmError::MalformedXml("missing <imageReferenceAttributes>".into()))?;
    let generation = doc
        .image_generation_parameters
        .as_ref()
        .ok_or_else(|| RcmError::MalformedXml("missing <imageGenerationParameters>".into()))?;
    let source = doc
        .source_attributes
        .as_ref()
        .ok_or_else(|| RcmError::MalformedXml("missing <sourceAttributes>".into()))?;
    let radar = source
        .radar_parameters
        .as_ref()
        .ok_or_else(|| RcmError::MalformedXml("missing <radarParameters>".into()))?;

    let entries = atoi(&scene.number_of_entries, 0);
    if entries != 1 {
        return Err(RcmError::Unsupported(
            "only single-beam scenes are supported".into(),
        ));
    }

    let width = atoi(&image_attrs.samples_per_line, -1);
    let height = atoi(&image_attrs.num_lines, -1);
    if width <= 1 || height <= 1 {
        return Err(RcmError::BadGeometry(format!(
            "raster dimensions {}x{} are not sane",
            width, height
        )));
    }
    let width = width as usize;
    let height = height as usize;

    // Sample family.
    let raster = reference.raster_attributes.as_ref();
    let sample_type = raster
        .and_then(|r| r.sample_type.clone())
        .unwrap_or_default();
    let bits_per_sample = raster
        .map(|r| atoi(&r.bits_per_sample, 0))
        .unwrap_or(0);
    let (data_type, is_complex) = match (sample_type.as_str(), bits_per_sample) {
        ("Complex", 32) => (PixelType::CFloat32, true),
        ("Complex", 16) => (PixelType::CInt16, true),
        ("Magnitude Detected", 32) => (PixelType::Float32, false),
        ("Magnitude Detected", 16) => (PixelType::UInt16, false),
        _ => {
            return Err(RcmError::Unsupported(format!(
                "sampleType={:?} with bitsPerSample={} is not a supported configuration",
                sample_type, bits_per_sample
            )))
        }
    };

    let product_type = doc
        .image_generation_parameters
        .as_ref()
        .and_then(|g| g.general_processing_information.as_ref())
        .and_then(|g| g.product_type.clone())
        .unwrap_or_else(|| "UNK".to_string());
    // UNK, GCD and GCC products carry no usable calibration LUTs.
    let head = product_type.to_ascii_uppercase();
    let can_calibrate =
        !(head.starts_with("UNK") || head.starts_with("GCD") || head.starts_with("GCC"));

    let polarizations_raw = radar.polarizations.clone().unwrap_or_default();
    let polarizations: Vec<String> = polarizations_raw
        .split_whitespace()
        .map(|p| p.to_ascii_uppercase())
        .collect();
    if polarizations.is_empty() {
        return Err(RcmError::MalformedXml(
            "polarizations list is missing".into(),
        ));
    }

    // Walk the ipdf entries. A .NTF suffix means the single-NITF flavor
    // where one file carries every polarization.
    let mut image_files = Vec::new();
    let mut packaging = Packaging::OneFilePerPolarization;
    let mut image_file_count = 0usize;
    for ipdf in &image_attrs.ipdfs {
        let Some(filename) = ipdf.value.as_deref().filter(|v| !v.trim().is_empty()) else {
            continue;
        };
        let filename = filename.trim();
        image_file_count += 1;
        if filename.to_ascii_uppercase().ends_with(".NTF") {
            packaging = Packaging::SingleNitf;
            image_files.clear();
            image_files.push(ImageFileRef {
                pole: None,
                filename: normalize_separators(filename),
            });
            break;
        }
        let Some(pole) = ipdf.pole.as_deref().filter(|p| !p.is_empty()) else {
            // No pole and not a NITF: nothing to bind this file to.
            continue;
        };
        image_files.push(ImageFileRef {
            pole: Some(pole.to_ascii_uppercase()),
            filename: normalize_separators(filename),
        });
    }
    let one_file_per_pol =
        packaging == Packaging::OneFilePerPolarization && image_file_count == polarizations.len();

    let lut_files = reference
        .lookup_table_file_names
        .iter()
        .filter_map(|entry| {
            let pole = entry.pole.as_deref().filter(|p| !p.is_empty())?;
            let calibration_type = entry
                .sar_calibration_type
                .as_deref()
                .filter(|t| !t.is_empty())?;
            let filename = entry.value.as_deref().filter(|v| !v.trim().is_empty())?;
            Some(LutFileRef {
                pole: pole.to_ascii_uppercase(),
                calibration_type: calibration_type.to_string(),
                filename: normalize_separators(filename.trim()),
            })
        })
        .collect();

    let noise_files = reference
        .noise_level_file_names
        .iter()
        .filter_map(|entry| {
            let pole = entry.pole.as_deref().filter(|p| !p.is_empty())?;
            let filename = entry.value.as_deref().filter(|v| !v.trim().is_empty())?;
            Some(NoiseFileRef {
                pole: pole.to_ascii_uppercase(),
                filename: normalize_separators(filename.trim()),
            })
        })
        .collect();

    let incidence_angle_file = reference
        .incidence_angle_file_name
        .as_deref()
        .filter(|f| !f.trim().is_empty())
        .map(|f| normalize_separators(f.trim()));

    let sar_info = generation.sar_processing_information.as_ref();
    let lut_applied = sar_info
        .and_then(|s| s.lut_applied.clone())
        .unwrap_or_default();
    let per_polarization_scaling = sar_info
        .and_then(|s| s.per_polarization_scaling.as_deref())
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    let acquisition_start = source
        .raw_data_start_time
        .as_deref()
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|t| t.with_timezone(&Utc));

    let geographic = reference.geographic_information.as_ref();
    let map_projection = geographic.and_then(|g| g.map_projection.as_ref());

    let (geo_transform, geo_transform_valid) = map_projection
        .and_then(|mp| mp.positioning_information.as_ref())
        .map(|pos| compute_geo_transform(pos, width, height))
        .unwrap_or(([0.0, 1.0, 0.0, 0.0, 0.0, 1.0], false));

    let (projection, gcp_projection) =
        build_projections(geographic, map_projection, geo_transform_valid);

    let gcps = geographic
        .and_then(|g| g.geolocation_grid.as_ref())
        .map(extract_gcps)
        .unwrap_or_default();

    let rpc = geographic
        .and_then(|g| g.rational_functions.as_ref())
        .map(extract_rpc)
        .unwrap_or_default();

    let metadata = collect_metadata(&doc, &product_type, &polarizations_raw);

    Ok(ProductDescriptor {
        width,
        height,
        data_type,
        is_complex,
        bits_per_sample: bits_per_sample as u32,
        can_calibrate,
        product_type,
        polarizations,
        packaging,
        one_file_per_pol,
        image_files,
        lut_files,
        noise_files,
        incidence_angle_file,
        lut_applied,
        per_polarization_scaling,
        acquisition_start,
        geo_transform,
        geo_transform_valid,
        projection,
        gcp_projection,
        gcps,
        rpc,
        metadata,
    })
}

/// Affine transform from the UL/UR/BL corner map coordinates, validated
/// by reprojecting the BR corner with a quarter-pixel tolerance.
fn compute_geo_transform(
    pos: &PositioningInformationXml,
    width: usize,
    height: usize,
) -> (GeoTransform, bool) {
    let corner = |c: &Option<CornerXml>| -> (f64, f64) {
        let coord = c.as_ref().and_then(|c| c.map_coordinate.as_ref());
        (
            coord.map(|m| atof(&m.easting)).unwrap_or(0.0),
            coord.map(|m| atof(&m.northing)).unwrap_or(0.0),
        )
    };
    let (tl_x, tl_y) = corner(&pos.upper_left_corner);
    let (tr_x, tr_y) = corner(&pos.upper_right_corner);
    let (bl_x, bl_y) = corner(&pos.lower_left_corner);
    let (br_x, br_y) = corner(&pos.lower_right_corner);

    let w = width as f64;
    let h = height as f64;
    let mut gt = [0.0f64; 6];
    gt[1] = (tr_x - tl_x) / (w - 1.0);
    gt[4] = (tr_y - tl_y) / (w - 1.0);
    gt[2] = (bl_x - tl_x) / (h - 1.0);
    gt[5] = (bl_y - tl_y) / (h - 1.0);
    gt[0] = tl_x - 0.5 * gt[1] - 0.5 * gt[2];
    gt[3] = tl_y - 0.5 * gt[4] - 0.5 * gt[5];

    let test_x = gt[0] + gt[1] * (w - 0.5) + gt[2] * (h - 0.5);
    let test_y = gt[3] + gt[4] * (w - 0.5) + gt[5] * (h - 0.5);

    // Quarter-pixel numerical leeway on either axis.
    let valid = (test_x - br_x).abs() <= (0.25 * (gt[1] + gt[2])).abs()
        && (test_y - br_y).abs() <= (0.25 * (gt[4] + gt[5])).abs();
    if !valid {
        log::warn!(
            "unexpected error in calculating affine transform: corner coordinates inconsistent"
        );
    }
    (gt, valid)
}

/// Opaque coordinate-system strings for the projected CS (when the map
/// projection is interpretable) and the geographic CS of the GCPs.
fn build_projections(
    geographic: Option<&GeographicInformationXml>,
    map_projection: Option<&MapProjectionXml>,
    have_geo_transform: bool,
) -> (Option<String>, String) {
    const WGS84: &str = "+proj=longlat +datum=WGS84 +no_defs";

    // Without an ellipsoid block the GCP coordinate system stays unset;
    // the WGS-84 fallback applies only to incomplete ellipsoid data.
    let Some(ellipsoid) = geographic.and_then(|g| g.ellipsoid_parameters.as_ref()) else {
        return (None, String::new());
    };

    let name = ellipsoid.ellipsoid_name.clone().unwrap_or_default();
    let major = atof(&ellipsoid.semi_major_axis);
    let minor = atof(&ellipsoid.semi_minor_axis);

    let geog = if name.is_empty() || major == 0.0 || minor == 0.0 {
        log::warn!("incomplete ellipsoid information, using WGS-84 parameters");
        WGS84.to_string()
    } else if name == "WGS84" || name == "WGS 1984" {
        WGS84.to_string()
    } else {
        let inv_flattening = major / (major - minor);
        format!(
            "+proj=longlat +a={} +rf={} +no_defs",
            major, inv_flattening
        )
    };

    let datum = if geog == WGS84 {
        "+datum=WGS84".to_string()
    } else {
        format!("+a={} +rf={}", major, major / (major - minor))
    };

    let mut projection = None;
    if let Some(mp) = map_projection {
        let descriptor = mp
            .map_projection_descriptor
            .clone()
            .unwrap_or_default()
            .to_ascii_uppercase();

        if let (Some(utm), true) = (mp.utm_projection_parameters.as_ref(), have_geo_transform) {
            let zone = atoi(&utm.utm_zone, 0);
            let south = utm
                .hemisphere
                .as_deref()
                .map(|h| h.to_ascii_lowercase().starts_with("southern"))
                .unwrap_or(false);
            if descriptor.starts_with("UTM") {
                let hemi = if south { " +south" } else { "" };
                projection = Some(format!(
                    "+proj=utm +zone={}{} {} +units=m +no_defs",
                    zone, hemi, datum
                ));
            }
        } else if let (Some(nsp), true) =
            (mp.nsp_projection_parameters.as_ref(), have_geo_transform)
        {
            let x0 = atof(&nsp.map_origin_false_easting);
            let y0 = atof(&nsp.map_origin_false_northing);
            let lon0 = atof(&nsp.center_of_projection_longitude);
            let lat0 = atof(&nsp.center_of_projection_latitude);
            let sp1 = atof(&nsp.standard_parallels1);
            let sp2 = atof(&nsp.standard_parallels2);

            if descriptor.starts_with("ARC") {
                // Albers Conical Equal Area.
                projection = Some(format!(
                    "+proj=aea +lat_1={} +lat_2={} +lat_0={} +lon_0={} +x_0={} +y_0={} {} +units=m +no_defs",
                    sp1, sp2, lat0, lon0, x0, y0, datum
                ));
            } else if descriptor.starts_with("LCC") {
                projection = Some(format!(
                    "+proj=lcc +lat_1={} +lat_2={} +lat_0={} +lon_0={} +x_0={} +y_0={} {} +units=m +no_defs",
                    sp1, sp2, lat0, lon0, x0, y0, datum
                ));
            } else if descriptor.starts_with("STPL") {
                // NAD83 state plane zones, USGS numbering.
                let zone = atoi(&nsp.zone, 1);
                projection = Some(format!("+proj=spcs +zone={} +datum=NAD83 +units=m", zone));
            }
        }

        if projection.is_none() && mp.positioning_information.is_some() {
            log::warn!(
                "unable to interpret projection information; check mapProjection in product.xml"
            );
        }
    }

    (projection, geog)
}

fn extract_gcps(grid: &GeolocationGridXml) -> Vec<Gcp> {
    grid.image_tie_points
        .iter()
        .enumerate()
        .map(|(idx, point)| {
            let image = point.image_coordinate.as_ref();
            let geodetic = point.geodetic_coordinate.as_ref();
            Gcp {
                id: (idx + 1).to_string(),
                pixel: image.map(|c| atof(&c.pixel)).unwrap_or(0.0),
                line: image.map(|c| atof(&c.line)).unwrap_or(0.0),
                longitude: geodetic.map(|c| atof(&c.longitude)).unwrap_or(0.0),
                latitude: geodetic.map(|c| atof(&c.latitude)).unwrap_or(0.0),
                height: geodetic.map(|c| atof(&c.height)).unwrap_or(0.0),
            }
        })
        .collect()
}

fn extract_rpc(rf: &RationalFunctionsXml) -> Vec<(String, String)> {
    let mapping: [(&str, &Option<String>); 16] = [
        ("ERR_BIAS", &rf.bias_error),
        ("ERR_RAND", &rf.random_error),
        ("LINE_OFF", &rf.line_offset),
        ("SAMP_OFF", &rf.pixel_offset),
        ("LAT_OFF", &rf.latitude_offset),
        ("LONG_OFF", &rf.longitude_offset),
        ("HEIGHT_OFF", &rf.height_offset),
        ("LINE_SCALE", &rf.line_scale),
        ("SAMP_SCALE", &rf.pixel_scale),
        ("LAT_SCALE", &rf.latitude_scale),
        ("LONG_SCALE", &rf.longitude_scale),
        ("HEIGHT_SCALE", &rf.height_scale),
        ("LINE_NUM_COEFF", &rf.line_numerator_coefficients),
        ("LINE_DEN_COEFF", &rf.line_denominator_coefficients),
        ("SAMP_NUM_COEFF", &rf.pixel_numerator_coefficients),
        ("SAMP_DEN_COEFF", &rf.pixel_denominator_coefficients),
    ];
    mapping
        .iter()
        .filter_map(|(key, value)| {
            value
                .as_ref()
                .map(|v| (key.to_string(), v.clone()))
        })
        .collect()
}

fn collect_metadata(
    doc: &ProductXml,
    product_type: &str,
    polarizations_raw: &str,
) -> Vec<(String, String)> {
    let mut items: Vec<(String, String)> = Vec::new();
    let mut push = |key: &str, value: String| items.push((key.to_string(), value));

    let generation = doc.image_generation_parameters.as_ref();
    let general = generation.and_then(|g| g.general_processing_information.as_ref());
    let sar_info = generation.and_then(|g| g.sar_processing_information.as_ref());
    let source = doc.source_attributes.as_ref();
    let radar = source.and_then(|s| s.radar_parameters.as_ref());
    let orbit = source
        .and_then(|s| s.orbit_and_attitude.as_ref())
        .and_then(|o| o.orbit_information.as_ref());
    let reference = doc.image_reference_attributes.as_ref();
    let raster = reference.and_then(|r| r.raster_attributes.as_ref());
    let geographic = reference.and_then(|r| r.geographic_information.as_ref());
    let map_projection = geographic.and_then(|g| g.map_projection.as_ref());
    let ellipsoid = geographic.and_then(|g| g.ellipsoid_parameters.as_ref());
    let image_attrs = doc
        .scene_attributes
        .as_ref()
        .and_then(|s| s.image_attributes.as_ref());

    push("PRODUCT_TYPE", product_type.to_string());
    push(
        "PRODUCT_ID",
        item(&doc.product_id, "UNK"),
    );
    push(
        "SECURITY_CLASSIFICATION",
        item(
            &doc.security_attributes
                .as_ref()
                .and_then(|s| s.security_classification.clone()),
            "UNK",
        ),
    );
    push(
        "POLARIZATION_DATA_MODE",
        item(
            &source.and_then(|s| s.polarization_data_mode.clone()),
            "UNK",
        ),
    );
    push(
        "PROCESSING_FACILITY",
        item(&general.and_then(|g| g.processing_facility.clone()), "UNK"),
    );
    push(
        "PROCESSING_TIME",
        item(&general.and_then(|g| g.processing_time.clone()), "UNK"),
    );
    push(
        "SATELLITE_HEIGHT",
        item(&sar_info.and_then(|s| s.satellite_height.clone()), "UNK"),
    );
    push(
        "FIRST_LINE_TIME",
        item(
            &sar_info.and_then(|s| s.zero_doppler_time_first_line.clone()),
            "UNK",
        ),
    );
    push(
        "LAST_LINE_TIME",
        item(
            &sar_info.and_then(|s| s.zero_doppler_time_last_line.clone()),
            "UNK",
        ),
    );
    push(
        "LUT_APPLIED",
        item(&sar_info.and_then(|s| s.lut_applied.clone()), ""),
    );
    push(
        "PER_POLARIZATION_SCALING",
        item(
            &sar_info.and_then(|s| s.per_polarization_scaling.clone()),
            "false",
        ),
    );
    push(
        "SAMPLE_TYPE",
        item(&raster.and_then(|r| r.sample_type.clone()), ""),
    );
    push(
        "DATA_TYPE",
        item(&raster.and_then(|r| r.data_type.clone()), ""),
    );
    push(
        "BITS_PER_SAMPLE",
        item(&raster.and_then(|r| r.bits_per_sample.clone()), ""),
    );
    push(
        "SAMPLED_PIXEL_SPACING_TIME",
        item(
            &raster.and_then(|r| r.sampled_pixel_spacing_time.clone()),
            "UNK",
        ),
    );
    push(
        "SAMPLED_LINE_SPACING_TIME",
        item(
            &raster.and_then(|r| r.sampled_line_spacing_time.clone()),
            "UNK",
        ),
    );
    push(
        "PIXEL_TIME_ORDERING",
        item(&raster.and_then(|r| r.pixel_time_ordering.clone()), "UNK"),
    );
    push(
        "LINE_TIME_ORDERING",
        item(&raster.and_then(|r| r.line_time_ordering.clone()), "UNK"),
    );
    push(
        "PIXEL_SPACING",
        item(&raster.and_then(|r| r.sampled_pixel_spacing.clone()), "UNK"),
    );
    push(
        "LINE_SPACING",
        item(&raster.and_then(|r| r.sampled_line_spacing.clone()), "UNK"),
    );
    push("POLARIZATIONS", polarizations_raw.to_string());
    push(
        "ACQUISITION_TYPE",
        item(&radar.and_then(|r| r.acquisition_type.clone()), "UNK"),
    );
    push("BEAMS", item(&radar.and_then(|r| r.beams.clone()), "UNK"));
    push(
        "SATELLITE_IDENTIFIER",
        item(&source.and_then(|s| s.satellite.clone()), ""),
    );
    push(
        "SENSOR_IDENTIFIER",
        item(&source.and_then(|s| s.sensor.clone()), ""),
    );
    push(
        "BEAM_MODE",
        item(&source.and_then(|s| s.beam_mode.clone()), "UNK"),
    );
    push(
        "BEAM_MODE_MNEMONIC",
        item(&source.and_then(|s| s.beam_mode_mnemonic.clone()), "UNK"),
    );
    push(
        "BEAM_MODE_DEFINITION_ID",
        item(
            &source.and_then(|s| s.beam_mode_definition_id.clone()),
            "UNK",
        ),
    );
    push(
        "ACQUISITION_START_TIME",
        item(&source.and_then(|s| s.raw_data_start_time.clone()), "UNK"),
    );
    push(
        "FACILITY_IDENTIFIER",
        item(
            &source.and_then(|s| s.input_dataset_facility_id.clone()),
            "UNK",
        ),
    );
    push(
        "ORBIT_DIRECTION",
        item(&orbit.and_then(|o| o.pass_direction.clone()), "UNK"),
    );
    push(
        "ORBIT_DATA_SOURCE",
        item(&orbit.and_then(|o| o.orbit_data_source.clone()), "UNK"),
    );
    push(
        "ORBIT_DATA_FILE",
        item(&orbit.and_then(|o| o.orbit_data_file_name.clone()), "UNK"),
    );
    push(
        "NEAR_RANGE_INCIDENCE_ANGLE",
        item(
            &image_attrs.and_then(|i| i.inc_ang_near_rng.clone()),
            "UNK",
        ),
    );
    push(
        "FAR_RANGE_INCIDENCE_ANGLE",
        item(&image_attrs.and_then(|i| i.inc_ang_far_rng.clone()), "UNK"),
    );
    push(
        "SLANT_RANGE_NEAR_EDGE",
        item(
            &image_attrs.and_then(|i| i.slant_range_near_edge.clone()),
            "UNK",
        ),
    );
    push(
        "SLANT_RANGE_FAR_EDGE",
        item(
            &image_attrs.and_then(|i| i.slant_range_far_edge.clone()),
            "UNK",
        ),
    );

    if let Some(mp) = map_projection {
        push(
            "MAP_PROJECTION_DESCRIPTOR",
            item(&mp.map_projection_descriptor, "UNK"),
        );
        push(
            "MAP_PROJECTION_ORIENTATION",
            item(&mp.map_projection_orientation, "UNK"),
        );
        push(
            "RESAMPLING_KERNEL",
            item(&mp.resampling_kernel, "UNK"),
        );
        push(
            "SATELLITE_HEADING",
            item(&mp.satellite_heading, "UNK"),
        );
    }
    if let Some(ellipsoid) = ellipsoid {
        push(
            "GEODETIC_TERRAIN_HEIGHT",
            item(&ellipsoid.geodetic_terrain_height, "UNK"),
        );
    }

    items
}

/// Quick lookup helper over the descriptor's metadata items.
pub fn metadata_map(descriptor: &ProductDescriptor) -> HashMap<String, String> {
    descriptor.metadata.iter().cloned().collect()
}
