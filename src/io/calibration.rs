//! Loaders for the per-polarization calibration XML files.
//!
//! RCM keeps one `lut` document per polarization and calibration kind,
//! one `noiseLevels` document per polarization, and optionally one
//! `incidenceAngles` document per product, all under the bundle's
//! `calibration/` folder. Each stores sparse tables that densify through
//! [`crate::core::lut::densify`].

use quick_xml::de::from_str;
use quick_xml::events::Event;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::core::lut::{densify, Lut};
use crate::types::{Calibration, RcmError, RcmResult};

#[derive(Debug, Deserialize)]
struct LutXml {
    offset: Option<f64>,
    #[serde(rename = "pixelFirstLutValue")]
    pixel_first_lut_value: i32,
    #[serde(rename = "stepSize")]
    step_size: i32,
    #[serde(rename = "numberOfValues")]
    number_of_values: i32,
    gains: String,
}

#[derive(Debug, Deserialize)]
struct NoiseLevelsXml {
    #[serde(rename = "referenceNoiseLevel", default)]
    reference_noise_levels: Vec<ReferenceNoiseLevelXml>,
}

#[derive(Debug, Deserialize)]
struct ReferenceNoiseLevelXml {
    #[serde(rename = "sarCalibrationType")]
    sar_calibration_type: String,
    #[serde(rename = "pixelFirstNoiseValue")]
    pixel_first_noise_value: i32,
    #[serde(rename = "stepSize")]
    step_size: i32,
    #[serde(rename = "numberOfValues")]
    number_of_values: i32,
    #[serde(rename = "noiseLevelValues")]
    noise_level_values: String,
}

#[derive(Debug, Deserialize)]
struct IncidenceAnglesXml {
    #[serde(rename = "pixelFirstAnglesValue")]
    pixel_first_angles_value: i32,
    #[serde(rename = "stepSize")]
    step_size: i32,
    #[serde(rename = "numberOfValues")]
    number_of_values: i32,
    #[serde(default)]
    angles: Vec<String>,
}

fn read_document<T: for<'de> Deserialize<'de>>(path: &Path) -> RcmResult<T> {
    let text =
        fs::read_to_string(path).map_err(|_| RcmError::MissingSibling(path.to_path_buf()))?;
    from_str(&text)
        .map_err(|e| RcmError::MalformedXml(format!("{}: {}", path.display(), e)))
}

fn parse_values(text: &str) -> RcmResult<Vec<f64>> {
    text.split_whitespace()
        .map(|tok| {
            tok.parse::<f64>()
                .map_err(|e| RcmError::MalformedXml(format!("bad numeric value {:?}: {}", tok, e)))
        })
        .collect()
}

/// Load a calibration gain LUT and densify it to cover `raster_width`
/// columns.
pub fn read_lut(path: &Path, raster_width: usize) -> RcmResult<Lut> {
    let doc: LutXml = read_document(path)?;

    if doc.number_of_values <= 0 {
        return Err(RcmError::BadLut(
            "number of values must be greater than zero".into(),
        ));
    }
    let values = parse_values(&doc.gains)?;
    if values.len() != doc.number_of_values as usize {
        return Err(RcmError::BadLut(format!(
            "numberOfValues says {} but {} gains are present",
            doc.number_of_values,
            values.len()
        )));
    }

    let gains = densify(
        &values,
        doc.step_size,
        doc.pixel_first_lut_value,
        raster_width,
    )?;
    Ok(Lut {
        offset: doc.offset.unwrap_or(0.0),
        gains,
    })
}

/// Load the noise table matching `calibration` from a `noiseLevels`
/// document. Absence of a matching `referenceNoiseLevel` child is not an
/// error; the band simply carries no noise table.
pub fn read_noise_levels(
    path: &Path,
    calibration: Calibration,
) -> RcmResult<Option<Vec<f64>>> {
    let Some(wanted) = calibration.sar_calibration_type() else {
        return Ok(None);
    };
    let doc: NoiseLevelsXml = read_document(path)?;

    for level in &doc.reference_noise_levels {
        if !level.sar_calibration_type.eq_ignore_ascii_case(wanted) {
            continue;
        }
        if level.number_of_values <= 0 {
            return Err(RcmError::BadLut(
                "number of noise values must be greater than zero".into(),
            ));
        }
        let values = parse_values(&level.noise_level_values)?;
        let table = densify(
            &values,
            level.step_size,
            level.pixel_first_noise_value,
            0,
        )?;
        return Ok(Some(table));
    }
    Ok(None)
}

/// Load the per-column incidence angle table. The document may split the
/// values across repeated `angles` elements.
pub fn read_incidence_angles(path: &Path) -> RcmResult<Vec<f64>> {
    let doc: IncidenceAnglesXml = read_document(path)?;

    if doc.number_of_values <= 0 {
        return Err(RcmError::BadLut(
            "number of angle values must be greater than zero".into(),
        ));
    }
    let joined = doc.angles.join(" ");
    let values = parse_values(&joined)?;
    densify(
        &values,
        doc.step_size,
        doc.pixel_first_angles_value,
        0,
    )
}

/// Cheap probe used while enumerating subdatasets: does the file exist
/// and parse as XML at all?
pub fn is_valid_xml_file(path: &Path) -> bool {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(_) => {
            log::warn!("failed to open the calibration file {}", path.display());
            return false;
        }
    };
    let mut reader = quick_xml::Reader::from_str(&text);
    loop {
        match reader.read_event() {
            Ok(Event::Eof) => return true,
            Err(e) => {
                log::warn!("failed to parse {}: {}", path.display(), e);
                return false;
            }
            Ok(_) => {}
        }
    }
}
