use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Affine geotransform, host-framework ordering:
/// `[origin_x, pixel_w, row_rot, origin_y, col_rot, pixel_h]`.
pub type GeoTransform = [f64; 6];

/// Error type for RCM product operations
#[derive(Debug, Error)]
pub enum RcmError {
    #[error("not an RCM product: {0}")]
    NotRecognized(String),

    #[error("the RCM reader does not support update access to existing datasets")]
    ReadOnly,

    #[error("malformed XML: {0}")]
    MalformedXml(String),

    #[error("non-sane scene geometry: {0}")]
    BadGeometry(String),

    #[error("unsupported product configuration: {0}")]
    Unsupported(String),

    #[error("cannot open sibling file {}", .0.display())]
    MissingSibling(PathBuf),

    #[error("the underlying band files do not have an appropriate data type")]
    IncompatibleBandFile,

    #[error("bad calibration look-up table: {0}")]
    BadLut(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal dispatch error: {0}")]
    Unreachable(&'static str),
}

/// Result type for RCM product operations
pub type RcmResult<T> = Result<T, RcmError>;

/// Element type of a raster sample, as reported by the underlying
/// raster framework and by this reader's bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelType {
    Byte,
    UInt16,
    Int16,
    UInt32,
    Int32,
    Float32,
    Float64,
    CInt16,
    CInt32,
    CFloat32,
    CFloat64,
}

impl PixelType {
    pub fn is_complex(self) -> bool {
        matches!(
            self,
            PixelType::CInt16 | PixelType::CInt32 | PixelType::CFloat32 | PixelType::CFloat64
        )
    }

    /// The real element type of one half of a complex pair, e.g.
    /// `CInt16 -> Int16`. `None` for real types.
    pub fn real_component(self) -> Option<PixelType> {
        match self {
            PixelType::CInt16 => Some(PixelType::Int16),
            PixelType::CInt32 => Some(PixelType::Int32),
            PixelType::CFloat32 => Some(PixelType::Float32),
            PixelType::CFloat64 => Some(PixelType::Float64),
            _ => None,
        }
    }
}

impl fmt::Display for PixelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PixelType::Byte => "Byte",
            PixelType::UInt16 => "UInt16",
            PixelType::Int16 => "Int16",
            PixelType::UInt32 => "UInt32",
            PixelType::Int32 => "Int32",
            PixelType::Float32 => "Float32",
            PixelType::Float64 => "Float64",
            PixelType::CInt16 => "CInt16",
            PixelType::CInt32 => "CInt32",
            PixelType::CFloat32 => "CFloat32",
            PixelType::CFloat64 => "CFloat64",
        };
        write!(f, "{}", name)
    }
}

/// Radiometric calibration view of a dataset.
///
/// `None` means no subdataset has been selected; the bands expose
/// uncalibrated digital numbers and the subdataset list is published.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Calibration {
    None,
    Uncalib,
    Sigma0,
    Beta0,
    Gamma,
}

impl Calibration {
    /// Layer tag used in subdataset references and LUT metadata.
    pub fn tag(self) -> Option<&'static str> {
        match self {
            Calibration::Sigma0 => Some("SIGMA0"),
            Calibration::Beta0 => Some("BETA0"),
            Calibration::Gamma => Some("GAMMA"),
            Calibration::Uncalib => Some("UNCALIB"),
            Calibration::None => None,
        }
    }

    /// The `sarCalibrationType` string used by the calibration XML files.
    pub fn sar_calibration_type(self) -> Option<&'static str> {
        match self {
            Calibration::Sigma0 => Some("Sigma Nought"),
            Calibration::Beta0 => Some("Beta Nought"),
            Calibration::Gamma => Some("Gamma"),
            _ => None,
        }
    }
}

impl fmt::Display for Calibration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag().unwrap_or("NONE"))
    }
}

/// How the bands of an underlying image file map onto one logical band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BandMapping {
    /// One native band passed straight through.
    Straight,
    /// Two real bands interpreted as the I and Q halves of one complex band.
    TwoBandComplex,
}

/// Packaging flavor of the image product data files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Packaging {
    /// One GeoTIFF per polarization, bound by the `pole` attribute.
    OneFilePerPolarization,
    /// A single NITF holding every polarization.
    SingleNitf,
}

/// Requested access mode when opening a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadOnly,
    Update,
}

/// Ground control point from the geolocation grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Gcp {
    pub id: String,
    pub pixel: f64,
    pub line: f64,
    pub longitude: f64,
    pub latitude: f64,
    pub height: f64,
}
