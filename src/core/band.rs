//! Raster bands and the tiled block-read pipeline.
//!
//! A band is either a pass-through of the underlying image file
//! ([`RawBand`]) or a calibrated view ([`CalibBand`]) applying the
//! per-column gain table to every sample. The two share one contract
//! through the [`RcmBand`] variant; dispatch is by pattern matching.

use ndarray::Array2;
use num_complex::Complex32;
use std::path::{Path, PathBuf};

use crate::core::lut::Lut;
use crate::io::image::{Block, ImageFile, Window};
use crate::types::{BandMapping, Calibration, PixelType, RcmError, RcmResult};

/// Clip a block request against the raster extent.
///
/// Returns the window actually covered by the raster; the caller zero
/// pads the remainder of the block.
fn clipped_window(
    block_x: usize,
    block_y: usize,
    block_size: (usize, usize),
    raster_size: (usize, usize),
) -> RcmResult<Window> {
    let (blk_w, blk_h) = block_size;
    let (width, height) = raster_size;
    let x = block_x * blk_w;
    let y = block_y * blk_h;
    if x >= width || y >= height {
        debug_assert!(false, "block ({}, {}) outside raster", block_x, block_y);
        return Err(RcmError::Unreachable("block origin outside raster"));
    }
    let request_w = if x + blk_w > width { width - x } else { blk_w };
    let request_h = if y + blk_h > height { height - y } else { blk_h };
    Ok(Window::new(x, y, request_w, request_h))
}

/// Uncalibrated band: digital numbers straight from the image file.
pub struct RawBand {
    pole: String,
    data_type: PixelType,
    mapping: BandMapping,
    /// Band of the underlying file this band reads (zero-based). The
    /// single-NITF flavor binds each polarization to its own band of
    /// the one file.
    source_band: usize,
    is_nitf: bool,
    band_file: Box<dyn ImageFile>,
    block_size: (usize, usize),
    raster_size: (usize, usize),
}

impl std::fmt::Debug for RawBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawBand")
            .field("pole", &self.pole)
            .field("data_type", &self.data_type)
            .field("mapping", &self.mapping)
            .field("source_band", &self.source_band)
            .field("is_nitf", &self.is_nitf)
            .field("block_size", &self.block_size)
            .field("raster_size", &self.raster_size)
            .finish()
    }
}

impl RawBand {
    pub fn new(
        pole: &str,
        data_type: PixelType,
        mapping: BandMapping,
        source_band: usize,
        is_nitf: bool,
        band_file: Box<dyn ImageFile>,
        raster_size: (usize, usize),
    ) -> Self {
        let block_size = band_file.block_size();
        Self {
            pole: pole.to_string(),
            data_type,
            mapping,
            source_band,
            is_nitf,
            band_file,
            block_size,
            raster_size,
        }
    }

    fn read_block(&self, block_x: usize, block_y: usize) -> RcmResult<Block> {
        let window = clipped_window(block_x, block_y, self.block_size, self.raster_size)?;
        let (blk_w, blk_h) = self.block_size;

        let data = match (self.mapping, self.is_nitf) {
            // Two real bands pixel-interleave into one complex band.
            (BandMapping::TwoBandComplex, false) => {
                let i = self.band_file.read_window(0, window)?;
                let q = self.band_file.read_window(1, window)?;
                Block::interleave_iq(&i, &q)?
            }
            // The NITF decoder already paired I/Q into a native complex band.
            (BandMapping::TwoBandComplex, true) => {
                self.band_file.read_window(self.source_band, window)?
            }
            (BandMapping::Straight, _) => {
                self.band_file.read_window(self.source_band, window)?
            }
        };
        Ok(data.embed(blk_h, blk_w))
    }
}

/// Calibrated band: reads raw samples at the original element type and
/// applies the gain table, reporting `Float32` (`CFloat32` for complex
/// sources).
pub struct CalibBand {
    pole: String,
    calibration: Calibration,
    /// Element type reported to callers.
    data_type: PixelType,
    /// Element type of the underlying samples, which selects the read
    /// formula.
    original_type: PixelType,
    source_band: usize,
    band_file: Box<dyn ImageFile>,
    lut: Lut,
    noise_levels: Option<Vec<f64>>,
    lut_file: PathBuf,
    noise_file: Option<PathBuf>,
    block_size: (usize, usize),
    raster_size: (usize, usize),
}

impl std::fmt::Debug for CalibBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CalibBand")
            .field("pole", &self.pole)
            .field("calibration", &self.calibration)
            .field("data_type", &self.data_type)
            .field("original_type", &self.original_type)
            .field("source_band", &self.source_band)
            .field("noise_levels", &self.noise_levels)
            .field("lut_file", &self.lut_file)
            .field("noise_file", &self.noise_file)
            .field("block_size", &self.block_size)
            .field("raster_size", &self.raster_size)
            .finish()
    }
}

impl CalibBand {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pole: &str,
        calibration: Calibration,
        original_type: PixelType,
        source_band: usize,
        band_file: Box<dyn ImageFile>,
        lut: Lut,
        noise_levels: Option<Vec<f64>>,
        lut_file: PathBuf,
        noise_file: Option<PathBuf>,
        raster_size: (usize, usize),
    ) -> Self {
        let data_type = if original_type.is_complex() {
            PixelType::CFloat32
        } else {
            PixelType::Float32
        };
        let block_size = band_file.block_size();
        Self {
            pole: pole.to_string(),
            calibration,
            data_type,
            original_type,
            source_band,
            band_file,
            lut,
            noise_levels,
            lut_file,
            noise_file,
            block_size,
            raster_size,
        }
    }

    pub fn lut(&self) -> &Lut {
        &self.lut
    }

    pub fn calibration(&self) -> Calibration {
        self.calibration
    }

    /// Layer tag of the calibration kind (`SIGMA0`, ...).
    pub fn calibration_tag(&self) -> Option<&'static str> {
        self.calibration.tag()
    }

    /// Replace the gain table with a narrowed copy. Returns false when
    /// the clamped request selects nothing and the table is left as is.
    pub fn narrow_lut(&mut self, pixel_offset: isize, pixel_width: usize) -> bool {
        match self.lut.narrowed(pixel_offset, pixel_width) {
            Some(lut) => {
                self.lut = lut;
                true
            }
            None => false,
        }
    }

    /// Read raw complex samples as `Complex<f32>`, pairing I/Q halves
    /// when the file stores them as two real bands.
    fn read_complex_window(&self, window: Window) -> RcmResult<Array2<Complex32>> {
        let block = if self.band_file.band_count() == 2 {
            let i = self.band_file.read_window(0, window)?;
            let q = self.band_file.read_window(1, window)?;
            Block::interleave_iq(&i, &q)?
        } else {
            self.band_file.read_window(self.source_band, window)?
        };
        block
            .to_complex32()
            .ok_or(RcmError::Unreachable("expected complex samples"))
    }

    fn read_real_window(&self, window: Window) -> RcmResult<Array2<f32>> {
        let block = self.band_file.read_window(self.source_band, window)?;
        block
            .to_f32()
            .ok_or(RcmError::Unreachable("expected real samples"))
    }

    fn read_block(&self, block_x: usize, block_y: usize) -> RcmResult<Block> {
        let window = clipped_window(block_x, block_y, self.block_size, self.raster_size)?;
        let (blk_w, blk_h) = self.block_size;
        let first_column = block_x * blk_w;

        match self.original_type {
            PixelType::CInt16 | PixelType::CFloat32 | PixelType::CFloat64 => {
                let raw = self.read_complex_window(window)?;
                let mut out = Array2::from_elem((blk_h, blk_w), Complex32::new(0.0, 0.0));
                for ((row, col), sample) in raw.indexed_iter() {
                    let digital = sample.re * sample.re + sample.im * sample.im;
                    let gain = self.lut.gain(first_column + col) as f32;
                    out[[row, col]] = Complex32::new(digital / (gain * gain), 0.0);
                }
                Ok(Block::CFloat32(out))
            }
            PixelType::UInt16 | PixelType::Byte | PixelType::Float32 | PixelType::Float64 => {
                let raw = self.read_real_window(window)?;
                let offset = self.lut.offset as f32;
                let mut out = Array2::zeros((blk_h, blk_w));
                for ((row, col), &digital) in raw.indexed_iter() {
                    let gain = self.lut.gain(first_column + col) as f32;
                    out[[row, col]] = (digital * digital + offset) / gain;
                }
                Ok(Block::Float32(out))
            }
            _ => {
                debug_assert!(
                    false,
                    "no calibration read path for {}",
                    self.original_type
                );
                Err(RcmError::Unreachable("no calibration read path"))
            }
        }
    }
}

/// One published band of a [`crate::core::dataset::Product`].
#[derive(Debug)]
pub enum RcmBand {
    Raw(RawBand),
    Calibrated(CalibBand),
}

impl RcmBand {
    /// Polarization tag (`HH`, `HV`, ...).
    pub fn pole(&self) -> &str {
        match self {
            RcmBand::Raw(band) => &band.pole,
            RcmBand::Calibrated(band) => &band.pole,
        }
    }

    /// Element type reported to callers.
    pub fn data_type(&self) -> PixelType {
        match self {
            RcmBand::Raw(band) => band.data_type,
            RcmBand::Calibrated(band) => band.data_type,
        }
    }

    pub fn calibration(&self) -> Calibration {
        match self {
            RcmBand::Raw(_) => Calibration::Uncalib,
            RcmBand::Calibrated(band) => band.calibration,
        }
    }

    pub fn is_complex(&self) -> bool {
        self.data_type().is_complex()
    }

    /// `(width, height)` of one block.
    pub fn block_size(&self) -> (usize, usize) {
        match self {
            RcmBand::Raw(band) => band.block_size,
            RcmBand::Calibrated(band) => band.block_size,
        }
    }

    /// Read one full block at block coordinates. Blocks straddling the
    /// raster edge carry zeros past the covered extent.
    pub fn read_block(&self, block_x: usize, block_y: usize) -> RcmResult<Block> {
        match self {
            RcmBand::Raw(band) => band.read_block(block_x, block_y),
            RcmBand::Calibrated(band) => band.read_block(block_x, block_y),
        }
    }

    pub fn lut(&self) -> Option<&Lut> {
        match self {
            RcmBand::Raw(_) => None,
            RcmBand::Calibrated(band) => Some(&band.lut),
        }
    }

    pub fn lut_file(&self) -> Option<&Path> {
        match self {
            RcmBand::Raw(_) => None,
            RcmBand::Calibrated(band) => Some(&band.lut_file),
        }
    }

    pub fn noise_levels(&self) -> Option<&[f64]> {
        match self {
            RcmBand::Raw(_) => None,
            RcmBand::Calibrated(band) => band.noise_levels.as_deref(),
        }
    }

    pub fn noise_level(&self, pixel: usize) -> Option<f64> {
        self.noise_levels().and_then(|t| t.get(pixel).copied())
    }

    pub fn noise_file(&self) -> Option<&Path> {
        match self {
            RcmBand::Raw(_) => None,
            RcmBand::Calibrated(band) => band.noise_file.as_deref(),
        }
    }

    pub fn band_mapping(&self) -> BandMapping {
        match self {
            RcmBand::Raw(band) => band.mapping,
            RcmBand::Calibrated(band) => {
                if band.band_file.band_count() == 2 {
                    BandMapping::TwoBandComplex
                } else {
                    BandMapping::Straight
                }
            }
        }
    }
}
