//! Interface to the external raster framework.
//!
//! The reader does not decode GeoTIFF or NITF itself; it consumes an
//! opened image file through the [`ImageFile`] trait and leaves the
//! decoding to the host framework. [`MemoryImage`] is the bundled
//! in-memory implementation, mirroring the host framework's memory
//! driver, and backs the test suites.

use ndarray::{s, Array2};
use num_complex::{Complex, Complex32, Complex64};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::types::{BandMapping, PixelType, RcmError, RcmResult};

/// Rectangular pixel window, in absolute raster coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl Window {
    pub fn new(x: usize, y: usize, width: usize, height: usize) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// A 2-D block of samples in one of the supported element types.
///
/// Arrays are indexed `[row, column]`.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Byte(Array2<u8>),
    UInt16(Array2<u16>),
    Int16(Array2<i16>),
    UInt32(Array2<u32>),
    Int32(Array2<i32>),
    Float32(Array2<f32>),
    Float64(Array2<f64>),
    CInt16(Array2<Complex<i16>>),
    CInt32(Array2<Complex<i32>>),
    CFloat32(Array2<Complex32>),
    CFloat64(Array2<Complex64>),
}

macro_rules! for_each_block {
    ($self:expr, $arr:ident => $body:expr) => {
        match $self {
            Block::Byte($arr) => $body,
            Block::UInt16($arr) => $body,
            Block::Int16($arr) => $body,
            Block::UInt32($arr) => $body,
            Block::Int32($arr) => $body,
            Block::Float32($arr) => $body,
            Block::Float64($arr) => $body,
            Block::CInt16($arr) => $body,
            Block::CInt32($arr) => $body,
            Block::CFloat32($arr) => $body,
            Block::CFloat64($arr) => $body,
        }
    };
}

impl Block {
    pub fn pixel_type(&self) -> PixelType {
        match self {
            Block::Byte(_) => PixelType::Byte,
            Block::UInt16(_) => PixelType::UInt16,
            Block::Int16(_) => PixelType::Int16,
            Block::UInt32(_) => PixelType::UInt32,
            Block::Int32(_) => PixelType::Int32,
            Block::Float32(_) => PixelType::Float32,
            Block::Float64(_) => PixelType::Float64,
            Block::CInt16(_) => PixelType::CInt16,
            Block::CInt32(_) => PixelType::CInt32,
            Block::CFloat32(_) => PixelType::CFloat32,
            Block::CFloat64(_) => PixelType::CFloat64,
        }
    }

    /// `(rows, columns)` of the block.
    pub fn dim(&self) -> (usize, usize) {
        for_each_block!(self, arr => arr.dim())
    }

    /// Copy of a sub-window of the block.
    pub fn window(&self, w: Window) -> Block {
        for_each_block!(self, arr => {
            let view = arr.slice(s![w.y..w.y + w.height, w.x..w.x + w.width]);
            view.to_owned().into()
        })
    }

    /// Copy into the top-left corner of a zeroed `rows x cols` block.
    /// Used to pad edge reads out to a full block.
    pub fn embed(&self, rows: usize, cols: usize) -> Block {
        for_each_block!(self, arr => {
            let mut out = Array2::default((rows, cols));
            out.slice_mut(s![..arr.nrows(), ..arr.ncols()]).assign(arr);
            out.into()
        })
    }

    /// View real samples as `f32`. `None` for complex variants.
    pub fn to_f32(&self) -> Option<Array2<f32>> {
        match self {
            Block::Byte(a) => Some(a.mapv(|v| v as f32)),
            Block::UInt16(a) => Some(a.mapv(|v| v as f32)),
            Block::Int16(a) => Some(a.mapv(|v| v as f32)),
            Block::UInt32(a) => Some(a.mapv(|v| v as f32)),
            Block::Int32(a) => Some(a.mapv(|v| v as f32)),
            Block::Float32(a) => Some(a.clone()),
            Block::Float64(a) => Some(a.mapv(|v| v as f32)),
            _ => None,
        }
    }

    /// View complex samples as `Complex<f32>`. `None` for real variants.
    pub fn to_complex32(&self) -> Option<Array2<Complex32>> {
        match self {
            Block::CInt16(a) => Some(a.mapv(|v| Complex32::new(v.re as f32, v.im as f32))),
            Block::CInt32(a) => Some(a.mapv(|v| Complex32::new(v.re as f32, v.im as f32))),
            Block::CFloat32(a) => Some(a.clone()),
            Block::CFloat64(a) => Some(a.mapv(|v| Complex32::new(v.re as f32, v.im as f32))),
            _ => None,
        }
    }

    /// Pair two equally-typed real blocks into one pixel-interleaved
    /// complex block (`i` real half, `q` imaginary half).
    pub fn interleave_iq(i: &Block, q: &Block) -> RcmResult<Block> {
        if i.dim() != q.dim() {
            return Err(RcmError::Unreachable("I/Q halves differ in shape"));
        }
        match (i, q) {
            (Block::Int16(re), Block::Int16(im)) => {
                Ok(Block::CInt16(complex_zip(re, im)))
            }
            (Block::Int32(re), Block::Int32(im)) => {
                Ok(Block::CInt32(complex_zip(re, im)))
            }
            (Block::Float32(re), Block::Float32(im)) => {
                Ok(Block::CFloat32(complex_zip(re, im)))
            }
            (Block::Float64(re), Block::Float64(im)) => {
                Ok(Block::CFloat64(complex_zip(re, im)))
            }
            _ => Err(RcmError::Unreachable("I/Q halves are not a real pair")),
        }
    }
}

fn complex_zip<T: Copy>(re: &Array2<T>, im: &Array2<T>) -> Array2<Complex<T>> {
    let mut out = Vec::with_capacity(re.len());
    for (r, i) in re.iter().zip(im.iter()) {
        out.push(Complex::new(*r, *i));
    }
    Array2::from_shape_vec(re.dim(), out).expect("shape preserved by zip")
}

macro_rules! block_from_array {
    ($($elem:ty => $variant:ident),+ $(,)?) => {
        $(impl From<Array2<$elem>> for Block {
            fn from(arr: Array2<$elem>) -> Self {
                Block::$variant(arr)
            }
        })+
    };
}

block_from_array! {
    u8 => Byte,
    u16 => UInt16,
    i16 => Int16,
    u32 => UInt32,
    i32 => Int32,
    f32 => Float32,
    f64 => Float64,
    Complex<i16> => CInt16,
    Complex<i32> => CInt32,
    Complex32 => CFloat32,
    Complex64 => CFloat64,
}

/// An opened image file of the external raster framework.
///
/// Band indices are zero-based. A window read returns exactly
/// `window.width * window.height` samples in the band's native element
/// type; requests outside the raster extent are an error.
pub trait ImageFile {
    fn band_count(&self) -> usize;

    fn pixel_type(&self, band: usize) -> RcmResult<PixelType>;

    /// `(width, height)` of the raster.
    fn size(&self) -> (usize, usize);

    /// Natural `(width, height)` tiling of the file.
    fn block_size(&self) -> (usize, usize);

    fn read_window(&self, band: usize, window: Window) -> RcmResult<Block>;
}

/// Opens image files by path, read-only.
pub trait ImageOpener {
    fn open(&self, path: &Path) -> RcmResult<Box<dyn ImageFile>>;
}

/// Classify how the bands of an opened image file map onto the logical
/// band of the requested element type.
///
/// NITF containers get an escape hatch: when no other rule matches the
/// file is passed straight through, because the NITF decoder may itself
/// have paired I/Q bands into complex ones. Two-band files whose halves
/// disagree in element type are rejected before the escape hatch.
pub fn probe_band_mapping(
    requested: PixelType,
    file: &dyn ImageFile,
    is_nitf: bool,
) -> RcmResult<BandMapping> {
    let count = file.band_count();
    let first = file.pixel_type(0)?;

    // One band (or a quad-pol four) of the right type passes straight through.
    if (count == 1 || count == 4) && requested == first {
        return Ok(BandMapping::Straight);
    }

    if count == 2 && requested.is_complex() {
        let second = file.pixel_type(1)?;
        // Both I/Q halves must share one element type, NITF or not.
        if first != second {
            return Err(RcmError::IncompatibleBandFile);
        }
        if requested.real_component() == Some(first) {
            return Ok(BandMapping::TwoBandComplex);
        }
        // Some NITF packings expose two bands that are themselves
        // already complex at the matching precision.
        if requested == first {
            return Ok(BandMapping::TwoBandComplex);
        }
    }

    if is_nitf {
        return Ok(BandMapping::Straight);
    }

    Err(RcmError::IncompatibleBandFile)
}

/// In-memory image file.
///
/// Every band is a [`Block`] of identical shape; clones share the
/// underlying storage so repeated opens of the same image are cheap.
#[derive(Debug, Clone)]
pub struct MemoryImage {
    bands: Arc<Vec<Block>>,
    block_size: (usize, usize),
}

impl MemoryImage {
    pub fn new(bands: Vec<Block>) -> RcmResult<Self> {
        let first = bands
            .first()
            .ok_or(RcmError::Unreachable("memory image needs at least one band"))?;
        let dim = first.dim();
        if bands.iter().any(|b| b.dim() != dim) {
            return Err(RcmError::Unreachable("memory image bands differ in shape"));
        }
        let (rows, cols) = dim;
        Ok(Self {
            bands: Arc::new(bands),
            block_size: (cols, rows),
        })
    }

    /// Override the natural tiling (defaults to one block spanning the
    /// whole raster).
    pub fn with_block_size(mut self, width: usize, height: usize) -> Self {
        self.block_size = (width, height);
        self
    }

    /// Number of live handles sharing this image's storage.
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.bands)
    }
}

impl ImageFile for MemoryImage {
    fn band_count(&self) -> usize {
        self.bands.len()
    }

    fn pixel_type(&self, band: usize) -> RcmResult<PixelType> {
        self.bands
            .get(band)
            .map(Block::pixel_type)
            .ok_or(RcmError::Unreachable("band index out of range"))
    }

    fn size(&self) -> (usize, usize) {
        let (rows, cols) = self.bands[0].dim();
        (cols, rows)
    }

    fn block_size(&self) -> (usize, usize) {
        self.block_size
    }

    fn read_window(&self, band: usize, window: Window) -> RcmResult<Block> {
        let block = self
            .bands
            .get(band)
            .ok_or(RcmError::Unreachable("band index out of range"))?;
        let (rows, cols) = block.dim();
        if window.x + window.width > cols || window.y + window.height > rows {
            return Err(RcmError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!(
                    "window {:?} outside raster {}x{}",
                    window, cols, rows
                ),
            )));
        }
        Ok(block.window(window))
    }
}

/// Path-keyed registry of [`MemoryImage`]s acting as the opener.
#[derive(Debug, Default)]
pub struct MemoryOpener {
    images: HashMap<PathBuf, MemoryImage>,
}

impl MemoryOpener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, image: MemoryImage) {
        self.images.insert(path.into(), image);
    }

    pub fn get(&self, path: &Path) -> Option<&MemoryImage> {
        self.images.get(path)
    }
}

impl ImageOpener for MemoryOpener {
    fn open(&self, path: &Path) -> RcmResult<Box<dyn ImageFile>> {
        self.images
            .get(path)
            .cloned()
            .map(|img| Box::new(img) as Box<dyn ImageFile>)
            .ok_or_else(|| RcmError::MissingSibling(path.to_path_buf()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BandMapping;

    fn image_of(bands: Vec<Block>) -> MemoryImage {
        MemoryImage::new(bands).unwrap()
    }

    #[test]
    fn straight_mapping_for_matching_single_band() {
        let img = image_of(vec![Block::UInt16(Array2::zeros((4, 4)))]);
        let mapping = probe_band_mapping(PixelType::UInt16, &img, false).unwrap();
        assert_eq!(mapping, BandMapping::Straight);
    }

    #[test]
    fn straight_mapping_for_quad_band_file() {
        let b = Block::CFloat32(Array2::zeros((2, 2)));
        let img = image_of(vec![b.clone(), b.clone(), b.clone(), b]);
        let mapping = probe_band_mapping(PixelType::CFloat32, &img, false).unwrap();
        assert_eq!(mapping, BandMapping::Straight);
    }

    #[test]
    fn two_real_bands_pair_into_complex() {
        let img = image_of(vec![
            Block::Int16(Array2::zeros((4, 4))),
            Block::Int16(Array2::zeros((4, 4))),
        ]);
        let mapping = probe_band_mapping(PixelType::CInt16, &img, false).unwrap();
        assert_eq!(mapping, BandMapping::TwoBandComplex);
    }

    #[test]
    fn two_complex_bands_accepted_at_matching_precision() {
        let img = image_of(vec![
            Block::CFloat32(Array2::zeros((4, 4))),
            Block::CFloat32(Array2::zeros((4, 4))),
        ]);
        let mapping = probe_band_mapping(PixelType::CFloat32, &img, false).unwrap();
        assert_eq!(mapping, BandMapping::TwoBandComplex);
    }

    #[test]
    fn mismatched_halves_are_rejected() {
        let img = image_of(vec![
            Block::Int16(Array2::zeros((4, 4))),
            Block::Float32(Array2::zeros((4, 4))),
        ]);
        let err = probe_band_mapping(PixelType::CInt16, &img, false).unwrap_err();
        assert!(matches!(err, RcmError::IncompatibleBandFile));
    }

    #[test]
    fn mismatched_halves_beat_the_nitf_escape_hatch() {
        let img = image_of(vec![
            Block::Int16(Array2::zeros((4, 4))),
            Block::Float32(Array2::zeros((4, 4))),
        ]);
        let err = probe_band_mapping(PixelType::CInt16, &img, true).unwrap_err();
        assert!(matches!(err, RcmError::IncompatibleBandFile));
    }

    #[test]
    fn nitf_escape_hatch_passes_straight_through() {
        let img = image_of(vec![Block::CFloat32(Array2::zeros((4, 4)))]);
        let mapping = probe_band_mapping(PixelType::CInt16, &img, true).unwrap();
        assert_eq!(mapping, BandMapping::Straight);
    }

    #[test]
    fn window_read_returns_exact_shape() {
        let data = Array2::from_shape_fn((4, 6), |(r, c)| (r * 10 + c) as u16);
        let img = image_of(vec![Block::UInt16(data)]);
        let block = img
            .read_window(0, Window::new(2, 1, 3, 2))
            .unwrap();
        match block {
            Block::UInt16(arr) => {
                assert_eq!(arr.dim(), (2, 3));
                assert_eq!(arr[[0, 0]], 12);
                assert_eq!(arr[[1, 2]], 24);
            }
            other => panic!("unexpected block type {:?}", other.pixel_type()),
        }
    }

    #[test]
    fn out_of_range_window_is_an_io_error() {
        let img = image_of(vec![Block::Byte(Array2::zeros((4, 4)))]);
        let err = img.read_window(0, Window::new(2, 2, 4, 4)).unwrap_err();
        assert!(matches!(err, RcmError::Io(_)));
    }

    #[test]
    fn interleave_pairs_real_blocks() {
        let re = Block::Float32(Array2::from_elem((1, 2), 3.0));
        let im = Block::Float32(Array2::from_elem((1, 2), 4.0));
        match Block::interleave_iq(&re, &im).unwrap() {
            Block::CFloat32(arr) => {
                assert_eq!(arr[[0, 0]], Complex32::new(3.0, 4.0));
                assert_eq!(arr[[0, 1]], Complex32::new(3.0, 4.0));
            }
            other => panic!("unexpected block type {:?}", other.pixel_type()),
        }
    }
}
