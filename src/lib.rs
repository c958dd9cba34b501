//! rcmdata: a reader for RADARSAT Constellation Mission (RCM) SAR
//! image products.
//!
//! A product is an on-disk bundle rooted at `product.xml`. The reader
//! exposes each polarimetric channel as a raster band, either as raw
//! digital numbers or radiometrically calibrated (Sigma Nought, Beta
//! Nought or Gamma) through the per-polarization look-up tables shipped
//! in the bundle's `calibration/` folder.
//!
//! Decoding the underlying GeoTIFF or NITF imagery is delegated to the
//! host raster framework through the [`ImageOpener`] / [`ImageFile`]
//! traits; the bundled [`MemoryOpener`] serves synthetic products.
//!
//! ```no_run
//! use rcmdata::{MemoryOpener, Product};
//!
//! let opener = MemoryOpener::new();
//! let product = Product::open("RCM_CALIB:SIGMA0:/data/rcm/product.xml", &opener)?;
//! for band in product.bands() {
//!     let block = band.read_block(0, 0)?;
//!     println!("{} {:?}", band.pole(), block.dim());
//! }
//! # Ok::<(), rcmdata::RcmError>(())
//! ```

pub mod core;
pub mod io;
pub mod types;

pub use crate::core::band::RcmBand;
pub use crate::core::dataset::Product;
pub use crate::core::lut::Lut;
pub use crate::io::image::{
    Block, ImageFile, ImageOpener, MemoryImage, MemoryOpener, Window,
};
pub use crate::types::{
    Access, BandMapping, Calibration, Gcp, GeoTransform, Packaging, PixelType, RcmError, RcmResult,
};
