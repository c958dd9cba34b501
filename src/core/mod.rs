//! Core dataset machinery: LUT densification, bands and the product
//! dataset.

pub mod band;
pub mod dataset;
pub mod lut;
