//! I/O modules: descriptor parsing, calibration tables and image-file
//! access.

pub mod annotation;
pub mod calibration;
pub mod image;
