//! Sparse-to-dense expansion of calibration gain tables.
//!
//! The calibration XML files store a sparse list of values plus a
//! `stepSize` / `pixelFirstLutValue` addressing rule: raw value `k` sits
//! at range sample `pixelFirst + k * stepSize`. The reader densifies the
//! list into one value per raster column up front so the read pipeline
//! can index by absolute column.

use crate::types::{RcmError, RcmResult};

/// A densified calibration look-up table.
#[derive(Debug, Clone, PartialEq)]
pub struct Lut {
    /// Additive offset applied to squared detected samples.
    pub offset: f64,
    /// One gain per raster column.
    pub gains: Vec<f64>,
}

impl Lut {
    pub fn len(&self) -> usize {
        self.gains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gains.is_empty()
    }

    /// Gain for an absolute column index.
    pub fn gain(&self, pixel: usize) -> f64 {
        self.gains[pixel]
    }

    /// Narrow the table to `width` entries starting at `offset`.
    ///
    /// The offset is clamped to zero and the width is clamped so the
    /// slice stays inside the table. Returns `None` when the clamped
    /// request selects nothing; the table is left untouched either way.
    pub fn narrowed(&self, offset: isize, width: usize) -> Option<Lut> {
        let offset = offset.max(0) as usize;
        if offset >= self.gains.len() {
            return None;
        }
        let mut width = width;
        if offset + width > self.gains.len() - 1 {
            width = self.gains.len() - offset - 1;
        }
        if width == 0 {
            return None;
        }
        Some(Lut {
            offset: self.offset,
            gains: self.gains[offset..offset + width].to_vec(),
        })
    }
}

/// Expand a sparse value list into a dense per-column table.
///
/// The table length is `|step_size| * values.len()`. Columns before
/// `pixel_first` take the first value, columns past the last sample
/// position take the last value, and columns between two sample
/// positions interpolate linearly. A negative `step_size` means the
/// range ordering is reversed: the same procedure runs on the reversed
/// list.
///
/// `min_len` is the raster width the table must cover; pass 0 to skip
/// the check.
pub fn densify(
    values: &[f64],
    step_size: i32,
    pixel_first: i32,
    min_len: usize,
) -> RcmResult<Vec<f64>> {
    if values.is_empty() {
        return Err(RcmError::BadLut(
            "number of values must be greater than zero".into(),
        ));
    }
    if step_size == 0 {
        return Err(RcmError::BadLut("step size must be non-zero".into()));
    }
    if step_size < 0 && pixel_first <= 0 {
        return Err(RcmError::BadLut(
            "first pixel must be positive when the product is descending".into(),
        ));
    }

    let table_size = step_size.unsigned_abs() as usize * values.len();
    if min_len > 0 && table_size < min_len {
        return Err(RcmError::BadLut(format!(
            "table of {} gains does not cover the full {}-pixel range",
            table_size, min_len
        )));
    }

    let mut vals = values.to_vec();
    if step_size < 0 {
        vals.reverse();
    }
    let step = step_size.unsigned_abs() as i64;
    let first = pixel_first as i64;
    let len = table_size as i64;

    let mut table = vec![0.0; table_size];

    // Columns ahead of the first sample position.
    for idx in 0..first.min(len).max(0) {
        table[idx as usize] = vals[0];
    }

    // Interpolated interior segments.
    for k in 0..vals.len().saturating_sub(1) {
        let p0 = first + k as i64 * step;
        let p1 = p0 + step;
        let lo = p0.max(0);
        let hi = p1.min(len);
        for idx in lo..hi {
            let frac = (idx - p0) as f64 / step as f64;
            table[idx as usize] = vals[k] + (vals[k + 1] - vals[k]) * frac;
        }
    }

    // Columns at and past the last sample position.
    let last = first + (vals.len() as i64 - 1) * step;
    for idx in last.max(0)..len {
        table[idx as usize] = vals[vals.len() - 1];
    }

    Ok(table)
}

/// Space-separated scientific-notation rendering of a gain table, for
/// the `LUT_GAINS_n` metadata items. Tables routinely run past 10^4
/// entries, so the buffer grows on demand.
pub fn format_gains(gains: &[f64]) -> String {
    let mut out = String::with_capacity(gains.len() * 16);
    for gain in gains {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(&format!("{:e}", gain));
    }
    out
}
