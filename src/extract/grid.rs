//! Radar rainfall grid aggregation.
//!
//! The upstream file API delivers the whole island as a comma-separated
//! row-major grid at 0.0125° resolution. That is far too dense to serve
//! to clients, so each 4×4 block is averaged down to one coarse cell.

use super::{ExtractError, value_f64};
use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

/// Side length of the square block averaged into one output cell.
const BLOCK_FACTOR: usize = 4;
/// Raw values at or below this are invalid source cells.
const INVALID_SENTINEL: f64 = -99.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridMetadata {
    pub start_lon: f64,
    pub start_lat: f64,
    pub res_lon: f64,
    pub res_lat: f64,
    pub dim_x: usize,
    pub dim_y: usize,
    /// Regenerated at aggregation time, not inherited from the source.
    pub timestamp: String,
}

/// Aggregated rainfall grid, serialized as the radar JSON artifact.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RadarGrid {
    pub metadata: GridMetadata,
    pub rainfall_grid: Vec<f64>,
}

/// Extracts and downsamples the radar rainfall grid from the raw file-API
/// payload.
///
/// Invalid cells (≤ −99.0) are excluded from both the block sum and the
/// divisor; a block with no valid cells averages to 0.0. Remainder rows
/// and columns on the high edge that do not fill a whole block are
/// dropped. Output cells are rounded to 2 decimal places.
pub fn extract_radar_rainfall(raw: &Value) -> Result<RadarGrid> {
    let dataset = raw
        .pointer("/cwaopendata/dataset")
        .ok_or(ExtractError::MissingKey("cwaopendata.dataset"))?;
    let content = dataset
        .pointer("/contents/content")
        .and_then(Value::as_str)
        .ok_or(ExtractError::MissingKey("dataset.contents.content"))?;
    let params = dataset
        .pointer("/datasetInfo/parameterSet")
        .ok_or(ExtractError::MissingKey("dataset.datasetInfo.parameterSet"))?;

    let start_lon = param_f64(params, "StartPointLongitude").unwrap_or(118.0);
    let start_lat = param_f64(params, "StartPointLatitude").unwrap_or(20.0);
    let res_lon = param_f64(params, "GridResolution").unwrap_or(0.0125);
    // The grid is square, so one resolution covers both axes.
    let res_lat = res_lon;
    let dim_x = param_f64(params, "GridDimensionX").unwrap_or(441.0) as usize;
    let dim_y = param_f64(params, "GridDimensionY").unwrap_or(561.0) as usize;

    let mut values = Vec::with_capacity(dim_x * dim_y);
    for token in content.split(',') {
        let v: f64 = token
            .trim()
            .parse()
            .map_err(|_| ExtractError::Malformed(format!("grid cell '{token}' is not numeric")))?;
        values.push(v);
    }
    if values.len() != dim_x * dim_y {
        return Err(ExtractError::Malformed(format!(
            "grid content has {} cells, expected {}x{}",
            values.len(),
            dim_x,
            dim_y
        ))
        .into());
    }

    let new_dim_x = dim_x / BLOCK_FACTOR;
    let new_dim_y = dim_y / BLOCK_FACTOR;
    let mut rainfall_grid = vec![0.0f64; new_dim_x * new_dim_y];

    for y in 0..new_dim_y {
        for x in 0..new_dim_x {
            let mut sum = 0.0;
            let mut valid = 0usize;
            for y_offset in 0..BLOCK_FACTOR {
                for x_offset in 0..BLOCK_FACTOR {
                    let source_x = x * BLOCK_FACTOR + x_offset;
                    let source_y = y * BLOCK_FACTOR + y_offset;
                    let v = values[source_y * dim_x + source_x];
                    if v > INVALID_SENTINEL {
                        sum += v;
                        valid += 1;
                    }
                }
            }
            let avg = if valid == 0 { 0.0 } else { sum / valid as f64 };
            rainfall_grid[y * new_dim_x + x] = round2(avg);
        }
    }

    info!(dim_x = new_dim_x, dim_y = new_dim_y, "radar grid aggregated");

    Ok(RadarGrid {
        metadata: GridMetadata {
            start_lon,
            start_lat,
            res_lon: res_lon * BLOCK_FACTOR as f64,
            res_lat: res_lat * BLOCK_FACTOR as f64,
            dim_x: new_dim_x,
            dim_y: new_dim_y,
            timestamp: Utc::now().to_rfc3339(),
        },
        rainfall_grid,
    })
}

fn param_f64(params: &Value, key: &str) -> Option<f64> {
    params.get(key).and_then(value_f64)
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
