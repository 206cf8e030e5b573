//! Canvas component specifications.
//!
//! Structured specs for the heatmap and bar charts that the renderer converts
//! to Plotly figures for display.

use serde::{Deserialize, Serialize};

/// Heatmap specification for one attention head.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatmapSpec {
    pub title: String,
    /// Column labels (key tokens).
    pub x_labels: Vec<String>,
    /// Row labels (query tokens).
    pub y_labels: Vec<String>,
    /// Cell values, `z[row][col]`.
    pub z: Vec<Vec<f32>>,
    pub zmin: f32,
    pub zmax: f32,
    pub x_title: String,
    pub y_title: String,
    pub colorbar_title: String,
    #[serde(default = "default_tick_angle")]
    pub tick_angle: i32,
}

/// Bar chart specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarSpec {
    pub title: String,
    pub labels: Vec<String>,
    pub values: Vec<f32>,
    pub x_title: String,
    pub y_title: String,
    #[serde(default = "default_tick_angle")]
    pub tick_angle: i32,
    /// Fixed height in pixels; `None` lets the display surface decide.
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub margin: Option<ChartMargin>,
}

/// Plot margins in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartMargin {
    pub l: u32,
    pub r: u32,
    pub t: u32,
    pub b: u32,
}

fn default_tick_angle() -> i32 {
    45
}

impl BarSpec {
    /// Small-multiple variant used in the head comparison grid.
    pub fn compact(mut self) -> Self {
        self.height = Some(200);
        self.margin = Some(ChartMargin {
            l: 5,
            r: 5,
            t: 20,
            b: 5,
        });
        self
    }
}
