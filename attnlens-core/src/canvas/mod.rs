//! # Canvas
//!
//! Chart specifications and their conversion to Plotly figures for the
//! browser view.

pub mod components;
pub mod renderer;

pub use components::{BarSpec, ChartMargin, HeatmapSpec};
pub use renderer::{render_bar_figure, render_heatmap_figure};
