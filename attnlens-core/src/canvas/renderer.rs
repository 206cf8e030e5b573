//! Canvas server-side renderer.
//!
//! Converts component specs into Plotly figure objects (`{data, layout}`)
//! that the browser page hands straight to `Plotly.react`.

use serde_json::{Value, json};

use super::components::{BarSpec, HeatmapSpec};

/// Render a HeatmapSpec to a Plotly figure.
pub fn render_heatmap_figure(spec: &HeatmapSpec) -> Value {
    json!({
        "data": [{
            "type": "heatmap",
            "z": spec.z,
            "x": spec.x_labels,
            "y": spec.y_labels,
            "zmin": spec.zmin,
            "zmax": spec.zmax,
            "colorbar": { "title": { "text": spec.colorbar_title } },
        }],
        "layout": {
            "title": { "text": spec.title },
            "xaxis": { "title": { "text": spec.x_title }, "tickangle": spec.tick_angle },
            "yaxis": { "title": { "text": spec.y_title } },
        }
    })
}

/// Render a BarSpec to a Plotly figure.
pub fn render_bar_figure(spec: &BarSpec) -> Value {
    let mut layout = json!({
        "title": { "text": spec.title },
        "xaxis": { "title": { "text": spec.x_title }, "tickangle": spec.tick_angle },
        "yaxis": { "title": { "text": spec.y_title } },
    });
    if let Some(height) = spec.height {
        layout["height"] = json!(height);
    }
    if let Some(m) = &spec.margin {
        layout["margin"] = json!({ "l": m.l, "r": m.r, "t": m.t, "b": m.b });
    }

    json!({
        "data": [{
            "type": "bar",
            "x": spec.labels,
            "y": spec.values,
        }],
        "layout": layout,
    })
}

/// Escape HTML special characters.
pub(crate) fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use crate::canvas::components::ChartMargin;

    fn heatmap() -> HeatmapSpec {
        HeatmapSpec {
            title: "Head attention".into(),
            x_labels: vec!["[CLS]".into(), "hi".into()],
            y_labels: vec!["[CLS]".into(), "hi".into()],
            z: vec![vec![0.5, 0.5], vec![0.0, 1.0]],
            zmin: 0.0,
            zmax: 1.0,
            x_title: "Key tokens".into(),
            y_title: "Query tokens".into(),
            colorbar_title: "Attention".into(),
            tick_angle: 45,
        }
    }

    fn bar() -> BarSpec {
        BarSpec {
            title: "Attention from 'hi' to all tokens".into(),
            labels: vec!["[CLS]".into(), "hi".into()],
            values: vec![0.0, 1.0],
            x_title: "Tokens".into(),
            y_title: "Attention weight".into(),
            tick_angle: 45,
            height: None,
            margin: None,
        }
    }

    #[test]
    fn test_render_heatmap_figure() {
        let fig = render_heatmap_figure(&heatmap());
        assert_eq!(fig["data"][0]["type"], "heatmap");
        assert_eq!(fig["data"][0]["x"][0], "[CLS]");
        assert_eq!(fig["data"][0]["z"][1][1], 1.0);
        assert_eq!(fig["data"][0]["zmax"], 1.0);
        assert_eq!(fig["data"][0]["colorbar"]["title"]["text"], "Attention");
        assert_eq!(fig["layout"]["xaxis"]["title"]["text"], "Key tokens");
        assert_eq!(fig["layout"]["yaxis"]["title"]["text"], "Query tokens");
        assert_eq!(fig["layout"]["xaxis"]["tickangle"], 45);
    }

    #[test]
    fn test_render_bar_figure() {
        let fig = render_bar_figure(&bar());
        assert_eq!(fig["data"][0]["type"], "bar");
        assert_eq!(fig["data"][0]["x"][1], "hi");
        assert_eq!(fig["data"][0]["y"][1], 1.0);
        assert_eq!(
            fig["layout"]["title"]["text"],
            "Attention from 'hi' to all tokens"
        );
        assert!(fig["layout"].get("height").is_none());
        assert!(fig["layout"].get("margin").is_none());
    }

    #[test]
    fn test_render_bar_figure_with_size() {
        let mut spec = bar();
        spec.height = Some(200);
        spec.margin = Some(ChartMargin {
            l: 5,
            r: 5,
            t: 20,
            b: 5,
        });
        let fig = render_bar_figure(&spec);
        assert_eq!(fig["layout"]["height"], 200);
        assert_eq!(fig["layout"]["margin"]["t"], 20);
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html("<script>alert('xss')</script>"),
            "&lt;script&gt;alert(&#39;xss&#39;)&lt;/script&gt;"
        );
        assert_eq!(escape_html("a & b"), "a &amp; b");
        assert_eq!(escape_html("[CLS]"), "[CLS]");
    }
}
