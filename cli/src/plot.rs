//! Rollout plots: one panel per state dimension with the realized values,
//! the predicted mean and the k_d·σ confidence band.
//!
//! The output format follows the file extension: `.svg` writes vector
//! output, anything else a bitmap.

use anyhow::{Context, Result};
use control_core::{DimensionTrace, RolloutHistory};
use plotters::coord::Shift;
use plotters::prelude::*;
use std::path::Path;

const DIM_NAMES: [&str; 3] = ["x", "y", "theta"];
const PANEL_SIZE: (u32, u32) = (1200, 400);
const MEAN_COLOR: RGBColor = RGBColor(30, 90, 200);

pub fn save_rollout_plot(history: &RolloutHistory, path: &Path) -> Result<()> {
    let size = (PANEL_SIZE.0, PANEL_SIZE.1 * history.dims.len().max(1) as u32);
    let svg = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("svg"));

    if svg {
        let root = SVGBackend::new(path, size).into_drawing_area();
        draw_panels(&root, history)?;
        root.present()
            .with_context(|| format!("writing plot {}", path.display()))?;
    } else {
        let root = BitMapBackend::new(path, size).into_drawing_area();
        draw_panels(&root, history)?;
        root.present()
            .with_context(|| format!("writing plot {}", path.display()))?;
    }
    Ok(())
}

fn draw_panels<DB>(root: &DrawingArea<DB, Shift>, history: &RolloutHistory) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    root.fill(&RGBColor(255, 255, 255))?;
    let panels = root.split_evenly((history.dims.len().max(1), 1));
    for (i, (panel, trace)) in panels.iter().zip(&history.dims).enumerate() {
        let name = DIM_NAMES.get(i).copied().unwrap_or("state");
        draw_trace(panel, trace, name, history.k_d)?;
    }
    Ok(())
}

fn draw_trace<DB>(
    area: &DrawingArea<DB, Shift>,
    trace: &DimensionTrace,
    name: &str,
    k_d: f64,
) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let (ymin, ymax) = value_range(trace);
    let xmax = trace.len().max(1) as f64;

    let mut chart = ChartBuilder::on(area)
        .margin(20)
        .caption(format!("{name}: actual vs predicted"), ("sans-serif", 24))
        .x_label_area_size(40)
        .y_label_area_size(70)
        .build_cartesian_2d(0f64..xmax, ymin..ymax)?;

    chart
        .configure_mesh()
        .x_desc("tick")
        .y_desc(name)
        .x_labels(10)
        .y_labels(6)
        .x_label_formatter(&|v| format!("{:.0}", v))
        .y_label_formatter(&|v| format!("{:.2}", v))
        .light_line_style(RGBColor(220, 220, 220).stroke_width(1))
        .draw()?;

    if trace.is_empty() {
        return Ok(());
    }

    let band_style = MEAN_COLOR.mix(0.2).filled();
    chart
        .draw_series(std::iter::once(Polygon::new(band_polygon(trace), band_style)))?
        .label(format!("mean ± {k_d}σ"))
        .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 20, y + 5)], band_style));

    chart
        .draw_series(LineSeries::new(
            trace.predicted_mean.iter().enumerate().map(|(k, v)| (k as f64, *v)),
            MEAN_COLOR.stroke_width(2),
        ))?
        .label("predicted mean")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], MEAN_COLOR.stroke_width(2)));

    chart
        .draw_series(
            trace
                .actual
                .iter()
                .enumerate()
                .map(|(k, v)| Circle::new((k as f64, *v), 2, BLACK.filled())),
        )?
        .label("actual")
        .legend(|(x, y)| Circle::new((x + 10, y), 3, BLACK.filled()));

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;
    Ok(())
}

/// Y range covering the band and the realized values, padded by 5%.
fn value_range(trace: &DimensionTrace) -> (f64, f64) {
    let values = trace.lower.iter().chain(&trace.upper).chain(&trace.actual);
    let (lo, hi) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
    if lo > hi {
        return (-1.0, 1.0);
    }
    let pad = 0.05 * (hi - lo).max(1e-9);
    (lo - pad, hi + pad)
}

/// Closed outline of the band: upper edge forward, lower edge back.
fn band_polygon(trace: &DimensionTrace) -> Vec<(f64, f64)> {
    let upper = trace.upper.iter().enumerate().map(|(k, v)| (k as f64, *v));
    let lower = trace.lower.iter().enumerate().rev().map(|(k, v)| (k as f64, *v));
    upper.chain(lower).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use control_core::State;

    fn history(ticks: usize) -> RolloutHistory {
        let mut h = RolloutHistory::new(1.5);
        for k in 0..ticks {
            let t = k as f64 * 0.1;
            h.record(
                &State::new(t, -t, 0.5 * t),
                &State::new(t + 0.01, -t, 0.5 * t),
                &State::repeat(0.02),
            );
        }
        h
    }

    #[test]
    fn range_covers_band_and_actual() {
        let h = history(5);
        let (lo, hi) = value_range(&h.dims[0]);
        let band_lo = h.dims[0].lower.iter().copied().fold(f64::INFINITY, f64::min);
        let band_hi = h.dims[0].upper.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        assert!(lo < band_lo && lo < 0.0);
        assert!(hi > band_hi && hi > 0.4);
    }

    #[test]
    fn range_of_empty_or_flat_trace_is_non_degenerate() {
        let empty = DimensionTrace::default();
        assert_eq!(value_range(&empty), (-1.0, 1.0));

        let h = {
            let mut h = RolloutHistory::new(0.0);
            h.record(&State::zeros(), &State::zeros(), &State::zeros());
            h
        };
        let (lo, hi) = value_range(&h.dims[0]);
        assert!(lo < hi);
    }

    #[test]
    fn band_outline_runs_upper_then_lower_reversed() {
        let h = history(3);
        let outline = band_polygon(&h.dims[1]);
        assert_eq!(outline.len(), 6);
        assert_eq!(outline[0], (0.0, h.dims[1].upper[0]));
        assert_eq!(outline[2], (2.0, h.dims[1].upper[2]));
        assert_eq!(outline[3], (2.0, h.dims[1].lower[2]));
        assert_eq!(outline[5], (0.0, h.dims[1].lower[0]));
    }

    #[test]
    fn writes_svg_with_all_panels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rollout.svg");
        save_rollout_plot(&history(20), &path).unwrap();
        let svg = std::fs::read_to_string(&path).unwrap();
        assert!(svg.contains("<svg"));
        // 20 realized points per panel.
        assert!(svg.matches("<circle").count() >= 3 * 20);
        assert!(svg.contains("<polygon"));
    }
}
