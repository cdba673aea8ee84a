//! SVG charts: training curves and confusion-matrix heatmaps

use crate::cnn::TrainingHistory;
use crate::core::{Label, Result, XRayError};
use crate::metrics::ConfusionMatrix;
use log::info;
use plotters::prelude::*;
use std::fmt::Debug;
use std::ops::Range;
use std::path::Path;

const CAPTION_FONT: (&str, u32) = ("sans-serif", 20);

fn plot_err<E: Debug>(e: E) -> XRayError {
    XRayError::Plot(format!("{e:?}"))
}

/// Accuracy (left) and loss (right) per epoch, training vs. validation
pub fn plot_training_curves(history: &TrainingHistory, path: &Path) -> Result<()> {
    if history.is_empty() {
        return Err(XRayError::Plot("training history is empty".into()));
    }

    let root = SVGBackend::new(path, (1000, 500)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;
    let (left, right) = root.split_horizontally(500);

    draw_curves(
        &left,
        "Training and Validation Accuracy",
        ("Training Accuracy", history.accuracy()),
        ("Validation Accuracy", history.val_accuracy()),
        SeriesLabelPosition::LowerRight,
    )?;
    draw_curves(
        &right,
        "Training and Validation Loss",
        ("Training Loss", history.loss()),
        ("Validation Loss", history.val_loss()),
        SeriesLabelPosition::UpperRight,
    )?;

    root.present().map_err(plot_err)?;
    info!("Training curves written to {}", path.display());
    Ok(())
}

fn draw_curves<DB: DrawingBackend>(
    area: &DrawingArea<DB, plotters::coord::Shift>,
    title: &str,
    (train_name, train): (&str, Vec<f64>),
    (val_name, val): (&str, Vec<f64>),
    legend_position: SeriesLabelPosition,
) -> Result<()> {
    let epochs = train.len().max(val.len()).max(2);
    let y_range = value_range(train.iter().chain(val.iter()).copied());

    let mut chart = ChartBuilder::on(area)
        .caption(title, CAPTION_FONT)
        .margin(10)
        .x_label_area_size(30)
        .y_label_area_size(50)
        .build_cartesian_2d(0f64..(epochs - 1) as f64, y_range)
        .map_err(plot_err)?;

    chart
        .configure_mesh()
        .x_desc("epoch")
        .draw()
        .map_err(plot_err)?;

    for (name, values, color) in [(train_name, &train, BLUE), (val_name, &val, RED)] {
        if values.is_empty() {
            continue;
        }
        chart
            .draw_series(LineSeries::new(
                values.iter().enumerate().map(|(i, &v)| (i as f64, v)),
                color.stroke_width(2),
            ))
            .map_err(plot_err)?
            .label(name)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
    }

    chart
        .configure_series_labels()
        .position(legend_position)
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()
        .map_err(plot_err)?;
    Ok(())
}

/// Padded y range covering every value
fn value_range(values: impl Iterator<Item = f64>) -> Range<f64> {
    let (min, max) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    if !min.is_finite() {
        return 0.0..1.0;
    }
    let pad = ((max - min) * 0.05).max(0.01);
    (min - pad)..(max + pad)
}

/// Annotated heatmap, actual classes on rows (healthy on top)
pub fn plot_confusion_matrix(matrix: &ConfusionMatrix, title: &str, path: &Path) -> Result<()> {
    let root = SVGBackend::new(path, (560, 500)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, CAPTION_FONT)
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(90)
        // Integer ranges are inclusive once segmented: 0..1 gives the two classes
        .build_cartesian_2d((0i32..1).into_segmented(), (0i32..1).into_segmented())
        .map_err(plot_err)?;

    // y grows upwards, row 0 is drawn at the top
    let class_name = |v: &SegmentValue<i32>, flip: bool| match v {
        SegmentValue::CenterOf(i) if (0..2).contains(i) => {
            let index = (if flip { 1 - *i } else { *i }) as usize;
            Label::CLASS_NAMES[index].to_string()
        }
        _ => String::new(),
    };

    chart
        .configure_mesh()
        .disable_mesh()
        .x_desc("Predicted label")
        .y_desc("True label")
        .x_label_formatter(&|v| class_name(v, false))
        .y_label_formatter(&|v| class_name(v, true))
        .draw()
        .map_err(plot_err)?;

    let max = matrix.counts.iter().flatten().copied().max().unwrap_or(0).max(1) as f64;
    let cells: Vec<(i32, i32, usize)> = (0..2)
        .flat_map(|row| (0..2).map(move |col| (row, col)))
        .map(|(row, col)| (row as i32, col as i32, matrix.counts[row][col]))
        .collect();

    chart
        .draw_series(cells.iter().map(|&(row, col, count)| {
            let y = 1 - row;
            Rectangle::new(
                [
                    (SegmentValue::Exact(col), SegmentValue::Exact(y)),
                    (cell_end(col), cell_end(y)),
                ],
                heat_color(count as f64 / max).filled(),
            )
        }))
        .map_err(plot_err)?;

    chart
        .draw_series(cells.iter().map(|&(row, col, count)| {
            let color = if count as f64 / max > 0.5 { WHITE } else { BLACK };
            Text::new(
                count.to_string(),
                (SegmentValue::CenterOf(col), SegmentValue::CenterOf(1 - row)),
                ("sans-serif", 24).into_font().color(&color),
            )
        }))
        .map_err(plot_err)?;

    root.present().map_err(plot_err)?;
    info!("Confusion matrix written to {}", path.display());
    Ok(())
}

/// Far edge of the cell starting at `i`
fn cell_end(i: i32) -> SegmentValue<i32> {
    if i + 1 >= 2 {
        SegmentValue::Last
    } else {
        SegmentValue::Exact(i + 1)
    }
}

/// White to dark blue
fn heat_color(t: f64) -> RGBColor {
    let t = t.clamp(0.0, 1.0);
    let lerp = |from: u8, to: u8| (from as f64 + (to as f64 - from as f64) * t).round() as u8;
    RGBColor(lerp(247, 8), lerp(251, 48), lerp(255, 107))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_range_pads() {
        let range = value_range([0.2, 0.8].into_iter());
        assert!(range.start < 0.2 && range.end > 0.8);

        let flat = value_range([0.5, 0.5].into_iter());
        assert!(flat.start < 0.5 && flat.end > 0.5);

        assert_eq!(value_range(std::iter::empty()), 0.0..1.0);
    }

    /// `(x, y, width, height)` of every filled, non-background `<rect>`
    fn cell_rects(svg: &str) -> Vec<(f64, f64, f64, f64)> {
        let attr = |tag: &str, name: &str| -> Option<String> {
            let key = format!(" {name}=\"");
            let start = tag.find(&key)? + key.len();
            let len = tag[start..].find('"')?;
            Some(tag[start..start + len].to_string())
        };
        let num = |tag: &str, name: &str| attr(tag, name).and_then(|v| v.parse::<f64>().ok());

        svg.split("<rect")
            .skip(1)
            .filter_map(|rest| {
                let tag = &rest[..rest.find('>')?];
                let fill = attr(tag, "fill")?.to_ascii_lowercase();
                if fill == "none" || fill == "#ffffff" {
                    return None;
                }
                Some((
                    num(tag, "x")?,
                    num(tag, "y")?,
                    num(tag, "width")?,
                    num(tag, "height")?,
                ))
            })
            .collect()
    }

    #[test]
    fn test_confusion_matrix_cells_fill_plot_area() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("cm.svg");
        let matrix = ConfusionMatrix {
            counts: [[5, 2], [3, 10]],
        };
        plot_confusion_matrix(&matrix, "Confusion matrix (test)", &path).unwrap();

        let svg = std::fs::read_to_string(&path).unwrap();
        let cells = cell_rects(&svg);
        assert_eq!(cells.len(), 4, "expected a 2x2 grid, got {cells:?}");

        let left = cells.iter().map(|c| c.0).fold(f64::INFINITY, f64::min);
        let top = cells.iter().map(|c| c.1).fold(f64::INFINITY, f64::min);
        let right = cells.iter().map(|c| c.0 + c.2).fold(0.0, f64::max);
        let bottom = cells.iter().map(|c| c.1 + c.3).fold(0.0, f64::max);

        // Plot area: 560x500 canvas, 20px margin, 90px y labels, 50px x labels
        assert!((left - 110.0).abs() <= 3.0, "left edge {left}");
        assert!((right - 540.0).abs() <= 3.0, "right edge {right}");
        assert!((bottom - 430.0).abs() <= 3.0, "bottom edge {bottom}");
        assert!(top < 80.0, "top band left empty, cells start at {top}");

        // Each cell covers a quarter of the grid
        for &(_, _, w, h) in &cells {
            assert!((w - (right - left) / 2.0).abs() <= 3.0, "cell width {w}");
            assert!((h - (bottom - top) / 2.0).abs() <= 3.0, "cell height {h}");
        }
    }

    #[test]
    fn test_heat_color_endpoints() {
        assert_eq!(heat_color(0.0), RGBColor(247, 251, 255));
        assert_eq!(heat_color(1.0), RGBColor(8, 48, 107));
        assert_eq!(heat_color(7.0), heat_color(1.0));
    }
}
