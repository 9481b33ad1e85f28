use plotters::prelude::*;
use std::path::Path;

use crate::ipc::HistorySeries;

/// Renders the "Voltage vs Time" view of a history snapshot as SVG.
pub fn render_history_chart(
    series: &HistorySeries,
    path: impl AsRef<Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let (first, last) = match (series.sequence.first(), series.sequence.last()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => return Err("history is empty, nothing to plot".into()),
    };

    let (mut lo, mut hi) = series
        .setpoint
        .iter()
        .chain(series.measured.iter())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
    let margin = ((hi - lo) * 0.1).max(0.1);
    lo -= margin;
    hi += margin;
    let x_end = if last > first { last } else { first + 1 };

    let root = SVGBackend::new(path.as_ref(), (800, 480)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Voltage vs Time", ("sans-serif", 24))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(first..x_end, lo..hi)?;

    chart
        .configure_mesh()
        .x_desc("Time (arb. units)")
        .y_desc("Voltage (V)")
        .draw()?;

    let setpoint_color = RGBColor(215, 48, 39);
    let measured_color = RGBColor(69, 117, 180);

    chart
        .draw_series(LineSeries::new(
            series.sequence.iter().copied().zip(series.setpoint.iter().copied()),
            &setpoint_color,
        ))?
        .label("SetPoint")
        .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &setpoint_color));

    chart
        .draw_series(LineSeries::new(
            series.sequence.iter().copied().zip(series.measured.iter().copied()),
            &measured_color,
        ))?
        .label("Current voltage")
        .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &measured_color));

    chart
        .configure_series_labels()
        .background_style(&WHITE)
        .border_style(&BLACK)
        .draw()?;

    root.present()?;
    Ok(())
}
