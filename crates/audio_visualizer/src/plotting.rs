use anyhow::ensure;
use log::info;
use plotters::prelude::*;
use std::path::Path;
use stft::Spectrogram;

/// Figure dimensions of a rendered spectrogram.
const FIG_WIDTH: u32 = 1200;
const FIG_HEIGHT: u32 = 600;

/// Width of the color bar strip on the right.
const BAR_WIDTH: u32 = 110;

/// Bottom of the decibel color scale. Matches the dynamic range of
/// [`Spectrogram::into_db_ref_max`].
const DB_FLOOR: f64 = -80.0;

/// Map a decibel value in `[-80, 0]` onto a hue sweep, quiet blue to loud red.
fn db_color(db: f64) -> HSLColor {
    let n = ((db - DB_FLOOR) / -DB_FLOOR).clamp(0.0, 1.0);
    HSLColor(0.7 * (1.0 - n), 1.0, 0.15 + 0.35 * n)
}

/// Plot a time vs log-frequency spectrogram with a decibel color bar.
///
/// `spectrogram` must already be scaled to decibels referenced to its
/// maximum, so values lie in `[-80, 0]`.
pub fn plot_spectrogram(
    spectrogram: &Spectrogram,
    sample_rate: f32,
    window_step: usize,
    file_out: &Path,
    title: &str,
) -> anyhow::Result<()> {
    ensure!(
        spectrogram.window_cnt() > 0 && spectrogram.bin_cnt() > 1,
        "cannot plot an empty spectrogram"
    );

    let nyquist = sample_rate / 2.0;
    let bin_width = nyquist / (spectrogram.bin_cnt() - 1) as f32;
    let step_secs = window_step as f32 / sample_rate;
    let duration = spectrogram.window_cnt() as f32 * step_secs;

    // Frequency band of bin b spans (b - 0.5)..(b + 0.5) bin widths. The DC
    // bin has no home on a log axis, so the plot starts at bin 1's lower edge.
    let f_low = bin_width / 2.0;
    let f_high = nyquist;

    let root = BitMapBackend::new(file_out, (FIG_WIDTH, FIG_HEIGHT)).into_drawing_area();
    root.fill(&WHITE)?;
    let (main, bar) = root.split_horizontally(FIG_WIDTH - BAR_WIDTH);

    let mut chart = ChartBuilder::on(&main)
        .caption(title, ("sans-serif", 30).into_font())
        .margin(5)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(0f32..duration, (f_low..f_high).log_scale())?;

    chart
        .configure_mesh()
        .disable_mesh()
        .x_desc("Time (s)")
        .y_desc("Frequency (Hz)")
        .draw()?;

    // Background sits at the bottom of the dynamic range so cells near the
    // floor can be skipped instead of drawn.
    chart.draw_series(std::iter::once(Rectangle::new(
        [(0.0, f_low), (duration, f_high)],
        db_color(DB_FLOOR).filled(),
    )))?;

    let cells = spectrogram.rows().enumerate().flat_map(|(window_idx, row)| {
        let t0 = window_idx as f32 * step_secs;
        let t1 = t0 + step_secs;
        row.iter()
            .enumerate()
            .skip(1)
            // Cells at the floor are already the background color.
            .filter(|(_, &db)| db > DB_FLOOR + 0.5)
            .map(move |(bin_idx, &db)| {
                let f0 = ((bin_idx as f32 - 0.5) * bin_width).max(f_low);
                let f1 = ((bin_idx as f32 + 0.5) * bin_width).min(f_high);
                Rectangle::new([(t0, f0), (t1, f1)], db_color(db).filled())
            })
    });
    chart.draw_series(cells)?;

    draw_color_bar(&bar)?;

    root.present()?;
    info!(
        "Successfully saved spectrogram to {}",
        file_out.display()
    );
    Ok(())
}

/// Vertical decibel legend for the color scale.
fn draw_color_bar(area: &DrawingArea<BitMapBackend<'_>, plotters::coord::Shift>) -> anyhow::Result<()> {
    let mut chart = ChartBuilder::on(area)
        .margin(5)
        .margin_top(40)
        .x_label_area_size(40)
        .y_label_area_size(55)
        .build_cartesian_2d(0f64..1f64, DB_FLOOR..0f64)?;

    chart
        .configure_mesh()
        .disable_mesh()
        .x_labels(0)
        .y_label_formatter(&|db| format!("{db:+.0} dB"))
        .draw()?;

    // 0.5 dB slices approximate a continuous gradient.
    chart.draw_series((0..160).map(|slice| {
        let db0 = DB_FLOOR + f64::from(slice) * 0.5;
        Rectangle::new([(0.0, db0), (1.0, db0 + 0.5)], db_color(db0 + 0.25).filled())
    }))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::db_color;

    #[test]
    fn color_scale_endpoints_are_distinct() {
        let floor = db_color(-80.0);
        let top = db_color(0.0);
        assert!((floor.0 - 0.7).abs() < 1e-9, "floor should sit at the blue end");
        assert!(top.0.abs() < 1e-9, "reference should sit at the red end");
    }

    #[test]
    fn color_scale_clamps_out_of_range_values() {
        assert_eq!(db_color(10.0).0, db_color(0.0).0);
        assert_eq!(db_color(-200.0).0, db_color(-80.0).0);
    }
}
