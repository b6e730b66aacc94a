use realfft::RealFftPlanner;

/// Take normalized fft of real data and return magnitudes.
///
/// To get normalized results each element is scaled by `1/sqrt(length)`, so the
/// overall formula for an element is `|x/sqrt(length)|`.
pub fn scaled_real_fft(data: &mut [f64]) -> Vec<f64> {
    let scale_factor = 1.0 / (data.len() as f64).sqrt();
    real_fft(data).into_iter().map(|v| v * scale_factor).collect()
}

/// Take unnormalized fft of real data and return magnitudes.
/// `out.len() == data.len() / 2 + 1`
pub fn real_fft(data: &mut [f64]) -> Vec<f64> {
    let mut real_planner = RealFftPlanner::<f64>::new();

    let r2c = real_planner.plan_fft_forward(data.len());
    let mut spectrum = r2c.make_output_vec();

    // Only errors on length mismatch and the lengths come from the planner.
    r2c.process(data, &mut spectrum)
        .unwrap_or_else(|err| panic!("fft length invariant broken: {err}"));

    spectrum.iter().map(|v| v.norm()).collect()
}

/// Windowing functions useful for dtft analysis. See <https://en.wikipedia.org/wiki/Window_function> for details.
pub mod window_fn {
    pub type WindowFloat = f64;
    pub type WindowFn = fn(usize, usize) -> WindowFloat;
    use std::f64::consts::PI;

    /// Applies the given window function to the input data.
    pub fn apply_window(data: &mut [WindowFloat], window: WindowFn) {
        let data_len = data.len();
        for (i, elem) in data.iter_mut().enumerate() {
            *elem *= window(i, data_len);
        }
    }

    pub const fn rectangular(_n: usize, _samples: usize) -> WindowFloat {
        1.0
    }

    pub fn hann(n: usize, samples: usize) -> WindowFloat {
        const A0: WindowFloat = 0.5;
        A0 * (1.0
            - WindowFloat::cos((2.0 * PI * n as WindowFloat) / (samples as WindowFloat - 1.0)))
    }
}
