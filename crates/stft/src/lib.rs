//! Crate for finding the Short Time Fourier Transform of a real signal and
//! scaling it to decibels for spectrogram rendering.

use derive_more::{Add, Div, Mul, Sub};
use fft::window_fn::WindowFn;
use std::time::Duration;

/// Relating to frequency analysis ex. dtft and fft.
pub mod fft;

/// Amplitudes below this floor are treated as silence when converting to decibels.
const DB_AMIN: f64 = 1e-5;

/// Dynamic range kept below the reference amplitude when converting to decibels.
const DB_TOP: f64 = 80.0;

/// A window length. Wraps the number of samples with methods for converting to/from time.
#[derive(Copy, Clone, Default, Debug, PartialEq, Eq, PartialOrd, Ord, Add, Div, Mul, Sub)]
pub struct WindowLength {
    sample_num: usize,
}

impl WindowLength {
    /// [`WindowLength`] constructor.
    #[must_use]
    pub fn from_samples(sample_num: usize) -> Self {
        WindowLength { sample_num }
    }

    /// [`WindowLength`] constructor.
    /// # Arguments
    /// - `duration`: Length of the window in time.
    /// - `sample_rate`: Samples per second.
    #[must_use]
    pub fn from_duration(duration: Duration, sample_rate: f32) -> Self {
        // secs * samples/sec = samples
        WindowLength {
            sample_num: (duration.as_secs_f32() * sample_rate) as usize,
        }
    }

    /// Getter for samples
    #[must_use]
    pub fn samples(&self) -> usize {
        self.sample_num
    }

    /// Converts samples to duration. Samples / (samples/sec) = secs
    /// # Arguments
    /// - `sample_rate`: the samples per second.
    #[must_use]
    pub fn duration(&self, sample_rate: f32) -> Duration {
        Duration::from_secs_f32(self.sample_num as f32 / sample_rate)
    }
}

/// Calculates bin width of a dtft from the number of time samples.
/// Bin width is `Fs/N` where `Fs` is sampling frequency and `N` is samples.
#[must_use]
pub fn bin_width_from_time(sample_rate: f32, sample_cnt: usize) -> f32 {
    sample_rate / sample_cnt as f32
}

/// Converts a number of time samples to frequency samples.
/// N samples to (N/2)+1 samples.
#[must_use]
pub const fn time_samples_to_frequency(time_samples: usize) -> usize {
    (time_samples / 2) + 1
}

/// The information required to calculate a spectrogram.
#[derive(Debug)]
pub struct SpecCompute {
    data: Vec<f64>,            // Time domain data.
    window_len: WindowLength,  // The length of a window.
    window_step: WindowLength, // The step length used for each successive window. At most the window length.
    window_fn: WindowFn,       // The window function to use.
}

impl SpecCompute {
    /// Basic constructor.
    pub fn new(
        data: Vec<f64>,
        window_len: WindowLength,
        window_step: WindowLength,
        window_fn: WindowFn,
    ) -> Self {
        assert!(
            window_step <= window_len,
            "Step length should not be larger than the window itself."
        );
        SpecCompute {
            data,
            window_len,
            window_step,
            window_fn,
        }
    }

    /// Returns the time varying frequency analysis of the signal.
    /// One row of frequency-bin magnitudes per analysis window.
    #[must_use]
    pub fn stft(&self) -> Spectrogram {
        let mut rows = Vec::new();

        for window_of_data in self
            .data
            // Take a window of samples at a time.
            .windows(self.window_len.samples())
            // Step by the window step.
            .step_by(self.window_step.samples())
        {
            // Apply windowing function.
            let mut window_of_data = window_of_data.to_owned();
            fft::window_fn::apply_window(&mut window_of_data, self.window_fn);

            // Take the fourier transform of the window.
            rows.push(fft::scaled_real_fft(&mut window_of_data));
        }

        log::trace!(
            "stft produced {} windows of {} bins",
            rows.len(),
            rows.first().map_or(time_samples_to_frequency(self.window_len.samples()), Vec::len)
        );
        Spectrogram { rows }
    }

    /// Getter for time data.
    #[must_use]
    pub fn data(&self) -> &Vec<f64> {
        &self.data
    }
}

/// The calculated spectrogram. Time-major: `rows[window][bin]`.
#[derive(Debug)]
pub struct Spectrogram {
    rows: Vec<Vec<f64>>,
}

impl Spectrogram {
    /// Number of windows of time.
    #[must_use]
    pub fn window_cnt(&self) -> usize {
        self.rows.len()
    }

    /// Number of frequency bins per window. Given a window of `2n` time
    /// samples this is `n + 1`.
    #[must_use]
    pub fn bin_cnt(&self) -> usize {
        self.rows.first().map_or(0, Vec::len)
    }

    /// Each window's bins from the first window at t=0 to the last window.
    pub fn rows(&self) -> impl Iterator<Item = &[f64]> + '_ {
        self.rows.iter().map(Vec::as_slice)
    }

    /// Largest magnitude in the spectrogram.
    #[must_use]
    pub fn max(&self) -> f64 {
        self.rows
            .iter()
            .flatten()
            .copied()
            .fold(0.0_f64, f64::max)
    }

    /// Convert magnitudes to decibels referenced to the largest magnitude:
    /// `20*log10(a / max)`, with amplitudes floored at `1e-5` and the result
    /// clamped to 80 dB below the reference. The loudest cell maps to 0 dB
    /// and every value lies in `[-80, 0]`.
    #[must_use]
    pub fn into_db_ref_max(mut self) -> Self {
        let ref_db = 20.0 * self.max().max(DB_AMIN).log10();
        for row in self.rows.iter_mut() {
            for amplitude in row.iter_mut() {
                let db = 20.0 * amplitude.max(DB_AMIN).log10() - ref_db;
                *amplitude = db.max(-DB_TOP);
            }
        }
        self
    }

    /// Getter for the analysis data.
    #[must_use]
    pub fn data(&self) -> &Vec<Vec<f64>> {
        &self.rows
    }
}
