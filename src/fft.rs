//! FFT processing: windowing, real-to-complex transform, magnitude spectrum.

use std::f32::consts::PI;
use std::sync::Arc;

use realfft::num_complex::Complex;
use realfft::{RealFftPlanner, RealToComplex};

use crate::error::{Error, Result};

/// Window functions for spectral analysis.
///
/// The choice trades frequency resolution against spectral leakage:
/// rectangular resolves best but leaks most, flat-top measures amplitude
/// accurately but smears frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WindowFunction {
    Rectangular,
    #[default]
    Hann,
    Hamming,
    Blackman,
    FlatTop,
}

/// Configuration for FFT processing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FftConfig {
    /// Transform size. Must be a power of two.
    pub fft_size: usize,
    pub window: WindowFunction,
    /// Convert magnitudes to decibels normalized to [0, 1].
    pub use_magnitude_db: bool,
    /// Noise floor for the dB conversion.
    pub db_floor: f32,
    /// Full scale for the dB conversion.
    pub db_ceiling: f32,
}

impl Default for FftConfig {
    fn default() -> Self {
        Self {
            fft_size: 2048,
            window: WindowFunction::Hann,
            use_magnitude_db: true,
            db_floor: -80.0,
            db_ceiling: 0.0,
        }
    }
}

/// Computes magnitude spectra from windows of audio samples.
///
/// The transform plan, the window coefficients, and the input/output/scratch
/// buffers are all prepared up front so [`FftProcessor::compute`] performs no
/// allocation. Owned exclusively by the visualization thread.
pub struct FftProcessor {
    config: FftConfig,
    fft: Arc<dyn RealToComplex<f32>>,
    input: Vec<f32>,
    output: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    window: Vec<f32>,
}

impl FftProcessor {
    /// Plans the transform and precomputes the window.
    ///
    /// Fails with [`Error::InvalidArgument`] if `fft_size` is not a power
    /// of two.
    pub fn new(config: FftConfig) -> Result<Self> {
        validate_size(config.fft_size)?;

        let fft = RealFftPlanner::<f32>::new().plan_fft_forward(config.fft_size);
        let input = fft.make_input_vec();
        let output = fft.make_output_vec();
        let scratch = fft.make_scratch_vec();
        let window = build_window(config.window, config.fft_size);

        Ok(Self {
            config,
            fft,
            input,
            output,
            scratch,
            window,
        })
    }

    /// Number of output magnitude bins (`fft_size / 2 + 1`).
    pub fn bin_count(&self) -> usize {
        self.config.fft_size / 2 + 1
    }

    pub fn fft_size(&self) -> usize {
        self.config.fft_size
    }

    pub fn config(&self) -> &FftConfig {
        &self.config
    }

    /// Computes the magnitude spectrum of `samples` into `output`.
    ///
    /// If fewer than `fft_size` samples are provided they are right-aligned
    /// and the front is zero-padded, so the transform always reflects the
    /// most recent signal. If more are provided only the last `fft_size`
    /// are used. `output` must hold at least [`Self::bin_count`] values;
    /// a shorter buffer is a programmer error.
    ///
    /// Returns the number of magnitudes written (always `bin_count()`).
    pub fn compute(&mut self, samples: &[f32], output: &mut [f32]) -> usize {
        let n = self.config.fft_size;
        let bins = self.bin_count();
        assert!(output.len() >= bins, "output shorter than bin_count");

        let copy_count = samples.len().min(n);
        let offset = n - copy_count;

        self.input[..offset].fill(0.0);
        let recent = &samples[samples.len() - copy_count..];
        for ((slot, &sample), &coeff) in self.input[offset..]
            .iter_mut()
            .zip(recent)
            .zip(&self.window[offset..])
        {
            *slot = sample * coeff;
        }

        // Buffer lengths are fixed by the plan at construction, so the
        // transform cannot fail here.
        let _ = self
            .fft
            .process_with_scratch(&mut self.input, &mut self.output, &mut self.scratch);

        // One-sided spectrum scaling: 2/N, except DC and Nyquist which only
        // appear once in the full spectrum.
        let scale = 2.0 / n as f32;
        for (i, out) in output[..bins].iter_mut().enumerate() {
            let mut magnitude = self.output[i].norm() * scale;
            if i == 0 || i == bins - 1 {
                magnitude *= 0.5;
            }

            *out = if self.config.use_magnitude_db {
                let db = 20.0 * (magnitude + 1e-10).log10();
                let db = db.clamp(self.config.db_floor, self.config.db_ceiling);
                (db - self.config.db_floor) / (self.config.db_ceiling - self.config.db_floor)
            } else {
                magnitude
            };
        }

        bins
    }

    /// Frequency in Hz at the center of `bin_index`.
    pub fn bin_to_frequency(&self, bin_index: usize, sample_rate: f32) -> f32 {
        bin_index as f32 * sample_rate / self.config.fft_size as f32
    }

    /// Bin index closest to `frequency`, clamped to the valid range.
    pub fn frequency_to_bin(&self, frequency: f32, sample_rate: f32) -> usize {
        let bin = (frequency * self.config.fft_size as f32 / sample_rate + 0.5) as usize;
        bin.min(self.bin_count() - 1)
    }

    /// Replaces the configuration, re-planning if the size changed.
    /// The window is recomputed unconditionally.
    pub fn set_config(&mut self, config: FftConfig) -> Result<()> {
        validate_size(config.fft_size)?;

        let size_changed = config.fft_size != self.config.fft_size;
        self.config = config;

        if size_changed {
            self.fft = RealFftPlanner::<f32>::new().plan_fft_forward(self.config.fft_size);
            self.input = self.fft.make_input_vec();
            self.output = self.fft.make_output_vec();
            self.scratch = self.fft.make_scratch_vec();
        }
        self.window = build_window(self.config.window, self.config.fft_size);
        Ok(())
    }
}

fn validate_size(fft_size: usize) -> Result<()> {
    if !fft_size.is_power_of_two() {
        return Err(Error::InvalidArgument(format!(
            "FFT size must be a power of two, got {fft_size}"
        )));
    }
    Ok(())
}

fn build_window(window: WindowFunction, size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| {
            let x = i as f32 / (size - 1) as f32;
            match window {
                WindowFunction::Rectangular => 1.0,
                WindowFunction::Hann => 0.5 * (1.0 - (2.0 * PI * x).cos()),
                WindowFunction::Hamming => 0.54 - 0.46 * (2.0 * PI * x).cos(),
                WindowFunction::Blackman => {
                    0.42 - 0.5 * (2.0 * PI * x).cos() + 0.08 * (4.0 * PI * x).cos()
                }
                WindowFunction::FlatTop => {
                    0.215_578_95 - 0.416_631_58 * (2.0 * PI * x).cos()
                        + 0.277_263_158 * (4.0 * PI * x).cos()
                        - 0.083_578_947 * (6.0 * PI * x).cos()
                        + 0.006_947_368 * (8.0 * PI * x).cos()
                }
            }
        })
        .collect()
}

/// Maps `bin_count` linear FFT bins onto `num_bands` logarithmically spaced
/// display bands between `min_frequency` and `max_frequency`.
///
/// Each band is a half-open bin range `(lo, hi)` with at least one bin;
/// ranges are clamped to `bin_count`. `min_frequency` must be positive
/// (the spacing is computed in log10).
pub fn compute_log_bands(
    bin_count: usize,
    num_bands: usize,
    min_frequency: f32,
    max_frequency: f32,
    sample_rate: f32,
    fft_size: usize,
) -> Vec<(usize, usize)> {
    let log_min = min_frequency.log10();
    let log_max = max_frequency.log10();
    let log_step = (log_max - log_min) / num_bands as f32;

    let freq_to_bin = |freq: f32| -> usize {
        let bin = (freq * fft_size as f32 / sample_rate) as usize;
        bin.min(bin_count - 1)
    };

    (0..num_bands)
        .map(|i| {
            let freq_lo = 10.0f32.powf(log_min + log_step * i as f32);
            let freq_hi = 10.0f32.powf(log_min + log_step * (i + 1) as f32);

            let bin_lo = freq_to_bin(freq_lo);
            let mut bin_hi = freq_to_bin(freq_hi);

            // Narrow bands at the low end collapse to zero width; keep at
            // least one bin each.
            if bin_hi <= bin_lo {
                bin_hi = bin_lo + 1;
            }

            (bin_lo, bin_hi.min(bin_count))
        })
        .collect()
}
