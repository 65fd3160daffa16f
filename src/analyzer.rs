//! Spectrum analyzer: ring buffer to per-band display data, once per frame.

use std::time::Instant;

use crate::capture::{AudioCapture, AudioConfig};
use crate::error::{Error, Result};
use crate::fft::{FftConfig, FftProcessor, compute_log_bands};
use crate::ring::RingBuffer;

/// Configuration for the spectrum display.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalyzerConfig {
    /// Number of frequency bands to display.
    pub num_bands: usize,
    /// Lowest frequency (Hz). Must be positive when the log axis is used.
    pub min_frequency: f32,
    /// Highest frequency (Hz).
    pub max_frequency: f32,
    /// Temporal smoothing in [0, 1]: 0 = none, towards 1 = heavy.
    pub smoothing_factor: f32,
    /// Per-frame multiplier applied to falling peak markers, in [0, 1].
    pub peak_decay_rate: f32,
    /// Logarithmic vs linear frequency axis.
    pub logarithmic_frequency: bool,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            num_bands: 64,
            min_frequency: 20.0,
            max_frequency: 20_000.0,
            smoothing_factor: 0.7,
            peak_decay_rate: 0.95,
            logarithmic_frequency: true,
        }
    }
}

/// One frame of spectrum analysis, ready to render.
#[derive(Debug, Clone)]
pub struct SpectrumData {
    /// Smoothed magnitude per band, nominally in [0, 1].
    pub magnitudes: Vec<f32>,
    /// Peak-hold value per band.
    pub peaks: Vec<f32>,
    /// Time-domain RMS of the analyzed window.
    pub rms_level: f32,
    /// Largest absolute sample in the analyzed window.
    pub peak_level: f32,
    pub timestamp: Instant,
}

/// The frame pipeline behind [`SpectrumAnalyzer::update`].
///
/// Holds the FFT processor, the scratch buffers, the band mapping, and the
/// smoothing/peak state. Kept separate from the capture side so the update
/// path can run against any ring buffer.
struct FramePipeline {
    fft: FftProcessor,
    config: AnalyzerConfig,
    sample_rate: f32,
    sample_buffer: Vec<f32>,
    magnitude_buffer: Vec<f32>,
    smoothed: Vec<f32>,
    peaks: Vec<f32>,
    /// Half-open bin range per display band.
    band_bins: Vec<(usize, usize)>,
}

impl FramePipeline {
    fn new(fft: FftProcessor, config: AnalyzerConfig, sample_rate: f32) -> Self {
        let mut pipeline = Self {
            sample_buffer: vec![0.0; fft.fft_size()],
            magnitude_buffer: vec![0.0; fft.bin_count()],
            smoothed: vec![0.0; config.num_bands],
            peaks: vec![0.0; config.num_bands],
            band_bins: Vec::new(),
            fft,
            config,
            sample_rate,
        };
        pipeline.recompute_band_mapping();
        pipeline
    }

    fn set_config(&mut self, config: AnalyzerConfig) {
        let bands_changed = config.num_bands != self.config.num_bands
            || config.min_frequency != self.config.min_frequency
            || config.max_frequency != self.config.max_frequency
            || config.logarithmic_frequency != self.config.logarithmic_frequency;

        self.config = config;

        if bands_changed {
            self.smoothed.resize(self.config.num_bands, 0.0);
            self.peaks.resize(self.config.num_bands, 0.0);
            self.recompute_band_mapping();
        }
    }

    fn recompute_band_mapping(&mut self) {
        if self.config.logarithmic_frequency {
            self.band_bins = compute_log_bands(
                self.fft.bin_count(),
                self.config.num_bands,
                self.config.min_frequency,
                self.config.max_frequency,
                self.sample_rate,
                self.fft.fft_size(),
            );
        } else {
            let bins_per_band = self.fft.bin_count() / self.config.num_bands;
            self.band_bins = (0..self.config.num_bands)
                .map(|i| {
                    let start = i * bins_per_band;
                    let end = ((i + 1) * bins_per_band).min(self.fft.bin_count());
                    (start, end)
                })
                .collect();
        }
    }

    /// Mean magnitude over the band's bin range; 0 for empty ranges
    /// (linear mapping can produce them when bands outnumber bins).
    fn band_magnitude(&self, band_index: usize) -> f32 {
        let (lo, hi) = self.band_bins[band_index];
        if lo >= hi {
            return 0.0;
        }
        let sum: f32 = self.magnitude_buffer[lo..hi].iter().sum();
        sum / (hi - lo) as f32
    }

    fn process(&mut self, ring: &RingBuffer<f32>) -> SpectrumData {
        let timestamp = Instant::now();
        let needed = self.fft.fft_size();
        let available = ring.len();

        if available < needed / 4 {
            // Not enough new signal; hold the previous smoothed state so the
            // display keeps a consistent-length response instead of
            // flickering during the first frames after start.
            return SpectrumData {
                magnitudes: self.smoothed.clone(),
                peaks: self.peaks.clone(),
                rms_level: 0.0,
                peak_level: 0.0,
                timestamp,
            };
        }

        // Always analyze the most recent window.
        if available > needed {
            ring.discard(available - needed);
        }

        let read_count = ring.peek(&mut self.sample_buffer);

        let mut sum_squares = 0.0f32;
        let mut peak_level = 0.0f32;
        for &sample in &self.sample_buffer[..read_count] {
            sum_squares += sample * sample;
            peak_level = peak_level.max(sample.abs());
        }
        let rms_level = (sum_squares / read_count as f32).sqrt();

        self.fft
            .compute(&self.sample_buffer[..read_count], &mut self.magnitude_buffer);

        let num_bands = self.config.num_bands;
        let mut magnitudes = vec![0.0; num_bands];
        let mut peaks = vec![0.0; num_bands];
        let smoothing = self.config.smoothing_factor;

        for i in 0..num_bands {
            let raw = self.band_magnitude(i);

            // Exponential moving average across frames.
            self.smoothed[i] = (1.0 - smoothing) * raw + smoothing * self.smoothed[i];

            // Peak hold with multiplicative decay.
            if self.smoothed[i] > self.peaks[i] {
                self.peaks[i] = self.smoothed[i];
            } else {
                self.peaks[i] *= self.config.peak_decay_rate;
            }

            magnitudes[i] = self.smoothed[i];
            peaks[i] = self.peaks[i];
        }

        // Consume what we analyzed.
        ring.discard(read_count);

        SpectrumData {
            magnitudes,
            peaks,
            rms_level,
            peak_level,
            timestamp,
        }
    }
}

/// High-level analyzer combining audio capture and FFT processing.
///
/// Drives the full pipeline: peek samples from the capture ring buffer,
/// transform, aggregate into display bands, smooth, and track peaks. The
/// visualization loop calls [`SpectrumAnalyzer::update`] once per frame;
/// capture runs concurrently on the backend's thread.
pub struct SpectrumAnalyzer {
    capture: AudioCapture,
    pipeline: FramePipeline,
}

impl SpectrumAnalyzer {
    pub fn new(
        audio_config: AudioConfig,
        fft_config: FftConfig,
        analyzer_config: AnalyzerConfig,
    ) -> Result<Self> {
        if analyzer_config.logarithmic_frequency && analyzer_config.min_frequency <= 0.0 {
            return Err(Error::InvalidArgument(format!(
                "logarithmic band layout requires a positive minimum frequency, got {}",
                analyzer_config.min_frequency
            )));
        }

        let capture = AudioCapture::new(audio_config)?;
        let fft = FftProcessor::new(fft_config)?;
        let sample_rate = capture.sample_rate() as f32;

        Ok(Self {
            pipeline: FramePipeline::new(fft, analyzer_config, sample_rate),
            capture,
        })
    }

    /// Starts audio capture. Idempotent.
    pub fn start(&mut self) -> Result<()> {
        self.capture.start()
    }

    /// Stops audio capture. Idempotent.
    pub fn stop(&mut self) {
        self.capture.stop();
    }

    pub fn is_running(&self) -> bool {
        self.capture.is_running()
    }

    /// Runs one analysis tick and returns the spectrum for this frame.
    pub fn update(&mut self) -> SpectrumData {
        self.pipeline.process(self.capture.buffer())
    }

    /// Read access to the capture side, e.g. for statistics.
    pub fn audio(&self) -> &AudioCapture {
        &self.capture
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.pipeline.config
    }

    /// Updates the display configuration. Band state is resized and the
    /// bin mapping recomputed only when the band layout actually changed;
    /// audio and FFT configuration are never touched.
    pub fn set_config(&mut self, config: AnalyzerConfig) {
        self.pipeline.set_config(config);
    }

    pub fn sample_rate(&self) -> f32 {
        self.capture.sample_rate() as f32
    }
}

impl Drop for SpectrumAnalyzer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fft::WindowFunction;
    use std::f32::consts::PI;

    const SAMPLE_RATE: f32 = 48_000.0;

    fn linear_fft(fft_size: usize) -> FftProcessor {
        FftProcessor::new(FftConfig {
            fft_size,
            window: WindowFunction::Hann,
            use_magnitude_db: false,
            ..FftConfig::default()
        })
        .unwrap()
    }

    fn pipeline(fft_size: usize, config: AnalyzerConfig) -> FramePipeline {
        FramePipeline::new(linear_fft(fft_size), config, SAMPLE_RATE)
    }

    fn sine(frequency: f32, num_samples: usize, amplitude: f32) -> Vec<f32> {
        let omega = 2.0 * PI * frequency / SAMPLE_RATE;
        (0..num_samples)
            .map(|i| amplitude * (omega * i as f32).sin())
            .collect()
    }

    #[test]
    fn starvation_returns_zero_state_initially() {
        let mut pipeline = pipeline(512, AnalyzerConfig::default());
        let ring = RingBuffer::<f32>::new(4096);

        let data = pipeline.process(&ring);

        assert_eq!(data.magnitudes, vec![0.0; 64]);
        assert_eq!(data.peaks, vec![0.0; 64]);
        assert_eq!(data.rms_level, 0.0);
        assert_eq!(data.peak_level, 0.0);
    }

    #[test]
    fn starvation_holds_previous_smoothed_state() {
        let config = AnalyzerConfig {
            num_bands: 8,
            smoothing_factor: 0.0,
            ..AnalyzerConfig::default()
        };
        let mut pipeline = pipeline(512, config);
        let ring = RingBuffer::<f32>::new(4096);

        ring.try_push_slice(&sine(1000.0, 512, 1.0));
        let active = pipeline.process(&ring);
        assert!(active.magnitudes.iter().any(|&m| m > 0.0));

        // Fewer than fft_size/4 samples available: previous state holds,
        // levels report zero.
        ring.try_push_slice(&sine(1000.0, 64, 1.0));
        let starved = pipeline.process(&ring);

        assert_eq!(starved.magnitudes, active.magnitudes);
        assert_eq!(starved.rms_level, 0.0);
        assert_eq!(starved.peak_level, 0.0);
    }

    #[test]
    fn update_consumes_processed_samples() {
        let mut pipeline = pipeline(512, AnalyzerConfig::default());
        let ring = RingBuffer::<f32>::new(4096);

        // More than a full window: the surplus is discarded, the window
        // peeked and then consumed.
        ring.try_push_slice(&sine(1000.0, 600, 1.0));
        pipeline.process(&ring);

        assert_eq!(ring.len(), 0);
    }

    #[test]
    fn rms_and_peak_track_the_window() {
        let config = AnalyzerConfig {
            smoothing_factor: 0.0,
            ..AnalyzerConfig::default()
        };
        let mut pipeline = pipeline(512, config);
        let ring = RingBuffer::<f32>::new(4096);

        ring.try_push_slice(&sine(1000.0, 512, 1.0));
        let data = pipeline.process(&ring);

        // Full-scale sine: RMS ~= 1/sqrt(2), peak ~= 1.
        assert!((data.rms_level - 0.707).abs() < 0.05);
        assert!(data.peak_level > 0.99);
    }

    #[test]
    fn one_khz_sine_lands_in_containing_band() {
        // Log bands over 100..10000 Hz split at 316, 1000, 3162; the band
        // with index 2 covers [1000, 3162).
        let config = AnalyzerConfig {
            num_bands: 4,
            min_frequency: 100.0,
            max_frequency: 10_000.0,
            smoothing_factor: 0.0,
            peak_decay_rate: 1.0,
            logarithmic_frequency: true,
        };
        let mut pipeline = pipeline(512, config);
        let ring = RingBuffer::<f32>::new(4096);

        ring.try_push_slice(&sine(1000.0, 512, 1.0));
        let data = pipeline.process(&ring);

        let argmax = data
            .magnitudes
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(argmax, 2);
    }

    #[test]
    fn heavier_smoothing_converges_slower() {
        let run = |smoothing: f32| {
            let config = AnalyzerConfig {
                num_bands: 4,
                min_frequency: 100.0,
                max_frequency: 10_000.0,
                smoothing_factor: smoothing,
                peak_decay_rate: 1.0,
                logarithmic_frequency: true,
            };
            let mut pipeline = pipeline(512, config);
            let ring = RingBuffer::<f32>::new(4096);

            // Constant input over several frames.
            for _ in 0..5 {
                ring.try_push_slice(&sine(1000.0, 512, 1.0));
                pipeline.process(&ring);
            }
            pipeline.smoothed[2]
        };

        let light = run(0.2);
        let heavy = run(0.8);
        assert!(
            heavy < light,
            "heavy smoothing ({heavy}) should trail light smoothing ({light})"
        );
    }

    #[test]
    fn peaks_decay_geometrically_in_silence() {
        let config = AnalyzerConfig {
            num_bands: 4,
            min_frequency: 100.0,
            max_frequency: 10_000.0,
            smoothing_factor: 0.0,
            peak_decay_rate: 0.9,
            logarithmic_frequency: true,
        };
        let mut pipeline = pipeline(512, config);
        let ring = RingBuffer::<f32>::new(4096);

        ring.try_push_slice(&sine(1000.0, 512, 1.0));
        let loud = pipeline.process(&ring);
        let initial_peak = loud.peaks[2];
        assert!(initial_peak > 0.0);

        // With no smoothing, silence drops the magnitude to zero at once
        // and the peak falls by the decay factor every frame.
        for frame in 1..=5 {
            ring.try_push_slice(&[0.0; 512]);
            let data = pipeline.process(&ring);
            let expected = initial_peak * 0.9f32.powi(frame);
            assert!(
                (data.peaks[2] - expected).abs() < 1e-5,
                "frame {frame}: got {}, expected {expected}",
                data.peaks[2]
            );
        }
    }

    #[test]
    fn linear_mapping_partitions_bins() {
        let config = AnalyzerConfig {
            num_bands: 4,
            logarithmic_frequency: false,
            ..AnalyzerConfig::default()
        };
        let pipeline = pipeline(512, config);

        // bin_count = 257, 64 bins per band; the remainder bin is unused.
        assert_eq!(
            pipeline.band_bins,
            vec![(0, 64), (64, 128), (128, 192), (192, 256)]
        );
    }

    #[test]
    fn surplus_linear_bands_aggregate_to_zero() {
        let config = AnalyzerConfig {
            num_bands: 8,
            smoothing_factor: 0.0,
            logarithmic_frequency: false,
            ..AnalyzerConfig::default()
        };
        // fft_size 8 gives 5 bins for 8 bands: all ranges are empty.
        let mut pipeline = pipeline(8, config);
        let ring = RingBuffer::<f32>::new(64);

        ring.try_push_slice(&sine(1000.0, 8, 1.0));
        let data = pipeline.process(&ring);

        assert_eq!(data.magnitudes, vec![0.0; 8]);
    }

    #[test]
    fn log_bands_stay_within_bin_count() {
        let config = AnalyzerConfig {
            num_bands: 32,
            min_frequency: 20.0,
            max_frequency: 20_000.0,
            ..AnalyzerConfig::default()
        };
        let pipeline = pipeline(2048, config);

        assert_eq!(pipeline.band_bins.len(), 32);
        for &(lo, hi) in &pipeline.band_bins {
            assert!(lo < hi);
            assert!(hi <= 1025);
        }
    }

    #[test]
    fn smoothing_only_config_change_keeps_mapping_and_state() {
        let mut pipeline = pipeline(2048, AnalyzerConfig::default());
        let mapping_before = pipeline.band_bins.clone();

        pipeline.set_config(AnalyzerConfig {
            smoothing_factor: 0.1,
            ..AnalyzerConfig::default()
        });

        assert_eq!(pipeline.band_bins, mapping_before);
        assert_eq!(pipeline.smoothed.len(), 64);
        assert_eq!(pipeline.peaks.len(), 64);
    }

    #[test]
    fn band_count_change_resizes_state() {
        let mut pipeline = pipeline(2048, AnalyzerConfig::default());

        pipeline.set_config(AnalyzerConfig {
            num_bands: 16,
            ..AnalyzerConfig::default()
        });

        assert_eq!(pipeline.band_bins.len(), 16);
        assert_eq!(pipeline.smoothed.len(), 16);
        assert_eq!(pipeline.peaks.len(), 16);
    }
}
