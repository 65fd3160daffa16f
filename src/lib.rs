//! Real-time audio spectrum analysis for terminal visualization.
//!
//! The pipeline runs across two threads: the audio backend's real-time
//! callback pushes captured samples into a lock-free [`ring::RingBuffer`],
//! and the visualization loop pulls windows of samples out, transforms them
//! with [`fft::FftProcessor`], aggregates the bins into display bands, and
//! applies temporal smoothing and peak hold in
//! [`analyzer::SpectrumAnalyzer`]. One call to
//! [`analyzer::SpectrumAnalyzer::update`] per frame yields a
//! [`analyzer::SpectrumData`] ready to render.

pub mod analyzer;
pub mod capture;
pub mod error;
pub mod fft;
pub mod ring;
pub mod ui;

pub use analyzer::{AnalyzerConfig, SpectrumAnalyzer, SpectrumData};
pub use capture::{AudioCapture, AudioConfig, AudioStats};
pub use error::{Error, Result};
pub use fft::{FftConfig, FftProcessor, WindowFunction};
pub use ring::RingBuffer;
