//! Microphone capture: cpal input stream feeding the sample ring buffer.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleRate, StreamConfig};

use crate::error::{Error, Result};
use crate::ring::RingBuffer;

/// Audio capture configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioConfig {
    /// Samples per second.
    pub sample_rate: u32,
    /// Frames per callback. Smaller values trade efficiency for latency.
    pub buffer_frames: u32,
    /// Mono capture is the norm for visualization.
    pub channels: u32,
    /// History buffer duration used to size the ring buffer.
    pub ring_buffer_seconds: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            buffer_frames: 256,
            channels: 1,
            ring_buffer_seconds: 0.5,
        }
    }
}

/// Capture statistics snapshot.
///
/// Fields are read individually from relaxed atomics; the snapshot is
/// self-consistent per field but not a cross-field transaction.
#[derive(Debug, Clone, Copy, Default)]
pub struct AudioStats {
    pub frames_captured: u64,
    /// Backend-reported drops plus ring-buffer-full short writes.
    pub overruns: u64,
    pub callback_count: u64,
    /// Highest batch peak observed since capture started.
    pub peak_amplitude: f32,
}

/// Atomic cells behind [`AudioStats`], shared with the stream callback.
#[derive(Debug, Default)]
struct StatsCells {
    frames_captured: AtomicU64,
    overruns: AtomicU64,
    callback_count: AtomicU64,
    /// f32 bits; see [`raise_peak`].
    peak_amplitude: AtomicU32,
}

/// Monotonically raises `cell` (f32 bits) to at least `peak`.
///
/// Classic atomic-max emulation: load, compare, compare_exchange_weak,
/// retry with the observed value. Peaks are non-negative so comparing the
/// decoded floats is sufficient.
fn raise_peak(cell: &AtomicU32, peak: f32) {
    let mut current = cell.load(Ordering::Relaxed);
    while peak > f32::from_bits(current) {
        match cell.compare_exchange_weak(
            current,
            peak.to_bits(),
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(observed) => current = observed,
        }
    }
}

/// Process-wide cpal host, shared by reference count.
///
/// The first acquire opens the host, the last release drops it, and a
/// capture that fails construction releases its reference on unwind, so
/// repeated attempts start from a clean count.
struct HostCell {
    refs: usize,
    host: Option<cpal::Host>,
}

static HOST: Mutex<HostCell> = Mutex::new(HostCell {
    refs: 0,
    host: None,
});

struct HostGuard;

impl HostGuard {
    fn acquire() -> Self {
        let mut cell = HOST.lock().unwrap_or_else(PoisonError::into_inner);
        if cell.refs == 0 {
            cell.host = Some(cpal::default_host());
        }
        cell.refs += 1;
        HostGuard
    }

    fn with<R>(&self, f: impl FnOnce(&cpal::Host) -> R) -> R {
        let mut cell = HOST.lock().unwrap_or_else(PoisonError::into_inner);
        let host = cell.host.get_or_insert_with(cpal::default_host);
        f(host)
    }
}

impl Drop for HostGuard {
    fn drop(&mut self) {
        let mut cell = HOST.lock().unwrap_or_else(PoisonError::into_inner);
        cell.refs -= 1;
        if cell.refs == 0 {
            cell.host = None;
        }
    }
}

/// Captures audio from the default input device into a lock-free ring
/// buffer.
///
/// The stream callback runs on a backend-owned real-time thread and does
/// no allocation and no blocking: it raises the peak meter, pushes the
/// batch into the ring buffer, and bumps the statistics counters. Samples
/// that don't fit are dropped and counted as overruns.
pub struct AudioCapture {
    config: AudioConfig,
    device_name: String,
    ring: Arc<RingBuffer<f32>>,
    stats: Arc<StatsCells>,
    stream: cpal::Stream,
    running: bool,
    _host: HostGuard,
}

impl AudioCapture {
    /// Opens the default input device as an f32 stream at the configured
    /// rate and frame count. The stream is created stopped; call
    /// [`AudioCapture::start`].
    pub fn new(config: AudioConfig) -> Result<Self> {
        let host = HostGuard::acquire();

        let ring_len = (config.ring_buffer_seconds
            * config.sample_rate as f32
            * config.channels as f32) as usize;
        let ring = Arc::new(RingBuffer::new(ring_len));
        let stats = Arc::new(StatsCells::default());

        let device = host
            .with(|host| host.default_input_device())
            .ok_or_else(|| Error::DeviceUnavailable("no default audio input device".into()))?;
        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());

        let stream_config = StreamConfig {
            channels: config.channels as u16,
            sample_rate: SampleRate(config.sample_rate),
            buffer_size: BufferSize::Fixed(config.buffer_frames),
        };

        let ring_cb = Arc::clone(&ring);
        let stats_cb = Arc::clone(&stats);
        let stats_err = Arc::clone(&stats);

        let stream = device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let mut peak = 0.0f32;
                    for &sample in data {
                        peak = peak.max(sample.abs());
                    }
                    raise_peak(&stats_cb.peak_amplitude, peak);

                    let written = ring_cb.try_push_slice(data);
                    if written < data.len() {
                        stats_cb.overruns.fetch_add(1, Ordering::Relaxed);
                    }

                    stats_cb
                        .frames_captured
                        .fetch_add(data.len() as u64, Ordering::Relaxed);
                    stats_cb.callback_count.fetch_add(1, Ordering::Relaxed);
                },
                move |_err| {
                    // cpal surfaces backend-side drops here rather than as a
                    // per-callback flag. No stderr output: the TUI owns the
                    // terminal while the stream runs.
                    stats_err.overruns.fetch_add(1, Ordering::Relaxed);
                },
                None,
            )
            .map_err(|err| match err {
                cpal::BuildStreamError::DeviceNotAvailable => Error::DeviceUnavailable(
                    "input device disappeared while opening the stream".into(),
                ),
                cpal::BuildStreamError::StreamConfigNotSupported => Error::InvalidArgument(
                    format!(
                        "device does not support {} Hz x{} f32 input",
                        config.sample_rate, config.channels
                    ),
                ),
                other => Error::ResourceExhausted(format!("failed to open input stream: {other}")),
            })?;

        Ok(Self {
            config,
            device_name,
            ring,
            stats,
            stream,
            running: false,
            _host: host,
        })
    }

    /// Starts capture. Idempotent.
    pub fn start(&mut self) -> Result<()> {
        if self.running {
            return Ok(());
        }
        self.stream
            .play()
            .map_err(|err| Error::ResourceExhausted(format!("failed to start audio stream: {err}")))?;
        self.running = true;
        Ok(())
    }

    /// Stops capture. Idempotent and infallible so it can run from `Drop`.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        let _ = self.stream.pause();
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    pub fn channels(&self) -> u32 {
        self.config.channels
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Consumer handle for the captured samples.
    pub fn buffer(&self) -> &RingBuffer<f32> {
        &self.ring
    }

    pub fn stats(&self) -> AudioStats {
        AudioStats {
            frames_captured: self.stats.frames_captured.load(Ordering::Relaxed),
            overruns: self.stats.overruns.load(Ordering::Relaxed),
            callback_count: self.stats.callback_count.load(Ordering::Relaxed),
            peak_amplitude: f32::from_bits(self.stats.peak_amplitude.load(Ordering::Relaxed)),
        }
    }

    /// Names of all available input devices.
    pub fn list_input_devices() -> Result<Vec<String>> {
        let host = HostGuard::acquire();
        host.with(|host| {
            let devices = host.input_devices().map_err(|err| {
                Error::DeviceUnavailable(format!("failed to enumerate input devices: {err}"))
            })?;
            Ok(devices
                .map(|device| device.name().unwrap_or_else(|_| "unknown".to_string()))
                .collect())
        })
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.stop();
    }
}
