use clap::{Parser, Subcommand};
use spektr::analyzer::{AnalyzerConfig, SpectrumAnalyzer};
use spektr::capture::{AudioCapture, AudioConfig};
use spektr::fft::{FftConfig, WindowFunction};
use spektr::ui;

#[derive(Parser)]
#[command(name = "spektr")]
#[command(about = "Real-time terminal audio spectrum analyzer")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture the default input device and render the spectrum
    Run {
        /// Sample rate in Hz
        #[arg(long, default_value = "48000")]
        sample_rate: u32,

        /// Frames per audio callback
        #[arg(long, default_value = "512")]
        buffer_frames: u32,

        /// FFT size (power of two)
        #[arg(long, default_value = "2048")]
        fft_size: usize,

        /// Window function applied before the transform
        #[arg(long, value_enum, default_value = "hann")]
        window: WindowArg,

        /// Number of display bands
        #[arg(long, default_value = "64")]
        bands: usize,

        /// Lowest displayed frequency in Hz
        #[arg(long, default_value = "20")]
        min_frequency: f32,

        /// Highest displayed frequency in Hz
        #[arg(long, default_value = "16000")]
        max_frequency: f32,

        /// Temporal smoothing factor (0 = none, towards 1 = heavy)
        #[arg(long, default_value = "0.6")]
        smoothing: f32,

        /// Per-frame decay applied to falling peak markers
        #[arg(long, default_value = "0.92")]
        peak_decay: f32,

        /// Use a linear frequency axis instead of logarithmic
        #[arg(long)]
        linear: bool,

        /// Noise floor in dB for magnitude normalization
        #[arg(long, default_value = "-60", allow_hyphen_values = true)]
        db_floor: f32,

        /// Sample history buffer length in seconds
        #[arg(long, default_value = "0.5")]
        history: f32,
    },

    /// List available audio input devices
    Devices {
        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum WindowArg {
    Rectangular,
    Hann,
    Hamming,
    Blackman,
    FlatTop,
}

impl From<WindowArg> for WindowFunction {
    fn from(arg: WindowArg) -> Self {
        match arg {
            WindowArg::Rectangular => WindowFunction::Rectangular,
            WindowArg::Hann => WindowFunction::Hann,
            WindowArg::Hamming => WindowFunction::Hamming,
            WindowArg::Blackman => WindowFunction::Blackman,
            WindowArg::FlatTop => WindowFunction::FlatTop,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum OutputFormat {
    Text,
    Json,
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            sample_rate,
            buffer_frames,
            fft_size,
            window,
            bands,
            min_frequency,
            max_frequency,
            smoothing,
            peak_decay,
            linear,
            db_floor,
            history,
        } => {
            let audio_config = AudioConfig {
                sample_rate,
                buffer_frames,
                channels: 1,
                ring_buffer_seconds: history,
            };
            let fft_config = FftConfig {
                fft_size,
                window: window.into(),
                use_magnitude_db: true,
                db_floor,
                db_ceiling: 0.0,
            };
            let analyzer_config = AnalyzerConfig {
                num_bands: bands,
                min_frequency,
                max_frequency,
                smoothing_factor: smoothing,
                peak_decay_rate: peak_decay,
                logarithmic_frequency: !linear,
            };

            run_visualizer(audio_config, fft_config, analyzer_config)
        }

        Commands::Devices { format } => list_devices(format),
    };

    if let Err(err) = result {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run_visualizer(
    audio_config: AudioConfig,
    fft_config: FftConfig,
    analyzer_config: AnalyzerConfig,
) -> anyhow::Result<()> {
    let analyzer = SpectrumAnalyzer::new(audio_config, fft_config, analyzer_config)?;
    ui::run(analyzer)
}

fn list_devices(format: OutputFormat) -> anyhow::Result<()> {
    let devices = AudioCapture::list_input_devices()?;

    match format {
        OutputFormat::Text => {
            if devices.is_empty() {
                println!("No audio input devices found");
            } else {
                println!("Available input devices:");
                for name in devices {
                    println!("  {name}");
                }
            }
        }
        OutputFormat::Json => {
            let json = serde_json::json!({ "devices": devices });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
    }

    Ok(())
}
