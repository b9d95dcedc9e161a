use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Parser;
use num_complex::Complex32;
use rolling_stats::Stats;
use serde::Serialize;

use iqbridge::config::Frequency;
use iqbridge::mock::MockRadio;
use iqbridge::{IqSource, SourceEvent};

#[derive(Parser, Debug)]
#[command(name = "iq_capture")]
#[command(about = "Stream I/Q samples through the bridge and report statistics", long_about = None)]
struct Args {
    /// Device selector (see `iqbridge::mock::devices()`)
    #[arg(short, long, default_value = "mock=single")]
    device: String,

    /// Number of logical channels
    #[arg(short, long, default_value_t = 1)]
    channels: usize,

    /// Center frequency (e.g. "96.9mhz", "2.4ghz")
    #[arg(short, long, default_value = "100mhz")]
    freq: Frequency,

    /// Sample rate in Hz
    #[arg(short, long, default_value_t = 2_000_000.0)]
    sample_rate: f64,

    /// IF gain reduction in dB
    #[arg(long, default_value_t = 40.0)]
    if_gain: f64,

    /// Enable automatic gain mode
    #[arg(long)]
    agc: bool,

    /// Capture duration in seconds
    #[arg(long, default_value_t = 2.0)]
    duration: f32,

    /// Samples requested per pull
    #[arg(long, default_value_t = 8192)]
    pull_size: usize,

    /// Write channel 0 samples to a 16-bit stereo WAV (I left, Q right)
    #[arg(short, long)]
    wav: Option<PathBuf>,

    /// Emit the capture summary as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct CaptureSummary {
    device: String,
    sample_rate_hz: f64,
    center_freq_hz: f64,
    duration_secs: f32,
    samples: u64,
    pulls: u64,
    empty_pulls: u64,
    pull_mean: f64,
    pull_max: f64,
    gaps: u64,
    samples_lost: u64,
    overflows: u64,
    overloads: u64,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let driver = MockRadio::open(&args.device)?;
    let mut source = IqSource::select(driver, args.channels)?;

    let applied_rate = source.set_sample_rate(args.sample_rate)?;
    let applied_freq = source.set_center_freq(0, args.freq.as_hz())?;
    source.set_if_gain(0, args.if_gain)?;
    if args.agc {
        source.set_gain_mode(0, true)?;
    }

    if !args.json {
        println!("=== iqbridge capture ===");
        println!("Device: {}", source.description());
        println!("Sample rate: {} Hz (applied)", applied_rate);
        println!("Center frequency: {:.0} Hz (applied)", applied_freq);
        println!("Channels: {}", source.num_channels());
        println!();
    }

    let mut wav_writer = match &args.wav {
        Some(path) => {
            let spec = hound::WavSpec {
                channels: 2,
                sample_rate: applied_rate as u32,
                bits_per_sample: 16,
                sample_format: hound::SampleFormat::Int,
            };
            Some(hound::WavWriter::create(path, spec)?)
        }
        None => None,
    };

    let events = source.events();
    source.start()?;

    let mut buf = vec![Complex32::default(); args.pull_size];
    let mut pull_stats: Stats<f64> = Stats::new();
    let mut samples = 0u64;
    let mut pulls = 0u64;
    let mut empty_pulls = 0u64;

    let deadline = Instant::now() + Duration::from_secs_f32(args.duration);
    while Instant::now() < deadline {
        source.wait_available(0, Duration::from_millis(10))?;
        let produced = source.pull(0, &mut buf)?;
        pulls += 1;
        if produced == 0 {
            empty_pulls += 1;
            continue;
        }
        samples += produced as u64;
        pull_stats.update(produced as f64);

        if let Some(writer) = wav_writer.as_mut() {
            for sample in &buf[..produced] {
                writer.write_sample((sample.re * f32::from(i16::MAX)) as i16)?;
                writer.write_sample((sample.im * f32::from(i16::MAX)) as i16)?;
            }
        }
    }

    let device_description = source.description();
    let channel_stats = source.channel_stats(0);
    source.stop()?;

    if let Some(writer) = wav_writer {
        writer.finalize()?;
    }

    let mut gaps = 0u64;
    let mut samples_lost = 0u64;
    let mut overflows = 0u64;
    let mut overloads = 0u64;
    for event in events.try_iter() {
        match event {
            SourceEvent::Gap { missing, .. } => {
                gaps += 1;
                samples_lost += missing;
            }
            SourceEvent::Overflow { .. } => overflows += 1,
            SourceEvent::Overload { .. } => overloads += 1,
            SourceEvent::Rewind { .. } | SourceEvent::ModeChangeApplied { .. } => {}
        }
    }
    if let Some(stats) = channel_stats {
        gaps = stats.gaps;
        samples_lost = stats.samples_lost;
    }

    let summary = CaptureSummary {
        device: device_description,
        sample_rate_hz: applied_rate,
        center_freq_hz: applied_freq,
        duration_secs: args.duration,
        samples,
        pulls,
        empty_pulls,
        pull_mean: pull_stats.mean,
        pull_max: pull_stats.max,
        gaps,
        samples_lost,
        overflows,
        overloads,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("Samples: {}", summary.samples);
        println!(
            "Pulls: {} ({} empty), mean batch {:.0}, max batch {:.0}",
            summary.pulls, summary.empty_pulls, summary.pull_mean, summary.pull_max
        );
        println!(
            "Gaps: {} ({} samples lost), overflows: {}, overloads: {}",
            summary.gaps, summary.samples_lost, summary.overflows, summary.overloads
        );
    }

    Ok(())
}
