//! sa-cli: play or render auditory trial plans.
//!
//! Usage:
//!   sa-cli play demos/two_tones.toml
//!   sa-cli render demos/two_tones.toml --wav out.wav
//!   sa-cli tone --frequency 440 --amplitude 0.5 --seconds 1

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use sa_master::{ChannelRoute, Controller, SessionConfig, ToneSpec, TrialPlan, Waveform};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sa-cli", version, about = "Sample-accurate auditory stimulus playback")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Play a trial plan on the default output device
    Play {
        plan: PathBuf,
    },
    /// Render a trial plan offline to a WAV file
    Render {
        plan: PathBuf,
        #[arg(long)]
        wav: PathBuf,
        /// Length to render; the plan's trial length by default
        #[arg(long)]
        seconds: Option<f64>,
    },
    /// Play or render a single tone
    Tone {
        #[arg(long, default_value_t = 440.0)]
        frequency: f32,
        #[arg(long, default_value_t = 0.5)]
        amplitude: f32,
        #[arg(long, default_value_t = 1.0)]
        seconds: f64,
        /// Stereo balance, 0 = left, 1 = right
        #[arg(long, default_value_t = 0.5)]
        balance: f32,
        /// White noise instead of a sine
        #[arg(long)]
        noise: bool,
        #[arg(long)]
        wav: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match Cli::parse().command {
        Command::Play { plan } => {
            let (plan, base) = load_plan(&plan)?;
            let mut ctrl = Controller::new(plan.session.clone());
            ctrl.load_plan_assets(&plan, &base)?;
            ctrl.start_output().context("failed to open audio output")?;
            play(&mut ctrl, &plan)
        }
        Command::Render { plan, wav, seconds } => {
            let (plan, base) = load_plan(&plan)?;
            let mut ctrl = Controller::new(plan.session.clone());
            ctrl.load_plan_assets(&plan, &base)?;
            render(&mut ctrl, &plan, &wav, seconds)
        }
        Command::Tone {
            frequency,
            amplitude,
            seconds,
            balance,
            noise,
            wav,
        } => {
            let plan = TrialPlan {
                tones: vec![ToneSpec {
                    slot: None,
                    start_secs: 0.0,
                    duration_secs: seconds,
                    frequency,
                    amplitude,
                    channel: ChannelRoute::Balance(balance),
                    phase: 0.0,
                    waveform: if noise { Waveform::WhiteNoise } else { Waveform::Sine },
                    tag: 0,
                }],
                ..TrialPlan::default()
            };
            let mut ctrl = Controller::new(SessionConfig::default());
            match wav {
                Some(path) => render(&mut ctrl, &plan, &path, None),
                None => {
                    ctrl.start_output().context("failed to open audio output")?;
                    play(&mut ctrl, &plan)
                }
            }
        }
    }
}

fn load_plan(path: &Path) -> Result<(TrialPlan, PathBuf)> {
    let plan = TrialPlan::from_path(path).with_context(|| format!("failed to read {}", path.display()))?;
    let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
    Ok((plan, base))
}

fn play(ctrl: &mut Controller, plan: &TrialPlan) -> Result<()> {
    ctrl.play_trial(plan)?;
    let length = plan.length_secs();
    println!("Playing {length:.3} s...");

    // Generous slack for device start-up latency.
    let timeout = Duration::from_secs_f64(length + 2.0);
    let mut waited = Duration::ZERO;
    while !ctrl.is_finished() {
        if waited > timeout {
            ctrl.stop()?;
            bail!("engine did not reach the end of the trial");
        }
        if let Some(pos) = ctrl.position_secs() {
            print!("\r{pos:8.3} s");
            let _ = std::io::stdout().flush();
        }
        ctrl.drain_faults();
        std::thread::sleep(Duration::from_millis(20));
        waited += Duration::from_millis(20);
    }
    ctrl.end_session()?;
    println!("\rDone.          ");
    Ok(())
}

fn render(ctrl: &mut Controller, plan: &TrialPlan, wav: &Path, seconds: Option<f64>) -> Result<()> {
    let sample_rate = plan.session.sample_rate_hz.unwrap_or(48000);
    ctrl.configure_offline(sample_rate)?;
    ctrl.play_trial(plan)?;

    let seconds = seconds.unwrap_or_else(|| plan.length_secs());
    let frames = sa_master::secs_to_samples(seconds, sample_rate) as usize;
    println!("Rendering {seconds:.3} s to {} at {sample_rate} Hz...", wav.display());
    ctrl.render_to_wav(wav, frames)
        .with_context(|| format!("failed to write {}", wav.display()))?;
    let faults = ctrl.drain_faults();
    if !faults.is_empty() {
        println!("{} render fault(s) absorbed", faults.len());
    }
    ctrl.end_session()?;
    println!("Done.");
    Ok(())
}
