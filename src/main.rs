use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use voxtick::{
    EndReason, Project, RunMode, Settings, spawn_render_thread,
    audio::WavSink,
    timing::SequencerUpdate,
};

/// Offline renderer for voxtick projects
#[derive(Parser)]
#[command(name = "voxtick")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a project's tracks to a WAV file
    Render {
        /// Project file (RON)
        project: PathBuf,

        /// Output WAV file
        #[arg(short, long, default_value = "out.wav")]
        output: PathBuf,

        /// First sample to render
        #[arg(long, default_value = "0")]
        from: u64,

        /// Stop at this sample even if tracks are still playing
        #[arg(long)]
        to: Option<u64>,

        /// Settings file overriding the project's settings
        #[arg(long)]
        settings: Option<PathBuf>,
    },

    /// Show a project's instruments and tracks
    List {
        /// Project file (RON)
        project: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Render {
            project,
            output,
            from,
            to,
            settings,
        } => render(project, output, from, to, settings),
        Commands::List { project } => list(project),
    }
}

fn render(
    project_path: PathBuf,
    output: PathBuf,
    from: u64,
    to: Option<u64>,
    settings_path: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let project = Project::load(&project_path)?;
    let settings = match settings_path {
        Some(path) => Settings::load(&path)?,
        None => project.effective_settings(),
    };
    let sample_rate = settings.sample_rate;
    let sink = WavSink::create(&output, sample_rate, settings.wav_bits)?;

    let mut sequencer = project.build(settings.shared())?;
    sequencer.manager_mut().set_sink(Box::new(sink));

    let thread = spawn_render_thread(sequencer, RunMode::SequenceOnce { from, to });
    let mut report = None;
    for update in thread.updates.iter() {
        match update {
            SequencerUpdate::Progress { sample } => {
                tracing::info!("{:.1}s rendered", sample as f64 / sample_rate as f64);
            }
            SequencerUpdate::Finished(r) => {
                report = Some(r);
                break;
            }
        }
    }
    if thread.join().is_err() {
        return Err("render thread panicked".into());
    }
    let report = report.ok_or("render thread ended without a report")?;

    tracing::info!(
        samples = report.samples,
        voices = report.stats.voices_started,
        unresolved = report.stats.unresolved_instruments,
        "wrote {}",
        output.display()
    );
    match report.reason {
        EndReason::Completed | EndReason::EndTime => Ok(()),
        reason => Err(format!("render stopped early: {:?}", reason).into()),
    }
}

fn list(project_path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let project = Project::load(&project_path)?;
    let sequencer = project.build(project.effective_settings().shared())?;

    println!("{}", project.name);
    println!("instruments:");
    for desc in sequencer.manager().instruments() {
        println!(
            "  {:>6}  {:<16} {:<8} {}",
            desc.number, desc.name, desc.kind.name, desc.description
        );
    }
    println!("tracks:");
    for track in sequencer.tracks() {
        println!(
            "  {:>6}  {} events, {} samples, {} extra loops",
            track.number(),
            track.len(),
            track.length(),
            track.loop_count()
        );
    }
    Ok(())
}
