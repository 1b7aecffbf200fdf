// crates/reelqueue-app/src/main.rs
//
// reelqueue CLI. Builds a Session, turns arguments into QueueCommands, starts
// the queue and prints StoreEvents until it goes idle.
//
// While the queue runs, stdin lines control it:
//   p → pause   r → resume   c → cancel current   q → quit

use std::collections::HashMap;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use crossbeam_channel::{never, select, unbounded, Receiver};
use tracing::{debug, info};
use uuid::Uuid;

use reelqueue_app::config::AppConfig;
use reelqueue_app::helpers::format::{fit_name, format_bytes, format_ratio};
use reelqueue_app::helpers::log;
use reelqueue_app::paths;
use reelqueue_app::session::Session;
use reelqueue_app::store::{RunState, StoreEvent};
use reelqueue_core::commands::QueueCommand;
use reelqueue_core::edit::{EditSession, TrimInput};
use reelqueue_core::helpers::geometry::{AspectRatio, CropRegion};
use reelqueue_core::helpers::time::format_duration;
use reelqueue_core::job::{InputFile, ItemStatus};
use reelqueue_core::settings::{QualityPreset, ResolutionCap};
use reelqueue_media::{default_codec, MediaWorkerFactory};

const NAME_WIDTH: usize = 32;

#[derive(Parser)]
#[command(name = "reelqueue")]
#[command(about = "Queue video files for conversion to MP4")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: <config dir>/reelqueue/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(clap::Args)]
struct OutputArgs {
    /// Quality preset (low, medium, high)
    #[arg(long, value_parser = parse_quality)]
    quality: Option<QualityPreset>,

    /// Resolution cap (original, 1080p, 720p, 480p)
    #[arg(long, value_parser = parse_resolution)]
    resolution: Option<ResolutionCap>,

    /// Directory results are written to
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Keep buffer results in memory instead of saving them
    #[arg(long)]
    no_download: bool,

    /// Drop items from the queue once their result is saved
    #[arg(long)]
    remove_after_download: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert one or more files to MP4
    Convert {
        /// Input files (at most 10)
        #[arg(required = true)]
        files: Vec<PathBuf>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Crop and/or trim a single file
    Crop {
        /// Input file
        file: PathBuf,

        /// Normalized crop region as x,y,width,height (0..1)
        #[arg(long, value_parser = parse_region)]
        region: Option<CropRegion>,

        /// Aspect lock (free, 16:9, 9:16, 4:3, 3:4, 1:1, 4:5, 21:9)
        #[arg(long, value_parser = parse_aspect)]
        aspect: Option<AspectRatio>,

        /// Trim start in seconds
        #[arg(long)]
        trim_start: Option<f64>,

        /// Trim end in seconds
        #[arg(long)]
        trim_end: Option<f64>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Print what the codec learns about a file, as JSON
    Probe {
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::load(cli.config.as_deref())?;
    let log_path = config.log_file.then(paths::log_file);
    log::init(cli.verbose, log_path.as_deref());

    match cli.command {
        Commands::Probe { file } => {
            let info = default_codec()
                .probe(&file)
                .with_context(|| format!("probing {}", file.display()))?;
            println!("{}", serde_json::to_string_pretty(&info)?);
            Ok(())
        }

        Commands::Convert { files, output } => {
            apply_output_args(&mut config, &output);
            let session = open_session(&config)?;
            let report = session.process_command(QueueCommand::AddFiles(files));
            for r in &report.rejected {
                let path = r.path.as_deref().map(|p| p.display().to_string()).unwrap_or_default();
                eprintln!("skipped {path}: {}", r.reason);
            }
            if report.added.is_empty() {
                bail!("nothing to convert");
            }
            run_queue(&session)
        }

        Commands::Crop { file, region, aspect, trim_start, trim_end, output } => {
            apply_output_args(&mut config, &output);
            let input = InputFile::from_path(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let info = default_codec()
                .probe(&file)
                .with_context(|| format!("probing {}", file.display()))?;

            let mut edit = EditSession::new();
            edit.load(input, info, None);
            if let Some(aspect) = aspect {
                edit.set_aspect(aspect);
            }
            if let Some(region) = region {
                edit.set_region(region);
            }
            if let Some(t) = trim_start {
                edit.set_trim_start(t, TrimInput::Typed);
            }
            if let Some(t) = trim_end {
                edit.set_trim_end(t, TrimInput::Typed);
            }
            let spec = edit.edit_spec();
            if spec.is_identity() {
                bail!("crop covers the whole frame and trim the whole duration; use `convert` instead");
            }
            if let Some(px) = spec.crop {
                info!(left = px.left, top = px.top, width = px.width, height = px.height, "crop");
            }
            if let Some(trim) = spec.trim {
                info!("trim {} – {}", format_duration(trim.start), format_duration(trim.end));
            }

            let session = open_session(&config)?;
            let report = session.process_command(QueueCommand::AddCropJob { path: file, edit: spec });
            if let Some(r) = report.rejected.first() {
                bail!("{}", r.reason);
            }
            run_queue(&session)
        }
    }
}

fn apply_output_args(config: &mut AppConfig, args: &OutputArgs) {
    if let Some(q) = args.quality {
        config.settings.quality = q;
    }
    if let Some(r) = args.resolution {
        config.settings.resolution = r;
    }
    if let Some(dir) = &args.output_dir {
        config.output_dir = Some(dir.clone());
    }
    if args.no_download {
        config.settings.auto_download = false;
    }
    if args.remove_after_download {
        config.settings.remove_after_download = true;
    }
}

fn open_session(config: &AppConfig) -> Result<Session> {
    let factory = Arc::new(MediaWorkerFactory::new(default_codec()));
    Session::init(config, factory)
}

// ── Queue run ─────────────────────────────────────────────────────────────────

enum Input {
    Command(QueueCommand),
    Quit,
}

fn spawn_stdin_reader() -> Receiver<Input> {
    let (tx, rx) = unbounded();
    let spawned = thread::Builder::new().name("stdin".into()).spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            let input = match line.trim() {
                "p" => Input::Command(QueueCommand::Pause),
                "r" => Input::Command(QueueCommand::Resume),
                "c" => Input::Command(QueueCommand::CancelCurrent),
                "q" => Input::Quit,
                "" => continue,
                other => {
                    eprintln!("unknown command '{other}' (p, r, c, q)");
                    continue;
                }
            };
            if tx.send(input).is_err() {
                break;
            }
        }
    });
    if let Err(e) = spawned {
        debug!("no stdin control: {e}");
    }
    rx
}

fn run_queue(session: &Session) -> Result<()> {
    let events = session.subscribe();
    if !session.process_command(QueueCommand::Start).applied {
        bail!("queue has nothing pending");
    }

    let input = spawn_stdin_reader();
    let closed = never();
    let mut stdin_open = true;
    let mut printer = Printer::default();
    loop {
        let control = if stdin_open { input.clone() } else { closed.clone() };
        select! {
            recv(events) -> ev => match ev {
                Ok(StoreEvent::RunState(RunState::Idle)) | Err(_) => break,
                Ok(ev) => printer.print(session, &ev),
            },
            recv(control) -> msg => match msg {
                Ok(Input::Command(cmd)) => {
                    session.process_command(cmd);
                }
                Ok(Input::Quit) => {
                    info!("quitting");
                    session.dispose();
                    break;
                }
                // stdin closed: keep running without interactive control.
                Err(_) => stdin_open = false,
            },
        }
    }

    let failed = session.store().items().iter().filter(|i| i.status == ItemStatus::Failed).count();
    if failed > 0 {
        bail!("{failed} job(s) failed");
    }
    Ok(())
}

/// Turns StoreEvents into terminal lines. Progress is printed once per 10%.
#[derive(Default)]
struct Printer {
    last_decile: HashMap<Uuid, u32>,
}

impl Printer {
    fn print(&mut self, session: &Session, ev: &StoreEvent) {
        let name = |id: &Uuid| {
            session.store().item(*id)
                .map(|i| fit_name(&i.input.name, NAME_WIDTH))
                .unwrap_or_else(|| id.to_string())
        };
        match ev {
            StoreEvent::StatusChanged { id, status, error } => match error {
                Some(e) => println!("{:<w$}  {}: {e}", name(id), status.label(), w = NAME_WIDTH),
                None => println!("{:<w$}  {}", name(id), status.label(), w = NAME_WIDTH),
            },
            StoreEvent::Progress { id, info } => {
                let decile = (info.fraction * 10.0) as u32;
                if self.last_decile.get(id).is_some_and(|d| *d >= decile) {
                    return;
                }
                self.last_decile.insert(*id, decile);
                let eta = info.remaining
                    .map(|r| format!(", {} left", format_duration(r.as_secs_f64())))
                    .unwrap_or_default();
                println!(
                    "{:<w$}  {:>3.0}%  {}{eta}",
                    name(id),
                    info.fraction * 100.0,
                    format_bytes(info.bytes_processed),
                    w = NAME_WIDTH
                );
            }
            StoreEvent::Completed { id, output_name, output_size, compression_ratio, delivered_to } => {
                self.last_decile.remove(id);
                let place = delivered_to
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| output_name.clone());
                println!(
                    "{:<w$}  → {place} ({}, {})",
                    name(id),
                    format_bytes(*output_size),
                    format_ratio(*compression_ratio),
                    w = NAME_WIDTH
                );
            }
            StoreEvent::RunState(RunState::Paused) => println!("queue paused (r to resume)"),
            StoreEvent::RunState(RunState::Running) => println!("queue running"),
            _ => {}
        }
    }
}

// ── Argument parsers ──────────────────────────────────────────────────────────

fn parse_quality(s: &str) -> Result<QualityPreset, String> {
    QualityPreset::parse(s).ok_or_else(|| format!("unknown quality '{s}' (low, medium, high)"))
}

fn parse_resolution(s: &str) -> Result<ResolutionCap, String> {
    ResolutionCap::parse(s).ok_or_else(|| format!("unknown resolution '{s}' (original, 1080p, 720p, 480p)"))
}

fn parse_aspect(s: &str) -> Result<AspectRatio, String> {
    AspectRatio::parse(s).ok_or_else(|| format!("unknown aspect ratio '{s}'"))
}

fn parse_region(s: &str) -> Result<CropRegion, String> {
    let parts: Vec<f64> = s
        .split(',')
        .map(|p| p.trim().parse::<f64>().map_err(|e| format!("'{p}': {e}")))
        .collect::<Result<_, _>>()?;
    match parts.as_slice() {
        [x, y, w, h] => Ok(CropRegion::new(*x, *y, *w, *h)),
        _ => Err(format!("expected x,y,width,height, got '{s}'")),
    }
}
