use clap::Parser;
use humansize::{DECIMAL, format_size};
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;
use torrent_dd::{
    AcquisitionStatus, CancellationToken, Config, EpisodeSelection, ProgressEvent, RunOptions,
    SeasonReport, SeasonRequest, run_season,
};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Some episodes ended in an error or never reached the index
const EXIT_EPISODES_FAILED: i32 = 3;
/// The index had nothing usable for the first requested episode
const EXIT_NOTHING_FOUND: i32 = 2;

#[derive(Parser)]
#[command(name = "torrent_dd")]
#[command(about = "Download tv series episodes by torrent, with subtitles matching the release")]
struct Cli {
    /// Name of the series, e.g. "The Office"
    #[arg(long)]
    series: String,

    /// Season number
    #[arg(long)]
    season: u32,

    /// Episode number; without --full-season only this episode is fetched
    #[arg(long)]
    episode: Option<u32>,

    /// Directory the series folder is created in
    #[arg(long, default_value = ".")]
    download_dir: PathBuf,

    /// Subtitle language code
    #[arg(long, default_value = "en")]
    lang: String,

    /// Fetch the season from --episode (or the first episode) onwards
    #[arg(long)]
    full_season: bool,

    /// Try Subscenter first for Hebrew subtitles
    #[arg(long)]
    use_subscenter: bool,

    /// Prefer the largest release over the best seeded one
    #[arg(long)]
    best_resolution: bool,

    /// Skip the torrent and only fetch subtitles for files already downloaded
    #[arg(long)]
    subtitles_only: bool,

    /// Configuration file (defaults to the platform config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log debug output
    #[arg(short, long)]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

impl Cli {
    fn episodes(&self) -> EpisodeSelection {
        match (self.full_season, self.episode) {
            (false, Some(episode)) => EpisodeSelection::Single(episode),
            (_, start) => EpisodeSelection::FromStart(start.unwrap_or(1)),
        }
    }
}

fn log_filter(verbose: bool, quiet: bool) -> EnvFilter {
    if quiet {
        EnvFilter::new("error")
    } else if verbose {
        // Dependency crates stay at warn
        EnvFilter::new("warn,torrent_dd=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    let filter = log_filter(verbose, quiet);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(io::stderr))
        .init();
}

/// Handles progress events and prints formatted output to stdout
fn handle_progress_event(event: ProgressEvent) {
    match event {
        ProgressEvent::SeasonStarted { series, season } => {
            println!("torrent_dd: fetching {} season {}...", series, season);
        }
        ProgressEvent::EpisodeStarted { episode, directory } => {
            println!("\n=== Episode {} ===", episode.detail().to_uppercase());
            println!("Target: {}", directory.display());
        }
        ProgressEvent::Searching { attempt, .. } => {
            if attempt == 1 {
                println!("Searching for releases...");
            } else {
                println!("Searching for releases (attempt {})...", attempt);
            }
        }
        ProgressEvent::RetryScheduled {
            attempt,
            max_attempts,
            delay,
        } => {
            println!(
                "  Index unreachable, retry {}/{} in {}s",
                attempt,
                max_attempts,
                delay.as_secs()
            );
        }
        ProgressEvent::CandidateChosen {
            name,
            seeders,
            leechers,
            trusted,
        } => {
            let trusted = if trusted { ", trusted" } else { "" };
            println!("  Chose: {} ({} seeders, {} leechers{})", name, seeders, leechers, trusted);
        }
        ProgressEvent::TransferStarted { .. } => {
            println!("  Downloading...");
        }
        ProgressEvent::TransferProgress {
            fraction,
            total_bytes,
        } => {
            print!(
                "\r  {:>5.1}% of {}",
                fraction * 100.0,
                format_size(total_bytes, DECIMAL)
            );
            let _ = io::stdout().flush();
        }
        ProgressEvent::TransferCompleted { name } => {
            println!("\r  Downloaded: {}", name);
        }
        ProgressEvent::SubtitleSourceAttempted { source, language } => {
            println!("  Looking for {} subtitles on {}...", language, source);
        }
        ProgressEvent::SubtitlesAcquired {
            source,
            version,
            file_count,
            ..
        } => {
            println!(
                "  Subtitles for version '{}' from {} ({} file(s))",
                version, source, file_count
            );
        }
        ProgressEvent::SubtitlesUnavailable { .. } => {
            println!("  No matching subtitles found.");
        }
        ProgressEvent::EpisodeFinished { status, .. } => {
            println!("  Result: {}", describe(status));
        }
        ProgressEvent::SeasonStopped { episode, .. } => {
            println!("\nNo more releases after episode {}, stopping.", episode);
        }
        ProgressEvent::CleanupFinished {
            removed_directories,
            removed_files,
        } => {
            if removed_directories + removed_files > 0 {
                println!(
                    "\nCleaned up {} empty folder(s) and {} stray file(s).",
                    removed_directories, removed_files
                );
            }
        }
        ProgressEvent::Complete { downloaded } => {
            println!("\nSeason run complete! Downloaded {} episode(s).", downloaded.len());
        }
    }
}

fn describe(status: AcquisitionStatus) -> &'static str {
    match status {
        AcquisitionStatus::Success => "downloaded",
        AcquisitionStatus::NoConnection => "index unreachable",
        AcquisitionStatus::NoResults => "no releases found",
        AcquisitionStatus::NoGoodResults => "no well-seeded release found",
        AcquisitionStatus::GenericError => "failed",
    }
}

fn exit_code(report: &SeasonReport) -> i32 {
    if !report.failed.is_empty() {
        EXIT_EPISODES_FAILED
    } else if report.downloaded.is_empty() && report.stopped_at.is_some() {
        EXIT_NOTHING_FOUND
    } else {
        0
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    let request = SeasonRequest {
        series: cli.series.clone(),
        season: cli.season,
        episodes: cli.episodes(),
        download_dir: cli.download_dir.clone(),
    };

    let options = RunOptions {
        language: cli.lang.clone(),
        prefer_regional_subtitles: cli.use_subscenter,
        prefer_largest_size: cli.best_resolution,
        subtitles_only: cli.subtitles_only,
    };

    match run_season(
        &config,
        &request,
        &options,
        CancellationToken::new(),
        handle_progress_event,
    ) {
        Ok(report) => {
            println!(
                "The following episodes were downloaded successfully: {:?}",
                report.downloaded
            );
            if !report.failed.is_empty() {
                println!("The following episodes failed: {:?}", report.failed);
            }
            for directory in &report.cleanup_failures {
                eprintln!("Warning: could not tidy up {}", directory.display());
            }
            process::exit(exit_code(&report));
        }
        Err(e) => {
            eprintln!("\nError during season run: {}", e);
            process::exit(1);
        }
    }
}
