use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use listening_timeline::config::{AppConfig, CliConfig, FileConfig, DEFAULT_COVERAGE_YEARS};
use listening_timeline::history::{CalendarDay, CanonicalListenRecord};
use listening_timeline::{CalendarQuery, SqliteTimelineStore, TimelineRebuilder, TimelineStore};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
#[clap(version, about)]
struct CliArgs {
    /// Path to the SQLite timeline database file.
    #[clap(long, value_parser = parse_path)]
    pub db_path: Option<PathBuf>,

    /// Path to a TOML config file. Its values override command line values.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Years of history one export covers, counting back from its download date.
    #[clap(long, default_value_t = DEFAULT_COVERAGE_YEARS)]
    pub coverage_years: u32,

    /// Print results as JSON.
    #[clap(long)]
    pub json: bool,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rebuild the canonical timeline and calendar from every imported batch.
    Rebuild,

    /// Print the coverage window derived for each batch.
    Coverage,

    /// Print the listening calendar.
    Calendar {
        /// Only days no export covers.
        #[clap(long, conflicts_with = "listened")]
        missing: bool,

        /// Only days with at least one listen.
        #[clap(long)]
        listened: bool,
    },

    /// Print canonical listens in timeline order.
    Listens {
        /// First date to include (YYYY-MM-DD).
        #[clap(long)]
        from: Option<NaiveDate>,

        /// Last date to include (YYYY-MM-DD).
        #[clap(long)]
        to: Option<NaiveDate>,

        #[clap(long)]
        artist: Option<String>,

        #[clap(long, requires = "artist")]
        track: Option<String>,

        /// Maximum number of listens to print.
        #[clap(long, default_value_t = 100)]
        limit: usize,
    },
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_calendar(days: &[CalendarDay], json: bool) -> Result<()> {
    if json {
        return print_json(days);
    }
    for day in days {
        let status = match (day.has_listen, day.is_missing) {
            (true, _) => "listened",
            (false, true) => "missing",
            (false, false) => "silent",
        };
        println!("{}  {}", day.date, status);
    }
    Ok(())
}

fn print_listens(listens: &[CanonicalListenRecord], json: bool) -> Result<()> {
    if json {
        return print_json(listens);
    }
    for listen in listens {
        println!(
            "{:>8}  {}  {} - {} ({} ms)",
            listen.position,
            listen.end_time.to_rfc3339(),
            listen.artist_name,
            listen.track_name,
            listen.ms_played
        );
    }
    Ok(())
}

fn query_listens(
    store: &dyn TimelineStore,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    artist: Option<&str>,
    track: Option<&str>,
    limit: usize,
) -> Result<Vec<CanonicalListenRecord>> {
    let mut listens = match (from, to, artist, track) {
        (None, None, None, _) => return store.get_listens(0, limit),
        (None, None, Some(artist), Some(track)) => store.get_listens_by_track(artist, track)?,
        (None, None, Some(artist), None) => store.get_listens_by_artist(artist)?,
        (from, to, _, _) => {
            // Stored dates compare as text, so open bounds stay within 4-digit years
            let earliest = NaiveDate::from_ymd_opt(1, 1, 1).unwrap_or(NaiveDate::MIN);
            let latest = NaiveDate::from_ymd_opt(9999, 12, 31).unwrap_or(NaiveDate::MAX);
            store.get_listens_between(from.unwrap_or(earliest), to.unwrap_or(latest))?
        }
    };
    if let Some(artist) = artist {
        listens.retain(|l| l.artist_name == artist);
    }
    if let Some(track) = track {
        listens.retain(|l| l.track_name == track);
    }
    listens.truncate(limit);
    Ok(listens)
}

fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    // Logs go to stderr so stdout stays clean for results
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    let file_config = cli_args
        .config
        .as_deref()
        .map(FileConfig::load)
        .transpose()?;
    let cli_config = CliConfig {
        db_path: cli_args.db_path.clone(),
        coverage_years: cli_args.coverage_years,
    };
    let config = AppConfig::resolve(&cli_config, file_config)?;

    info!("Opening timeline database at {:?}...", config.db_path);
    let store: Arc<dyn TimelineStore> = Arc::new(SqliteTimelineStore::new(&config.db_path)?);
    let rebuilder = TimelineRebuilder::new(store.clone(), config.coverage);

    match cli_args.command {
        Command::Rebuild => {
            let report = rebuilder.rebuild()?;
            if cli_args.json {
                print_json(&report)?;
            } else {
                println!("{}", report);
            }
        }
        Command::Coverage => {
            let windows = rebuilder.coverage_windows()?;
            if cli_args.json {
                print_json(&windows)?;
            } else {
                for window in windows {
                    println!("batch {}  {} .. {}", window.batch_id, window.start, window.end);
                }
            }
        }
        Command::Calendar { missing, listened } => {
            let query = if missing {
                CalendarQuery::missing()
            } else if listened {
                CalendarQuery::listened()
            } else {
                CalendarQuery::all()
            };
            print_calendar(&store.get_calendar(&query)?, cli_args.json)?;
        }
        Command::Listens {
            from,
            to,
            artist,
            track,
            limit,
        } => {
            let listens = query_listens(
                store.as_ref(),
                from,
                to,
                artist.as_deref(),
                track.as_deref(),
                limit,
            )?;
            print_listens(&listens, cli_args.json)?;
        }
    }
    Ok(())
}
