//! teletext-viewer: render captured teletext pages in the terminal.
//!
//! Loads a JSON capture into a page cache, replays a key script through the
//! navigation controller and prints the resulting page.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use log::{debug, info, warn};
use teletext::{DecoderSettings, NavigationSettings, PageStore, PassiveSource, Teletext};

mod capture;
mod keys;
mod logging;
mod render;

use keys::Key;

/// teletext-viewer - Terminal viewer for captured teletext pages
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON page capture to load
    #[arg(short = 'i', long)]
    capture: PathBuf,

    /// Page to show first (three hex digits)
    #[arg(short, long)]
    page: Option<String>,

    /// Sub-page to show (hex)
    #[arg(short, long)]
    sub: Option<String>,

    /// Key script replayed before rendering (see `keys`)
    #[arg(short, long)]
    keys: Option<String>,

    /// Print the page as JSON
    #[arg(long)]
    json: bool,

    /// Print plain text without colours
    #[arg(long)]
    plain: bool,

    /// Ignore Level 2.5 enhancement data
    #[arg(long)]
    no_level25: bool,

    /// Reveal concealed text
    #[arg(long)]
    reveal: bool,

    /// Flash phase in milliseconds
    #[arg(long, default_value = "0")]
    phase: u64,

    /// Configuration file path
    #[arg(short = 'f', long)]
    config: Option<PathBuf>,

    /// Directory for log files (console only when unset)
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Configuration file format.
#[derive(Debug, serde::Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    decoder: DecoderSettings,
    #[serde(default)]
    navigation: NavigationSection,
    #[serde(default)]
    logging: LoggingSection,
}

#[derive(Debug, serde::Deserialize, Default)]
struct NavigationSection {
    start_page: Option<String>,
}

#[derive(Debug, serde::Deserialize, Default)]
struct LoggingSection {
    log_dir: Option<String>,
    retention_days: Option<u64>,
    level: Option<String>,
}

fn load_config(path: &Path) -> Result<ConfigFile, Box<dyn std::error::Error>> {
    let contents = std::fs::read_to_string(path)?;
    let config: ConfigFile = toml::from_str(&contents)?;
    Ok(config)
}

/// Merge file settings with command-line flags; flags take precedence.
fn settings(args: &Args, file: &ConfigFile) -> Result<(DecoderSettings, NavigationSettings), Box<dyn std::error::Error>> {
    let decoder = DecoderSettings {
        level25: file.decoder.level25 && !args.no_level25,
        hint: file.decoder.hint || args.reveal,
        ..file.decoder
    };

    let start_page = match args.page.as_deref().or(file.navigation.start_page.as_deref()) {
        Some(page) => NavigationSettings::parse_page(page)?,
        None => NavigationSettings::default().start_page,
    };

    Ok((decoder, NavigationSettings { start_page }))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load config file: explicit path > auto-detect > default
    let config_path = args.config.clone().or_else(|| {
        let default_path = PathBuf::from("teletext-viewer.toml");
        default_path.exists().then_some(default_path)
    });
    let file_config = match &config_path {
        Some(path) => match load_config(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load config file {}: {}", path.display(), e);
                return Err(e);
            }
        },
        None => ConfigFile::default(),
    };

    let log_dir = args
        .log_dir
        .clone()
        .or_else(|| file_config.logging.log_dir.as_ref().map(PathBuf::from));
    logging::init_logging(
        log_dir.as_deref(),
        file_config.logging.retention_days.unwrap_or(7),
        args.verbose,
        file_config.logging.level.as_deref(),
    )?;
    if let Some(path) = &config_path {
        info!("Loaded config from: {}", path.display());
    }

    let (decoder, navigation) = settings(&args, &file_config)?;
    debug!("Decoder settings: {:?}", decoder);

    let cache = PageStore::shared();
    let count = capture::load_capture(&args.capture, &mut cache.write())?;
    info!("Loaded {} pages from {}", count, args.capture.display());

    let mut teletext = Teletext::new(cache, Arc::new(PassiveSource), decoder, navigation)?;
    if teletext.state().pending {
        warn!("Page {:03X} is not in the capture", navigation.start_page);
    }

    if let Some(sub) = &args.sub {
        let sub_page = u8::from_str_radix(sub.trim(), 16)?;
        if !teletext.goto_sub_page(sub_page) {
            warn!("Sub-page {:02X} is not in the capture", sub_page);
        }
    }

    // Catching needs a decoded page, so render after every key.
    teletext.render();
    for key in keys::parse_keys(args.keys.as_deref().unwrap_or(""))? {
        match key {
            Key::Action(action) => {
                teletext.handle(action);
            }
            Key::TopStep { forward } => teletext.top_step(forward),
        }
        teletext.render();
    }

    let Some(decoded) = teletext.render() else {
        return Err(format!("Page {:03X} is not in the capture", teletext.state().page).into());
    };
    let labels = teletext.fasttext_labels();
    let state = teletext.state();

    if args.json {
        let view = render::PageView::new(&decoded, state, &labels);
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else if args.plain {
        println!("{}", render::render_plain(&decoded, state));
        println!("{}", render::render_labels(&labels, false));
        println!("{}", render::status_line(state));
    } else {
        print!("{}", render::render_terminal(&decoded, state, args.phase));
        println!("{}", render::render_labels(&labels, true));
        println!("{}", render::status_line(state));
    }

    Ok(())
}
