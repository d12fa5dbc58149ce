use clap::{Parser, Subcommand};
use env_logger::Env;
use folio::cache::DerivativeCache;
use folio::cache::DiskStore;
use folio::config::{self, ServerConfig};
use folio::imaging::RustBackend;
use folio::resize::{self, ResizeService};
use folio::{cache, catalog, output, server, thumbnails};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "folio")]
#[command(version)]
#[command(about = "On-demand image delivery for photo portfolios")]
#[command(long_about = "\
On-demand image delivery for photo portfolios

Originals live in a single directory. Resized derivatives are generated on
first request and cached next to them; a catalog endpoint lists the photos
newest first.

Photos directory:

  photos/
  ├── 20230601_120000_B.jpg        # Original
  ├── photo_A.jpg                  # Original
  ├── thumbnails/                  # Written by 'folio thumbnails'
  │   └── photo_A.webp
  └── resized/                     # Derivative cache, managed by the server
      └── webp/640/photo_A.webp

Capture date (first available wins):
  EXIF DateTimeOriginal → EXIF DateTime → filename timestamp → file mtime

Run 'folio gen-config' to generate a documented folio.toml.")]
struct Cli {
    /// Config file (missing file = defaults)
    #[arg(long, default_value = config::DEFAULT_CONFIG_FILE, global = true)]
    config: PathBuf,

    /// Photos directory (overrides `photos_root`)
    #[arg(long, global = true)]
    photos: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server
    Serve {
        /// Listen address (overrides `server.bind`)
        #[arg(long)]
        bind: Option<SocketAddr>,
    },
    /// Print the photo catalog, newest first
    Catalog {
        /// Emit the same JSON as GET /photos-list
        #[arg(long)]
        json: bool,
    },
    /// Render one derivative through the cache
    Render {
        /// Original file name inside the photos directory
        #[arg(long)]
        file: String,
        #[arg(long)]
        width: Option<u32>,
        /// webp, jpeg or png
        #[arg(long)]
        format: Option<String>,
        #[arg(long)]
        quality: Option<u32>,
        /// Write the bytes here instead of only reporting them
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Generate gallery thumbnails for every original
    Thumbnails {
        /// Regenerate thumbnails that are already up to date
        #[arg(long)]
        force: bool,
    },
    /// Delete cached derivatives whose original is gone
    Sweep,
    /// Print a stock folio.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    if let Command::GenConfig = cli.command {
        print!("{}", config::stock_config_toml());
        return Ok(());
    }

    let mut config = config::load_config(&cli.config)?;
    if let Some(photos) = cli.photos {
        config.photos_root = photos;
    }

    match cli.command {
        Command::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            runtime.block_on(server::run(&config))?;
        }
        Command::Catalog { json } => {
            init_thread_pool(&config.processing);
            let records = catalog::list_photos(&RustBackend::new(), &config.photos_root)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                output::print_catalog(&records);
            }
        }
        Command::Render {
            file,
            width,
            format,
            quality,
            out,
        } => {
            let request = render_request(&config, file, width, format, quality)?;
            let service = ResizeService::new(
                &config.photos_root,
                RustBackend::with_pixel_limit(config.resize.max_pixels),
                DerivativeCache::new(
                    DiskStore::new(config.resized_dir()),
                    config.resize.default_quality(),
                ),
                Arc::new(rayon::ThreadPoolBuilder::new().num_threads(1).build()?),
                config.resize.generation_timeout(),
            );
            let derivative = service.get(&request)?;
            println!(
                "{} {}w {} q{}: {} bytes ({})",
                request.basename,
                request.width,
                request.format,
                request.quality.value(),
                derivative.bytes.len(),
                derivative.status.header_value()
            );
            if let Some(out) = out {
                std::fs::write(&out, &derivative.bytes)?;
                println!("Wrote {}", out.display());
            }
        }
        Command::Thumbnails { force } => {
            init_thread_pool(&config.processing);
            let (tx, rx) = std::sync::mpsc::channel();
            let printer = std::thread::spawn(move || {
                for event in rx {
                    for line in output::format_thumbnail_event(&event) {
                        println!("{}", line);
                    }
                }
            });
            let result = thumbnails::generate_thumbnails(
                &RustBackend::with_pixel_limit(config.resize.max_pixels),
                &config.photos_root,
                &config.thumbnails,
                force,
                Some(tx),
            );
            if printer.join().is_err() {
                log::warn!("progress printer panicked");
            }
            output::print_thumbnail_report(&result?);
            println!("Thumbnails in {}", config.thumbnails_dir().display());
        }
        Command::Sweep => {
            let report = cache::sweep_orphans(&config.photos_root, &config.resized_dir())?;
            output::print_sweep_report(&report);
        }
        // Printed before the config is loaded.
        Command::GenConfig => {}
    }

    Ok(())
}

/// Build a request the same way the HTTP endpoint does, except that an
/// unknown format name is an error rather than a fallback.
fn render_request(
    config: &ServerConfig,
    file: String,
    width: Option<u32>,
    format: Option<String>,
    quality: Option<u32>,
) -> Result<resize::ResizeRequest, resize::ResizeError> {
    let mut query = std::collections::HashMap::from([("file".to_string(), file)]);
    if let Some(width) = width {
        query.insert("w".into(), width.to_string());
    }
    if let Some(quality) = quality {
        query.insert("q".into(), quality.to_string());
    }
    if let Some(format) = &format {
        query.insert("fmt".into(), resize::parse_format(format)?.to_string());
    }
    resize::ResizeRequest::from_query(&query, None, &config.resize)
}

/// Initialize the global rayon pool for batch commands.
///
/// Capped at the number of available cores.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
