use anyhow::Result;
use clap::{Parser, Subcommand};
use codescan::{BarcodeFormat, ScannerConfig};
use serde::Serialize;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "codescan")]
#[command(about = "Barcode scanning pipeline with vote-based stabilization")]
#[command(version)]
#[command(long_about = "Reads barcodes from image files with the bundled QR detector and \
manages the configuration used by the live camera scanning pipeline.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "codescan.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read barcodes from image files and print them as JSON
    Read {
        /// Image files to decode
        #[arg(required = true)]
        paths: Vec<String>,

        /// Restrict detection to these formats (e.g. QR_CODE); repeatable
        #[arg(short, long = "format", value_name = "FORMAT")]
        formats: Vec<String>,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageReport {
    path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    barcodes: Option<Vec<codescan::BarcodeResult>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    init_logging(&args)?;

    info!("Starting codescan v{}", env!("CARGO_PKG_VERSION"));

    let config = match ScannerConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if args.validate_config {
        match config.validate() {
            Ok(()) => {
                info!("Configuration validation successful");
                println!("✓ Configuration is valid");
                return Ok(());
            }
            Err(e) => {
                error!("Configuration validation failed: {}", e);
                eprintln!("✗ Configuration validation failed: {}", e);
                std::process::exit(1);
            }
        }
    }
    config.validate()?;

    match args.command {
        Some(Command::Read { paths, formats }) => {
            let formats = if formats.is_empty() {
                config.scan.formats.clone()
            } else {
                BarcodeFormat::parse_list(&formats)
            };
            let failures = read_images(&paths, formats).await?;
            if failures > 0 {
                std::process::exit(1);
            }
        }
        None => {
            eprintln!("No command given. Run `codescan --help` for usage.");
            std::process::exit(2);
        }
    }

    Ok(())
}

#[cfg(feature = "qr")]
async fn read_images(paths: &[String], formats: Vec<BarcodeFormat>) -> Result<usize> {
    use codescan::scanner::read_barcodes_from_path;
    use codescan::QrDetectorProvider;

    let provider = QrDetectorProvider;
    let mut reports = Vec::with_capacity(paths.len());
    let mut failures = 0;

    for path in paths {
        match read_barcodes_from_path(&provider, path, formats.clone()).await {
            Ok(barcodes) => {
                info!("{}: {} barcodes", path, barcodes.len());
                reports.push(ImageReport {
                    path: path.clone(),
                    barcodes: Some(barcodes),
                    error: None,
                });
            }
            Err(e) => {
                error!("{}: {}", path, e);
                failures += 1;
                reports.push(ImageReport {
                    path: path.clone(),
                    barcodes: None,
                    error: Some(e.to_string()),
                });
            }
        }
    }

    println!("{}", serde_json::to_string_pretty(&reports)?);
    Ok(failures)
}

#[cfg(not(feature = "qr"))]
async fn read_images(_paths: &[String], _formats: Vec<BarcodeFormat>) -> Result<usize> {
    anyhow::bail!("codescan was built without the `qr` feature; no detector is available")
}

fn init_logging(args: &Args) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("codescan={}", log_level)));

    // Logs go to stderr so JSON results on stdout stay clean
    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .boxed()
        }
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();

    Ok(())
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# Codescan Configuration File");
    println!("# Defaults for every option. Environment variables override file values,");
    println!("# e.g. CODESCAN_STABILIZER__VOTE_THRESHOLD=5");
    println!();
    println!("{}", toml::to_string_pretty(&ScannerConfig::default())?);
    Ok(())
}
