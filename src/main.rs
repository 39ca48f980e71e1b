use anyhow::{Context, Result};
use clap::Parser;
use punchclock::model::{EmployeeSummary, KioskIdentity};
use punchclock::services::{
    BackendSeed, FileIdentityStore, IdentityStore, InMemoryBackend, NoFaceEncoder, Services,
    StaticIdentityStore,
};
use punchclock::{KioskApp, PunchclockConfig};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "punchclock")]
#[command(about = "Headless kiosk time-clock session controller")]
#[command(version)]
#[command(long_about = "Runs the session controller of a shared time-clock kiosk: employees \
identify by face or by name search plus PIN, pick a punch action, and confirm it with a \
photo. The directory, registry, ledger and photo storage are served in-process from a seed \
file or built-in demo data.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "punchclock.toml", help = "Path to TOML configuration file")]
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
    #[arg(long, help = "Validate configuration file and exit without starting the system")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Dry run mode - initialize but don't start components
    #[arg(long, help = "Perform dry run - initialize components but don't start them")]
    dry_run: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Also write logs to daily-rotated files in this directory
    #[arg(long, value_name = "DIR", help = "Directory for daily rotated log files")]
    log_dir: Option<String>,

    /// JSON file with kiosks, employees and templates for the in-process backend
    #[arg(long, value_name = "FILE", help = "Seed the in-process backend from a JSON file")]
    seed: Option<String>,

    /// Register a demo kiosk and roster, and use it as this device's identity
    #[arg(long, help = "Run against a built-in demo kiosk and roster")]
    demo_kiosk: bool,

    /// Drive the session from the terminal
    #[arg(long, help = "Enable the terminal console (type commands, Esc to quit)")]
    console: bool,

    /// Open a session right after start
    #[arg(long, help = "Open a session immediately after starting")]
    open: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    let log_guard = init_logging(&args)?;

    info!("Starting punchclock v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = match PunchclockConfig::load_from_file(&args.config) {
        Ok(config) => {
            info!("Configuration loaded successfully from: {}", args.config);
            config
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        if args.validate_config {
            eprintln!("✗ Configuration validation failed: {}", e);
            std::process::exit(1);
        }
        return Err(e.into());
    }
    if args.validate_config {
        info!("Configuration validation successful");
        println!("✓ Configuration is valid");
        return Ok(());
    }

    let services = build_services(&args, &config)?;

    let mut app = KioskApp::new(config, services).map_err(|e| {
        error!("Failed to create kiosk app: {}", e);
        e
    })?;
    app.set_keyboard_enabled(args.console);
    app.set_open_on_start(args.open);

    app.initialize().await.map_err(|e| {
        error!("Failed to initialize system: {}", e);
        e
    })?;

    if args.dry_run {
        info!("Dry run mode - components initialized but not started");
        println!("✓ Dry run completed successfully - all components initialized");
        return Ok(());
    }

    app.start().await.map_err(|e| {
        error!("Failed to start system: {}", e);
        e
    })?;

    let exit_code = app.run().await.map_err(|e| {
        error!("System error during execution: {}", e);
        e
    })?;

    info!("Punchclock exited with code: {}", exit_code);
    drop(log_guard);
    std::process::exit(exit_code);
}

fn build_services(args: &Args, config: &PunchclockConfig) -> Result<Services> {
    let backend = match &args.seed {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read seed file {}", path))?;
            let seed = BackendSeed::from_json(&json)
                .with_context(|| format!("Failed to parse seed file {}", path))?;
            let backend = InMemoryBackend::from_seed(seed);
            info!("Seeded backend with {} kiosk(s) from {}", backend.kiosk_count(), path);
            backend
        }
        None => InMemoryBackend::new(),
    };
    let backend = Arc::new(backend);

    let identity: Arc<dyn IdentityStore> = if args.demo_kiosk {
        let kiosk_id = seed_demo(&backend);
        info!("Demo kiosk {} registered", kiosk_id);
        Arc::new(StaticIdentityStore::new(Some(kiosk_id.to_string())))
    } else {
        if args.seed.is_none() {
            warn!("No seed file given; the kiosk registry is empty and sessions will be refused");
        }
        Arc::new(FileIdentityStore::new(&config.kiosk.identity_path))
    };

    // No face recognition model ships with the binary
    Ok(Services::in_memory(backend, identity, Arc::new(NoFaceEncoder)))
}

fn seed_demo(backend: &InMemoryBackend) -> Uuid {
    let kiosk_id = Uuid::new_v4();
    backend.add_kiosk(KioskIdentity {
        kiosk_id: Some(kiosk_id),
        display_name: "Demo Kiosk".to_string(),
        tenant: "demo".to_string(),
        biometric_enabled: false,
        manual_entry_enabled: true,
        inactivity_timeout_seconds: 0,
    });

    for (id, name, number, department) in [
        ("emp-1", "Jordan Smith", "1001", "Service"),
        ("emp-2", "Alex Rivera", "1002", "Parts"),
        ("emp-3", "Sam Carter", "1003", "Sales"),
    ] {
        backend.add_employee(
            EmployeeSummary {
                employee_id: id.to_string(),
                display_name: name.to_string(),
                employee_number: Some(number.to_string()),
                department: Some(department.to_string()),
            },
            "1234",
        );
    }
    kiosk_id
}

fn init_logging(args: &Args) -> Result<Option<WorkerGuard>> {
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
        .unwrap_or_else(|_| EnvFilter::new(format!("punchclock={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    let mut layers = vec![fmt_layer];
    let mut guard = None;
    if let Some(dir) = &args.log_dir {
        let appender = tracing_appender::rolling::daily(dir, "punchclock.log");
        let (writer, file_guard) = tracing_appender::non_blocking(appender);
        layers.push(
            fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .boxed(),
        );
        guard = Some(file_guard);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .init();

    Ok(guard)
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# Punchclock Configuration File");
    println!("# Every value can be overridden with PUNCHCLOCK_<SECTION>__<KEY>,");
    println!("# e.g. PUNCHCLOCK_LOCKOUT__MAX_ATTEMPTS=5");
    println!();
    println!("{}", PunchclockConfig::default().to_toml()?);
    Ok(())
}
