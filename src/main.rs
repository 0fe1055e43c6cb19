//! `secp256k1-probe`: report whether the secp256k1 native backend loads on
//! this host, and why not if it does not.
//!
//! Exit codes: `0` enabled, `1` disabled, `2` unsupported platform.

#![deny(unsafe_code)]

use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use secp256k1_native::{config, BackendStatus, Loader, LoaderConfig};

#[derive(Parser, Debug)]
#[command(name = "secp256k1-probe", version, about)]
struct Args {
    /// Config file to use instead of $SECP256K1_NATIVE_CONFIG / ~/.firefly.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Architecture identifier to classify instead of the running one.
    #[arg(long, requires = "os")]
    arch: Option<String>,

    /// OS identifier to classify instead of the running one.
    #[arg(long, requires = "arch")]
    os: Option<String>,

    /// Print the report and logs as JSON.
    #[arg(long)]
    json: bool,

    /// Log loader steps at debug level.
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Serialize, Debug)]
struct Report {
    enabled: bool,
    context: i64,
    platform: Option<String>,
    source: Option<&'static str>,
    path: Option<String>,
    category: Option<&'static str>,
    error: Option<String>,
}

impl Report {
    fn from_status(status: &BackendStatus) -> Self {
        let backend = status.backend();
        Self {
            enabled: status.is_enabled(),
            context: status.context(),
            platform: backend.map(|b| b.platform().to_string()),
            source: backend.map(|b| b.source().as_str()),
            path: backend.map(|b| b.path().display().to_string()),
            category: status.error().map(|e| e.category()),
            error: status.error().map(ToString::to_string),
        }
    }

    fn print(&self, json: bool) {
        if json {
            match serde_json::to_string(self) {
                Ok(line) => println!("{line}"),
                Err(e) => eprintln!("failed to encode report: {e}"),
            }
            return;
        }
        if self.enabled {
            println!("secp256k1 native backend: enabled");
            println!("  context:  {:#x}", self.context);
            if let Some(platform) = &self.platform {
                println!("  platform: {platform}");
            }
            if let (Some(source), Some(path)) = (self.source, &self.path) {
                println!("  library:  {path} ({source})");
            }
        } else {
            println!("secp256k1 native backend: disabled");
            if let (Some(category), Some(error)) = (self.category, &self.error) {
                println!("  reason:   [{category}] {error}");
            }
        }
    }
}

fn init_logging(args: &Args) {
    let default = if args.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if args.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args);

    let mut loader_config = match &args.config {
        Some(path) => LoaderConfig::load_or_default(path),
        None => config::config_path()
            .map(|p| LoaderConfig::load_or_default(&p))
            .unwrap_or_default(),
    };
    loader_config.apply_overrides(|key| std::env::var_os(key));

    let mut loader = Loader::new(loader_config);
    if let (Some(arch), Some(os)) = (args.arch, args.os) {
        loader = loader.with_target(arch, os);
    }

    match loader.initialize() {
        Ok(status) => {
            Report::from_status(&status).print(args.json);
            if status.is_enabled() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            }
        }
        Err(unsupported) => {
            eprintln!("secp256k1-probe: {unsupported}");
            ExitCode::from(2)
        }
    }
}
