use std::process::ExitCode;
use std::sync::Arc;

use camino::Utf8PathBuf;
use clap::{crate_authors, crate_version, Arg, ArgAction, Command};

use gmsa_authd::center::Center;
use gmsa_authd::config::{LogLevel, LogTarget, ProcessConfig};
use gmsa_authd::log::Logger;
use gmsa_authd::store::{FileStorage, RoleStore};

fn main() -> ExitCode {
    let cmd = Command::new("gmsa-authd")
        .version(crate_version!())
        .author(crate_authors!())
        .next_line_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .help("TOML bootstrap file; CLI flags below override its contents"),
        )
        .arg(
            Arg::new("state_dir")
                .long("state-dir")
                .help("Directory holding the persisted Config and Role records"),
        )
        .arg(
            Arg::new("listen_addr")
                .long("listen-addr")
                .help("Address the HTTP surface listens on"),
        )
        .arg(
            Arg::new("log_level")
                .long("log-level")
                .value_parser(["trace", "debug", "info", "warning", "error", "critical"])
                .help("Minimum log level"),
        )
        .arg(
            Arg::new("log_target")
                .long("log-target")
                .value_parser(["stdout", "stderr"])
                .help("Where to send log output"),
        )
        .arg(Arg::new("check_config").long("check-config").action(ArgAction::SetTrue));

    let matches = cmd.get_matches();

    let mut process_config = match matches.get_one::<String>("config") {
        Some(path) => match ProcessConfig::load_from_file(&Utf8PathBuf::from(path)) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("could not load --config '{path}': {err}");
                return ExitCode::FAILURE;
            }
        },
        None => ProcessConfig::default(),
    };
    if let Some(dir) = matches.get_one::<String>("state_dir") {
        process_config.state_dir = Utf8PathBuf::from(dir);
    }
    if let Some(addr) = matches.get_one::<String>("listen_addr") {
        match addr.parse() {
            Ok(addr) => process_config.listen_addr = addr,
            Err(err) => {
                eprintln!("invalid --listen-addr '{addr}': {err}");
                return ExitCode::FAILURE;
            }
        }
    }
    if let Some(level) = matches.get_one::<String>("log_level") {
        process_config.logging.level = parse_log_level(level);
    }
    if let Some(target) = matches.get_one::<String>("log_target") {
        process_config.logging.target = match target.as_str() {
            "stdout" => LogTarget::Stdout,
            _ => LogTarget::Stderr,
        };
    }

    if matches.get_flag("check_config") {
        return ExitCode::SUCCESS;
    }

    let logger = match Logger::launch(&process_config.logging) {
        Ok(logger) => logger,
        Err(err) => {
            eprintln!("could not start logger: {err}");
            return ExitCode::FAILURE;
        }
    };

    let storage = match FileStorage::new(process_config.state_dir.clone()) {
        Ok(storage) => storage,
        Err(err) => {
            tracing::error!("could not open state directory '{}': {err}", process_config.state_dir);
            return ExitCode::FAILURE;
        }
    };

    let center = Arc::new(Center::new(RoleStore::new(storage), logger));
    if let Err(err) = center.reload_from_store() {
        tracing::error!("could not load persisted configuration: {err}");
        return ExitCode::FAILURE;
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("could not start tokio runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(async {
        let listener = match tokio::net::TcpListener::bind(process_config.listen_addr).await {
            Ok(listener) => listener,
            Err(err) => {
                tracing::error!("could not bind to {}: {err}", process_config.listen_addr);
                return ExitCode::FAILURE;
            }
        };

        tracing::info!("listening on {}", process_config.listen_addr);

        let app = gmsa_authd::http::router(center);
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
            })
            .await;

        match result {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                tracing::error!("HTTP server failed: {err}");
                ExitCode::FAILURE
            }
        }
    })
}

fn parse_log_level(s: &str) -> LogLevel {
    match s {
        "trace" => LogLevel::Trace,
        "debug" => LogLevel::Debug,
        "warning" => LogLevel::Warning,
        "error" => LogLevel::Error,
        "critical" => LogLevel::Critical,
        _ => LogLevel::Info,
    }
}
