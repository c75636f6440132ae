//! splittun command-line front door.
//!
//! Parses `--conf`/`--local`/`--remote`, builds the configured proxies,
//! and runs until SIGINT/SIGTERM/SIGHUP.

mod cli;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tunnel_core::{Config, LocalServer, ListMode, RemoteServer, Router, Signal, SiteList, Socks5, Tunnel, UserPass};

use cli::Args;

fn init_tracing(debug: bool, file: Option<&str>) {
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match file {
        Some(path) => {
            let path = path.to_string();
            builder
                .with_writer(move || {
                    std::fs::OpenOptions::new()
                        .create(true)
                        .append(true)
                        .open(&path)
                        .expect("open log file")
                })
                .with_ansi(false)
                .init();
        }
        None => builder.init(),
    }
}

fn build_tunnels(cfg: &Config) -> Result<Vec<Arc<dyn tunnel_core::Proxy>>, String> {
    cfg.tunnels
        .iter()
        .map(|t| {
            Tunnel::new(&t.method, &t.key, t.addr.clone())
                .map(|t| Arc::new(t) as Arc<dyn tunnel_core::Proxy>)
                .map_err(|e| format!("create tunnel proxy for {}: {e}", t.addr))
        })
        .collect()
}

fn build_socks(cfg: &Config) -> Result<Vec<Arc<dyn tunnel_core::Proxy>>, String> {
    cfg.socks
        .iter()
        .map(|s| {
            let mut methods = vec![tunnel_core::socks5::AUTH_NOT_REQUIRED];
            if !s.user_pass.is_empty() {
                methods.push(tunnel_core::socks5::AUTH_USER_PASS);
            }
            let users = UserPass::new(s.user_pass.clone());
            Socks5::new(&methods, users, s.addr.clone())
                .map(|s| Arc::new(s) as Arc<dyn tunnel_core::Proxy>)
                .map_err(|e| format!("create local socks5 proxy for {}: {e}", s.addr))
        })
        .collect()
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigint = signal(SignalKind::interrupt()).expect("install SIGINT handler");
        let mut sigterm = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        let mut sighup = signal(SignalKind::hangup()).expect("install SIGHUP handler");
        tokio::select! {
            _ = sigint.recv() => {},
            _ = sigterm.recv() => {},
            _ = sighup.recv() => {},
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

async fn run(args: Args, cfg: Config) -> Result<(), String> {
    if cfg.tunnels.is_empty() || (args.local && cfg.socks.is_empty()) {
        return Err("empty socks or tunnels".to_string());
    }

    let signal = Signal::new();
    let tunnels = build_tunnels(&cfg)?;

    if args.local {
        let router = Arc::new(Router {
            suffix_list: SiteList::new(ListMode::DirectSuffixes, &cfg.direct_suffixes),
            direct_list: SiteList::new(ListMode::Direct, &cfg.direct_sites),
            tunnel_list: SiteList::new(ListMode::Tunnel, &cfg.tunnel_sites),
        });
        let socks = build_socks(&cfg)?;
        let count = socks.len();

        let mut handles = Vec::new();
        for sock in socks {
            let server = Arc::new(LocalServer::new(
                sock,
                tunnels.clone(),
                Arc::clone(&router),
                signal.clone(),
            ));
            handles.push(tokio::spawn(server.run()));
        }
        info!(count, "local servers running");

        wait_for_shutdown_signal().await;
        signal.close();
        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "local server task panicked");
            }
        }
    } else {
        let count = tunnels.len();
        let mut handles = Vec::new();
        for tunnel in tunnels {
            let server = Arc::new(RemoteServer::new(tunnel, signal.clone()));
            handles.push(tokio::spawn(server.run()));
        }
        info!(count, "remote servers running");

        wait_for_shutdown_signal().await;
        signal.close();
        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "remote server task panicked");
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(e) = args.validate() {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    let cfg = match Config::load(&args.conf) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("parsing config file failed: {e}");
            return ExitCode::FAILURE;
        }
    };

    let debug = cfg.log.as_ref().map(|l| l.debug).unwrap_or(false);
    let log_file = cfg.log.as_ref().and_then(|l| l.file.as_deref());
    init_tracing(debug, log_file);

    if let Err(e) = run(args, cfg).await {
        error!(error = %e, "fatal");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
