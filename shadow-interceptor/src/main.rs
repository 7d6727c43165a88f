use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use http::Method;
use tokio::sync::watch;

use shadow_interceptor::intercept::{Decision, RequestDescriptor};
use shadow_interceptor::metrics::registry::gather_as_text;
use shadow_interceptor::metrics::service::MetricsServer;
use shadow_interceptor::obs::ObsSink;
use shadow_interceptor::{telemetry, App, AppConfig};

#[derive(Debug, Parser)]
#[command(name = "shadow-interceptor", version, about = "Rule-driven HTTP request interception")]
struct Args {
    /// Path to config.yaml (relative paths inside are resolved against its directory)
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Evaluate one request against the current rules.
    Check {
        #[arg(long)]
        url: String,
        #[arg(long, default_value = "GET")]
        method: String,
        /// Request body, usually json
        #[arg(long)]
        body: Option<String>,
        /// Print metrics after the decision
        #[arg(long)]
        metrics: bool,
    },
    /// Load the rules once and report what was kept and dropped.
    Lint,
    /// Keep the rules refreshed until Ctrl-C.
    Watch,
}

fn locate_config(p: PathBuf) -> PathBuf {
    if p.exists() || p != Path::new("config.yaml") {
        return p;
    }
    if let Ok(exe) = std::env::current_exe() {
        if let Some(cand) = exe.parent().map(|d| d.join("config.yaml")) {
            if cand.exists() {
                return cand;
            }
        }
    }
    p
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let cfg = AppConfig::load(&locate_config(args.config))?;

    match args.command {
        Command::Check {
            url,
            method,
            body,
            metrics,
        } => {
            telemetry::init_console()?;
            check(&cfg, &url, &method, body, metrics).await
        }
        Command::Lint => {
            telemetry::init_console()?;
            lint(&cfg).await
        }
        Command::Watch => run_watch(&cfg).await,
    }
}

async fn check(
    cfg: &AppConfig,
    url: &str,
    method: &str,
    body: Option<String>,
    metrics: bool,
) -> anyhow::Result<()> {
    let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .with_context(|| format!("invalid method {method:?}"))?;

    let app = App::from_config(cfg, None)?;
    if let Err(e) = app.refresher().refresh().await {
        eprintln!("rules unavailable, evaluating with none: {e}");
    }

    let mut req = RequestDescriptor::new(method, url);
    if let Some(b) = body {
        req = req.with_body(b);
    }

    match app.engine.evaluate(&req) {
        Decision::Passthrough => println!("passthrough"),
        Decision::Mock { rule } => {
            println!("mock rule={}", rule.id);
            match app.synthesizer.resolve(&rule).await {
                Ok(resp) => {
                    println!("status: {}", resp.status.as_u16());
                    print!("{}", resp.header_lines());
                    println!();
                    println!("{}", resp.text());
                }
                Err(e) => println!("synthesis failed ({:?} policy): {e}", cfg.synthesis_failure),
            }
        }
    }

    if metrics {
        print!("{}", gather_as_text());
    }
    Ok(())
}

async fn lint(cfg: &AppConfig) -> anyhow::Result<()> {
    let app = App::from_config(cfg, None)?;
    let rs = app.refresher().refresh().await?;

    for rule in &rs.rules {
        let method = rule.method.as_ref().map(Method::as_str).unwrap_or("*");
        println!("ok      {} {} {}", rule.id, method, rule.url);
    }
    for d in &rs.dropped {
        println!(
            "dropped #{} {}: {}",
            d.index,
            d.id.as_deref().unwrap_or("-"),
            d.reason
        );
    }
    println!("{} kept, {} dropped", rs.len(), rs.dropped.len());
    Ok(())
}

async fn run_watch(cfg: &AppConfig) -> anyhow::Result<()> {
    let log_dir = cfg.log_dir_path();
    telemetry::init_tracing("shadow-interceptor", &log_dir)?;
    let obs = ObsSink::new(&log_dir)?;

    let app = App::from_config(cfg, Some(obs))?;
    let (tx, rx) = watch::channel(false);

    let mut tasks = Vec::new();
    if let Some(listen) = cfg.metrics_listen.clone() {
        let rx = rx.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = MetricsServer::new(listen.clone()).run(rx).await {
                tracing::error!("metrics bind {} failed: {}", listen, e);
            }
        }));
    }
    tasks.push(tokio::spawn(app.refresher().run(rx)));

    tracing::info!(enabled = cfg.enabled, source = %app.source.describe(), "watching rules");
    tokio::signal::ctrl_c().await?;
    let _ = tx.send(true);

    for t in tasks {
        let _ = t.await;
    }
    Ok(())
}
