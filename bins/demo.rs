use std::process::ExitCode;

use datastore::demo::DemoController;
use dotenvy::dotenv;
use tracing::{error, info, warn};
use uuid::Uuid;

fn init_logging() {
    // load .env first so RUST_LOG from it applies
    dotenv().ok();
    match std::env::var("LOG_FORMAT").as_deref() {
        Ok("json") => common::utils::logging::init_logging_json(),
        _ => common::utils::logging::init_logging_default(),
    }
    info!(service = "demo", event = "logger_init", "tracing subscriber initialized");
}

fn load_config() -> configs::AppConfig {
    match configs::AppConfig::load_and_validate() {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(service = "demo", event = "config_default", error = %e, "no usable config.toml; using defaults");
            configs::AppConfig::default()
        }
    }
}

fn main() -> ExitCode {
    init_logging();

    let run_id = Uuid::new_v4();
    let pid = std::process::id();
    let version = env!("CARGO_PKG_VERSION");

    std::panic::set_hook(Box::new(move |info| {
        error!(service = "demo", event = "panic", %run_id, pid, message = %info, "unhandled panic occurred");
    }));

    let cfg = load_config();

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if let Some(w) = cfg.demo.worker_threads { builder.worker_threads(w); }
    let rt = match builder.build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(service = "demo", event = "runtime_build_failed", error = %e, "failed to build tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    info!(
        service = "demo",
        event = "start",
        %run_id,
        pid,
        version,
        data_dir = %cfg.storage.data_dir.display(),
        "datastore demo starting"
    );

    let controller = match rt.block_on(async {
        datastore::runtime::ensure_env(&cfg.storage.data_dir).await?;
        Ok::<_, anyhow::Error>(DemoController::open(&cfg.storage, &cfg.demo).await?)
    }) {
        Ok(controller) => controller,
        Err(e) => {
            error!(service = "demo", event = "open_failed", error = %e, "cannot open stores");
            return ExitCode::FAILURE;
        }
    };

    // Read once from this (non-runtime) thread before anything is scheduled.
    let handle = rt.handle().clone();
    if let Err(e) = controller
        .read_counter_blocking(&handle)
        .and_then(|_| controller.read_example_counter_blocking(&handle))
    {
        error!(service = "demo", event = "read_failed", error = %e, "initial read failed");
        return ExitCode::FAILURE;
    }

    rt.block_on(async {
        tokio::select! {
            res = async {
                let report = controller.run().await?;
                let sequential = controller.run_sequential().await?;
                Ok::<_, datastore::StoreError>((report, sequential))
            } => match res {
                Ok((report, (before, after))) => {
                    info!(
                        service = "demo",
                        event = "stop",
                        %run_id,
                        counter = report.counter_after,
                        example_counter = report.settings_after,
                        sequential_counter_before = before,
                        sequential_counter_after = after,
                        "demo finished"
                    );
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    error!(service = "demo", event = "run_failed", error = %e, "demo run failed");
                    ExitCode::FAILURE
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!(service = "demo", event = "shutdown_signal", %run_id, pid, "received Ctrl+C, stopping");
                ExitCode::SUCCESS
            }
        }
    })
}
