use costing_core::{init_logging, init_stderr_logging};
use costing_server::config::{ServerConfig, StartupError};
use costing_server::http::{self, AppState};
use log::info;

#[tokio::main]
async fn main() {
    let config = match ServerConfig::load() {
        Ok(cfg) => cfg,
        Err(err) => exit_with(err),
    };

    if let Err(err) = init_logs(&config) {
        exit_with(err);
    }

    let state = match config
        .schema_profile()
        .and_then(|profile| AppState::new(&config, profile))
    {
        Ok(state) => state,
        Err(err) => exit_with(err),
    };

    let listener = match tokio::net::TcpListener::bind(config.bind_addr).await {
        Ok(listener) => listener,
        Err(_) => exit_with(StartupError {
            code: "ERR_BIND_FAILED",
            message: format!("failed to bind listener on {}", config.bind_addr),
        }),
    };

    info!(
        "event=server_start module=http status=ok bind_addr={} generation={:?}",
        config.bind_addr, config.schema_generation
    );

    if let Err(err) = axum::serve(listener, http::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        exit_with(StartupError {
            code: "ERR_SERVER_FAILED",
            message: err.to_string(),
        });
    }
    info!("event=server_stop module=http status=ok");
}

fn init_logs(config: &ServerConfig) -> Result<(), StartupError> {
    let level = config.effective_log_level();
    match config.log_dir.as_deref() {
        Some(dir) => init_logging(level, dir),
        None => init_stderr_logging(level),
    }
    .map_err(|message| StartupError {
        code: "ERR_LOGGING",
        message,
    })
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn exit_with(err: StartupError) -> ! {
    eprintln!("STARTUP_ERROR {}", err);
    std::process::exit(1);
}
