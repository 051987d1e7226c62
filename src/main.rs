use clap::Parser;
use claudito_lib::config::{ServerArgs, ServerConfig};
use claudito_lib::file_storage::ensure_dir;
use claudito_lib::server::{self, ServerAppState};
use claudito_lib::shutdown::{register_signal_handlers, ShutdownHandler, ShutdownState};

fn main() {
    let args = ServerArgs::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match ServerConfig::load(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to create tokio runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run(config)) {
        eprintln!("Server error: {}", e);
        std::process::exit(1);
    }
}

async fn run(config: ServerConfig) -> Result<(), String> {
    ensure_dir(&config.data_dir)?;
    log::info!("[Server] Data directory: {}", config.data_dir.display());
    match &config.claude_path {
        Some(path) => log::info!("[Server] Using claude CLI at {}", path.display()),
        None => log::warn!("[Server] claude CLI not found; agent requests will fail"),
    }

    let shutdown_state = ShutdownState::new();
    if let Err(e) = register_signal_handlers(shutdown_state.clone()) {
        log::warn!("Failed to register signal handlers: {}", e);
    }

    claudito_lib::perform_auto_recovery(&config.data_dir);

    let state = ServerAppState::new(&config, shutdown_state.clone());
    let result = server::run_server(config.port, &config.bind, state.clone()).await;

    ShutdownHandler::with_state(shutdown_state).handle_shutdown(|| state.stop_all());
    result
}
