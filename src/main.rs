mod cli;

use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("huellas=info,tower_http=info")),
        )
        .init();

    let code = match cli::run() {
        cli::RunOutcome::Serve(config) => match huellas::serve(config).await {
            Ok(()) => 0,
            Err(err) => {
                tracing::error!(error = %err, "server stopped");
                1
            }
        },
        cli::RunOutcome::Listen {
            config,
            user_id,
            visible,
        } => match huellas::listen(config, &user_id, visible).await {
            Ok(()) => 0,
            Err(err) => {
                tracing::error!(error = %err, "listener stopped");
                1
            }
        },
        cli::RunOutcome::Precache(shell_config) => {
            let cache_name = shell_config.cache_name.clone();
            match huellas::precache(shell_config).await {
                Ok(cached) => {
                    println!("{cached} assets cached in {cache_name}");
                    0
                }
                Err(err) => {
                    eprintln!("precache failed: {err}");
                    1
                }
            }
        }
        cli::RunOutcome::Exit(code) => code,
    };
    if code != 0 {
        std::process::exit(code);
    }
}
