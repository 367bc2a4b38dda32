use std::net::SocketAddr;
use tokio::net::TcpListener;

use campus_chat_server::auth::jwt::{self, ACCESS_TOKEN_TTL_SECS};
use campus_chat_server::config::{generate_config_template, Config};
use campus_chat_server::{db, identity, routes, state};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load config with layered precedence: defaults < TOML < env < CLI
    let config = Config::load()?;

    // Handle --generate-config: print template and exit
    if config.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    // Initialize tracing/logging
    if config.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "campus_chat_server=info".parse().unwrap()),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "campus_chat_server=info".parse().unwrap()),
            )
            .init();
    }

    tracing::info!(
        "Campus chat server v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    // Initialize SQLite database
    let db = db::init_db(&config.data_dir)?;

    // Load or generate JWT signing key (256-bit random, stored in data_dir)
    let jwt_secret = jwt::load_or_generate_jwt_secret(&config.data_dir)?;

    // Handle --provision-user: upsert the user, print a token and exit
    if let Some(user_id) = &config.provision_user {
        let display_name = config.display_name.as_deref().unwrap_or(user_id);
        let user = identity::register_user(&db, user_id, display_name)
            .map_err(|e| e as Box<dyn std::error::Error>)?;
        let token = jwt::issue_access_token(&jwt_secret, &user.id, ACCESS_TOKEN_TTL_SECS)?;
        tracing::info!(user_id = %user.id, "Provisioned user");
        println!("{}", token);
        return Ok(());
    }

    let app_state = state::AppState::new(db, jwt_secret, &config)?;
    tracing::info!(
        media_dir = %app_state.media_dir.display(),
        history_timeout_ms = config.history_timeout_ms,
        "Messaging core ready"
    );

    // Build router
    let app = routes::build_router(app_state);

    // Bind and serve
    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
