use buzai::config::AppConfig;
use buzai::openai_client::{OpenAiClient, TextGenerator};
use buzai::{build_router, db, AppState};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    init_logging()?;

    let config = AppConfig::from_env()?;

    let db_pool = db::create_pool(&config).await.map_err(|e| {
        tracing::error!("Failed to connect to database: {}", e);
        e
    })?;
    tracing::info!("Database connection pool ready");

    let generator: Option<Arc<dyn TextGenerator>> = match &config.openai_api_key {
        Some(api_key) => {
            let client = OpenAiClient::new(
                api_key.clone(),
                config.openai_base_url.clone(),
                config.openai_model.clone(),
            );
            tracing::info!("✅ OpenAI client initialized (model: {})", client.model());
            Some(Arc::new(client))
        }
        None => {
            tracing::warn!("OPENAI_API_KEY not set - /api/generate is disabled and marketing packages use the static template");
            None
        }
    };

    if config.admin_emails.is_empty() {
        tracing::info!("No ADMIN_EMAILS configured; only staff accounts can review payments");
    }

    let bind_addr = config.bind_addr.clone();
    let shared_state = Arc::new(AppState {
        db_pool,
        config,
        generator,
    });

    let app = build_router(shared_state);

    // ConnectInfo gives the rate limiters the peer address
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app.into_make_service_with_connect_info::<std::net::SocketAddr>()).await?;

    Ok(())
}

fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            "debug,buzai=trace,sqlx=info,reqwest=info,hyper=info,tower=info".to_string()
        } else {
            "info,buzai=info,sqlx=warn,reqwest=warn,hyper=warn,tower=warn".to_string()
        }
    });

    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&log_level))?;

    let fmt_layer = if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true)
            .with_thread_ids(true)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    };

    tracing_subscriber::registry().with(env_filter).with(fmt_layer).init();

    tracing::info!("🐝 BuzAI starting up...");
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Build mode: {}", if cfg!(debug_assertions) { "development" } else { "production" });
    tracing::info!("Log level: {}", log_level);

    Ok(())
}
