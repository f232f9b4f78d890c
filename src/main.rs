use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use webrag::auth::{AuthService, OtpMailer, TokenIssuer, UserStore};
use webrag::config::Config;
use webrag::embeddings::EmbeddingClient;
use webrag::llm::LlmClient;
use webrag::rag::RagService;
use webrag::scrape::WebExtractor;
use webrag::server::{AppState, build_app};
use webrag::store::VectorStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,webrag=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    let store = Arc::new(VectorStore::open(&config.vector_store_path()).await?);
    let embeddings = EmbeddingClient::new(&config.embedding_api_url, config.embedding_batch_size)?;
    let llm = LlmClient::new(&config.groq_api_url, config.groq_api_keys.clone())?;
    let extractor = Arc::new(WebExtractor::new()?);
    let rag = Arc::new(RagService::new(store, embeddings, llm, extractor));

    let user_store = UserStore::open(&config.user_database_path()).await?;
    let mailer = match (&config.brevo_api_key, &config.brevo_sender_email) {
        (Some(api_key), Some(sender)) => Some(OtpMailer::new(
            api_key.clone(),
            sender.clone(),
            config.brevo_endpoint.clone(),
        )?),
        _ => {
            warn!("BREVO_API_KEY or BREVO_SENDER_EMAIL not set; OTP email disabled");
            None
        }
    };
    let tokens = config
        .jwt_secret
        .as_ref()
        .map(|secret| TokenIssuer::new(secret.clone(), config.jwt_expiry_minutes));
    if tokens.is_none() {
        warn!("JWT_SECRET not set; token issuance disabled");
    }
    let auth = Arc::new(AuthService::new(user_store, mailer, tokens));

    if config.api_key.is_none() {
        warn!("API_KEY not set; RAG endpoints are unauthenticated");
    }

    let state = AppState {
        rag,
        auth,
        api_key: config.api_key.clone(),
    };
    let app = build_app(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on {addr}");
    axum::serve(listener, app).await?;

    Ok(())
}
