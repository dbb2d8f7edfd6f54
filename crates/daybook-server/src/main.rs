//! # daybook-server
//!
//! HTTP service behind the Daybook illustrated diary.
//!
//! This binary provides:
//! - **Accounts and sessions**: Argon2 password hashes, HS256 JWTs in an
//!   HTTP-only cookie
//! - **Entry pipeline**: derives a title, image prompt and author-style
//!   rewrite from each entry, generates an illustration and hosts it
//! - **Admission gate**: a per-client request limit and a per-user weekly
//!   entry quota over a local or Redis-backed counter store
//! - **REST API** (axum) for entries, profiles, health and hosted images

mod admission;
mod api;
mod auth;
mod config;
mod counter_store;
mod db;
mod deletion;
mod error;
mod generative;
mod image_host;
mod pipeline;
mod rate_limit;
mod session;
#[cfg(test)]
mod test_support;

use std::sync::Arc;
use std::time::Duration;

use mockable::{Clock, DefaultClock};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use daybook_store::Database;

use crate::admission::{Admission, AdmissionPolicy};
use crate::api::AppState;
use crate::config::{ImageHostKind, ServerConfig};
use crate::counter_store::{CounterStore, LocalCounterStore, RedisCounterStore};
use crate::db::StoreHandle;
use crate::deletion::EntryRemover;
use crate::generative::{ImageGenerator, OpenAiClient, PlaceholderGenerator, TextGenerator};
use crate::image_host::{CloudinaryImageHost, ImageHost, LocalImageHost};
use crate::pipeline::EntryPipeline;
use crate::session::SessionKeys;

const SWEEP_INTERVAL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,daybook_server=debug")),
        )
        .init();

    info!("Starting Daybook server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------
    let clock: Arc<dyn Clock + Send + Sync> = Arc::new(DefaultClock);

    let store = StoreHandle::new(Database::open_at(&config.database_path)?);

    let (text, images) = generators(&config)?;

    let mut local_images = None;
    let host: Arc<dyn ImageHost> = match (&config.image_host, &config.cloudinary) {
        (ImageHostKind::Cloudinary, Some(credentials)) => {
            info!(cloud = %credentials.cloud_name, "Hosting images on Cloudinary");
            Arc::new(CloudinaryImageHost::new(
                credentials.clone(),
                config.generation_timeout,
            )?)
        }
        _ => {
            let local = Arc::new(
                LocalImageHost::new(
                    config.image_storage_path.clone(),
                    &config.public_base_url,
                    config.max_image_size,
                    config.generation_timeout,
                )
                .await?,
            );
            local_images = Some(local.clone());
            local
        }
    };

    let counters = counter_store(&config, clock.clone()).await;
    let admission = Admission::new(
        counters,
        clock.clone(),
        AdmissionPolicy::global(config.requests_per_minute),
        AdmissionPolicy::weekly_entries(config.weekly_entry_limit),
    );

    let pipeline = EntryPipeline::new(
        store.clone(),
        text,
        images,
        host.clone(),
        clock,
        config.stylize_entries,
    );

    let app_state = AppState {
        store: store.clone(),
        sessions: Arc::new(SessionKeys::new(
            &config.jwt_secret,
            config.session_ttl_days,
            config.secure_cookies,
        )),
        admission: admission.clone(),
        pipeline: Arc::new(pipeline),
        remover: Arc::new(EntryRemover::new(store, host)),
        local_images,
    };

    // -----------------------------------------------------------------------
    // 4. Spawn background tasks
    // -----------------------------------------------------------------------

    // Periodic counter sweep (every 5 minutes)
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            admission.sweep().await;
        }
    });

    // -----------------------------------------------------------------------
    // 5. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, config.http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}

fn generators(
    config: &ServerConfig,
) -> anyhow::Result<(Arc<dyn TextGenerator>, Arc<dyn ImageGenerator>)> {
    match (&config.openai_api_key, config.placeholder_generators()) {
        (Some(key), false) => {
            let client = Arc::new(OpenAiClient::new(
                &config.openai_base_url,
                key,
                &config.chat_model,
                &config.image_model,
                config.generation_timeout,
            )?);
            info!(chat = %config.chat_model, image = %config.image_model, "Using OpenAI generators");
            let text: Arc<dyn TextGenerator> = client.clone();
            let images: Arc<dyn ImageGenerator> = client;
            Ok((text, images))
        }
        _ => {
            if config.openai_api_key.is_none() && !config.use_placeholder_ai {
                warn!("OPENAI_API_KEY not set, using placeholder generators");
            } else {
                info!("Placeholder generators enabled");
            }
            let placeholder = Arc::new(PlaceholderGenerator);
            let text: Arc<dyn TextGenerator> = placeholder.clone();
            let images: Arc<dyn ImageGenerator> = placeholder;
            Ok((text, images))
        }
    }
}

/// Redis when configured and reachable, otherwise the in-process store.
async fn counter_store(
    config: &ServerConfig,
    clock: Arc<dyn Clock + Send + Sync>,
) -> Arc<dyn CounterStore> {
    if let Some(url) = &config.redis_url {
        match RedisCounterStore::connect(url).await {
            Ok(store) => {
                info!("Using Redis counter store");
                return Arc::new(store);
            }
            Err(e) => warn!(error = %e, "Redis unavailable, falling back to local counters"),
        }
    } else {
        warn!("REDIS_URL not set, counters are local to this instance");
    }
    Arc::new(LocalCounterStore::new(clock))
}
