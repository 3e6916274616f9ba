//! Forum sync console
//!
//! Opens the local forum database, mounts the home feed with live sync and logs the feed
//! every time it changes, until interrupted.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use forum_sync::auth::LocalAuth;
use forum_sync::config::Config;
use forum_sync::db;
use forum_sync::gateway::LocalGateway;
use forum_sync::models::AuthorRef;
use forum_sync::screens::HomeScreen;
use forum_sync::sync::SyncController;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env();

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting forum sync");
    tracing::info!("Database path: {:?}", config.db_path);

    // Initialize database
    let pool = db::init_database(&config.db_path).await?;
    if config.seed_themes {
        db::seed_themes(&pool).await?;
    }

    let gateway = Arc::new(LocalGateway::new(pool.clone(), config.change_feed_capacity));
    let auth = Arc::new(LocalAuth::new(pool, config.reset_token_ttl_minutes));
    let controller = Arc::new(SyncController::new(gateway));

    let mut renders = controller.watch_renders();
    let mut home = HomeScreen::mount(Arc::clone(&controller), auth).await;
    tracing::info!("Home feed mounted ({:?})", home.sync_state());
    log_feed(&controller);

    loop {
        tokio::select! {
            changed = renders.changed() => {
                if changed.is_err() {
                    break;
                }
                log_feed(&controller);
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, shutting down");
                break;
            }
        }
    }

    home.unmount().await;
    Ok(())
}

fn log_feed(controller: &SyncController<LocalGateway>) {
    let questions = controller.questions();
    tracing::info!("{} questions", questions.len());
    for question in &questions {
        let replies = controller
            .responses(&question.id)
            .map(|responses| responses.len())
            .unwrap_or(0);
        tracing::info!(
            "  [{}] {} by {} ({} replies{})",
            question.theme.as_ref().map(|t| t.name.as_str()).unwrap_or("-"),
            question.title,
            AuthorRef::display_name(question.author.as_ref()),
            replies,
            if controller.is_loading(&question.id) { ", loading" } else { "" },
        );
    }
}
