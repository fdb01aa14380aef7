use crate::shutdown;
use deskboard::components::redis_service::RedisActor;
use deskboard::components::timetable::Timetable;
use deskboard::components::ComponentManager;
use deskboard::config::Config;
use deskboard::error::Error;
use std::sync::Arc;
use tokio::sync::{oneshot, RwLock};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Initialize logging with environment-based configuration
pub fn init_logging() -> miette::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,redis=warn,reqwest=warn")),
        )
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| Error::Other(format!("Failed to set up logging: {}", e)))?;

    Ok(())
}

/// Load and initialize the application config
pub async fn load_config() -> miette::Result<Arc<RwLock<Config>>> {
    match Config::load() {
        Ok(config) => Ok(Arc::new(RwLock::new(config))),
        Err(e) => {
            error!("Failed to load configuration: {:?}", e);
            Err(e.into())
        }
    }
}

/// Start the persistence actor and enabled components, then wait for shutdown
pub async fn run(config: Arc<RwLock<Config>>) -> miette::Result<()> {
    // Initialize component manager
    let mut component_manager = ComponentManager::new(Arc::clone(&config));

    // Initialize Redis service
    let (mut redis_actor, redis_handle) = RedisActor::new(Arc::clone(&config)).await?;

    // Spawn Redis actor task
    tokio::spawn(async move {
        redis_actor.run().await;
    });

    // Register Timetable component
    if config.read().await.is_component_enabled("timetable") {
        component_manager.register(Timetable::new());
    } else {
        info!("Timetable component disabled");
    }

    // Create a shared component manager
    let component_manager = Arc::new(component_manager);

    // Initialize components
    if let Err(e) = component_manager.init_all(redis_handle.clone()).await {
        error!("Failed to initialize components: {:?}", e);
    }

    // Create shutdown channel
    let (shutdown_send, shutdown_recv) = oneshot::channel();

    // Spawn signal handler task
    let shutdown_components = Arc::clone(&component_manager);
    tokio::spawn(async move {
        shutdown::handle_signals(shutdown_send, shutdown_components, redis_handle).await;
    });

    info!("deskboard is running");

    // Wait for the signal handler to finish shutting down
    if shutdown_recv.await.is_err() {
        error!("Shutdown handler exited unexpectedly");
    }

    info!("deskboard stopped");
    Ok(())
}
