use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::Config;
use crate::error::DashResult;

/// Trait for component schedulers that run recurring background work
pub trait Scheduler: Send + Sized + 'static {
    /// The type of handle used by this scheduler
    type Handle: Clone + Send + Sync + 'static;

    /// Start the scheduler with the necessary context
    fn start(
        config: Arc<RwLock<Config>>,
        handle: Self::Handle,
    ) -> Pin<Box<dyn Future<Output = DashResult<Self>> + Send>>;

    /// Stop the scheduler gracefully
    fn stop(&mut self) -> Pin<Box<dyn Future<Output = DashResult<()>> + Send + '_>>;
}
