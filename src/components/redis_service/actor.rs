use super::store::KeyValueStore;
use crate::config::Config;
use crate::error::{persistence_error, DashResult};
use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client as RedisClient};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};

// Redis key constants
pub mod keys {
    pub const TIMETABLE_SNAPSHOT: &str = "timetable:snapshot";
    pub const TIMETABLE_IDENTIFIER: &str = "timetable:identifier";
    pub const CREDENTIALS: &str = "credentials";
}

/// The Redis actor that processes messages
pub struct RedisActor {
    client: RedisClient,
    connection: Option<ConnectionManager>,
    command_rx: mpsc::Receiver<RedisCommand>,
}

/// Commands that can be sent to the Redis actor
pub enum RedisCommand {
    Get(String, mpsc::Sender<DashResult<Option<String>>>),
    Set(String, String, mpsc::Sender<DashResult<()>>),
    Delete(String, mpsc::Sender<DashResult<()>>),
    Shutdown,
}

/// Handle for communicating with the Redis actor
#[derive(Clone)]
pub struct RedisActorHandle {
    command_tx: mpsc::Sender<RedisCommand>,
}

impl RedisActorHandle {
    /// Create a new empty handle for initialization purposes
    pub fn empty() -> Self {
        let (command_tx, _) = mpsc::channel(32);
        Self { command_tx }
    }

    /// Shutdown the actor
    pub async fn shutdown(&self) -> DashResult<()> {
        let _ = self.command_tx.send(RedisCommand::Shutdown).await;
        Ok(())
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(mpsc::Sender<DashResult<T>>) -> RedisCommand,
    ) -> DashResult<T> {
        let (response_tx, mut response_rx) = mpsc::channel(1);
        self.command_tx
            .send(build(response_tx))
            .await
            .map_err(|e| persistence_error(&format!("Actor mailbox error: {}", e)))?;

        response_rx
            .recv()
            .await
            .ok_or_else(|| persistence_error("Response channel closed"))?
    }
}

#[async_trait]
impl KeyValueStore for RedisActorHandle {
    async fn get(&self, key: &str) -> DashResult<Option<String>> {
        self.request(|tx| RedisCommand::Get(key.to_string(), tx))
            .await
    }

    async fn set(&self, key: &str, value: String) -> DashResult<()> {
        self.request(|tx| RedisCommand::Set(key.to_string(), value, tx))
            .await
    }

    async fn delete(&self, key: &str) -> DashResult<()> {
        self.request(|tx| RedisCommand::Delete(key.to_string(), tx))
            .await
    }
}

impl RedisActor {
    /// Create a new actor and return its handle
    pub async fn new(config: Arc<RwLock<Config>>) -> DashResult<(Self, RedisActorHandle)> {
        let (command_tx, command_rx) = mpsc::channel(32);

        let redis_url = config.read().await.redis_url.clone();
        let client = RedisClient::open(redis_url.as_str())
            .map_err(|e| persistence_error(&format!("Failed to create Redis client: {}", e)))?;

        let actor = Self {
            client,
            connection: None,
            command_rx,
        };

        let handle = RedisActorHandle { command_tx };

        Ok((actor, handle))
    }

    /// Start the actor's processing loop
    pub async fn run(&mut self) {
        info!("Redis actor started");

        // Process commands
        while let Some(cmd) = self.command_rx.recv().await {
            match cmd {
                RedisCommand::Get(key, response_tx) => {
                    let result = self.get_value(&key).await;
                    let _ = response_tx.send(result).await;
                }
                RedisCommand::Set(key, value, response_tx) => {
                    let result = self.set_value(&key, value).await;
                    let _ = response_tx.send(result).await;
                }
                RedisCommand::Delete(key, response_tx) => {
                    let result = self.delete_value(&key).await;
                    let _ = response_tx.send(result).await;
                }
                RedisCommand::Shutdown => {
                    info!("Redis actor shutting down");
                    break;
                }
            }
        }

        info!("Redis actor shut down");
    }

    /// Get a redis connection, connecting lazily on first use
    async fn connection(&mut self) -> DashResult<ConnectionManager> {
        if let Some(connection) = &self.connection {
            return Ok(connection.clone());
        }

        let connection = ConnectionManager::new(self.client.clone())
            .await
            .map_err(|e| persistence_error(&format!("Failed to connect to Redis: {}", e)))?;
        debug!("Connected to Redis");

        self.connection = Some(connection.clone());
        Ok(connection)
    }

    async fn get_value(&mut self, key: &str) -> DashResult<Option<String>> {
        let mut redis_conn = self.connection().await?;

        redis_conn
            .get::<_, Option<String>>(key)
            .await
            .map_err(|e| persistence_error(&format!("Failed to read {} from Redis: {}", key, e)))
    }

    async fn set_value(&mut self, key: &str, value: String) -> DashResult<()> {
        let mut redis_conn = self.connection().await?;

        redis_conn
            .set::<_, _, ()>(key, value)
            .await
            .map_err(|e| persistence_error(&format!("Failed to save {} to Redis: {}", key, e)))
    }

    async fn delete_value(&mut self, key: &str) -> DashResult<()> {
        let mut redis_conn = self.connection().await?;

        redis_conn
            .del::<_, ()>(key)
            .await
            .map_err(|e| persistence_error(&format!("Failed to delete {} from Redis: {}", key, e)))
    }
}
