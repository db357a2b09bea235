//! AMQP (RabbitMQ) queue backend.

mod client;

pub use client::AmqpClient;

use crate::error::{JobsError, JobsResult};
use lapin::{Connection, ConnectionProperties};
use std::time::Duration;
use tracing::debug;

/// Connection attempts before giving up.
const CONNECT_RETRIES: usize = 10;

/// Delay between connection attempts.
const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(200);

/// Connect to the broker, retrying briefly to ride out restarts.
pub async fn connect(url: &str) -> JobsResult<Connection> {
    let mut last_error = None;

    for attempt in 0..CONNECT_RETRIES {
        match Connection::connect(url, ConnectionProperties::default()).await {
            Ok(connection) => {
                debug!(attempt, "Connected to AMQP broker");
                return Ok(connection);
            }
            Err(e) => {
                debug!(attempt, error = %e, "AMQP connection failed, retrying");
                last_error = Some(e);
                tokio::time::sleep(CONNECT_RETRY_DELAY).await;
            }
        }
    }

    Err(last_error
        .map(JobsError::Amqp)
        .unwrap_or_else(|| JobsError::Internal("AMQP connect failed".to_string())))
}
