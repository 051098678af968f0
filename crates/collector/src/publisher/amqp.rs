//! AMQP 0-9-1 publisher backed by lapin

use super::Publisher;
use crate::config::BrokerSettings;
use async_trait::async_trait;
use chrono::Utc;
use collector_common::{CollectorError, NormalizedRecord, Result};
use lapin::options::{
    BasicPublishOptions, ConfirmSelectOptions, ExchangeDeclareOptions, QueueBindOptions,
    QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// AMQP reply code for a normal close.
const REPLY_SUCCESS: u16 = 200;

/// Persistent delivery mode.
const DELIVERY_MODE_PERSISTENT: u8 = 2;

const CONTENT_TYPE_JSON: &str = "application/json";

/// Publisher holding one connection and one confirm-mode channel
pub struct AmqpPublisher {
    settings: BrokerSettings,
    connection: Option<Connection>,
    channel: Option<Channel>,
}

impl AmqpPublisher {
    pub fn new(settings: BrokerSettings) -> Self {
        Self {
            settings,
            connection: None,
            channel: None,
        }
    }

    pub fn settings(&self) -> &BrokerSettings {
        &self.settings
    }

    async fn open(&self, uri: &str) -> lapin::Result<(Connection, Channel)> {
        let connection = Connection::connect(uri, connection_properties()).await?;

        match self.prepare_channel(&connection).await {
            Ok(channel) => Ok((connection, channel)),
            Err(e) => {
                if let Err(close_err) = connection.close(REPLY_SUCCESS, "setup failed").await {
                    debug!(error = %close_err, "Failed to close half-open connection");
                }
                Err(e)
            }
        }
    }

    async fn prepare_channel(&self, connection: &Connection) -> lapin::Result<Channel> {
        let channel = connection.create_channel().await?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await?;

        let queue = &self.settings.queue;
        channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await?;

        let exchange = &self.settings.exchange;
        if !exchange.is_empty() {
            channel
                .exchange_declare(
                    exchange,
                    ExchangeKind::Direct,
                    ExchangeDeclareOptions {
                        durable: true,
                        ..ExchangeDeclareOptions::default()
                    },
                    FieldTable::default(),
                )
                .await?;
            channel
                .queue_bind(
                    queue,
                    exchange,
                    self.settings.routing_key(),
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await?;
        }

        Ok(channel)
    }
}

/// Run lapin's I/O and callbacks on the current tokio runtime
fn connection_properties() -> ConnectionProperties {
    ConnectionProperties::default()
        .with_executor(tokio_executor_trait::Tokio::current())
        .with_reactor(tokio_reactor_trait::Tokio)
}

fn message_properties() -> BasicProperties {
    BasicProperties::default()
        .with_content_type(CONTENT_TYPE_JSON.into())
        .with_delivery_mode(DELIVERY_MODE_PERSISTENT)
        .with_message_id(Uuid::new_v4().to_string().into())
        .with_timestamp(Utc::now().timestamp().max(0) as u64)
}

#[async_trait]
impl Publisher for AmqpPublisher {
    async fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            debug!("Broker connection already open");
            return Ok(());
        }

        // Drop whatever is left of a previous session
        self.close().await;

        let uri = self.settings.amqp_uri()?;
        info!(broker = %self.settings.redacted_uri(), "Connecting to broker");

        let (connection, channel) = self
            .open(&uri)
            .await
            .map_err(|e| CollectorError::connection_lost(format!("connect failed: {e}")))?;

        self.connection = Some(connection);
        self.channel = Some(channel);

        info!(
            queue = %self.settings.queue,
            exchange = %self.settings.exchange,
            "Connected to broker"
        );
        Ok(())
    }

    fn is_connected(&self) -> bool {
        let connection_up = self
            .connection
            .as_ref()
            .is_some_and(|c| c.status().connected());
        let channel_up = self
            .channel
            .as_ref()
            .is_some_and(|c| c.status().connected());

        connection_up && channel_up
    }

    async fn publish(&mut self, records: &[NormalizedRecord]) -> Result<usize> {
        let channel = self
            .channel
            .as_ref()
            .filter(|c| c.status().connected())
            .ok_or_else(|| CollectorError::connection_lost("channel is not open"))?;

        let exchange = self.settings.exchange.as_str();
        let routing_key = self.settings.routing_key();
        let span = info_span!("publish", queue = %routing_key, records = records.len());

        async move {
            let mut published = 0;

            for record in records {
                let payload = record.to_json_bytes().map_err(|e| CollectorError::Publish {
                    published,
                    message: CollectorError::from(e).to_string(),
                })?;

                let confirm = channel
                    .basic_publish(
                        exchange,
                        routing_key,
                        BasicPublishOptions::default(),
                        &payload,
                        message_properties(),
                    )
                    .await
                    .map_err(|e| CollectorError::Publish {
                        published,
                        message: e.to_string(),
                    })?;

                let confirmation = confirm.await.map_err(|e| CollectorError::Publish {
                    published,
                    message: e.to_string(),
                })?;

                if confirmation.is_nack() {
                    return Err(CollectorError::Publish {
                        published,
                        message: "broker nacked message".to_string(),
                    });
                }

                published += 1;
                debug!(published, bytes = payload.len(), "Message confirmed");
            }

            info!(published, "Batch published");
            Ok(published)
        }
        .instrument(span)
        .await
    }

    async fn close(&mut self) {
        if let Some(channel) = self.channel.take() {
            if channel.status().connected() {
                if let Err(e) = channel.close(REPLY_SUCCESS, "collector closing").await {
                    warn!(error = %e, "Failed to close broker channel");
                }
            }
        }

        if let Some(connection) = self.connection.take() {
            if connection.status().connected() {
                if let Err(e) = connection.close(REPLY_SUCCESS, "collector closing").await {
                    warn!(error = %e, "Failed to close broker connection");
                } else {
                    info!("Broker connection closed");
                }
            }
        }
    }
}
