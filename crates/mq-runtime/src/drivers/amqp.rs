//! AMQP driver (lapin, AMQP 0.9.1).
//!
//! Immediate publishes go through a durable direct exchange. Delayed
//! publishes rely on the broker's `x-delayed-message` exchange type with a
//! per-message `x-delay` header in milliseconds; the per-queue
//! TTL + dead-letter-exchange relay is deliberately not used since the two
//! strategies are not wire-compatible.

use crate::config::AmqpConfig;
use crate::consumer::{ConsumerWorker, Disposition, MessageHandler, ShutdownSignal};
use crate::driver::{ConsumeMode, DriverKind, QueueDriver};
use crate::error::QueueError;
use crate::message::{Binding, ExchangeName, Message, MessageId, RouteKey};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use lapin::message::Delivery;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions,
    ConfirmSelectOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::publisher_confirm::Confirmation;
use lapin::types::{AMQPValue, FieldTable};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use std::sync::Arc;
use std::time::Duration;

/// Exchange type provided by the broker's delayed-message plugin
const DELAYED_EXCHANGE_TYPE: &str = "x-delayed-message";

/// AMQP driver over a single connection and channel
pub struct AmqpDriver {
    // Held so the connection outlives the channel
    _connection: Connection,
    channel: Channel,
    config: AmqpConfig,
}

impl AmqpDriver {
    /// Connect to the broker and open a publish/consume channel.
    ///
    /// Publisher confirms are enabled so a rejected publish surfaces as
    /// [`QueueError::Publish`] instead of vanishing.
    pub async fn connect(config: AmqpConfig) -> Result<Self, QueueError> {
        let connection = Connection::connect(
            &config.url(),
            ConnectionProperties::default().with_connection_name("mq-runtime".into()),
        )
        .await
        .map_err(|e| QueueError::connection(format!("AMQP connection failed: {e}")))?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| QueueError::connection(format!("AMQP channel creation failed: {e}")))?;

        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| QueueError::connection(format!("AMQP confirm mode failed: {e}")))?;

        Ok(Self {
            _connection: connection,
            channel,
            config,
        })
    }

    /// The connection configuration this driver was built with
    pub fn config(&self) -> &AmqpConfig {
        &self.config
    }

    /// Declare the durable exchange for a binding: direct for immediate
    /// delivery, the delayed-message type for delay queues.
    async fn declare_exchange(&self, binding: &Binding, delayed: bool) -> Result<(), QueueError> {
        let (kind, arguments) = if delayed {
            (
                ExchangeKind::Custom(DELAYED_EXCHANGE_TYPE.to_string()),
                delayed_exchange_arguments(),
            )
        } else {
            (ExchangeKind::Direct, FieldTable::default())
        };

        self.channel
            .exchange_declare(
                binding.exchange().as_str(),
                kind,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                arguments,
            )
            .await
            .map_err(|e| QueueError::ExchangeDeclaration {
                exchange: binding.exchange().to_string(),
                message: e.to_string(),
            })
    }

    /// Declare the durable queue and bind it to the exchange on the route key
    async fn declare_and_bind_queue(&self, binding: &Binding) -> Result<(), QueueError> {
        self.channel
            .queue_declare(
                binding.queue().as_str(),
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| QueueError::QueueDeclaration {
                queue: binding.queue().to_string(),
                message: e.to_string(),
            })?;

        self.channel
            .queue_bind(
                binding.queue().as_str(),
                binding.exchange().as_str(),
                binding.route_key().as_str(),
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| QueueError::QueueDeclaration {
                queue: binding.queue().to_string(),
                message: format!("binding failed: {e}"),
            })
    }

    /// Publish with confirm handling shared by both publish paths
    async fn publish(
        &self,
        binding: &Binding,
        body: &Bytes,
        properties: BasicProperties,
    ) -> Result<(), QueueError> {
        let rejected = |message: String| QueueError::Publish {
            exchange: binding.exchange().to_string(),
            route_key: binding.route_key().to_string(),
            message,
        };

        let confirm = self
            .channel
            .basic_publish(
                binding.exchange().as_str(),
                binding.route_key().as_str(),
                BasicPublishOptions::default(),
                body.as_ref(),
                properties,
            )
            .await
            .map_err(|e| rejected(e.to_string()))?
            .await
            .map_err(|e| rejected(format!("confirmation failed: {e}")))?;

        if let Confirmation::Nack(_) = confirm {
            return Err(rejected("broker negatively acknowledged publish".to_string()));
        }

        Ok(())
    }

    /// Process one broker-pushed delivery
    async fn handle_delivery(
        &self,
        binding: &Binding,
        delivery: Delivery,
        handler: &Arc<dyn MessageHandler>,
        worker: &mut ConsumerWorker,
    ) -> Result<(), QueueError> {
        let message = envelope_message(binding, &delivery);
        let succeeded = handler.handle(&message).await;

        match worker.dispose(&message, succeeded) {
            Disposition::Acknowledge | Disposition::DeadLetter => delivery
                .ack(BasicAckOptions::default())
                .await
                .map_err(|e| QueueError::transport(format!("ack failed: {e}"))),
            Disposition::Requeue => delivery
                .nack(BasicNackOptions {
                    requeue: true,
                    ..Default::default()
                })
                .await
                .map_err(|e| QueueError::transport(format!("nack failed: {e}"))),
        }
    }
}

#[async_trait]
impl QueueDriver for AmqpDriver {
    async fn queue(&self, binding: &Binding, body: Bytes) -> Result<Message, QueueError> {
        self.declare_exchange(binding, false).await?;

        let id = MessageId::generate();
        let properties = BasicProperties::default()
            .with_message_id(id.as_str().into())
            .with_delivery_mode(2);
        self.publish(binding, &body, properties).await?;

        Ok(Message::new(id, body, binding))
    }

    async fn delay_queue(
        &self,
        binding: &Binding,
        body: Bytes,
        ttl: Duration,
    ) -> Result<Message, QueueError> {
        self.declare_exchange(binding, true).await?;
        self.declare_and_bind_queue(binding).await?;

        let id = MessageId::generate();
        let properties = BasicProperties::default()
            .with_message_id(id.as_str().into())
            .with_delivery_mode(2)
            .with_headers(delay_headers(ttl));
        self.publish(binding, &body, properties).await?;

        Ok(Message::new(id, body, binding))
    }

    async fn consume(
        &self,
        binding: &Binding,
        mode: ConsumeMode,
        handler: Arc<dyn MessageHandler>,
        worker: &mut ConsumerWorker,
        mut shutdown: ShutdownSignal,
    ) -> Result<(), QueueError> {
        self.declare_exchange(binding, mode == ConsumeMode::Delayed)
            .await?;
        self.declare_and_bind_queue(binding).await?;

        let consumer_tag = format!("{}-{}", binding.queue(), MessageId::generate());
        let mut consumer = self
            .channel
            .basic_consume(
                binding.queue().as_str(),
                &consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| QueueError::transport(format!("consume setup failed: {e}")))?;

        loop {
            tokio::select! {
                _ = shutdown.wait() => return Ok(()),
                delivery = consumer.next() => match delivery {
                    Some(Ok(delivery)) => {
                        self.handle_delivery(binding, delivery, &handler, worker)
                            .await?;
                    }
                    Some(Err(e)) => {
                        // Delivery stream errors carry no envelope; log and
                        // keep receiving, the message will be redelivered
                        worker
                            .sink()
                            .consumer_error("amqp consumer", &e.to_string());
                    }
                    None => {
                        return Err(QueueError::connection(
                            "AMQP delivery stream closed".to_string(),
                        ));
                    }
                },
            }
        }
    }

    fn kind(&self) -> DriverKind {
        DriverKind::Amqp
    }
}

/// Arguments declaring what the delayed exchange routes as once the delay
/// elapses
fn delayed_exchange_arguments() -> FieldTable {
    let mut arguments = FieldTable::default();
    arguments.insert(
        "x-delayed-type".into(),
        AMQPValue::LongString("direct".to_string().into()),
    );
    arguments
}

/// Per-message header carrying the delay in milliseconds
fn delay_headers(ttl: Duration) -> FieldTable {
    let mut headers = FieldTable::default();
    headers.insert("x-delay".into(), AMQPValue::LongLongInt(ttl.as_millis() as i64));
    headers
}

/// Reconstruct the message envelope from broker delivery metadata.
///
/// The exchange and route key fall back to the consume binding if the
/// broker reports values outside the accepted name alphabet; a missing
/// message id gets a fresh one so retry marks stay usable.
fn envelope_message(binding: &Binding, delivery: &Delivery) -> Message {
    let id = delivery
        .properties
        .message_id()
        .as_ref()
        .map(|id| MessageId::from_delivery(id.as_str()))
        .unwrap_or_else(MessageId::generate);

    let exchange = ExchangeName::new(delivery.exchange.as_str())
        .unwrap_or_else(|_| binding.exchange().clone());
    let route_key = RouteKey::new(delivery.routing_key.as_str())
        .unwrap_or_else(|_| binding.route_key().clone());
    let delivered = Binding::new(exchange, binding.queue().clone(), route_key);

    Message::new(id, Bytes::from(delivery.data.clone()), &delivered)
}

#[cfg(test)]
#[path = "amqp_tests.rs"]
mod tests;
