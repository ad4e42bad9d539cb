//! Explicit composition of the two pipelines.
//!
//! ```text
//! ClockSource -> producer pump -> requestPushChannel -> QueueOutboundGateway -> test.queue
//! test.queue -> QueueListener -> jmsInboundChannel -> ConsumerHandler
//! ```
//!
//! `Variant::Transacted` uses the message-driven transacted listener and the
//! consumer that fails every third call. `Variant::Polling` pulls up to ten
//! messages per second and only logs them.

use std::sync::Arc;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::broker::Broker;
use crate::config::Settings;
use crate::connection::{ConnectionFactory, PooledConnectionFactory};
use crate::consumer::{
    ConsumerHandler, DeliveryCounter, FailingLoggingConsumer, LoggingConsumer, MessageConsumer,
};
use crate::integration::{
    ClockSource, DirectChannel, MessageDrivenChannelAdapter, QueueListener, QueueMessageSource,
    QueueOutboundGateway, SourcePollingChannelAdapter,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    /// Event-driven transacted listener, consumer fails every third message.
    Transacted,
    /// Fixed-delay polling listener, consumer only logs.
    Polling,
}

pub struct ApplicationBuilder {
    settings: Settings,
    clock_source: ClockSource,
    consumer: Option<Arc<dyn MessageConsumer>>,
}

impl ApplicationBuilder {
    pub fn clock_source(mut self, clock_source: ClockSource) -> Self {
        self.clock_source = clock_source;
        self
    }

    /// Replace the consumer the variant would normally pick.
    pub fn consumer(mut self, consumer: Arc<dyn MessageConsumer>) -> Self {
        self.consumer = Some(consumer);
        self
    }

    /// Wire everything and start the timers. Must run inside a tokio runtime.
    pub fn start(self, variant: Variant) -> Application {
        let settings = self.settings;
        let queue = settings.listener.queue.as_str();

        let broker = Arc::new(Broker::new(&settings.broker.name));
        let connection_factory = PooledConnectionFactory::new(
            broker.clone(),
            settings.pool_settings(),
            settings.redelivery_policy(),
        );
        connection_factory.start();
        let cancel = CancellationToken::new();

        let request_channel = Arc::new(DirectChannel::new(Application::REQUEST_CHANNEL));
        request_channel.subscribe(Arc::new(QueueOutboundGateway::new(
            connection_factory.handle(),
            queue,
        )));
        let producer =
            SourcePollingChannelAdapter::new("clockSource", self.clock_source, request_channel)
                .with_poller(settings.producer_poller());

        let mut delivery_counter = None;
        let consumer: Arc<dyn MessageConsumer> = match (self.consumer, variant) {
            (Some(consumer), _) => consumer,
            (None, Variant::Transacted) => {
                let counter = DeliveryCounter::new();
                delivery_counter = Some(counter.clone());
                Arc::new(
                    FailingLoggingConsumer::new(counter)
                        .with_failure_interval(settings.consumer.failure_interval),
                )
            }
            (None, Variant::Polling) => Arc::new(LoggingConsumer),
        };
        let inbound_channel = Arc::new(DirectChannel::new(Application::INBOUND_CHANNEL));
        inbound_channel.subscribe(Arc::new(ConsumerHandler::new(consumer)));

        let listener = match variant {
            Variant::Transacted => QueueListener::MessageDriven(
                MessageDrivenChannelAdapter::new(
                    connection_factory.handle(),
                    queue,
                    inbound_channel,
                )
                .with_receive_timeout(settings.receive_timeout()),
            ),
            Variant::Polling => QueueListener::Polling(
                SourcePollingChannelAdapter::new(
                    "queuePoller",
                    QueueMessageSource::new(
                        connection_factory.handle(),
                        queue,
                        settings.receive_timeout(),
                    ),
                    inbound_channel,
                )
                .with_poller(settings.listener_poller()),
            ),
        };

        info!(?variant, queue, "Starting pipeline");
        let tasks = vec![
            producer.spawn(cancel.child_token()),
            listener.spawn(cancel.child_token()),
        ];

        Application {
            variant,
            broker,
            connection_factory,
            cancel,
            tasks,
            delivery_counter,
        }
    }
}

/// A running pipeline. Owns the broker and the connection pool.
pub struct Application {
    variant: Variant,
    broker: Arc<Broker>,
    connection_factory: PooledConnectionFactory,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    delivery_counter: Option<DeliveryCounter>,
}

impl Application {
    pub const REQUEST_CHANNEL: &'static str = "requestPushChannel";
    pub const INBOUND_CHANNEL: &'static str = "jmsInboundChannel";

    pub fn builder(settings: Settings) -> ApplicationBuilder {
        ApplicationBuilder {
            settings,
            clock_source: ClockSource::new(),
            consumer: None,
        }
    }

    pub fn start(settings: Settings, variant: Variant) -> Self {
        Self::builder(settings).start(variant)
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn broker(&self) -> &Arc<Broker> {
        &self.broker
    }

    pub fn connection_factory(&self) -> ConnectionFactory {
        self.connection_factory.handle()
    }

    /// Invocations of the built-in failing consumer so far. `None` when the
    /// pipeline runs another consumer (`Polling`, or one set on the builder).
    pub fn delivery_counter(&self) -> Option<&DeliveryCounter> {
        self.delivery_counter.as_ref()
    }

    /// Stop the timers, wait for in-flight work, then release the pool and
    /// the broker. Nothing is processed once this returns.
    pub async fn shutdown(self) {
        info!("Shutting down pipeline");
        self.cancel.cancel();
        for result in join_all(self.tasks).await {
            if let Err(e) = result {
                warn!("Pipeline task ended abnormally: {e}");
            }
        }
        self.connection_factory.stop();
        self.broker.stop().await;
    }
}
