use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use tokio_util::sync::CancellationToken;

use super::listener::{DeliveryEvent, DeliveryState};
use super::source::iso_date_time;
use super::*;
use crate::broker::{Broker, Frame};
use crate::connection::{
    AcknowledgeMode, ConnectionFactory, PoolSettings, PooledConnectionFactory, RedeliveryPolicy,
};
use crate::consumer::{DeliveryCounter, FailingLoggingConsumer, MessageConsumer};
use crate::utils::{Error, Result};

const QUEUE: &str = "test.queue";

#[derive(Debug, Clone, PartialEq, Eq)]
struct Delivery {
    payload: String,
    redelivered: bool,
    succeeded: bool,
}

/// Records every delivery, delegating the outcome to an optional inner consumer.
#[derive(Clone, Default)]
struct RecordingHandler {
    deliveries: Arc<Mutex<Vec<Delivery>>>,
    inner: Option<Arc<dyn MessageConsumer>>,
}

impl RecordingHandler {
    fn wrapping(inner: Arc<dyn MessageConsumer>) -> Self {
        Self {
            deliveries: Arc::default(),
            inner: Some(inner),
        }
    }

    fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().unwrap().clone()
    }

    fn len(&self) -> usize {
        self.deliveries.lock().unwrap().len()
    }

    fn payloads(&self) -> Vec<String> {
        self.deliveries().into_iter().map(|d| d.payload).collect()
    }

    async fn wait_for(&self, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.len() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("deliveries did not arrive in time");
    }
}

#[async_trait]
impl MessageHandler for RecordingHandler {
    async fn handle(&self, message: Message) -> Result<()> {
        let result = match &self.inner {
            Some(inner) => inner.consume(&message),
            None => Ok(()),
        };
        self.deliveries.lock().unwrap().push(Delivery {
            payload: message.payload.clone(),
            redelivered: message.headers.redelivered,
            succeeded: result.is_ok(),
        });
        result
    }
}

struct AlwaysFails;

impl MessageConsumer for AlwaysFails {
    fn consume(&self, message: &Message) -> Result<()> {
        Err(Error::Handler {
            reason: "always".to_string(),
            payload: message.payload.clone(),
        })
    }
}

/// Yields `limit` numbered messages, then nothing.
struct CountingSource {
    produced: AtomicUsize,
    limit: usize,
}

impl CountingSource {
    fn new(limit: usize) -> Self {
        Self {
            produced: AtomicUsize::new(0),
            limit,
        }
    }
}

#[async_trait]
impl MessageSource for CountingSource {
    async fn receive(&self) -> Result<Option<Message>> {
        let n = self.produced.fetch_add(1, Ordering::SeqCst);
        Ok((n < self.limit).then(|| Message::new(n.to_string())))
    }
}

fn time(text: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f").unwrap()
}

fn started_factory(policy: RedeliveryPolicy) -> (Arc<Broker>, PooledConnectionFactory) {
    let broker = Arc::new(Broker::default());
    let factory = PooledConnectionFactory::new(broker.clone(), PoolSettings::default(), policy);
    factory.start();
    (broker, factory)
}

fn channel_with(handler: RecordingHandler) -> Arc<DirectChannel> {
    let channel = Arc::new(DirectChannel::new("out"));
    channel.subscribe(Arc::new(handler));
    channel
}

async fn publish_timestamps(broker: &Broker, count: usize) {
    for i in 0..count {
        let payload = format!("2024-01-01T00:00:{i:02}");
        broker.send(&Frame::new(QUEUE, &payload)).await.unwrap();
    }
}

fn message_driven(
    factory: ConnectionFactory,
    output: Arc<DirectChannel>,
) -> MessageDrivenChannelAdapter {
    MessageDrivenChannelAdapter::new(factory, QUEUE, output)
        .with_receive_timeout(Duration::from_millis(20))
}

// ---- channel -------------------------------------------------------------

#[tokio::test]
async fn test_direct_channel_without_subscriber() {
    let channel = DirectChannel::new("requestPushChannel");
    let err = channel.send(Message::new("x")).await.unwrap_err();
    assert!(matches!(err, Error::NoSubscriber { channel } if channel == "requestPushChannel"));
}

#[tokio::test]
async fn test_direct_channel_has_single_slot() {
    let channel = DirectChannel::new("c");
    let first = RecordingHandler::default();
    let second = RecordingHandler::default();

    assert!(channel.subscribe(Arc::new(first.clone())));
    assert!(!channel.subscribe(Arc::new(second.clone())));

    channel.send(Message::new("x")).await.unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(second.len(), 0);
}

// ---- sources -------------------------------------------------------------

#[test]
fn test_iso_date_time() {
    assert_eq!(
        iso_date_time(&time("2024-01-01T00:00:00")),
        "2024-01-01T00:00:00"
    );
    assert_eq!(
        iso_date_time(&time("2024-03-05T10:15:30.123")),
        "2024-03-05T10:15:30.123"
    );
}

#[tokio::test]
async fn test_clock_source_yields_current_time() {
    let source = ClockSource::with_clock(Arc::new(|| time("2024-01-01T00:00:05")));
    let message = source.receive().await.unwrap().unwrap();
    assert_eq!(message.payload, "2024-01-01T00:00:05");
    assert!(!message.headers.redelivered);
}

#[tokio::test]
async fn test_queue_source_acknowledges_on_receive() {
    let (broker, factory) = started_factory(RedeliveryPolicy::unbounded());
    publish_timestamps(&broker, 1).await;
    let source = QueueMessageSource::new(factory.handle(), QUEUE, Duration::from_millis(10));

    let message = source.receive().await.unwrap().unwrap();
    assert_eq!(message.payload, "2024-01-01T00:00:00");
    assert!(message.headers.broker_message_id.is_some());
    assert_eq!(broker.queue_depth(QUEUE).await, 0);
    assert!(source.receive().await.unwrap().is_none());
}

// ---- pollers -------------------------------------------------------------

#[test]
fn test_default_poller() {
    let poller = PollerMetadata::default();
    assert_eq!(poller.trigger, Trigger::FixedRate(Duration::from_secs(60)));
    assert_eq!(poller.max_messages_per_poll, 1);
}

#[tokio::test]
async fn test_poll_once_respects_max_messages() {
    let handler = RecordingHandler::default();
    let adapter = SourcePollingChannelAdapter::new(
        "unbounded",
        CountingSource::new(usize::MAX),
        channel_with(handler.clone()),
    )
    .with_poller(PollerMetadata::fixed_delay(Duration::from_secs(1), 10));

    assert_eq!(adapter.poll_once().await, 10);
    assert_eq!(handler.len(), 10);
}

#[tokio::test]
async fn test_poll_once_stops_when_source_is_empty() {
    let handler = RecordingHandler::default();
    let adapter = SourcePollingChannelAdapter::new(
        "short",
        CountingSource::new(3),
        channel_with(handler.clone()),
    )
    .with_poller(PollerMetadata::fixed_delay(Duration::from_secs(1), 10));

    assert_eq!(adapter.poll_once().await, 3);
    assert_eq!(handler.payloads(), vec!["0", "1", "2"]);
}

#[tokio::test(start_paused = true)]
async fn test_fixed_rate_pump_forwards_one_message_per_period() {
    let handler = RecordingHandler::default();
    let adapter = SourcePollingChannelAdapter::new(
        "producer",
        CountingSource::new(usize::MAX),
        channel_with(handler.clone()),
    )
    .with_poller(PollerMetadata::fixed_rate(Duration::from_secs(10), 1));
    let cancel = CancellationToken::new();
    let task = adapter.spawn(cancel.clone());

    tokio::time::sleep(Duration::from_secs(35)).await;
    assert_eq!(handler.payloads(), vec!["0", "1", "2", "3"]);

    cancel.cancel();
    task.await.unwrap();
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(handler.len(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_zero_period_runs_at_minimum_period() {
    for trigger in [
        PollerMetadata::fixed_rate(Duration::ZERO, 1),
        PollerMetadata::fixed_delay(Duration::ZERO, 1),
    ] {
        let handler = RecordingHandler::default();
        let adapter = SourcePollingChannelAdapter::new(
            "producer",
            CountingSource::new(usize::MAX),
            channel_with(handler.clone()),
        )
        .with_poller(trigger);
        let cancel = CancellationToken::new();
        let task = adapter.spawn(cancel.clone());

        tokio::time::sleep(Duration::from_millis(5) + Duration::from_micros(500)).await;
        cancel.cancel();
        task.await.unwrap();
        assert!((5..=7).contains(&handler.len()), "{}", handler.len());
    }
}

#[tokio::test(start_paused = true)]
async fn test_fixed_delay_listener_pulls_in_batches_of_ten() {
    let (broker, factory) = started_factory(RedeliveryPolicy::unbounded());
    publish_timestamps(&broker, 25).await;
    let handler = RecordingHandler::default();
    let source = QueueMessageSource::new(factory.handle(), QUEUE, Duration::from_millis(100));
    let adapter = SourcePollingChannelAdapter::new("listener", source, channel_with(handler.clone()))
        .with_poller(PollerMetadata::fixed_delay(Duration::from_millis(1000), 10));
    let cancel = CancellationToken::new();
    let task = adapter.spawn(cancel.clone());

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(handler.len(), 10);
    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(handler.len(), 20);
    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(handler.len(), 25);

    cancel.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn test_polling_listener_drops_failed_messages() {
    let (broker, factory) = started_factory(RedeliveryPolicy::unbounded());
    publish_timestamps(&broker, 3).await;
    let handler = RecordingHandler::wrapping(Arc::new(AlwaysFails));
    let source = QueueMessageSource::new(factory.handle(), QUEUE, Duration::from_millis(10));
    let adapter = SourcePollingChannelAdapter::new("listener", source, channel_with(handler.clone()))
        .with_poller(PollerMetadata::fixed_delay(Duration::from_secs(1), 10));

    assert_eq!(adapter.poll_once().await, 3);
    assert!(handler.deliveries().iter().all(|d| !d.succeeded));
    assert_eq!(broker.queue_depth(QUEUE).await, 0);
}

#[tokio::test]
async fn test_pump_survives_publish_failures() {
    let (broker, factory) = started_factory(RedeliveryPolicy::unbounded());
    let gateway = QueueOutboundGateway::new(factory.handle(), QUEUE);
    let channel = Arc::new(DirectChannel::new("requestPushChannel"));
    channel.subscribe(Arc::new(gateway));
    let adapter = SourcePollingChannelAdapter::new("producer", CountingSource::new(5), channel);

    factory.stop();
    assert_eq!(adapter.poll_once().await, 1);
    assert_eq!(broker.queue_depth(QUEUE).await, 0);
}

// ---- gateway -------------------------------------------------------------

#[tokio::test]
async fn test_gateway_publishes_payload() {
    let (broker, factory) = started_factory(RedeliveryPolicy::unbounded());
    let gateway = QueueOutboundGateway::new(factory.handle(), QUEUE);

    gateway.handle(Message::new("2024-01-01T00:00:00")).await.unwrap();

    let queue = broker.queue(QUEUE).await.unwrap();
    let frame = Frame::decode(&queue.try_pop().await.unwrap()).unwrap();
    assert_eq!(frame.payload, "2024-01-01T00:00:00");
    assert!(frame.reply_to.is_none());
}

#[tokio::test]
async fn test_gateway_reports_publish_failure() {
    let (_broker, factory) = started_factory(RedeliveryPolicy::unbounded());
    let gateway = QueueOutboundGateway::new(factory.handle(), QUEUE);
    factory.stop();

    let err = gateway.handle(Message::new("lost")).await.unwrap_err();
    assert!(matches!(err, Error::Publish { destination, .. } if destination == QUEUE));
}

#[tokio::test]
async fn test_gateway_request_reply() {
    let (_broker, factory) = started_factory(RedeliveryPolicy::unbounded());
    let replies = RecordingHandler::default();
    let gateway = QueueOutboundGateway::new(factory.handle(), QUEUE).with_reply(ReplySettings {
        timeout: Duration::from_secs(5),
        channel: Some(channel_with(replies.clone())),
    });

    let responder_factory = factory.handle();
    let responder = tokio::spawn(async move {
        let connection = responder_factory.create_connection().await.unwrap();
        let mut session = connection.create_session(AcknowledgeMode::Auto);
        let request = session
            .receive(QUEUE, Duration::from_secs(5))
            .await
            .unwrap()
            .unwrap();
        let reply_to = request.reply_to.clone().unwrap();
        let correlation_id = request.correlation_id.clone().unwrap();
        let mut reply = Frame::new(&reply_to, &format!("ack {}", request.payload));
        reply.correlation_id = Some(correlation_id);
        session.send(reply).await.unwrap();
    });

    gateway.handle(Message::new("ping")).await.unwrap();
    responder.await.unwrap();

    assert_eq!(replies.payloads(), vec!["ack ping"]);
}

#[tokio::test(start_paused = true)]
async fn test_gateway_reply_timeout() {
    let (broker, factory) = started_factory(RedeliveryPolicy::unbounded());
    let gateway = QueueOutboundGateway::new(factory.handle(), QUEUE).with_reply(ReplySettings {
        timeout: Duration::from_secs(2),
        channel: None,
    });

    let err = gateway.handle(Message::new("ping")).await.unwrap_err();

    assert!(matches!(err, Error::ReplyTimeout { .. }));
    assert_eq!(broker.queue_depth(QUEUE).await, 1);
}

// ---- message-driven listener ---------------------------------------------

#[test]
fn test_delivery_state_transitions() {
    use DeliveryEvent::*;
    use DeliveryState::*;

    assert_eq!(Idle.on(Arrived), Some(Processing));
    assert_eq!(Processing.on(HandlerSucceeded), Some(Committed));
    assert_eq!(Processing.on(HandlerFailed), Some(RolledBack));
    assert_eq!(RolledBack.on(Arrived), Some(Processing));
    assert_eq!(Committed.on(Arrived), Some(Processing));

    assert_eq!(Idle.on(HandlerSucceeded), None);
    assert_eq!(Processing.on(Arrived), None);
    assert_eq!(Committed.on(HandlerFailed), None);
}

#[tokio::test]
async fn test_transacted_listener_redelivers_every_third_failure() {
    let (broker, factory) = started_factory(RedeliveryPolicy::unbounded());
    publish_timestamps(&broker, 6).await;
    let consumer = FailingLoggingConsumer::new(DeliveryCounter::new());
    let handler = RecordingHandler::wrapping(Arc::new(consumer));
    let cancel = CancellationToken::new();
    let task = message_driven(factory.handle(), channel_with(handler.clone())).spawn(cancel.clone());

    handler.wait_for(8).await;
    cancel.cancel();
    task.await.unwrap();

    let delivery = |second: u32, redelivered: bool, succeeded: bool| Delivery {
        payload: format!("2024-01-01T00:00:{second:02}"),
        redelivered,
        succeeded,
    };
    assert_eq!(
        handler.deliveries(),
        vec![
            delivery(0, false, true),
            delivery(1, false, true),
            delivery(2, false, false),
            delivery(2, true, true),
            delivery(3, false, true),
            delivery(4, false, false),
            delivery(4, true, true),
            delivery(5, false, true),
        ]
    );
    assert_eq!(broker.queue_depth(QUEUE).await, 0);
}

#[tokio::test]
async fn test_transacted_listener_dead_letters_after_max_redeliveries() {
    let (broker, factory) = started_factory(RedeliveryPolicy::with_max_redeliveries(2));
    publish_timestamps(&broker, 1).await;
    let handler = RecordingHandler::wrapping(Arc::new(AlwaysFails));
    let adapter = message_driven(factory.handle(), channel_with(handler.clone()));
    let mut state = adapter.subscribe_state();
    let cancel = CancellationToken::new();
    let task = adapter.spawn(cancel.clone());

    handler.wait_for(3).await;
    tokio::time::timeout(Duration::from_secs(5), async {
        while broker.queue_depth(Broker::DEAD_LETTER_QUEUE).await == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    cancel.cancel();
    task.await.unwrap();

    assert_eq!(handler.len(), 3);
    assert_eq!(*state.borrow_and_update(), DeliveryState::RolledBack);
    assert_eq!(broker.queue_depth(QUEUE).await, 0);
}

#[tokio::test]
async fn test_transacted_listener_state_after_success() {
    let (broker, factory) = started_factory(RedeliveryPolicy::unbounded());
    let handler = RecordingHandler::default();
    let adapter = message_driven(factory.handle(), channel_with(handler.clone()));
    let state = adapter.subscribe_state();
    assert_eq!(*state.borrow(), DeliveryState::Idle);

    let cancel = CancellationToken::new();
    let task = adapter.spawn(cancel.clone());
    publish_timestamps(&broker, 1).await;
    handler.wait_for(1).await;
    cancel.cancel();
    task.await.unwrap();

    assert_eq!(*state.borrow(), DeliveryState::Committed);
}

#[tokio::test]
async fn test_stopped_listener_leaves_queue_alone() {
    let (broker, factory) = started_factory(RedeliveryPolicy::unbounded());
    let handler = RecordingHandler::default();
    let cancel = CancellationToken::new();
    let listener = QueueListener::MessageDriven(message_driven(
        factory.handle(),
        channel_with(handler.clone()),
    ));
    assert!(listener.is_transacted());
    assert_eq!(listener.destination(), QUEUE);
    let task = listener.spawn(cancel.clone());

    cancel.cancel();
    task.await.unwrap();
    publish_timestamps(&broker, 2).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(handler.len(), 0);
    assert_eq!(broker.queue_depth(QUEUE).await, 2);
}

#[tokio::test]
async fn test_listener_exits_when_factory_stops() {
    let (_broker, factory) = started_factory(RedeliveryPolicy::unbounded());
    let task = message_driven(factory.handle(), channel_with(RecordingHandler::default()))
        .spawn(CancellationToken::new());

    factory.stop();

    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("listener did not exit")
        .unwrap();
}
