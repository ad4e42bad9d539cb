use std::sync::Arc;

use tracing::{debug, info};

use crate::consumer::MessageConsumer;
use crate::consumer::counter::DeliveryCounter;
use crate::integration::source::{Clock, SystemClock, iso_date_time};
use crate::integration::Message;
use crate::utils::{Error, Result};

#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingConsumer;

impl MessageConsumer for LoggingConsumer {
    fn consume(&self, message: &Message) -> Result<()> {
        info!("{}", message.payload);
        Ok(())
    }
}

pub struct FailingLoggingConsumer {
    counter: DeliveryCounter,
    failure_interval: u64,
    clock: Arc<dyn Clock>,
}

impl FailingLoggingConsumer {
    pub const DEFAULT_FAILURE_INTERVAL: u64 = 3;
    const FAILURE_REASON: &'static str = "TEST!";

    pub fn new(counter: DeliveryCounter) -> Self {
        Self {
            counter,
            failure_interval: Self::DEFAULT_FAILURE_INTERVAL,
            clock: Arc::new(SystemClock),
        }
    }

    /// Fail every `failure_interval`-th invocation. Zero disables failures.
    pub fn with_failure_interval(mut self, failure_interval: u64) -> Self {
        self.failure_interval = failure_interval;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn counter(&self) -> &DeliveryCounter {
        &self.counter
    }

    /// Whether the invocation with this counter value is meant to fail.
    pub fn fails_on(&self, invocation: u64) -> bool {
        self.failure_interval != 0 && invocation % self.failure_interval == 0
    }
}

impl MessageConsumer for FailingLoggingConsumer {
    fn consume(&self, message: &Message) -> Result<()> {
        let now = iso_date_time(&self.clock.now());
        let invocation = self.counter.increment_and_get();
        if self.fails_on(invocation) {
            debug!(invocation, payload = %message.payload, "Injecting consumer failure");
            return Err(Error::Handler {
                reason: Self::FAILURE_REASON.to_string(),
                payload: message.payload.clone(),
            });
        }
        println!("{now}: {}", message.payload);
        Ok(())
    }
}
