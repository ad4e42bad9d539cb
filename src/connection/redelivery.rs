use std::time::Duration;

/// How often a rolled back message is handed out again before it is moved to
/// the dead-letter queue.
///
/// `max_redeliveries = None` never gives up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RedeliveryPolicy {
    pub max_redeliveries: Option<u32>,
    pub redelivery_delay: Duration,
}

impl RedeliveryPolicy {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn with_max_redeliveries(max_redeliveries: u32) -> Self {
        Self {
            max_redeliveries: Some(max_redeliveries),
            ..Self::default()
        }
    }

    /// Whether a frame rolled back `redelivery_count` times may be delivered again.
    pub fn allows(&self, redelivery_count: u32) -> bool {
        self.max_redeliveries
            .is_none_or(|max| redelivery_count <= max)
    }
}
