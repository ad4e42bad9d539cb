use async_trait::async_trait;

use crate::integration::message::Message;
use crate::utils::Result;

/// Anything that can sit at the end of a channel.
///
/// An `Err` travels straight back to whoever sent the message into the
/// channel, which is how a consumer failure reaches the transacted listener.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: Message) -> Result<()>;
}
