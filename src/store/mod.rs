mod schema;
mod store;

pub use store::Store;

use crate::channel::state::{Channel, ChannelTransaction};
use crate::channel::types::Hash256;
use crate::errors::Result;

/// Durable channel state as the node sees it. Implementations must apply
/// each call atomically: a put, the removal of a superseded record and the
/// journal append either all land or none do.
pub trait ChannelStore: Clone + Send + Sync + 'static {
    fn put_channel(&self, channel: &Channel) -> Result<()>;

    /// Persists the channel and appends a journal entry in one transaction.
    fn put_channel_with_transaction(
        &self,
        channel: &Channel,
        transaction: &ChannelTransaction,
    ) -> Result<()>;

    /// Point lookup by channel id, open channels first.
    fn get_channel(&self, channel_id: &Hash256) -> Result<Option<Channel>>;

    /// All channels, open and closed.
    fn list_channels(&self) -> Result<Vec<Channel>>;

    fn get_transaction(&self, id: &Hash256) -> Result<Option<ChannelTransaction>>;

    fn list_transactions(&self) -> Result<Vec<ChannelTransaction>>;
}
