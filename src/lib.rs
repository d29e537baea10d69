mod config;
pub use config::ChannelConfig;

pub mod channel;
pub use channel::node::PaymentChannelNode;
pub use channel::types::{Hash256, PeerId, Privkey, Pubkey};

pub mod kmutex;
pub mod overlay;
pub mod store;
pub mod wallet;

mod errors;
pub use errors::{Error, Result};

mod tasks;
pub use tasks::TaskTrackerWithCancellation;
