pub mod address;
pub mod commitment;
pub mod node;
pub mod scripts;
pub mod serde_utils;
pub mod state;
pub mod types;
pub mod wire;

pub use address::ChannelAddress;
pub use node::PaymentChannelNode;
pub use state::{Channel, ChannelStatus, ChannelTransaction};

#[cfg(test)]
pub mod tests;
