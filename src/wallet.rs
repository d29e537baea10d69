use async_trait::async_trait;
use bitcoin::{Address, OutPoint, Transaction, TxOut};

use crate::errors::Result;

/// The slice of the surrounding wallet the payment channel node consumes.
/// Key management, coin selection and signing all stay on the wallet's side
/// of this boundary.
#[async_trait]
pub trait WalletBackend: Send + Sync + 'static {
    /// Returns the next external chained address for the account.
    async fn new_address(&self, account: u32) -> Result<Address>;

    /// Creates a new signed transaction spending wallet outputs with at
    /// least `min_conf` confirmations to the given outputs. Change and an
    /// appropriate transaction fee are included automatically.
    async fn create_simple_tx(
        &self,
        account: u32,
        outputs: Vec<TxOut>,
        min_conf: u32,
        fee_per_kb: u64,
    ) -> Result<Transaction>;

    /// Broadcasts the transaction to the network.
    async fn publish_transaction(&self, tx: &Transaction) -> Result<()>;

    /// Marks an outpoint as locked: it must not be used as an input for
    /// newly created transactions.
    fn lock_outpoint(&self, outpoint: OutPoint);

    /// Releases a previously locked outpoint.
    fn unlock_outpoint(&self, outpoint: OutPoint);

    /// Causes the wallet to watch the given address. Channel escrow and
    /// breach-remedy addresses are imported so payouts and punishments show
    /// up as wallet activity.
    async fn import_address(&self, address: &Address, rescan: bool) -> Result<()>;
}
