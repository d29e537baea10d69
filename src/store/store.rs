use std::path::Path;
use std::sync::Arc;

use rocksdb::{DBCompressionType, Direction, IteratorMode, Options, WriteBatch, DB};
use serde::Serialize;

use super::schema::*;
use super::ChannelStore;
use crate::channel::state::{Channel, ChannelStatus, ChannelTransaction};
use crate::channel::types::Hash256;
use crate::errors::Result;

/// Rocksdb-backed channel store. Every logical mutation is one write
/// batch, so a channel put, its stale-record delete and the journal append
/// land atomically.
#[derive(Clone, Debug)]
pub struct Store {
    db: Arc<DB>,
}

pub(crate) fn serialize_to_vec<T: ?Sized + Serialize>(value: &T, field_name: &str) -> Vec<u8> {
    bincode::serialize(value)
        .unwrap_or_else(|e| panic!("serialization of {} failed: {}", field_name, e))
}

pub(crate) fn deserialize_from<'a, T>(slice: &'a [u8], field_name: &str) -> T
where
    T: serde::Deserialize<'a>,
{
    bincode::deserialize(slice)
        .unwrap_or_else(|e| panic!("deserialization of {} failed: {}", field_name, e))
}

impl Store {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut options = Options::default();
        options.create_if_missing(true);
        options.set_compression_type(DBCompressionType::Lz4);
        let db = Arc::new(DB::open(&options, path)?);
        Ok(Self { db })
    }

    fn get<K: AsRef<[u8]>>(&self, key: K) -> Result<Option<Vec<u8>>> {
        Ok(self.db.get(key.as_ref())?)
    }

    fn batch(&self) -> Batch {
        Batch {
            db: Arc::clone(&self.db),
            wb: WriteBatch::default(),
        }
    }

    fn bucket_values(&self, bucket: &[u8]) -> Result<Vec<Vec<u8>>> {
        let prefix = bucket_prefix(bucket);
        let mut values = Vec::new();
        for item in self
            .db
            .iterator(IteratorMode::From(&prefix, Direction::Forward))
        {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            values.push(value.to_vec());
        }
        Ok(values)
    }
}

struct Batch {
    db: Arc<DB>,
    wb: WriteBatch,
}

impl Batch {
    fn put<K: AsRef<[u8]>, V: AsRef<[u8]>>(&mut self, key: K, value: V) {
        self.wb.put(key, value)
    }

    fn delete<K: AsRef<[u8]>>(&mut self, key: K) {
        self.wb.delete(key.as_ref())
    }

    fn commit(self) -> Result<()> {
        Ok(self.db.write(self.wb)?)
    }
}

impl Store {
    fn put_channel_impl(
        &self,
        channel: &Channel,
        transaction: Option<&ChannelTransaction>,
    ) -> Result<()> {
        let mut batch = self.batch();
        let value = serialize_to_vec(channel, "Channel");
        if channel.status == ChannelStatus::Closed {
            batch.put(bucket_key(CLOSED_CHANNELS_BUCKET, channel.id.as_ref()), value);
            // A channel lives in exactly one of the two buckets.
            batch.delete(bucket_key(OPEN_CHANNELS_BUCKET, channel.id.as_ref()));
        } else {
            batch.put(bucket_key(OPEN_CHANNELS_BUCKET, channel.id.as_ref()), value);
        }
        if let Some(transaction) = transaction {
            batch.put(
                bucket_key(TRANSACTIONS_BUCKET, transaction.id.as_ref()),
                serialize_to_vec(transaction, "ChannelTransaction"),
            );
        }
        batch.commit()
    }
}

impl ChannelStore for Store {
    fn put_channel(&self, channel: &Channel) -> Result<()> {
        self.put_channel_impl(channel, None)
    }

    fn put_channel_with_transaction(
        &self,
        channel: &Channel,
        transaction: &ChannelTransaction,
    ) -> Result<()> {
        self.put_channel_impl(channel, Some(transaction))
    }

    fn get_channel(&self, channel_id: &Hash256) -> Result<Option<Channel>> {
        if let Some(value) = self.get(bucket_key(OPEN_CHANNELS_BUCKET, channel_id.as_ref()))? {
            return Ok(Some(deserialize_from(&value, "Channel")));
        }
        if let Some(value) = self.get(bucket_key(CLOSED_CHANNELS_BUCKET, channel_id.as_ref()))? {
            return Ok(Some(deserialize_from(&value, "Channel")));
        }
        Ok(None)
    }

    fn list_channels(&self) -> Result<Vec<Channel>> {
        let mut channels = Vec::new();
        for value in self.bucket_values(OPEN_CHANNELS_BUCKET)? {
            channels.push(deserialize_from(&value, "Channel"));
        }
        for value in self.bucket_values(CLOSED_CHANNELS_BUCKET)? {
            channels.push(deserialize_from(&value, "Channel"));
        }
        Ok(channels)
    }

    fn get_transaction(&self, id: &Hash256) -> Result<Option<ChannelTransaction>> {
        Ok(self
            .get(bucket_key(TRANSACTIONS_BUCKET, id.as_ref()))?
            .map(|value| deserialize_from(&value, "ChannelTransaction")))
    }

    fn list_transactions(&self) -> Result<Vec<ChannelTransaction>> {
        let mut transactions = Vec::new();
        for value in self.bucket_values(TRANSACTIONS_BUCKET)? {
            transactions.push(deserialize_from(&value, "ChannelTransaction"));
        }
        Ok(transactions)
    }
}
