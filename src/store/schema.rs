/// Key layout. Buckets are emulated as slash-joined key prefixes under the
/// subsystem's top-level namespace:
///
/// +------------------------------------+-----------+---------------------+
/// | Prefix                             | Key       | Value               |
/// +------------------------------------+-----------+---------------------+
/// | paymentchannels/openchannels/      | channel id| Channel             |
/// | paymentchannels/closedchannels/    | channel id| Channel             |
/// | paymentchannels/transactions/      | ctx id    | ChannelTransaction  |
/// +------------------------------------+-----------+---------------------+
pub(crate) const PAYMENT_CHANNELS_BUCKET: &[u8] = b"paymentchannels";
pub(crate) const OPEN_CHANNELS_BUCKET: &[u8] = b"openchannels";
pub(crate) const CLOSED_CHANNELS_BUCKET: &[u8] = b"closedchannels";
pub(crate) const TRANSACTIONS_BUCKET: &[u8] = b"transactions";

pub(crate) fn bucket_prefix(bucket: &[u8]) -> Vec<u8> {
    [PAYMENT_CHANNELS_BUCKET, b"/", bucket, b"/"].concat()
}

pub(crate) fn bucket_key(bucket: &[u8], id: &[u8]) -> Vec<u8> {
    [PAYMENT_CHANNELS_BUCKET, b"/", bucket, b"/", id].concat()
}
