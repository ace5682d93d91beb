mod networking;

pub use networking::*;

use bytes::{Bytes, BytesMut};
use futures::{FutureExt, Sink, SinkExt, Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream};
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::error::TransportError;

/// Width of the little-endian length prefix in front of every buffer.
pub const FRAME_LENGTH_BYTES: usize = 8;

/// Length-framed byte channel.
pub type FramedChannel<C> = Framed<C, LengthDelimitedCodec>;

/// Length-framed tokio's Duplex stream.
pub type DuplexChannel = FramedChannel<DuplexStream>;

/// Codec for the octet-stream framing spoken by the engines.
pub fn engine_codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_length(FRAME_LENGTH_BYTES)
        .little_endian()
        .max_frame_length(usize::MAX)
        .new_codec()
}

/// Wrap raw AsyncRead/Write into a framed engine channel.
pub fn wrap_channel<C>(channel: C) -> FramedChannel<C>
where
    C: AsyncRead + AsyncWrite,
{
    Framed::new(channel, engine_codec())
}

/// Create bidirectional in-memory framed channel.
pub fn framed_duplex(max_buf_size: usize) -> (DuplexChannel, DuplexChannel) {
    let (a, b) = tokio::io::duplex(max_buf_size);
    (wrap_channel(a), wrap_channel(b))
}

/// Ordered set of connections, one per engine.
///
/// Engine order is fixed for the lifetime of the set; shares received from
/// the engines are always combined in this order.
#[derive(Debug)]
pub struct EngineChannels<Channel> {
    channels: Vec<Channel>,
}

impl<Channel> EngineChannels<Channel> {
    /// Create wrapper for given list of connections, indexed by engine ID.
    pub fn new(channels: impl IntoIterator<Item = Channel>) -> Self {
        Self {
            channels: channels.into_iter().collect(),
        }
    }

    /// Number of engines.
    pub fn num_engines(&self) -> usize {
        self.channels.len()
    }
}

impl<E, Channel> EngineChannels<Channel>
where
    Channel: Stream<Item = Result<BytesMut, E>> + Sink<Bytes> + Unpin,
{
    /// Send the same buffer to every engine.
    pub async fn send_all(&mut self, buf: Bytes) -> Result<(), TransportError> {
        futures::future::try_join_all(self.channels.iter_mut().enumerate().map(
            |(id, channel)| {
                channel
                    .send(buf.clone())
                    .then(move |x| async move { x.map_err(|_| TransportError::Send(id)) })
            },
        ))
        .await
        .map(|_| ())
    }

    /// Receive next buffer from engine with given ID.
    pub async fn receive(&mut self, engine: usize) -> Result<BytesMut, TransportError> {
        match self.channels[engine].next().await {
            Some(Ok(buf)) => Ok(buf),
            Some(Err(_)) => Err(TransportError::Recv(engine)),
            None => Err(TransportError::Closed(engine)),
        }
    }

    /// Flush and close every channel. All channels are released even if some fail.
    pub async fn close_all(self) -> Result<(), TransportError> {
        let mut result = Ok(());
        for (id, mut channel) in self.channels.into_iter().enumerate() {
            if channel.close().await.is_err() && result.is_ok() {
                result = Err(TransportError::Send(id));
            }
        }
        result
    }
}

/// Create in-process channels for testing: the client side set and the engine ends.
pub fn mock_engine_channels(
    num_engines: usize,
    max_buf_size: usize,
) -> (EngineChannels<DuplexChannel>, Vec<DuplexChannel>) {
    let (client, engines): (Vec<_>, Vec<_>) =
        (0..num_engines).map(|_| framed_duplex(max_buf_size)).unzip();
    (EngineChannels::new(client), engines)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_all_and_receive_in_order() {
        let (mut channels, mut engines) = mock_engine_channels(3, 1 << 16);
        channels.send_all(Bytes::from_static(b"abc")).await.unwrap();
        for engine in engines.iter_mut() {
            let buf = engine.next().await.unwrap().unwrap();
            assert_eq!(&buf[..], b"abc");
        }

        for (id, engine) in engines.iter_mut().enumerate() {
            engine.send(Bytes::from(vec![id as u8])).await.unwrap();
        }
        for id in 0..3 {
            assert_eq!(&channels.receive(id).await.unwrap()[..], &[id as u8]);
        }
    }

    #[tokio::test]
    async fn test_frame_layout() {
        let (a, mut b) = tokio::io::duplex(1024);
        let mut framed = wrap_channel(a);
        framed.send(Bytes::from_static(&[9, 8])).await.unwrap();
        let mut raw = [0u8; 10];
        tokio::io::AsyncReadExt::read_exact(&mut b, &mut raw)
            .await
            .unwrap();
        assert_eq!(raw, [2, 0, 0, 0, 0, 0, 0, 0, 9, 8]);
    }

    #[tokio::test]
    async fn test_receive_after_close() {
        let (mut channels, engines) = mock_engine_channels(2, 1024);
        drop(engines);
        assert!(matches!(
            channels.receive(1).await,
            Err(TransportError::Closed(1))
        ));
    }
}
