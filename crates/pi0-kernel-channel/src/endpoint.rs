//! A secure channel bound to a transport.

use std::time::Duration;

use pi0_kernel_core::Principal;

use crate::channel::SecureChannel;
use crate::error::Result;
use crate::packet::Packet;
use crate::transport::Transport;

/// A message opened by a [`ChannelEndpoint`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub from: Principal,
    pub sequence: u64,
    pub plaintext: Vec<u8>,
}

/// Seals outbound messages and opens inbound ones over a [`Transport`].
pub struct ChannelEndpoint<T: Transport> {
    channel: SecureChannel,
    transport: T,
}

impl<T: Transport> ChannelEndpoint<T> {
    /// Bind `channel` to `transport`. The channel takes the transport's
    /// local principal as its identity, so packets addressed elsewhere are
    /// refused.
    pub fn new(channel: SecureChannel, transport: T) -> Self {
        let channel = channel.with_local(transport.local().clone());
        Self { channel, transport }
    }

    pub fn local(&self) -> &Principal {
        self.transport.local()
    }

    pub fn channel(&self) -> &SecureChannel {
        &self.channel
    }

    /// Seal `plaintext` for `target` and hand it to the transport.
    pub async fn send(&self, target: &Principal, plaintext: &[u8]) -> Result<Packet> {
        let packet = self.channel.send(target, plaintext)?;
        self.transport.send(packet.clone()).await?;
        Ok(packet)
    }

    /// Seal and send each message in order. Stops at the first failure.
    pub async fn send_all<I, M>(&self, target: &Principal, messages: I) -> Result<Vec<Packet>>
    where
        I: IntoIterator<Item = M>,
        M: AsRef<[u8]>,
    {
        let mut sent = Vec::new();
        for message in messages {
            sent.push(self.send(target, message.as_ref()).await?);
        }
        Ok(sent)
    }

    /// Wait for the next packet and open it.
    pub async fn recv(&self) -> Result<Delivery> {
        let (from, packet) = self.transport.recv().await?;
        self.open(from, packet)
    }

    /// Like [`recv`](Self::recv) but gives up after `timeout`.
    pub async fn recv_timeout(&self, timeout: Duration) -> Result<Option<Delivery>> {
        match self.transport.recv_timeout(timeout).await? {
            Some((from, packet)) => self.open(from, packet).map(Some),
            None => Ok(None),
        }
    }

    fn open(&self, from: Principal, packet: Packet) -> Result<Delivery> {
        let plaintext = self.channel.receive(&packet)?;
        Ok(Delivery {
            from,
            sequence: packet.sequence,
            plaintext,
        })
    }
}
