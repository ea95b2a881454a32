//! Transport abstraction for packet delivery.
//!
//! The transport moves sealed packets between principals. It never sees
//! plaintext and performs no authentication of its own; a hostile
//! transport can drop, duplicate or reorder packets, which the receiving
//! channel detects.

use async_trait::async_trait;

use pi0_kernel_core::Principal;

use crate::error::Result;
use crate::packet::Packet;

/// Delivery of packets between principals.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver a packet to the principal it is addressed to.
    async fn send(&self, packet: Packet) -> Result<()>;

    /// Receive the next packet from any peer.
    ///
    /// Returns the sender and the packet. Waits until one is available.
    async fn recv(&self) -> Result<(Principal, Packet)>;

    /// Receive with timeout.
    ///
    /// Returns None if the timeout expires before a packet arrives.
    async fn recv_timeout(&self, timeout: std::time::Duration) -> Result<Option<(Principal, Packet)>>;

    /// The principal this transport delivers for.
    fn local(&self) -> &Principal;

    /// Principals currently reachable, excluding the local one.
    async fn peers(&self) -> Vec<Principal>;
}

/// An in-memory transport for tests and single-process deployments.
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::{mpsc, Mutex, RwLock};

    use crate::error::ChannelError;

    const QUEUE_DEPTH: usize = 1000;

    #[derive(Debug)]
    struct Envelope {
        from: Principal,
        packet: Packet,
    }

    /// Shared routing table for memory transports.
    #[derive(Default)]
    pub struct MemoryNetwork {
        senders: RwLock<HashMap<Principal, mpsc::Sender<Envelope>>>,
    }

    impl MemoryNetwork {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Attach a principal to the network, replacing any earlier attachment.
        pub async fn connect(self: &Arc<Self>, local: Principal) -> MemoryTransport {
            let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
            self.senders.write().await.insert(local.clone(), tx);

            MemoryTransport {
                local,
                network: Arc::clone(self),
                receiver: Mutex::new(rx),
            }
        }

        /// Detach a principal. Packets addressed to it then fail to send.
        pub async fn disconnect(&self, principal: &Principal) {
            self.senders.write().await.remove(principal);
        }
    }

    /// In-memory transport endpoint.
    pub struct MemoryTransport {
        local: Principal,
        network: Arc<MemoryNetwork>,
        receiver: Mutex<mpsc::Receiver<Envelope>>,
    }

    #[async_trait]
    impl Transport for MemoryTransport {
        async fn send(&self, packet: Packet) -> Result<()> {
            let sender = self
                .network
                .senders
                .read()
                .await
                .get(&packet.target)
                .cloned()
                .ok_or_else(|| ChannelError::Transport(format!("peer not found: {}", packet.target)))?;

            sender
                .send(Envelope {
                    from: self.local.clone(),
                    packet,
                })
                .await
                .map_err(|_| ChannelError::Transport("peer disconnected".into()))
        }

        async fn recv(&self) -> Result<(Principal, Packet)> {
            let mut rx = self.receiver.lock().await;
            match rx.recv().await {
                Some(envelope) => Ok((envelope.from, envelope.packet)),
                None => Err(ChannelError::Transport("channel closed".into())),
            }
        }

        async fn recv_timeout(&self, timeout: std::time::Duration) -> Result<Option<(Principal, Packet)>> {
            let mut rx = self.receiver.lock().await;
            match tokio::time::timeout(timeout, rx.recv()).await {
                Ok(Some(envelope)) => Ok(Some((envelope.from, envelope.packet))),
                Ok(None) => Err(ChannelError::Transport("channel closed".into())),
                Err(_) => Ok(None),
            }
        }

        fn local(&self) -> &Principal {
            &self.local
        }

        async fn peers(&self) -> Vec<Principal> {
            let senders = self.network.senders.read().await;
            let mut peers: Vec<_> = senders
                .keys()
                .filter(|p| *p != &self.local)
                .cloned()
                .collect();
            peers.sort();
            peers
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryNetwork;
    use super::*;
    use crate::error::ChannelError;
    use bytes::Bytes;
    use pi0_kernel_core::Blake3Hash;
    use std::time::Duration;

    fn packet_for(target: &str, sequence: u64) -> Packet {
        Packet {
            target: Principal::from(target),
            ciphertext: Bytes::from_static(b"opaque"),
            mac: Blake3Hash::ZERO,
            sequence,
        }
    }

    #[tokio::test]
    async fn test_memory_transport_send_recv() {
        let network = MemoryNetwork::new();
        let alice = network.connect(Principal::from("alice")).await;
        let bob = network.connect(Principal::from("bob")).await;

        alice.send(packet_for("bob", 1)).await.unwrap();

        let (from, packet) = bob.recv().await.unwrap();
        assert_eq!(from, Principal::from("alice"));
        assert_eq!(packet.sequence, 1);
        assert_eq!(bob.peers().await, vec![Principal::from("alice")]);
    }

    #[tokio::test]
    async fn test_unknown_peer() {
        let network = MemoryNetwork::new();
        let alice = network.connect(Principal::from("alice")).await;

        let err = alice.send(packet_for("nobody", 1)).await.unwrap_err();
        assert!(matches!(err, ChannelError::Transport(_)));
    }

    #[tokio::test]
    async fn test_recv_timeout_empty() {
        let network = MemoryNetwork::new();
        let alice = network.connect(Principal::from("alice")).await;

        let got = alice.recv_timeout(Duration::from_millis(10)).await.unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn test_disconnect() {
        let network = MemoryNetwork::new();
        let alice = network.connect(Principal::from("alice")).await;
        let _bob = network.connect(Principal::from("bob")).await;

        network.disconnect(&Principal::from("bob")).await;
        assert!(alice.send(packet_for("bob", 1)).await.is_err());
        assert!(alice.peers().await.is_empty());
    }
}
