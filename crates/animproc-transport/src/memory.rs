//! In-process peer link
//!
//! `MemoryLink` is the router-facing half; `MemoryPeer` plays the remote
//! process, pushing frames in and collecting what was sent.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use animproc_core::{AnimError, AnimResult};

use crate::PeerLink;

#[derive(Default)]
struct Shared {
    inbound: VecDeque<Vec<u8>>,
    outbound: Vec<Vec<u8>>,
    connected: bool,
    reachable: bool,
    fail_sends: usize,
    fail_recvs: usize,
    reconnects: u64,
}

/// Link side handed to the router
pub struct MemoryLink {
    shared: Arc<Mutex<Shared>>,
}

/// Remote side kept by the test or simulator
#[derive(Clone)]
pub struct MemoryPeer {
    shared: Arc<Mutex<Shared>>,
}

impl MemoryLink {
    /// Create a linked pair, initially connected or not
    pub fn pair(connected: bool) -> (MemoryLink, MemoryPeer) {
        let shared = Arc::new(Mutex::new(Shared {
            connected,
            ..Shared::default()
        }));
        (
            MemoryLink {
                shared: Arc::clone(&shared),
            },
            MemoryPeer { shared },
        )
    }
}

impl PeerLink for MemoryLink {
    fn is_connected(&self) -> bool {
        self.shared.lock().connected
    }

    fn disconnect(&mut self) {
        self.shared.lock().connected = false;
    }

    fn try_send(&mut self, bytes: &[u8]) -> bool {
        let mut shared = self.shared.lock();
        if !shared.connected {
            return false;
        }
        if shared.fail_sends > 0 {
            shared.fail_sends -= 1;
            shared.connected = false;
            return false;
        }
        shared.outbound.push(bytes.to_vec());
        true
    }

    fn try_recv(&mut self, buf: &mut [u8]) -> usize {
        let mut shared = self.shared.lock();
        if !shared.connected {
            return 0;
        }
        if shared.fail_recvs > 0 {
            shared.fail_recvs -= 1;
            shared.connected = false;
            return 0;
        }
        let Some(frame) = shared.inbound.pop_front() else {
            return 0;
        };
        // Datagram semantics: anything past the buffer is lost
        let len = frame.len().min(buf.len());
        buf[..len].copy_from_slice(&frame[..len]);
        len
    }

    fn reconnect(&mut self) -> AnimResult<()> {
        let mut shared = self.shared.lock();
        if !shared.reachable {
            return Err(AnimError::NotConnected);
        }
        shared.connected = true;
        shared.reconnects += 1;
        Ok(())
    }
}

impl MemoryPeer {
    /// Queue a frame for the link to receive
    pub fn push(&self, frame: impl Into<Vec<u8>>) {
        self.shared.lock().inbound.push_back(frame.into());
    }

    /// Take every frame the link has sent so far
    pub fn take_sent(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.shared.lock().outbound)
    }

    /// Frames queued but not yet received by the link
    pub fn pending(&self) -> usize {
        self.shared.lock().inbound.len()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.lock().connected
    }

    /// Attach or detach the remote side
    pub fn set_connected(&self, connected: bool) {
        self.shared.lock().connected = connected;
    }

    /// Whether `reconnect` on the link succeeds
    pub fn set_reachable(&self, reachable: bool) {
        self.shared.lock().reachable = reachable;
    }

    /// Number of successful reconnects
    pub fn reconnects(&self) -> u64 {
        self.shared.lock().reconnects
    }

    /// Make the next `count` sends fail
    pub fn fail_next_sends(&self, count: usize) {
        self.shared.lock().fail_sends = count;
    }

    /// Make the next `count` receives fail
    pub fn fail_next_recvs(&self, count: usize) {
        self.shared.lock().fail_recvs = count;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_frames_flow_both_ways() {
        let (mut link, peer) = MemoryLink::pair(true);
        peer.push(vec![1, 2, 3]);
        peer.push(vec![4]);

        let mut buf = [0u8; 8];
        assert_eq!(link.try_recv(&mut buf), 3);
        assert_eq!(&buf[..3], &[1, 2, 3]);
        assert_eq!(link.try_recv(&mut buf), 1);
        assert_eq!(link.try_recv(&mut buf), 0);

        assert!(link.try_send(&[9, 9]));
        assert_eq!(peer.take_sent(), vec![vec![9, 9]]);
        assert!(peer.take_sent().is_empty());
    }

    #[test]
    fn test_send_failure_disconnects() {
        let (mut link, peer) = MemoryLink::pair(true);
        peer.fail_next_sends(1);
        assert!(!link.try_send(&[1]));
        assert!(!link.is_connected());
        assert!(!link.try_send(&[1]));
        assert!(peer.take_sent().is_empty());
    }

    #[test]
    fn test_recv_failure_disconnects() {
        let (mut link, peer) = MemoryLink::pair(true);
        peer.push(vec![1]);
        peer.fail_next_recvs(1);
        let mut buf = [0u8; 4];
        assert_eq!(link.try_recv(&mut buf), 0);
        assert!(!link.is_connected());
        assert_eq!(peer.pending(), 1);
    }

    #[test]
    fn test_reconnect_requires_reachable_peer() {
        let (mut link, peer) = MemoryLink::pair(false);
        assert!(link.reconnect().is_err());
        peer.set_reachable(true);
        link.reconnect().unwrap();
        assert!(link.is_connected());
        assert_eq!(peer.reconnects(), 1);
    }

    proptest! {
        #[test]
        fn prop_one_datagram_per_recv_in_order(
            frames in prop::collection::vec(prop::collection::vec(any::<u8>(), 1..64), 0..16),
        ) {
            let (mut link, peer) = MemoryLink::pair(true);
            for frame in &frames {
                peer.push(frame.clone());
            }

            let mut buf = [0u8; 64];
            for frame in &frames {
                let len = link.try_recv(&mut buf);
                prop_assert_eq!(&buf[..len], frame.as_slice());
            }
            prop_assert_eq!(link.try_recv(&mut buf), 0);
        }
    }
}
