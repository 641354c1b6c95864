//! Peer link contract

use animproc_core::{AnimError, AnimResult};

/// One side of a framed, non-blocking peer connection.
///
/// Any send or receive failure disconnects the link; callers never retry.
pub trait PeerLink: Send {
    /// Whether a peer is currently attached
    fn is_connected(&self) -> bool;

    /// Drop the peer
    fn disconnect(&mut self);

    /// Send one frame. Returns false when not connected or when the frame
    /// could not be sent in full; either way the link is disconnected.
    fn try_send(&mut self, bytes: &[u8]) -> bool;

    /// Receive one frame into `buf`. Returns 0 when nothing is pending or
    /// the receive failed (which also disconnects).
    fn try_recv(&mut self, buf: &mut [u8]) -> usize;

    /// Re-establish a dropped connection, if this side can initiate one
    fn reconnect(&mut self) -> AnimResult<()> {
        Err(AnimError::NotConnected)
    }
}

impl<L: PeerLink + ?Sized> PeerLink for Box<L> {
    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn disconnect(&mut self) {
        (**self).disconnect()
    }

    fn try_send(&mut self, bytes: &[u8]) -> bool {
        (**self).try_send(bytes)
    }

    fn try_recv(&mut self, buf: &mut [u8]) -> usize {
        (**self).try_recv(buf)
    }

    fn reconnect(&mut self) -> AnimResult<()> {
        (**self).reconnect()
    }
}
