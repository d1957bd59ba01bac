//! Bidirectional, ordered, byte-framed message passing between exactly two
//! endpoints on one host.
//!
//! A [`Channel`] produces an [`Anchor`] (kept by the parent) and a [`Point`]
//! (transferable to a subprocess). Both route through
//! `suitkaise-serializer` for payload encoding and a length-prefixed framer
//! over a `UnixStream` socket pair for transport.

mod endpoint;
mod error;
mod framing;

pub use endpoint::{close_inherited_fd, Anchor, CanRecv, CanSend, Full, Point, RecvOnly, SendOnly};
pub use error::ChannelError;

use std::os::unix::net::UnixStream;

pub struct Channel;

impl Channel {
    /// Create a duplex anchor/point pair: both ends may send and receive.
    pub fn pair() -> Result<(Anchor<Full>, Point<Full>), ChannelError> {
        let (a, b) = UnixStream::pair()?;
        Ok((Anchor::new(a), Point::new(b)))
    }

    /// Create a one-way pair: the anchor may only send, the point may only
    /// receive. Enforced at the type level - there is no runtime direction
    /// check to get wrong.
    pub fn one_way_pair() -> Result<(Anchor<SendOnly>, Point<RecvOnly>), ChannelError> {
        let (a, b) = UnixStream::pair()?;
        Ok((Anchor::new(a), Point::new(b)))
    }

    /// The mirror image of [`Channel::one_way_pair`]: the anchor may only
    /// receive, the point may only send. Used for the `C->P` leg of a
    /// `Worker`'s tell/listen pair, where the *child's* point is the sender
    /// and the parent's anchor only ever listens.
    pub fn one_way_pair_reversed() -> Result<(Anchor<RecvOnly>, Point<SendOnly>), ChannelError> {
        let (a, b) = UnixStream::pair()?;
        Ok((Anchor::new(a), Point::new(b)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Ping {
        seq: u32,
    }

    #[test]
    fn duplex_pair_round_trips_a_message_anchor_to_point() {
        let (mut anchor, point) = Channel::pair().unwrap();
        anchor.send(&Ping { seq: 1 }).unwrap();
        let received: Ping = point.recv().unwrap();
        assert_eq!(received, Ping { seq: 1 });
    }

    #[test]
    fn duplex_pair_round_trips_a_message_point_to_anchor() {
        let (mut anchor, point) = Channel::pair().unwrap();
        point.send(&Ping { seq: 7 }).unwrap();
        let received: Ping = anchor.recv().unwrap();
        assert_eq!(received, Ping { seq: 7 });
    }

    #[test]
    fn messages_are_delivered_fifo() {
        let (mut anchor, point) = Channel::pair().unwrap();
        for seq in 0..5 {
            anchor.send(&Ping { seq }).unwrap();
        }
        for expected in 0..5 {
            let got: Ping = point.recv().unwrap();
            assert_eq!(got.seq, expected);
        }
    }

    #[test]
    fn recv_timeout_returns_none_when_no_message_arrives() {
        let (_anchor, point) = Channel::pair().unwrap();
        let result: Option<Ping> = point.recv_timeout(Duration::from_millis(50)).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn closing_the_anchor_surfaces_as_closed_on_the_point() {
        let (anchor, point) = Channel::pair().unwrap();
        anchor.close();
        let err = point.recv::<Ping>().unwrap_err();
        assert!(matches!(err, ChannelError::Closed));
    }

    #[test]
    fn one_way_pair_only_exposes_send_on_anchor_and_recv_on_point() {
        let (mut anchor, point) = Channel::one_way_pair().unwrap();
        anchor.send(&Ping { seq: 42 }).unwrap();
        let got: Ping = point.recv().unwrap();
        assert_eq!(got, Ping { seq: 42 });
        // `point.send(..)` and `anchor.recv::<Ping>()` do not compile for
        // one-way pairs - enforced by the `CanSend`/`CanRecv` bounds, not at
        // runtime.
    }

    #[test]
    fn reversed_one_way_pair_only_exposes_send_on_point_and_recv_on_anchor() {
        let (mut anchor, point) = Channel::one_way_pair_reversed().unwrap();
        point.send(&Ping { seq: 9 }).unwrap();
        let got: Ping = anchor.recv().unwrap();
        assert_eq!(got, Ping { seq: 9 });
    }

    #[test]
    fn a_point_transferred_twice_fails_with_endpoint_locked() {
        let (_anchor, point) = Channel::pair().unwrap();
        let bytes = suitkaise_serializer::encode(&point).unwrap();
        let err = suitkaise_serializer::encode(&point).unwrap_err();
        assert!(matches!(
            err,
            suitkaise_serializer::SerializationError::Codec(_)
        ));
        // The re-decoded point, from the first successful encode, is usable.
        let reconnected: Point = suitkaise_serializer::decode(&bytes).unwrap();
        drop(reconnected);
    }
}
