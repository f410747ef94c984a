//! In-memory message link for tests and simulations.
//!
//! `channel_link` returns the rig side (`ChannelLink`, a `MessageLink`) and a
//! `RemotePeer` handle that plays the remote controller.

use crossbeam_channel::{Receiver, Sender, unbounded};
use rig_traits::{LinkEvent, MessageLink, PeerId};

pub struct ChannelLink {
    events: Receiver<LinkEvent>,
    outbound: Sender<String>,
}

#[derive(Clone)]
pub struct RemotePeer {
    id: PeerId,
    events: Sender<LinkEvent>,
    inbound: Receiver<String>,
}

pub fn channel_link(id: PeerId) -> (ChannelLink, RemotePeer) {
    let (ev_tx, ev_rx) = unbounded();
    let (out_tx, out_rx) = unbounded();
    (
        ChannelLink {
            events: ev_rx,
            outbound: out_tx,
        },
        RemotePeer {
            id,
            events: ev_tx,
            inbound: out_rx,
        },
    )
}

impl MessageLink for ChannelLink {
    fn poll(&mut self) -> Vec<LinkEvent> {
        self.events.try_iter().collect()
    }

    fn broadcast(&mut self, text: &str) {
        // Nobody listening is not an error for a broadcast
        let _ = self.outbound.send(text.to_string());
    }
}

impl RemotePeer {
    pub fn id(&self) -> PeerId {
        self.id
    }

    pub fn connect(&self) {
        let _ = self.events.send(LinkEvent::Connected(self.id));
    }

    pub fn send_text(&self, text: impl Into<String>) {
        let _ = self.events.send(LinkEvent::Text(self.id, text.into()));
    }

    pub fn send_binary(&self, len: usize) {
        let _ = self.events.send(LinkEvent::Binary(self.id, len));
    }

    pub fn disconnect(&self) {
        let _ = self.events.send(LinkEvent::Disconnected(self.id));
    }

    /// Every message broadcast by the rig since the last call.
    pub fn received(&self) -> Vec<String> {
        self.inbound.try_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_arrive_in_order() {
        let (mut link, peer) = channel_link(7);
        peer.connect();
        peer.send_text("{}");
        peer.disconnect();
        assert_eq!(
            link.poll(),
            vec![
                LinkEvent::Connected(7),
                LinkEvent::Text(7, "{}".into()),
                LinkEvent::Disconnected(7),
            ]
        );
        assert!(link.poll().is_empty());
    }

    #[test]
    fn broadcast_reaches_peer() {
        let (mut link, peer) = channel_link(1);
        link.broadcast("hello");
        assert_eq!(peer.received(), vec!["hello".to_string()]);
        drop(peer);
        link.broadcast("nobody home");
    }
}
