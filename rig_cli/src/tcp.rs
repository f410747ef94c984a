//! Newline-delimited text transport over TCP.
//!
//! An accept thread registers each peer and spawns a reader thread for it.
//! Readers forward lines as `LinkEvent`s over a channel; the control loop
//! drains them with `poll` and writes broadcasts on its own thread.

use std::collections::HashMap;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, unbounded};
use rig_traits::{LinkEvent, MessageLink, PeerId};

/// A peer that cannot take a broadcast within this window is dropped.
const WRITE_TIMEOUT: Duration = Duration::from_millis(250);
/// Longest accepted inbound line, excluding the newline. Longer lines drop the peer.
const MAX_LINE: usize = 4096;

type Peers = Arc<Mutex<HashMap<PeerId, TcpStream>>>;

fn lock(peers: &Peers) -> MutexGuard<'_, HashMap<PeerId, TcpStream>> {
    peers.lock().unwrap_or_else(|p| p.into_inner())
}

pub struct TcpLink {
    events: Receiver<LinkEvent>,
    peers: Peers,
    /// Disconnects discovered while broadcasting, reported on the next poll.
    dropped: Vec<LinkEvent>,
    local_addr: SocketAddr,
}

impl TcpLink {
    pub fn bind(addr: &str) -> io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        let local_addr = listener.local_addr()?;
        let (tx, rx) = unbounded();
        let peers: Peers = Arc::default();

        let accept_peers = Arc::clone(&peers);
        thread::Builder::new()
            .name("rig-accept".into())
            .spawn(move || accept_loop(&listener, &tx, &accept_peers))?;

        Ok(Self {
            events: rx,
            peers,
            dropped: Vec::new(),
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn peer_count(&self) -> usize {
        lock(&self.peers).len()
    }
}

fn accept_loop(listener: &TcpListener, tx: &Sender<LinkEvent>, peers: &Peers) {
    let next_id = AtomicU32::new(1);
    for conn in listener.incoming() {
        let stream = match conn {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "accept failed");
                continue;
            }
        };
        let id = next_id.fetch_add(1, Ordering::Relaxed);
        if let Err(e) = register(id, stream, tx, peers) {
            tracing::warn!(peer = id, error = %e, "peer setup failed");
        }
    }
}

fn register(id: PeerId, stream: TcpStream, tx: &Sender<LinkEvent>, peers: &Peers) -> io::Result<()> {
    let remote = stream.peer_addr()?;
    stream.set_nodelay(true)?;
    let writer = stream.try_clone()?;
    writer.set_write_timeout(Some(WRITE_TIMEOUT))?;
    lock(peers).insert(id, writer);
    tracing::debug!(peer = id, %remote, "peer accepted");
    if tx.send(LinkEvent::Connected(id)).is_err() {
        return Ok(());
    }

    let tx = tx.clone();
    let peers = Arc::clone(peers);
    thread::Builder::new()
        .name(format!("rig-peer-{id}"))
        .spawn(move || read_loop(id, stream, &tx, &peers))?;
    Ok(())
}

fn read_loop(id: PeerId, stream: TcpStream, tx: &Sender<LinkEvent>, peers: &Peers) {
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match (&mut reader).take(MAX_LINE as u64 + 1).read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(n) if n > MAX_LINE && buf.last() != Some(&b'\n') => {
                tracing::warn!(peer = id, limit = MAX_LINE, "line too long; dropping peer");
                break;
            }
            Ok(n) => {
                while matches!(buf.last(), Some(b'\n' | b'\r')) {
                    buf.pop();
                }
                if buf.is_empty() {
                    continue;
                }
                let event = match std::str::from_utf8(&buf) {
                    Ok(text) => LinkEvent::Text(id, text.to_string()),
                    Err(_) => LinkEvent::Binary(id, n),
                };
                if tx.send(event).is_err() {
                    return;
                }
            }
            Err(e) => {
                tracing::debug!(peer = id, error = %e, "peer read failed");
                break;
            }
        }
    }
    // Only report the disconnect if a failed broadcast has not already done so
    if lock(peers).remove(&id).is_some() {
        let _ = tx.send(LinkEvent::Disconnected(id));
    }
}

impl MessageLink for TcpLink {
    fn poll(&mut self) -> Vec<LinkEvent> {
        let mut events: Vec<LinkEvent> = self.dropped.drain(..).collect();
        events.extend(self.events.try_iter());
        events
    }

    fn broadcast(&mut self, text: &str) {
        let mut line = String::with_capacity(text.len() + 1);
        line.push_str(text);
        line.push('\n');

        let mut peers = lock(&self.peers);
        let mut failed = Vec::new();
        for (id, stream) in peers.iter_mut() {
            if let Err(e) = stream.write_all(line.as_bytes()) {
                tracing::warn!(peer = *id, error = %e, "broadcast failed; dropping peer");
                failed.push(*id);
            }
        }
        for id in failed {
            if let Some(stream) = peers.remove(&id) {
                let _ = stream.shutdown(std::net::Shutdown::Both);
            }
            self.dropped.push(LinkEvent::Disconnected(id));
        }
    }
}
