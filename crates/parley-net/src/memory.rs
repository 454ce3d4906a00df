//! In-process transport.
//!
//! Implements the transport contract over paired tokio channels: offers and
//! answers are rendezvous tokens, an applied answer opens both ends, and
//! frames are delivered in order. Used by tests and local development; a
//! real deployment plugs in its own transport task behind the same
//! command/event channels.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::transport::{TransportCommand, TransportError, TransportEvent, TransportHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Offer,
    Answer,
}

impl Side {
    fn other(self) -> Side {
        match self {
            Side::Offer => Side::Answer,
            Side::Answer => Side::Offer,
        }
    }
}

#[derive(Debug, Clone)]
struct Endpoint {
    handle: TransportHandle,
    events: mpsc::Sender<TransportEvent>,
}

#[derive(Debug, Default)]
struct Link {
    offer: Option<Endpoint>,
    answer: Option<Endpoint>,
    open: bool,
}

impl Link {
    fn side(&self, side: Side) -> Option<&Endpoint> {
        match side {
            Side::Offer => self.offer.as_ref(),
            Side::Answer => self.answer.as_ref(),
        }
    }
}

#[derive(Debug, Default)]
struct NetworkState {
    next_link: u64,
    links: HashMap<u64, Link>,
    // offer/answer rendezvous tokens -> link
    pending_offers: HashMap<String, u64>,
    pending_answers: HashMap<String, u64>,
}

/// The shared "medium" every in-process transport endpoint attaches to.
#[derive(Debug, Clone, Default)]
pub struct MemoryNetwork {
    inner: Arc<Mutex<NetworkState>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Spawn one transport endpoint attached to `network`.
///
/// Returns the command and event channels of the transport contract.
pub fn spawn_memory_transport(
    network: &MemoryNetwork,
) -> (mpsc::Sender<TransportCommand>, mpsc::Receiver<TransportEvent>) {
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<TransportCommand>(256);
    let (event_tx, event_rx) = mpsc::channel::<TransportEvent>(256);
    let inner = network.inner.clone();

    tokio::spawn(async move {
        let mut next_handle: u64 = 0;
        // local handle -> (link id, which side of it we are)
        let mut channels: HashMap<u64, (u64, Side)> = HashMap::new();

        while let Some(cmd) = cmd_rx.recv().await {
            match cmd {
                TransportCommand::CreateOffer { reply } => {
                    next_handle += 1;
                    let handle = TransportHandle(next_handle);
                    let token = format!("mem-offer-{}", Uuid::new_v4().simple());

                    let mut state = inner.lock().await;
                    state.next_link += 1;
                    let link_id = state.next_link;
                    state.links.insert(
                        link_id,
                        Link {
                            offer: Some(Endpoint {
                                handle,
                                events: event_tx.clone(),
                            }),
                            answer: None,
                            open: false,
                        },
                    );
                    state.pending_offers.insert(token.clone(), link_id);
                    drop(state);

                    channels.insert(handle.0, (link_id, Side::Offer));
                    debug!(handle = %handle, "Offer gathered");
                    let _ = reply.send(Ok((handle, token)));
                }

                TransportCommand::AcceptOffer { sdp, reply } => {
                    let mut state = inner.lock().await;
                    let result = match state.pending_offers.remove(&sdp) {
                        Some(link_id) => {
                            next_handle += 1;
                            let handle = TransportHandle(next_handle);
                            let token = format!("mem-answer-{}", Uuid::new_v4().simple());

                            match state.links.get_mut(&link_id) {
                                Some(link) => {
                                    link.answer = Some(Endpoint {
                                        handle,
                                        events: event_tx.clone(),
                                    });
                                    state.pending_answers.insert(token.clone(), link_id);
                                    channels.insert(handle.0, (link_id, Side::Answer));
                                    debug!(handle = %handle, "Answer gathered");
                                    Ok((handle, token))
                                }
                                None => Err(TransportError::InvalidDescription),
                            }
                        }
                        None => Err(TransportError::InvalidDescription),
                    };
                    drop(state);
                    let _ = reply.send(result);
                }

                TransportCommand::ApplyAnswer { handle, sdp, reply } => {
                    let mut state = inner.lock().await;

                    let valid = state
                        .pending_answers
                        .get(&sdp)
                        .copied()
                        .filter(|link_id| {
                            channels.get(&handle.0) == Some(&(*link_id, Side::Offer))
                        });

                    match valid {
                        Some(link_id) => {
                            state.pending_answers.remove(&sdp);
                            let endpoints = state.links.get_mut(&link_id).map(|link| {
                                link.open = true;
                                (link.offer.clone(), link.answer.clone())
                            });
                            drop(state);

                            // Both ends observe the open channel before the
                            // initiator's apply call resolves.
                            if let Some((offer, answer)) = endpoints {
                                for side in [offer, answer].into_iter().flatten() {
                                    let _ = side
                                        .events
                                        .send(TransportEvent::ChannelOpen { handle: side.handle })
                                        .await;
                                }
                            }
                            let _ = reply.send(Ok(()));
                        }
                        None => {
                            drop(state);
                            warn!(handle = %handle, "Answer does not match this offer");
                            let _ = reply.send(Err(TransportError::InvalidDescription));
                        }
                    }
                }

                TransportCommand::Send { handle, data } => {
                    let Some(&(link_id, side)) = channels.get(&handle.0) else {
                        warn!(handle = %handle, "Send on unknown handle");
                        continue;
                    };

                    let state = inner.lock().await;
                    let peer = state
                        .links
                        .get(&link_id)
                        .filter(|link| link.open)
                        .and_then(|link| link.side(side.other()).cloned());
                    drop(state);

                    match peer {
                        Some(peer) => {
                            let _ = peer
                                .events
                                .send(TransportEvent::Message {
                                    handle: peer.handle,
                                    data,
                                })
                                .await;
                        }
                        None => debug!(handle = %handle, "Dropping frame on unopened channel"),
                    }
                }

                TransportCommand::Close { handle } => {
                    let Some((link_id, _)) = channels.remove(&handle.0) else {
                        continue;
                    };
                    close_link(&inner, link_id).await;
                }
            }
        }

        // Endpoint dropped: every channel it owned goes down with it.
        let links: Vec<u64> = channels.values().map(|(link_id, _)| *link_id).collect();
        for link_id in links {
            close_link(&inner, link_id).await;
        }
        debug!("Memory transport endpoint terminated");
    });

    (cmd_tx, event_rx)
}

async fn close_link(inner: &Arc<Mutex<NetworkState>>, link_id: u64) {
    let mut state = inner.lock().await;
    let link = state.links.remove(&link_id);
    drop(state);

    if let Some(link) = link {
        for side in [link.offer, link.answer].into_iter().flatten() {
            let _ = side
                .events
                .send(TransportEvent::ChannelClosed { handle: side.handle })
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{accept_offer, apply_answer, create_offer, send_frame};

    async fn expect_open(rx: &mut mpsc::Receiver<TransportEvent>) -> TransportHandle {
        match rx.recv().await {
            Some(TransportEvent::ChannelOpen { handle }) => handle,
            other => panic!("expected ChannelOpen, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_offer_answer_opens_both_ends() {
        let network = MemoryNetwork::new();
        let (a_cmd, mut a_events) = spawn_memory_transport(&network);
        let (b_cmd, mut b_events) = spawn_memory_transport(&network);

        let (a_handle, offer) = create_offer(&a_cmd).await.unwrap();
        let (b_handle, answer) = accept_offer(&b_cmd, offer).await.unwrap();
        apply_answer(&a_cmd, a_handle, answer).await.unwrap();

        assert_eq!(expect_open(&mut a_events).await, a_handle);
        assert_eq!(expect_open(&mut b_events).await, b_handle);
    }

    #[tokio::test]
    async fn test_frames_arrive_in_order() {
        let network = MemoryNetwork::new();
        let (a_cmd, mut a_events) = spawn_memory_transport(&network);
        let (b_cmd, mut b_events) = spawn_memory_transport(&network);

        let (a_handle, offer) = create_offer(&a_cmd).await.unwrap();
        let (b_handle, answer) = accept_offer(&b_cmd, offer).await.unwrap();
        apply_answer(&a_cmd, a_handle, answer).await.unwrap();
        expect_open(&mut a_events).await;
        expect_open(&mut b_events).await;

        for i in 0..5u8 {
            send_frame(&a_cmd, a_handle, vec![i]).await.unwrap();
        }

        for i in 0..5u8 {
            match b_events.recv().await {
                Some(TransportEvent::Message { handle, data }) => {
                    assert_eq!(handle, b_handle);
                    assert_eq!(data, vec![i]);
                }
                other => panic!("expected Message, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_bogus_offer_rejected() {
        let network = MemoryNetwork::new();
        let (b_cmd, _b_events) = spawn_memory_transport(&network);

        let result = accept_offer(&b_cmd, "garbage".to_string()).await;
        assert!(matches!(result, Err(TransportError::InvalidDescription)));
    }

    #[tokio::test]
    async fn test_close_notifies_peer() {
        let network = MemoryNetwork::new();
        let (a_cmd, mut a_events) = spawn_memory_transport(&network);
        let (b_cmd, mut b_events) = spawn_memory_transport(&network);

        let (a_handle, offer) = create_offer(&a_cmd).await.unwrap();
        let (b_handle, answer) = accept_offer(&b_cmd, offer).await.unwrap();
        apply_answer(&a_cmd, a_handle, answer).await.unwrap();
        expect_open(&mut a_events).await;
        expect_open(&mut b_events).await;

        a_cmd
            .send(TransportCommand::Close { handle: a_handle })
            .await
            .unwrap();

        match b_events.recv().await {
            Some(TransportEvent::ChannelClosed { handle }) => assert_eq!(handle, b_handle),
            other => panic!("expected ChannelClosed, got {other:?}"),
        }
    }
}
