//! The transport collaborator contract.
//!
//! Parley does not own a transport substrate. Whatever provides it (WebRTC
//! data channels, QUIC streams, an in-process pair for tests) is driven
//! through typed command and event channels: commands go into the transport
//! task, events come back out. Offer and answer descriptions are opaque
//! strings; once a channel is open it is ordered, reliable, and
//! bidirectional.

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Opaque identifier for one peer channel, allocated by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransportHandle(pub u64);

impl std::fmt::Display for TransportHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Transport unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid session description")]
    InvalidDescription,

    #[error("Unknown transport handle {0}")]
    UnknownHandle(TransportHandle),
}

/// Commands sent *into* the transport task.
#[derive(Debug)]
pub enum TransportCommand {
    /// Open an offer and gather every negotiation candidate into one
    /// self-contained description. The reply arrives only once gathering is
    /// complete.
    CreateOffer {
        reply: oneshot::Sender<Result<(TransportHandle, String), TransportError>>,
    },
    /// Open an answer against a remote offer description, again replying
    /// with a complete, portable description.
    AcceptOffer {
        sdp: String,
        reply: oneshot::Sender<Result<(TransportHandle, String), TransportError>>,
    },
    /// Apply a remote answer to a previously created offer.
    ApplyAnswer {
        handle: TransportHandle,
        sdp: String,
        reply: oneshot::Sender<Result<(), TransportError>>,
    },
    /// Send one frame on an open channel.
    Send {
        handle: TransportHandle,
        data: Vec<u8>,
    },
    /// Tear down a channel.
    Close { handle: TransportHandle },
}

/// Events sent *from* the transport task to the application.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The channel behind `handle` is open and usable.
    ChannelOpen { handle: TransportHandle },
    /// The channel closed, for any reason.
    ChannelClosed { handle: TransportHandle },
    /// A frame arrived. Arrival order per channel is preserved.
    Message {
        handle: TransportHandle,
        data: Vec<u8>,
    },
}

/// Request an offer description, suspending until candidate gathering is
/// complete.
pub async fn create_offer(
    cmd_tx: &mpsc::Sender<TransportCommand>,
) -> Result<(TransportHandle, String), TransportError> {
    let (reply, rx) = oneshot::channel();
    cmd_tx
        .send(TransportCommand::CreateOffer { reply })
        .await
        .map_err(|_| TransportError::Unavailable("transport task gone".into()))?;
    rx.await
        .map_err(|_| TransportError::Unavailable("transport dropped reply".into()))?
}

/// Answer a remote offer, suspending until candidate gathering is complete.
pub async fn accept_offer(
    cmd_tx: &mpsc::Sender<TransportCommand>,
    sdp: String,
) -> Result<(TransportHandle, String), TransportError> {
    let (reply, rx) = oneshot::channel();
    cmd_tx
        .send(TransportCommand::AcceptOffer { sdp, reply })
        .await
        .map_err(|_| TransportError::Unavailable("transport task gone".into()))?;
    rx.await
        .map_err(|_| TransportError::Unavailable("transport dropped reply".into()))?
}

/// Apply a remote answer to the offer behind `handle`.
pub async fn apply_answer(
    cmd_tx: &mpsc::Sender<TransportCommand>,
    handle: TransportHandle,
    sdp: String,
) -> Result<(), TransportError> {
    let (reply, rx) = oneshot::channel();
    cmd_tx
        .send(TransportCommand::ApplyAnswer { handle, sdp, reply })
        .await
        .map_err(|_| TransportError::Unavailable("transport task gone".into()))?;
    rx.await
        .map_err(|_| TransportError::Unavailable("transport dropped reply".into()))?
}

/// Fire-and-forget frame send.
pub async fn send_frame(
    cmd_tx: &mpsc::Sender<TransportCommand>,
    handle: TransportHandle,
    data: Vec<u8>,
) -> Result<(), TransportError> {
    cmd_tx
        .send(TransportCommand::Send { handle, data })
        .await
        .map_err(|_| TransportError::Unavailable("transport task gone".into()))
}
