//! The public client handle.

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use sesame_core::config::ClientConfig;
use sesame_core::link::GattLink;
use sesame_proto::event::{self, Event, EventMeta, HistoryEntry, MechSettings, MechStatus};
use sesame_proto::{Command, ItemCode, ProtoError};

use crate::error::Error;
use crate::transport::{Request, Transport};

/// Requests the handle can queue before `send` pends.
const REQUEST_QUEUE: usize = 32;

/// Events buffered per subscription before the transport starts dropping.
const SUBSCRIPTION_QUEUE: usize = 16;

/// Handle to one Sesame device.
///
/// Cheap to clone; all clones talk to the same transport task, so commands
/// from different clones share one session and one correlator. The transport
/// stops when the last clone is dropped.
#[derive(Debug, Clone)]
pub struct SesameClient {
    requests: mpsc::Sender<Request>,
    config: ClientConfig,
}

impl SesameClient {
    /// Spawn the transport task for `link` with default timeouts.
    ///
    /// `secret` is the device's long-term 16-byte secret from registration.
    /// Must be called from within a tokio runtime.
    pub fn new<L: GattLink>(link: L, secret: [u8; 16]) -> Self {
        Self::with_config(link, secret, ClientConfig::default())
    }

    /// Spawn the transport task with explicit timeouts.
    pub fn with_config<L: GattLink>(link: L, secret: [u8; 16], config: ClientConfig) -> Self {
        let (requests_tx, requests_rx) = mpsc::channel(REQUEST_QUEUE);
        tokio::spawn(Transport::new(link, secret, requests_rx).run());
        Self { requests: requests_tx, config }
    }

    /// Connect the link and run the login handshake to completion.
    ///
    /// Resolves once the device acknowledges the login proof; commands may
    /// be issued concurrently with `connect` but will fail with
    /// [`Error::SessionNotReady`] until it resolves.
    pub async fn connect(&self) -> Result<(), Error> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(Request::Connect { reply: reply_tx }).await?;
        match tokio::time::timeout(self.config.handshake_timeout, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::Closed),
            Err(_) => {
                // Drive the actor's handshake to its failed state so a late
                // challenge cannot establish a session we reported dead.
                let _ = self.send(Request::AbortHandshake).await;
                Err(Error::HandshakeFailed("handshake timed out".to_owned()))
            },
        }
    }

    /// Tear the connection down. The handle stays usable; a later
    /// [`connect`](Self::connect) runs a fresh handshake.
    pub async fn disconnect(&self) -> Result<(), Error> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(Request::Disconnect { reply: reply_tx }).await?;
        reply_rx.await.map_err(|_| Error::Closed)?
    }

    /// Drive the lock to its locked position.
    ///
    /// `operator` is recorded in the device history, truncated to
    /// [`MAX_DISPLAY_NAME`](sesame_proto::MAX_DISPLAY_NAME) bytes on a
    /// character boundary.
    pub async fn lock(&self, operator: &str) -> Result<(), Error> {
        let (message, _) = self.request(Command::Lock { name: operator.to_owned() }).await?;
        match event::decode(&message)? {
            Event::Lock { status: 0 } => Ok(()),
            Event::Lock { status } => Err(Error::CommandFailed { command: "lock", status }),
            _ => Err(unexpected(&message)),
        }
    }

    /// Drive the lock to its unlocked position.
    pub async fn unlock(&self, operator: &str) -> Result<(), Error> {
        let (message, _) = self.request(Command::Unlock { name: operator.to_owned() }).await?;
        match event::decode(&message)? {
            Event::Unlock { status: 0 } => Ok(()),
            Event::Unlock { status } => Err(Error::CommandFailed { command: "unlock", status }),
            _ => Err(unexpected(&message)),
        }
    }

    /// Firmware version string.
    pub async fn get_version(&self) -> Result<String, Error> {
        let (message, _) = self.request(Command::GetVersion).await?;
        match event::decode(&message)? {
            Event::Version(version) => Ok(version),
            _ => Err(unexpected(&message)),
        }
    }

    /// Newest history record, or `None` when the log is empty.
    pub async fn get_history_head(&self) -> Result<Option<HistoryEntry>, Error> {
        let (message, _) = self.request(Command::HistoryHead).await?;
        match event::decode(&message)? {
            Event::History(entry) => Ok(entry),
            _ => Err(unexpected(&message)),
        }
    }

    /// Oldest history record, or `None` when the log is empty.
    pub async fn get_history_tail(&self) -> Result<Option<HistoryEntry>, Error> {
        let (message, _) = self.request(Command::HistoryTail).await?;
        match event::decode(&message)? {
            Event::History(entry) => Ok(entry),
            _ => Err(unexpected(&message)),
        }
    }

    /// Delete one history record by its id.
    pub async fn delete_history(&self, id: u32) -> Result<(), Error> {
        let (message, _) = self.request(Command::DeleteHistory { id }).await?;
        match event::decode(&message)? {
            Event::DeleteHistory { status: 0 } => Ok(()),
            Event::DeleteHistory { status } => Err(Error::HistoryDeleteFailed { status }),
            _ => Err(unexpected(&message)),
        }
    }

    /// Set the autolock delay in seconds; 0 disables autolock.
    pub async fn set_autolock_time(&self, seconds: u16) -> Result<(), Error> {
        let (message, _) = self.request(Command::SetAutolockTime { seconds }).await?;
        match event::decode(&message)? {
            Event::AutolockTimeAck => Ok(()),
            _ => Err(unexpected(&message)),
        }
    }

    /// Set the lock and unlock motor positions.
    pub async fn set_mech_settings(&self, lock: i16, unlock: i16) -> Result<(), Error> {
        let (message, _) = self.request(Command::SetMechSettings { lock, unlock }).await?;
        match event::decode(&message)? {
            Event::MechSettings(settings) => {
                debug!(?settings, "device confirmed mech settings");
                Ok(())
            },
            _ => Err(unexpected(&message)),
        }
    }

    /// Latest mechanical status pushed by the device, if any arrived yet.
    pub async fn mech_status(&self) -> Result<Option<MechStatus>, Error> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(Request::MechStatus { reply: reply_tx }).await?;
        reply_rx.await.map_err(|_| Error::Closed)
    }

    /// Latest mechanical settings pushed by the device, if any arrived yet.
    pub async fn mech_settings(&self) -> Result<Option<MechSettings>, Error> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(Request::MechSettings { reply: reply_tx }).await?;
        reply_rx.await.map_err(|_| Error::Closed)
    }

    /// Send an arbitrary message without awaiting a response.
    ///
    /// Escape hatch for protocol extension and debugging; the typed
    /// commands above are preferred.
    pub async fn send_raw(
        &self,
        item_code: u8,
        payload: Vec<u8>,
        encrypted: bool,
    ) -> Result<(), Error> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(Request::SendRaw { item_code, payload, encrypted, reply: reply_tx }).await?;
        reply_rx.await.map_err(|_| Error::Closed)?
    }

    /// Subscribe to every inbound message carrying `code`.
    ///
    /// Subscriptions are independent of the one-shot command correlation:
    /// a message that answers a pending command is also delivered to every
    /// subscriber for its code. Events are dropped, not queued without
    /// bound, when the subscriber falls too far behind.
    pub async fn subscribe(&self, code: ItemCode) -> Result<Subscription, Error> {
        let (events_tx, events_rx) = mpsc::channel(SUBSCRIPTION_QUEUE);
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(Request::Subscribe { code, sender: events_tx, reply: reply_tx }).await?;
        let id = reply_rx.await.map_err(|_| Error::Closed)?;
        Ok(Subscription { code, id, events: events_rx, requests: self.requests.clone() })
    }

    /// Send a command and await its correlated response, bounded by the
    /// per-command timeout.
    async fn request(&self, command: Command) -> Result<(Bytes, EventMeta), Error> {
        let name = command.name();
        let code = command.item_code().as_u8();
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(Request::Command {
            item_code: code,
            payload: command.encode(),
            encrypted: command.encrypted(),
            expect: code,
            reply: reply_tx,
        })
        .await?;
        match tokio::time::timeout(self.config.command_timeout, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::Closed),
            Err(_) => Err(Error::Timeout { command: name }),
        }
    }

    async fn send(&self, request: Request) -> Result<(), Error> {
        self.requests.send(request).await.map_err(|_| Error::Closed)
    }
}

/// The correlator matches responses by item code, so a response decoding to
/// a different variant means the device broke the protocol.
fn unexpected(message: &[u8]) -> Error {
    Error::Proto(ProtoError::UnknownItemCode(message.get(1).copied().unwrap_or(0)))
}

/// A live subscription to one item code.
///
/// Unsubscribes from the transport when dropped.
#[derive(Debug)]
pub struct Subscription {
    code: ItemCode,
    id: u64,
    events: mpsc::Receiver<(Event, EventMeta)>,
    requests: mpsc::Sender<Request>,
}

impl Subscription {
    /// Item code this subscription follows.
    pub fn code(&self) -> ItemCode {
        self.code
    }

    /// Next event, in arrival order. `None` once the transport is gone.
    pub async fn recv(&mut self) -> Option<(Event, EventMeta)> {
        self.events.recv().await
    }

    /// Explicitly deregister; equivalent to dropping the subscription.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // Best effort: a full queue means the transport is about to notice
        // our closed event channel anyway.
        let _ = self.requests.try_send(Request::Unsubscribe { code: self.code, id: self.id });
    }
}
