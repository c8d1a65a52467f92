//! The transport actor.
//!
//! One task owns everything that must never be touched from two places: the
//! link, the reassembly buffer, the secure session (and with it both nonce
//! counters), the correlator's one-shot waiters and the persistent
//! subscriber map. The public client handle only ever talks to this task
//! over a channel, so there is exactly one inbound processing path and one
//! outbound send path by construction.
//!
//! Inbound pipeline per notification: reassemble, decrypt when the terminal
//! frame was an encrypted one, feed the handshake machine until it reports
//! authenticated, then dispatch - first to at most one live one-shot waiter
//! for the message's item code (FIFO), then to every persistent subscriber,
//! decoding the typed event at most once per message.

use std::collections::{HashMap, VecDeque};

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use sesame_core::LinkError;
use sesame_core::handshake::{Handshake, HandshakeAction, HandshakeState};
use sesame_core::link::GattLink;
use sesame_crypto::SecureSession;
use sesame_proto::event::{self, Event, EventMeta, MechSettings, MechStatus};
use sesame_proto::frame::{Reassembler, fragment};
use sesame_proto::item_code::ItemCode;

use crate::error::Error;

/// A correlated response: the raw decrypted message plus dispatch metadata.
pub(crate) type Response = (Bytes, EventMeta);

/// Requests from the client handle to the actor.
pub(crate) enum Request {
    /// Connect the link and run the handshake; replied to once
    /// authenticated.
    Connect { reply: oneshot::Sender<Result<(), Error>> },
    /// Tear the link down and reset all session state.
    Disconnect { reply: oneshot::Sender<Result<(), Error>> },
    /// Send a command and correlate the next inbound message carrying
    /// `expect`.
    Command {
        item_code: u8,
        payload: Vec<u8>,
        encrypted: bool,
        expect: u8,
        reply: oneshot::Sender<Result<Response, Error>>,
    },
    /// Fire-and-forget send, for protocol extension and debugging.
    SendRaw {
        item_code: u8,
        payload: Vec<u8>,
        encrypted: bool,
        reply: oneshot::Sender<Result<(), Error>>,
    },
    /// Abandon an in-flight handshake after a caller-side timeout.
    AbortHandshake,
    /// Register a persistent subscriber for one item code.
    Subscribe {
        code: ItemCode,
        sender: mpsc::Sender<(Event, EventMeta)>,
        reply: oneshot::Sender<u64>,
    },
    /// Drop a persistent subscriber.
    Unsubscribe { code: ItemCode, id: u64 },
    /// Latest cached mech status push.
    MechStatus { reply: oneshot::Sender<Option<MechStatus>> },
    /// Latest cached mech settings push.
    MechSettings { reply: oneshot::Sender<Option<MechSettings>> },
}

struct Subscriber {
    id: u64,
    sender: mpsc::Sender<(Event, EventMeta)>,
}

/// The actor. Constructed by the client handle, consumed by [`run`].
///
/// [`run`]: Transport::run
pub(crate) struct Transport<L> {
    link: L,
    requests: mpsc::Receiver<Request>,
    secret: [u8; 16],
    handshake: Handshake,
    session: Option<SecureSession>,
    reassembler: Reassembler,
    waiters: HashMap<u8, VecDeque<oneshot::Sender<Result<Response, Error>>>>,
    subscribers: HashMap<ItemCode, Vec<Subscriber>>,
    next_subscriber_id: u64,
    connect_reply: Option<oneshot::Sender<Result<(), Error>>>,
    mech_status: Option<MechStatus>,
    mech_settings: Option<MechSettings>,
}

impl<L: GattLink> Transport<L> {
    pub(crate) fn new(link: L, secret: [u8; 16], requests: mpsc::Receiver<Request>) -> Self {
        Self {
            link,
            requests,
            secret,
            handshake: Handshake::new(secret),
            session: None,
            reassembler: Reassembler::new(),
            waiters: HashMap::new(),
            subscribers: HashMap::new(),
            next_subscriber_id: 0,
            connect_reply: None,
            mech_status: None,
            mech_settings: None,
        }
    }

    /// Actor main loop. Exits when every client handle is dropped or the
    /// link closes for good.
    pub(crate) async fn run(mut self) {
        loop {
            tokio::select! {
                request = self.requests.recv() => match request {
                    Some(request) => self.handle_request(request).await,
                    None => {
                        debug!("all client handles dropped, stopping transport");
                        let _ = self.link.disconnect().await;
                        return;
                    },
                },
                notification = self.link.next_notification() => match notification {
                    Some(frame) => self.on_frame(&frame).await,
                    None => {
                        info!("link closed");
                        self.fail_all(&Error::Link(LinkError::Disconnected));
                        return;
                    },
                },
            }
        }
    }

    async fn handle_request(&mut self, request: Request) {
        match request {
            Request::Connect { reply } => self.handle_connect(reply).await,
            Request::Disconnect { reply } => {
                self.reset_session_state();
                let _ = reply.send(self.link.disconnect().await.map_err(Error::Link));
            },
            Request::Command { item_code, payload, encrypted, expect, reply } => {
                // Register before transmitting so a fast response cannot
                // slip past the correlator.
                self.waiters.entry(expect).or_default().push_back(reply);
                if let Err(send_error) = self.send_message(item_code, &payload, encrypted).await {
                    if let Some(reply) =
                        self.waiters.get_mut(&expect).and_then(VecDeque::pop_back)
                    {
                        let _ = reply.send(Err(send_error));
                    }
                }
            },
            Request::SendRaw { item_code, payload, encrypted, reply } => {
                let _ = reply.send(self.send_message(item_code, &payload, encrypted).await);
            },
            Request::AbortHandshake => {
                // The caller already reported failure; a late challenge or
                // login ack must not establish a session behind its back,
                // even if the handshake raced to completion.
                debug!("abandoning timed-out handshake");
                self.handshake.fail();
                self.session = None;
                self.connect_reply = None;
            },
            Request::Subscribe { code, sender, reply } => {
                self.next_subscriber_id += 1;
                let id = self.next_subscriber_id;
                self.subscribers.entry(code).or_default().push(Subscriber { id, sender });
                let _ = reply.send(id);
            },
            Request::Unsubscribe { code, id } => {
                if let Some(subscribers) = self.subscribers.get_mut(&code) {
                    subscribers.retain(|subscriber| subscriber.id != id);
                }
            },
            Request::MechStatus { reply } => {
                let _ = reply.send(self.mech_status);
            },
            Request::MechSettings { reply } => {
                let _ = reply.send(self.mech_settings);
            },
        }
    }

    async fn handle_connect(&mut self, reply: oneshot::Sender<Result<(), Error>>) {
        // A previous handshake may have timed out or failed partway; a new
        // connect always starts from a clean slate.
        if self.handshake.state() != HandshakeState::Disconnected {
            self.reset_session_state();
        }
        if let Err(link_error) = self.link.connect().await {
            let _ = reply.send(Err(Error::Link(link_error)));
            return;
        }
        if let Err(handshake_error) = self.handshake.link_ready() {
            let _ = reply.send(Err(Error::Handshake(handshake_error)));
            return;
        }
        info!("link connected, awaiting challenge");
        // Resolved from the inbound path once the login ack arrives.
        self.connect_reply = Some(reply);
    }

    /// Outbound send path: envelope, encrypt when the session demands it,
    /// fragment, write each frame in order.
    async fn send_message(
        &mut self,
        item_code: u8,
        payload: &[u8],
        encrypted: bool,
    ) -> Result<(), Error> {
        let mut message = Vec::with_capacity(1 + payload.len());
        message.push(item_code);
        message.extend_from_slice(payload);

        let data = if encrypted {
            let session = self.session.as_mut().ok_or(Error::SessionNotReady)?;
            session.encrypt(&message)?
        } else {
            message
        };

        debug!(item_code, len = data.len(), encrypted, "sending message");
        for frame in fragment(&data, encrypted) {
            self.link.write(&frame).await?;
        }
        Ok(())
    }

    /// Inbound processing path, one notification at a time and in arrival
    /// order.
    async fn on_frame(&mut self, frame: &[u8]) {
        let Some((message, was_encrypted)) = self.reassembler.push(frame) else {
            return;
        };

        let message = if was_encrypted {
            let Some(session) = self.session.as_mut() else {
                warn!("encrypted message before session establishment, dropping");
                return;
            };
            match session.decrypt(&message) {
                Ok(plaintext) => Bytes::from(plaintext),
                Err(decrypt_error) => {
                    error!(%decrypt_error, "inbound message failed authentication");
                    // No way to tell which command the lost message answered,
                    // and the counters may now be desynchronized: fail every
                    // outstanding waiter rather than let them all time out.
                    self.fail_all(&Error::Authentication);
                    return;
                },
            }
        } else if self.session.is_some() {
            // The device never sends plaintext after login; mirrors the
            // device-side behavior of ignoring it.
            debug!("dropping plaintext message after session establishment");
            return;
        } else {
            message
        };

        if message.len() < 2 {
            warn!(len = message.len(), "dropping message shorter than its envelope");
            return;
        }

        if !self.handshake.is_authenticated() {
            self.drive_handshake(&message).await;
        }
        self.dispatch(&message, EventMeta { was_encrypted });
    }

    async fn drive_handshake(&mut self, message: &[u8]) {
        let actions = match self.handshake.on_message(message) {
            Ok(actions) => actions,
            Err(handshake_error) => {
                error!(%handshake_error, "handshake failed");
                if let Some(reply) = self.connect_reply.take() {
                    let _ = reply.send(Err(Error::Handshake(handshake_error)));
                }
                return;
            },
        };

        for action in actions {
            match action {
                HandshakeAction::InstallSession { key, challenge } => {
                    self.session = Some(SecureSession::new(&key, challenge));
                },
                HandshakeAction::SendLogin { proof } => {
                    // The proof goes out unencrypted: the session is not
                    // mutually confirmed yet.
                    if let Err(send_error) =
                        self.send_message(ItemCode::Login.as_u8(), &proof, false).await
                    {
                        error!(%send_error, "failed to send login proof");
                        self.handshake.fail();
                        if let Some(reply) = self.connect_reply.take() {
                            let _ = reply.send(Err(send_error));
                        }
                        return;
                    }
                },
            }
        }

        if self.handshake.is_authenticated() {
            if let Some(reply) = self.connect_reply.take() {
                let _ = reply.send(Ok(()));
            }
        }
    }

    /// Fan a completed message out: one live one-shot waiter, then all
    /// persistent subscribers for its code.
    fn dispatch(&mut self, message: &Bytes, meta: EventMeta) {
        let code_byte = message[1];

        if let Some(queue) = self.waiters.get_mut(&code_byte) {
            // Exactly one waiter fires per message; timed-out waiters whose
            // receiver is gone are skipped instead of eating the response.
            while let Some(waiter) = queue.pop_front() {
                if waiter.send(Ok((message.clone(), meta))).is_ok() {
                    break;
                }
            }
        }

        let Some(code) = ItemCode::from_u8(code_byte) else {
            debug!(code = code_byte, len = message.len(), "message with unknown item code");
            return;
        };

        let has_subscribers =
            self.subscribers.get(&code).is_some_and(|subscribers| !subscribers.is_empty());
        let caches = matches!(code, ItemCode::MechStatus | ItemCode::MechSettings);
        if !has_subscribers && !caches {
            return;
        }

        // Decoded at most once per message, shared by cache and subscribers.
        let decoded = match event::decode(message) {
            Ok(decoded) => decoded,
            Err(decode_error) => {
                warn!(%decode_error, ?code, "failed to decode inbound message");
                return;
            },
        };

        match &decoded {
            Event::MechStatus(status) => self.mech_status = Some(*status),
            Event::MechSettings(settings) => self.mech_settings = Some(*settings),
            _ => {},
        }

        if let Some(subscribers) = self.subscribers.get_mut(&code) {
            subscribers.retain(|subscriber| {
                match subscriber.sender.try_send((decoded.clone(), meta)) {
                    Ok(()) => true,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        // Slow subscribers lose events rather than stall the
                        // inbound pipeline.
                        warn!(subscriber = subscriber.id, ?code, "subscriber full, dropping event");
                        true
                    },
                    Err(mpsc::error::TrySendError::Closed(_)) => false,
                }
            });
        }
    }

    /// Fail every outstanding one-shot waiter and any pending connect.
    fn fail_all(&mut self, error: &Error) {
        for queue in self.waiters.values_mut() {
            for waiter in queue.drain(..) {
                let _ = waiter.send(Err(error.clone()));
            }
        }
        if let Some(reply) = self.connect_reply.take() {
            let _ = reply.send(Err(error.clone()));
        }
    }

    /// Forget everything session-related; a reconnect redoes the full
    /// handshake.
    fn reset_session_state(&mut self) {
        self.fail_all(&Error::Link(LinkError::Disconnected));
        self.handshake = Handshake::new(self.secret);
        self.session = None;
        self.reassembler = Reassembler::new();
    }
}
