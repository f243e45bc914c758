use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use model::{Clock, Rational, VideoRef};
use protocol::{ClientId, ClientMessage, ServerMessage};

use crate::document::DocumentStore;
use crate::playlist::Playlist;

/// Cadence of the periodic timeline tick.
pub const TICK_INTERVAL_MS: i64 = 1_000;

/// One outgoing message addressed to one client.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub to: ClientId,
    pub message: ServerMessage,
}

/// Single-writer dispatcher owning all canonical state.
///
/// Handlers run to completion and return the deliveries to send; broadcasts
/// are fire-and-forget with no backpressure. Membership sets double as the
/// topic groups: every connected client is in the playback group, document
/// groups are joined explicitly.
#[derive(Debug)]
pub struct Engine<C> {
    clock: C,
    playlist: Playlist,
    documents: DocumentStore,
    clients: BTreeSet<ClientId>,
    admins: BTreeSet<ClientId>,
    doc_members: BTreeMap<String, BTreeSet<ClientId>>,
}

impl<C: Clock> Engine<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            playlist: Playlist::default(),
            documents: DocumentStore::new(),
            clients: BTreeSet::new(),
            admins: BTreeSet::new(),
            doc_members: BTreeMap::new(),
        }
    }

    pub fn client_connected(&mut self, client: ClientId) {
        self.clients.insert(client);
    }

    pub fn client_disconnected(&mut self, client: ClientId) {
        self.clients.remove(&client);
        self.admins.remove(&client);
        for members in self.doc_members.values_mut() {
            members.remove(&client);
        }
    }

    /// Marks a connection as privileged. The flag is a soft admin gate: it
    /// is asserted out-of-band by the session layer and carries no
    /// cryptographic backing.
    pub fn grant_admin(&mut self, client: ClientId) {
        self.admins.insert(client);
    }

    /// Handles one inbound message and returns the deliveries to send.
    pub fn handle_message(&mut self, from: ClientId, message: ClientMessage) -> Vec<Delivery> {
        match message {
            ClientMessage::ReportOrder { order } => {
                let order = parse_refs(order);
                let now = self.clock.now_ms();
                if self.playlist.bootstrap(order, now) {
                    self.broadcast_playback()
                } else {
                    Vec::new()
                }
            }
            ClientMessage::ReportDuration { video, seconds } => {
                if let Some(video) = parse_ref(&video) {
                    self.playlist.cache_duration(video, seconds);
                }
                Vec::new()
            }
            // An ended report is a safety net, honored without confirming
            // duration or position; a false report costs one idle advance.
            ClientMessage::Ended { video: _ } => {
                let now = self.clock.now_ms();
                if self.playlist.advance(now) {
                    self.broadcast_playback()
                } else {
                    Vec::new()
                }
            }
            ClientMessage::RequestState {} => match self.playlist.snapshot() {
                Some(state) => vec![Delivery {
                    to: from,
                    message: ServerMessage::PlaybackState(state),
                }],
                None => Vec::new(),
            },
            ClientMessage::SetVideo { video } => self.privileged(from, |engine| {
                let now = engine.clock.now_ms();
                match parse_ref(&video) {
                    Some(video) if engine.playlist.force_video(video.clone(), now) => {
                        engine.broadcast_playback()
                    }
                    _ => Vec::new(),
                }
            }),
            ClientMessage::Skip {} => self.privileged(from, |engine| {
                let now = engine.clock.now_ms();
                if engine.playlist.advance(now) {
                    engine.broadcast_playback()
                } else {
                    Vec::new()
                }
            }),
            ClientMessage::Enqueue { refs } => self.privileged(from, |engine| {
                engine.playlist.enqueue(parse_refs(refs));
                Vec::new()
            }),
            ClientMessage::ClearQueue {} => self.privileged(from, |engine| {
                engine.playlist.clear_queue();
                Vec::new()
            }),
            ClientMessage::SetPaused { paused } => self.privileged(from, |engine| {
                let now = engine.clock.now_ms();
                engine.playlist.set_paused(paused, now);
                engine.broadcast_playback()
            }),
            ClientMessage::SetRate { rate } => self.privileged(from, |engine| {
                // Rational fields come straight off the wire; re-validate.
                let Ok(rate) = Rational::new(rate.num, rate.den) else {
                    debug!(num = rate.num, den = rate.den, "rate dropped");
                    return Vec::new();
                };
                let now = engine.clock.now_ms();
                engine.playlist.set_rate(rate, now);
                engine.broadcast_playback()
            }),
            ClientMessage::DocJoin { document_id } => {
                self.doc_members
                    .entry(document_id.clone())
                    .or_default()
                    .insert(from);
                let doc = self.documents.get_or_create(&document_id);
                vec![Delivery {
                    to: from,
                    message: ServerMessage::DocSnapshot {
                        revision: doc.revision,
                        document: doc.clone(),
                    },
                }]
            }
            ClientMessage::DocLeave { document_id } => {
                if let Some(members) = self.doc_members.get_mut(&document_id) {
                    members.remove(&from);
                }
                Vec::new()
            }
            ClientMessage::DocApplyOps {
                document_id,
                client_revision,
                operations,
            } => {
                let Some(outcome) =
                    self.documents
                        .apply_ops(&document_id, client_revision, &operations)
                else {
                    return Vec::new();
                };

                // The delta goes to the whole group, the sender included,
                // so even a stale sender converges on the applied result.
                let mut recipients = self.doc_recipients(&document_id);
                recipients.insert(from);

                let mut deliveries: Vec<Delivery> = recipients
                    .iter()
                    .map(|client| Delivery {
                        to: *client,
                        message: ServerMessage::DocDelta {
                            document_id: document_id.clone(),
                            operations: outcome.operations.clone(),
                            revision: outcome.revision,
                        },
                    })
                    .collect();

                if outcome.structural
                    && let Some(doc) = self.documents.get(&document_id)
                {
                    let doc = doc.clone();
                    deliveries.extend(recipients.iter().map(|client| Delivery {
                        to: *client,
                        message: ServerMessage::DocSnapshot {
                            document: doc.clone(),
                            revision: outcome.revision,
                        },
                    }));
                }

                deliveries
            }
            ClientMessage::DocCursor {
                document_id,
                cursor,
            } => {
                let members = self.doc_recipients(&document_id);
                if !members.contains(&from) {
                    debug!(client = from.0, document = %document_id, "cursor from non-member dropped");
                    return Vec::new();
                }
                members
                    .into_iter()
                    .filter(|client| *client != from)
                    .map(|client| Delivery {
                        to: client,
                        message: ServerMessage::DocCursor {
                            document_id: document_id.clone(),
                            client: from,
                            cursor,
                        },
                    })
                    .collect()
            }
        }
    }

    /// Periodic 1 Hz tick: evaluates the timeline and rebroadcasts the
    /// computed state whether or not anything changed, so followers converge
    /// even without an edge-triggered event.
    pub fn tick(&mut self) -> Vec<Delivery> {
        let now = self.clock.now_ms();
        self.playlist.tick(now);
        self.broadcast_playback()
    }

    fn privileged<F>(&mut self, from: ClientId, handler: F) -> Vec<Delivery>
    where
        F: FnOnce(&mut Self) -> Vec<Delivery>,
    {
        if !self.admins.contains(&from) {
            warn!(client = from.0, "privileged message ignored");
            return Vec::new();
        }
        handler(self)
    }

    fn broadcast_playback(&self) -> Vec<Delivery> {
        let Some(state) = self.playlist.snapshot() else {
            return Vec::new();
        };
        self.clients
            .iter()
            .map(|client| Delivery {
                to: *client,
                message: ServerMessage::PlaybackState(state.clone()),
            })
            .collect()
    }

    fn doc_recipients(&self, document_id: &str) -> BTreeSet<ClientId> {
        self.doc_members
            .get(document_id)
            .cloned()
            .unwrap_or_default()
    }
}

fn parse_ref(raw: &str) -> Option<VideoRef> {
    match VideoRef::parse(raw) {
        Ok(video) => Some(video),
        Err(error) => {
            debug!(%error, "video ref dropped");
            None
        }
    }
}

fn parse_refs(raw: Vec<String>) -> Vec<VideoRef> {
    raw.iter().filter_map(|raw| parse_ref(raw)).collect()
}
