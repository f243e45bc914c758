//! Loopback demo: one engine, two local clients, a short scripted session.
//!
//! Messages cross a JSON round-trip on both legs so the run exercises the
//! same wire encoding real connections use.

use std::thread::sleep;
use std::time::Duration;

use client::{Follower, Reconciler, SYNC_INTERVAL_MS};
use model::{Clip, Clock, Operation, Pattern, SystemClock};
use protocol::{ClientId, ClientMessage, ServerMessage};
use server::{Delivery, Engine, TICK_INTERVAL_MS};
use tracing::info;

const HOST: ClientId = ClientId(1);
const GUEST: ClientId = ClientId(2);
const DOC: &str = "listening-room";

struct LocalClient {
    id: ClientId,
    follower: Follower,
    reconciler: Reconciler,
}

impl LocalClient {
    fn new(id: ClientId) -> Self {
        Self {
            id,
            follower: Follower::new(),
            reconciler: Reconciler::new(),
        }
    }

    fn receive(&mut self, message: ServerMessage, now_ms: i64) {
        match message {
            ServerMessage::PlaybackState(state) => self.follower.on_state(state),
            ServerMessage::DocSnapshot { document, revision } => {
                self.reconciler.on_snapshot(document, revision, now_ms);
            }
            ServerMessage::DocDelta {
                operations,
                revision,
                ..
            } => self.reconciler.on_delta(&operations, revision),
            ServerMessage::DocCursor { client, cursor, .. } => {
                info!(client = client.0, ?cursor, "peer cursor");
            }
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let clock = SystemClock;
    let mut engine = Engine::new(SystemClock);
    let mut clients = [LocalClient::new(HOST), LocalClient::new(GUEST)];

    for client in &clients {
        engine.client_connected(client.id);
    }
    engine.grant_admin(HOST);

    // Playback bootstrap: the host reports what its page sees.
    send(
        &mut engine,
        &mut clients,
        &clock,
        HOST,
        ClientMessage::ReportOrder {
            order: vec![
                "dQw4w9WgXcQ".into(),
                "9bZkp7q19f0".into(),
                "kJQP7kiw5Fk".into(),
            ],
        },
    )?;
    send(
        &mut engine,
        &mut clients,
        &clock,
        HOST,
        ClientMessage::ReportDuration {
            video: "dQw4w9WgXcQ".into(),
            seconds: 212.0,
        },
    )?;

    // Both clients open the shared sequencer document.
    for id in [HOST, GUEST] {
        send(
            &mut engine,
            &mut clients,
            &clock,
            id,
            ClientMessage::DocJoin {
                document_id: DOC.into(),
            },
        )?;
    }

    // The host sketches structure while the guest programs the grid.
    let host_ops = clients[0].reconciler.apply_local(
        &[
            Operation::PatternAdd {
                pattern: Pattern {
                    id: "verse".into(),
                    name: "verse".into(),
                    bars: 2,
                    notes: Vec::new(),
                },
            },
            Operation::ClipAdd {
                clip: Clip {
                    id: "intro".into(),
                    track: 0,
                    start_step: 0,
                    length_steps: 32,
                    pattern_id: "verse".into(),
                },
            },
        ],
        clock.now_ms(),
    );
    send_ops(&mut engine, &mut clients, &clock, 0, host_ops)?;

    let guest_ops = clients[1].reconciler.apply_local(
        &[
            Operation::ToggleStep { lane: 0, step: 0 },
            Operation::ToggleStep { lane: 1, step: 4 },
            Operation::SetTempo { tempo: 128.0 },
        ],
        clock.now_ms(),
    );
    send_ops(&mut engine, &mut clients, &clock, 1, guest_ops)?;

    // Run the loops for a moment: followers at 250 ms, the engine at 1 Hz.
    let mut last_engine_tick = clock.now_ms();
    for _ in 0..8 {
        sleep(Duration::from_millis(SYNC_INTERVAL_MS as u64));
        let now = clock.now_ms();

        if now - last_engine_tick >= TICK_INTERVAL_MS {
            last_engine_tick = now;
            let deliveries = engine.tick();
            deliver(&mut clients, deliveries, &clock)?;
        }

        for client in &mut clients {
            for correction in client.follower.sync_tick(now) {
                info!(client = client.id.0, ?correction, "follower correction");
            }
        }
    }

    let host_doc = clients[0].reconciler.document();
    let guest_doc = clients[1].reconciler.document();
    info!(
        converged = host_doc == guest_doc,
        revision = clients[0].reconciler.revision(),
        "session finished"
    );

    Ok(())
}

/// Sends one client message through the JSON loopback and routes the
/// resulting deliveries.
fn send(
    engine: &mut Engine<SystemClock>,
    clients: &mut [LocalClient],
    clock: &SystemClock,
    from: ClientId,
    message: ClientMessage,
) -> Result<(), Box<dyn std::error::Error>> {
    let wire = serde_json::to_string(&message)?;
    let parsed: ClientMessage = serde_json::from_str(&wire)?;
    let deliveries = engine.handle_message(from, parsed);
    deliver(clients, deliveries, clock)
}

fn send_ops(
    engine: &mut Engine<SystemClock>,
    clients: &mut [LocalClient],
    clock: &SystemClock,
    client_index: usize,
    operations: Vec<Operation>,
) -> Result<(), Box<dyn std::error::Error>> {
    let message = ClientMessage::DocApplyOps {
        document_id: DOC.into(),
        client_revision: clients[client_index].reconciler.revision(),
        operations,
    };
    let from = clients[client_index].id;
    send(engine, clients, clock, from, message)
}

fn deliver(
    clients: &mut [LocalClient],
    deliveries: Vec<Delivery>,
    clock: &SystemClock,
) -> Result<(), Box<dyn std::error::Error>> {
    let now = clock.now_ms();
    for delivery in deliveries {
        let wire = serde_json::to_string(&delivery.message)?;
        let parsed: ServerMessage = serde_json::from_str(&wire)?;
        if let Some(client) = clients.iter_mut().find(|client| client.id == delivery.to) {
            client.receive(parsed, now);
        }
    }
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt::try_init();
}
