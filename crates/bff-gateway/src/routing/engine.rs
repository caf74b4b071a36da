//! # Mesh Routing Engine
//!
//! Collects connectivity reports and periodically pushes every attached
//! session its personal routing table.
//!
//! ```text
//! updatePeerStatus(room, connectedTo) ──► MeshStore ──(every interval)──► compute per room
//!                                                                              │ merge
//!                                                                              ▼
//!                                          session routing channel ◄── push (empty tables too)
//! ```
//!
//! The timer starts on the first report and is never restarted.

use crate::domain::address::PeerAddress;
use crate::domain::config::RoutingConfig;
use crate::domain::error::{GatewayError, GatewayResult};
use crate::domain::types::{RelayPeers, RoutingTableMessage, UpdatePeerStatusRequest};
use crate::routing::algorithm::{compute_routing_tables, merge_tables, RoutingTable};
use crate::routing::mesh::MeshStore;
use crate::rpc::services::RoutingService;
use crate::session::registry::SessionRegistry;
use crate::session::state::Session;
use bff_telemetry::{time_histogram, ROUTING_RECOMPUTATIONS, ROUTING_RECOMPUTE_DURATION};
use futures::stream::BoxStream;
use parking_lot::Mutex;
use shared_bus::PushOutcome;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Shared routing state of the process.
pub struct MeshRoutingEngine {
    config: RoutingConfig,
    registry: SessionRegistry,
    mesh: MeshStore,
    timer_started: AtomicBool,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl MeshRoutingEngine {
    pub fn new(config: RoutingConfig, registry: SessionRegistry) -> Self {
        Self {
            config,
            registry,
            mesh: MeshStore::new(),
            timer_started: AtomicBool::new(false),
            timer: Mutex::new(None),
        }
    }

    /// Connectivity reports.
    #[must_use]
    pub fn mesh(&self) -> &MeshStore {
        &self.mesh
    }

    /// Whether the periodic recomputation has been started.
    #[must_use]
    pub fn is_timer_started(&self) -> bool {
        self.timer_started.load(Ordering::SeqCst)
    }

    /// Replace `peer`'s adjacency in `room` and make sure the timer runs.
    ///
    /// Every `connected_to` entry must be a valid address; otherwise nothing
    /// is recorded.
    pub fn update_peer_status(
        self: &Arc<Self>,
        peer: &PeerAddress,
        request: UpdatePeerStatusRequest,
    ) -> GatewayResult<()> {
        if request.room.is_empty() {
            return Err(GatewayError::InvalidRequest("room cannot be empty".into()));
        }
        let connected_to = request
            .connected_to
            .iter()
            .map(|raw| PeerAddress::parse(raw))
            .collect::<GatewayResult<BTreeSet<_>>>()?;

        debug!(
            peer = %peer,
            room = %request.room,
            neighbours = connected_to.len(),
            "Peer status updated"
        );
        self.mesh.update(&request.room, peer.clone(), connected_to);
        self.ensure_timer();
        Ok(())
    }

    /// Stream of tables pushed to `session`.
    ///
    /// The channel is created once per session; a stream opened after an
    /// earlier one was cancelled ends immediately.
    pub fn routing_table_stream(&self, session: &Session) -> BoxStream<'static, RoutingTableMessage> {
        session
            .attach_routing_channel(self.config.channel_buffer)
            .into_stream()
    }

    /// Drop a departed peer's reports.
    pub fn forget_peer(&self, peer: &PeerAddress) {
        let rooms = self.mesh.forget_peer(peer);
        if rooms > 0 {
            debug!(peer = %peer, rooms, "Removed peer from routing mesh");
        }
    }

    /// Compute all tables and push one to every session with a routing
    /// channel. Returns the number of tables queued.
    pub fn recompute(&self) -> usize {
        let _timer = time_histogram!(ROUTING_RECOMPUTE_DURATION);
        ROUTING_RECOMPUTATIONS.inc();

        let snapshot = self.mesh.snapshot();
        let rooms = snapshot.len();
        let mut merged: HashMap<PeerAddress, RoutingTable<PeerAddress>> = HashMap::new();
        for mesh in snapshot.values() {
            for (peer, table) in compute_routing_tables(mesh) {
                merge_tables(merged.entry(peer).or_default(), table);
            }
        }

        let mut pushed = 0;
        for session in self.registry.sessions() {
            let Some(channel) = session.routing_channel() else {
                continue;
            };
            let table = merged.remove(session.address()).unwrap_or_default();
            match channel.push(to_message(table)) {
                PushOutcome::Delivered => pushed += 1,
                PushOutcome::Dropped => {
                    warn!(peer = %session.address(), "Routing channel full, table dropped");
                }
                PushOutcome::Closed => {}
            }
        }

        debug!(rooms, pushed, "Routing tables recomputed");
        pushed
    }

    fn ensure_timer(self: &Arc<Self>) {
        if self.timer_started.swap(true, Ordering::SeqCst) {
            return;
        }

        let period = self.config.recompute_interval;
        let engine: Weak<Self> = Arc::downgrade(self);
        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(engine) = engine.upgrade() else {
                    break;
                };
                engine.recompute();
            }
        });
        *self.timer.lock() = Some(task);
        info!(interval = ?period, "Routing recomputation timer started");
    }
}

impl Drop for MeshRoutingEngine {
    fn drop(&mut self) {
        if let Some(task) = self.timer.lock().take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for MeshRoutingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeshRoutingEngine")
            .field("rooms", &self.mesh.room_count())
            .field("timer_started", &self.is_timer_started())
            .finish()
    }
}

fn to_message(table: RoutingTable<PeerAddress>) -> RoutingTableMessage {
    RoutingTableMessage {
        table: table
            .into_iter()
            .map(|(destination, relays)| {
                (
                    destination.into(),
                    RelayPeers {
                        peers: relays.into_iter().map(Into::into).collect(),
                    },
                )
            })
            .collect(),
    }
}

/// Routing service of one session.
pub struct SessionRouting {
    engine: Arc<MeshRoutingEngine>,
    session: Arc<Session>,
}

impl SessionRouting {
    pub fn new(engine: Arc<MeshRoutingEngine>, session: Arc<Session>) -> Self {
        Self { engine, session }
    }
}

impl RoutingService for SessionRouting {
    fn update_peer_status(&self, request: UpdatePeerStatusRequest) -> GatewayResult<()> {
        self.engine
            .update_peer_status(self.session.address(), request)
    }

    fn get_routing_table(&self) -> BoxStream<'static, RoutingTableMessage> {
        self.engine.routing_table_stream(&self.session)
    }
}
