//! TCP server hosting planning-poker rooms
//!
//! Each connection binds to one `(room, participant)` pair through `join`.
//! Every applied room change is pushed as a full snapshot to all
//! connections subscribed to that room.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use pokerroom_core::{
    Error as CoreError, LeaveOutcome, Outcome, Participant, ParticipantId, Room, RoomConfig,
    RoomId, RoomObserver, RoomRegistry,
};
use tokio::io::{ReadHalf, WriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::frame::{read_frame, write_frame};
use crate::protocol::{ClientMessage, ServerMessage, ROOM_NOT_FOUND};

/// Default cap on simultaneous connections
pub const DEFAULT_MAX_CONNECTIONS: usize = 256;

/// Outbound queue depth per connection
const OUTBOUND_QUEUE: usize = 64;

/// How long a closing connection may take to flush its queue
const FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

type ConnId = u64;

/// Listener settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: IpAddr,
    pub port: u16,
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: crate::DEFAULT_PORT,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

/// Per-room subscriber sets. Receives registry notifications and fans the
/// snapshot out to every subscribed connection without blocking.
#[derive(Default)]
pub struct Broadcaster {
    rooms: Mutex<HashMap<RoomId, HashMap<ConnId, mpsc::Sender<ServerMessage>>>>,
}

impl Broadcaster {
    fn subscribe(&self, room_id: &RoomId, conn_id: ConnId, tx: mpsc::Sender<ServerMessage>) {
        self.rooms
            .lock()
            .entry(room_id.clone())
            .or_default()
            .insert(conn_id, tx);
    }

    fn unsubscribe(&self, room_id: &RoomId, conn_id: ConnId) {
        let mut rooms = self.rooms.lock();
        if let Some(subscribers) = rooms.get_mut(room_id) {
            subscribers.remove(&conn_id);
            if subscribers.is_empty() {
                rooms.remove(room_id);
            }
        }
    }

    /// Number of connections receiving updates for a room
    pub fn subscriber_count(&self, room_id: &RoomId) -> usize {
        self.rooms.lock().get(room_id).map_or(0, HashMap::len)
    }
}

impl RoomObserver for Broadcaster {
    fn room_changed(&self, room: &Room) {
        let rooms = self.rooms.lock();
        let Some(subscribers) = rooms.get(&room.id) else {
            return;
        };
        for (conn_id, tx) in subscribers {
            let msg = ServerMessage::room_state(room.clone());
            if let Err(e) = tx.try_send(msg) {
                debug!(conn_id, room_id = %room.id, error = %e, "Failed to queue snapshot");
            }
        }
    }

    fn room_destroyed(&self, room_id: &RoomId) {
        self.rooms.lock().remove(room_id);
    }
}

/// State shared by all connection tasks
struct Shared {
    registry: Arc<RoomRegistry>,
    broadcaster: Arc<Broadcaster>,
    /// Which connection currently speaks for a participant
    bindings: Mutex<HashMap<(RoomId, ParticipantId), ConnId>>,
    next_conn_id: AtomicU64,
}

/// Running server handle
pub struct Server {
    addr: SocketAddr,
    shared: Arc<Shared>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Server {
    /// Bind and start accepting connections
    pub async fn start(config: ServerConfig) -> Result<Self> {
        let listener = TcpListener::bind(SocketAddr::new(config.bind, config.port)).await?;
        let bound_addr = listener.local_addr()?;

        let broadcaster = Arc::new(Broadcaster::default());
        let registry = Arc::new(RoomRegistry::with_observer(broadcaster.clone()));
        let shared = Arc::new(Shared {
            registry,
            broadcaster,
            bindings: Mutex::new(HashMap::new()),
            next_conn_id: AtomicU64::new(1),
        });

        let (shutdown_tx, _) = broadcast::channel(1);
        let permits = Arc::new(Semaphore::new(config.max_connections));

        tokio::spawn(accept_loop(
            listener,
            shared.clone(),
            permits,
            shutdown_tx.clone(),
            shutdown_tx.subscribe(),
        ));

        info!(addr = %bound_addr, max_connections = config.max_connections, "Server started");

        Ok(Server {
            addr: bound_addr,
            shared,
            shutdown_tx,
        })
    }

    /// Get the server's bound address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The room registry served by this server
    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.shared.registry
    }

    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.shared.broadcaster
    }

    /// Notify every connection and stop accepting
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
        info!("Server shutdown initiated");
    }
}

/// Accept incoming connections
async fn accept_loop(
    listener: TcpListener,
    shared: Arc<Shared>,
    permits: Arc<Semaphore>,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => match permits.clone().try_acquire_owned() {
                        Ok(permit) => {
                            let conn_id = shared.next_conn_id.fetch_add(1, Ordering::Relaxed);
                            debug!(conn_id, addr = %addr, "New connection");
                            tokio::spawn(handle_connection(
                                stream,
                                conn_id,
                                shared.clone(),
                                shutdown_tx.subscribe(),
                                permit,
                            ));
                        }
                        Err(_) => {
                            warn!(addr = %addr, "Connection refused: server full");
                            tokio::spawn(refuse_connection(stream));
                        }
                    },
                    Err(e) => {
                        error!(error = %e, "Accept failed");
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                info!("Accept loop shutting down");
                break;
            }
        }
    }
}

async fn refuse_connection(mut stream: TcpStream) {
    let msg = ServerMessage::error(Error::ServerFull.to_string());
    if let Err(e) = write_frame(&mut stream, &msg).await {
        debug!(error = %e, "Failed to notify refused connection");
    }
}

/// Handle a single client connection
async fn handle_connection(
    stream: TcpStream,
    conn_id: ConnId,
    shared: Arc<Shared>,
    mut shutdown_rx: broadcast::Receiver<()>,
    _permit: OwnedSemaphorePermit,
) {
    let (mut reader, writer) = tokio::io::split(stream);
    let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE);
    let mut writer_handle = tokio::spawn(writer_task(writer, rx));

    let mut conn = Connection {
        id: conn_id,
        shared,
        tx,
        binding: None,
    };

    loop {
        tokio::select! {
            result = read_frame::<ReadHalf<TcpStream>, ClientMessage>(&mut reader) => {
                match result {
                    Ok(msg) => conn.handle(msg).await,
                    Err(Error::InvalidMessage(e)) => {
                        warn!(conn_id, error = %e, "Invalid message");
                        conn.reply(ServerMessage::error(format!("invalid message: {}", e))).await;
                    }
                    Err(Error::ConnectionClosed) => {
                        debug!(conn_id, "Connection closed");
                        break;
                    }
                    Err(e) => {
                        warn!(conn_id, error = %e, "Read error");
                        break;
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                conn.reply(ServerMessage::ServerShutdown).await;
                break;
            }
        }
    }

    // Disconnect acts as leave
    conn.detach();
    drop(conn);

    if tokio::time::timeout(FLUSH_TIMEOUT, &mut writer_handle)
        .await
        .is_err()
    {
        writer_handle.abort();
    }

    debug!(conn_id, "Connection finished");
}

/// Writer task - sends messages to the client
async fn writer_task(mut writer: WriteHalf<TcpStream>, mut rx: mpsc::Receiver<ServerMessage>) {
    while let Some(msg) = rx.recv().await {
        if let Err(e) = write_frame(&mut writer, &msg).await {
            debug!(error = %e, "Write failed");
            break;
        }
    }
}

/// One client's session state
struct Connection {
    id: ConnId,
    shared: Arc<Shared>,
    tx: mpsc::Sender<ServerMessage>,
    binding: Option<(RoomId, ParticipantId)>,
}

impl Connection {
    async fn reply(&self, msg: ServerMessage) {
        if self.tx.send(msg).await.is_err() {
            debug!(conn_id = self.id, "Failed to queue reply");
        }
    }

    async fn handle(&mut self, msg: ClientMessage) {
        match msg {
            ClientMessage::Join {
                room_id,
                participant,
                config,
            } => self.join(room_id, participant, config).await,
            ClientMessage::AddSubjects { subjects } => {
                self.room_action("add_subjects", |r, room, _| r.add_subjects(room, &subjects))
                    .await
            }
            ClientMessage::RemoveSubject { index } => {
                self.room_action("remove_subject", |r, room, _| r.remove_subject(room, index))
                    .await
            }
            ClientMessage::StartSession => {
                self.room_action("start_session", |r, room, _| r.start_session(room))
                    .await
            }
            ClientMessage::NextRound => {
                self.room_action("next_round", |r, room, _| r.next_round(room))
                    .await
            }
            ClientMessage::ResetSession => {
                self.room_action("reset_session", |r, room, _| r.reset_session(room))
                    .await
            }
            ClientMessage::CastVote { value } => {
                self.room_action("cast_vote", |r, room, voter| r.cast_vote(room, voter, value))
                    .await
            }
            ClientMessage::RevealVotes => {
                self.room_action("reveal_votes", |r, room, _| r.reveal_votes(room))
                    .await
            }
            ClientMessage::Leave => self.detach(),
            ClientMessage::Ping => self.reply(ServerMessage::Pong).await,
        }
    }

    async fn join(&mut self, room_id: RoomId, participant: Participant, config: Option<RoomConfig>) {
        // Switching room or identity releases the previous binding
        if let Some((bound_room, bound_id)) = &self.binding {
            if *bound_room != room_id || *bound_id != participant.id {
                self.detach();
            }
        }

        let shared = self.shared.clone();
        // Subscribe first so the joiner also receives the join snapshot
        shared
            .broadcaster
            .subscribe(&room_id, self.id, self.tx.clone());

        let participant_id = participant.id.clone();
        match shared.registry.join_or_create(&room_id, participant, config) {
            Ok(admission) => {
                // The room may have been destroyed and recreated since the
                // first subscribe, which drops its subscriber set
                shared
                    .broadcaster
                    .subscribe(&room_id, self.id, self.tx.clone());
                shared
                    .bindings
                    .lock()
                    .insert((room_id.clone(), participant_id.clone()), self.id);
                self.binding = Some((room_id, participant_id));
                self.reply(ServerMessage::join_accepted(admission.into_room()))
                    .await;
            }
            Err(e) => {
                shared.broadcaster.unsubscribe(&room_id, self.id);
                let reason = match e {
                    CoreError::RoomNotFound(_) => ROOM_NOT_FOUND.to_string(),
                    other => other.to_string(),
                };
                debug!(conn_id = self.id, room_id = %room_id, reason = %reason, "Join refused");
                self.reply(ServerMessage::join_rejected(reason)).await;
            }
        }
    }

    /// Apply a room action on behalf of the bound participant. Applied
    /// changes reach everyone through the broadcaster.
    async fn room_action<F>(&self, op: &'static str, action: F)
    where
        F: FnOnce(&RoomRegistry, &RoomId, &ParticipantId) -> Outcome,
    {
        let Some((room_id, participant_id)) = &self.binding else {
            self.reply(ServerMessage::error("join a room first")).await;
            return;
        };

        match action(&self.shared.registry, room_id, participant_id) {
            Outcome::Applied(_) => {}
            Outcome::NotFound => {
                self.reply(ServerMessage::RoomNotFound {
                    room_id: room_id.clone(),
                })
                .await
            }
            Outcome::Rejected(reason) => {
                debug!(conn_id = self.id, room_id = %room_id, op, reason = %reason, "Action ignored");
            }
        }
    }

    /// Stop receiving updates and, unless a newer connection now speaks for
    /// the participant, leave the room
    fn detach(&mut self) {
        let Some((room_id, participant_id)) = self.binding.take() else {
            return;
        };
        self.shared.broadcaster.unsubscribe(&room_id, self.id);

        let key = (room_id, participant_id);
        let owns_binding = {
            let mut bindings = self.shared.bindings.lock();
            if bindings.get(&key) == Some(&self.id) {
                bindings.remove(&key);
                true
            } else {
                false
            }
        };
        if !owns_binding {
            debug!(conn_id = self.id, room_id = %key.0, "Binding superseded; not leaving");
            return;
        }

        let (room_id, participant_id) = key;
        match self.shared.registry.leave(&room_id, &participant_id) {
            LeaveOutcome::Left(_) | LeaveOutcome::Destroyed => {}
            other => {
                debug!(conn_id = self.id, room_id = %room_id, outcome = ?other, "Leave had no effect")
            }
        }
    }
}
