//! TCP client for a pokerroom server

use std::net::SocketAddr;

use pokerroom_core::{Participant, RoomConfig, RoomId, VoteValue};
use tokio::io::{ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::frame::{read_frame, write_frame};
use crate::protocol::{ClientMessage, ServerMessage};

/// Client handle for network operations
pub struct Client {
    event_rx: mpsc::Receiver<ServerMessage>,
    cmd_tx: mpsc::Sender<ClientCommand>,
}

enum ClientCommand {
    Send(ClientMessage),
    Disconnect,
}

impl Client {
    /// Connect to a server
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        info!(addr = %addr, "Connecting to server");

        let stream = TcpStream::connect(addr).await?;
        let (reader, writer) = tokio::io::split(stream);

        let (event_tx, event_rx) = mpsc::channel(64);
        let (cmd_tx, cmd_rx) = mpsc::channel(64);

        tokio::spawn(connection_task(reader, writer, event_tx, cmd_rx));

        Ok(Client { event_rx, cmd_tx })
    }

    /// Get the next server message; `None` once the connection is gone
    pub async fn next_event(&mut self) -> Option<ServerMessage> {
        self.event_rx.recv().await
    }

    /// Queue a raw protocol message
    pub async fn send(&self, msg: ClientMessage) -> Result<()> {
        self.cmd_tx
            .send(ClientCommand::Send(msg))
            .await
            .map_err(|_| Error::NotConnected)
    }

    /// Join `room_id`; supplying a config creates the room if it is absent
    pub async fn join(
        &self,
        room_id: RoomId,
        participant: Participant,
        config: Option<RoomConfig>,
    ) -> Result<()> {
        self.send(ClientMessage::Join {
            room_id,
            participant,
            config,
        })
        .await
    }

    pub async fn add_subjects(&self, subjects: Vec<String>) -> Result<()> {
        self.send(ClientMessage::AddSubjects { subjects }).await
    }

    pub async fn remove_subject(&self, index: usize) -> Result<()> {
        self.send(ClientMessage::RemoveSubject { index }).await
    }

    pub async fn start_session(&self) -> Result<()> {
        self.send(ClientMessage::StartSession).await
    }

    pub async fn next_round(&self) -> Result<()> {
        self.send(ClientMessage::NextRound).await
    }

    pub async fn reset_session(&self) -> Result<()> {
        self.send(ClientMessage::ResetSession).await
    }

    pub async fn cast_vote(&self, value: VoteValue) -> Result<()> {
        self.send(ClientMessage::CastVote { value }).await
    }

    pub async fn reveal_votes(&self) -> Result<()> {
        self.send(ClientMessage::RevealVotes).await
    }

    pub async fn leave(&self) -> Result<()> {
        self.send(ClientMessage::Leave).await
    }

    pub async fn ping(&self) -> Result<()> {
        self.send(ClientMessage::Ping).await
    }

    /// Close the connection; the server treats this as leaving
    pub async fn disconnect(&self) {
        let _ = self.cmd_tx.send(ClientCommand::Disconnect).await;
    }
}

/// Main connection task - owns the write half and runs the reader
/// alongside, so a command never interrupts a partially read frame
async fn connection_task(
    reader: ReadHalf<TcpStream>,
    mut writer: WriteHalf<TcpStream>,
    event_tx: mpsc::Sender<ServerMessage>,
    mut cmd_rx: mpsc::Receiver<ClientCommand>,
) {
    let mut reader_handle = tokio::spawn(reader_task(reader, event_tx));

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(ClientCommand::Send(msg)) => {
                        if let Err(e) = write_frame(&mut writer, &msg).await {
                            warn!(error = %e, "Write failed");
                            break;
                        }
                    }
                    Some(ClientCommand::Disconnect) | None => {
                        debug!("Disconnecting");
                        break;
                    }
                }
            }
            _ = &mut reader_handle => {
                break;
            }
        }
    }

    reader_handle.abort();
}

/// Reader task - forwards server messages to the client handle
async fn reader_task(mut reader: ReadHalf<TcpStream>, event_tx: mpsc::Sender<ServerMessage>) {
    loop {
        match read_frame::<ReadHalf<TcpStream>, ServerMessage>(&mut reader).await {
            Ok(msg) => {
                if event_tx.send(msg).await.is_err() {
                    debug!("Client handle dropped");
                    break;
                }
            }
            Err(Error::ConnectionClosed) => {
                debug!("Server closed connection");
                break;
            }
            Err(e) => {
                warn!(error = %e, "Read error");
                break;
            }
        }
    }
}
