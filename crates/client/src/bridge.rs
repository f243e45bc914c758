use std::sync::mpsc::{Receiver, Sender, TryRecvError};

use protocol::{ClientMessage, ServerMessage};

/// Channel-backed bridge between a client loop and the server connection.
#[derive(Debug)]
pub struct ServerBridge {
    message_tx: Sender<ClientMessage>,
    delivery_rx: Receiver<ServerMessage>,
}

impl ServerBridge {
    /// Creates a bridge from message sender and delivery receiver.
    pub fn new(message_tx: Sender<ClientMessage>, delivery_rx: Receiver<ServerMessage>) -> Self {
        Self {
            message_tx,
            delivery_rx,
        }
    }

    /// Sends one message towards the server.
    pub fn send(&self, message: ClientMessage) -> Result<(), BridgeError> {
        self.message_tx
            .send(message)
            .map_err(|_| BridgeError::Disconnected)
    }

    /// Receives all currently queued deliveries without blocking.
    pub fn drain(&self) -> Result<Vec<ServerMessage>, BridgeError> {
        let mut deliveries = Vec::new();
        loop {
            match self.delivery_rx.try_recv() {
                Ok(delivery) => deliveries.push(delivery),
                Err(TryRecvError::Empty) => return Ok(deliveries),
                Err(TryRecvError::Disconnected) => return Err(BridgeError::Disconnected),
            }
        }
    }
}

/// Error raised by the client-server bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeError {
    Disconnected,
}
