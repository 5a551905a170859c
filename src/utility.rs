use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::{
    broadcast,
    mpsc::{Receiver, Sender},
    Mutex,
};

/// An mpsc pair whose receiver can be shared. The match engine locks the
/// receiver for the lifetime of its loop; handlers clone the sender.
#[derive(Clone, Debug)]
pub struct Channel<T> {
    pub sender: Sender<T>,
    pub receiver: Arc<Mutex<Receiver<T>>>,
}

impl<T> From<(Sender<T>, Receiver<T>)> for Channel<T> {
    fn from((sender, receiver): (Sender<T>, Receiver<T>)) -> Self {
        Channel {
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
        }
    }
}

pub async fn create_shutdown_channel() -> broadcast::Receiver<()> {
    let (shutdown_sender, shutdown_receiver) = broadcast::channel::<()>(1);
    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to listen for ctrl-c");
        shutdown_sender
            .send(())
            .expect("Failed to send shutdown signal");
    });
    shutdown_receiver
}

/// Finds a free local address. Used by tests to avoid port collisions.
pub async fn random_address() -> String {
    let socket = UdpSocket::bind("127.0.0.1:0")
        .await
        .expect("Failed to get random port");
    socket
        .local_addr()
        .expect("Failed to unwrap local address")
        .to_string()
}
