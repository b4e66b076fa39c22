//! Server network layer: the UDP socket, the outgoing-datagram queue, and
//! the background timers driving presence culling and rate-window rotation.

use crate::config::ServerConfig;
use crate::directory::{AccountDirectory, MembershipDirectory};
use crate::dispatcher::{Dispatcher, Outgoing};
use crate::rates::RateLimiter;
use crate::rooms::RoomDirectory;
use crate::session::SessionRegistry;
use log::{debug, error, info};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::interval;

/// Main server owning the socket and all protocol state.
pub struct Server<A, M> {
    socket: Arc<UdpSocket>,
    config: ServerConfig,
    dispatcher: Arc<Dispatcher<A, M>>,
    rooms: Arc<RwLock<RoomDirectory>>,
    rates: Arc<RwLock<RateLimiter>>,
    sessions: Arc<RwLock<SessionRegistry>>,
    out_rx: mpsc::UnboundedReceiver<Outgoing>,
}

impl<A, M> Server<A, M>
where
    A: AccountDirectory,
    M: MembershipDirectory,
{
    /// Binds the listening socket and wires up the protocol services. A
    /// failed bind is the only fatal startup condition.
    pub async fn bind(
        config: ServerConfig,
        accounts: A,
        memberships: M,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(config.bind_addr()).await?);
        info!("listening on {}", socket.local_addr()?);

        let sessions = Arc::new(RwLock::new(SessionRegistry::new()));
        let rooms = Arc::new(RwLock::new(RoomDirectory::new(
            config.member_timeout,
            config.ghost_timeout,
        )));
        let rates = Arc::new(RwLock::new(RateLimiter::new(
            config.rate_capacity,
            config.rate_window,
        )));
        let (out_tx, out_rx) = mpsc::unbounded_channel();

        let dispatcher = Arc::new(Dispatcher::new(
            &config,
            accounts,
            memberships,
            Arc::clone(&sessions),
            Arc::clone(&rooms),
            Arc::clone(&rates),
            out_tx,
        ));

        Ok(Server {
            socket,
            config,
            dispatcher,
            rooms,
            rates,
            sessions,
            out_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Handle to the room directory, for the community-browse surface
    /// (room ids, population, online counts).
    pub fn rooms(&self) -> Arc<RwLock<RoomDirectory>> {
        Arc::clone(&self.rooms)
    }

    /// Handle to the session registry.
    pub fn sessions(&self) -> Arc<RwLock<SessionRegistry>> {
        Arc::clone(&self.sessions)
    }

    /// Spawns task that sends queued outgoing datagrams.
    fn spawn_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let mut out_rx = std::mem::replace(&mut self.out_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(out) = out_rx.recv().await {
                if let Err(e) = socket.send_to(&out.bytes, out.addr).await {
                    error!("failed to send to {}: {}", out.addr, e);
                }
            }
        });
    }

    /// Spawns task that periodically culls stale members and ghosts.
    fn spawn_cull_timer(&self) {
        let rooms = Arc::clone(&self.rooms);
        let period = self.config.cull_interval;

        tokio::spawn(async move {
            let mut interval = interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                rooms.write().await.cull();
            }
        });
    }

    /// Spawns task that rotates the rate-limit window.
    fn spawn_rate_rotation_timer(&self) {
        let rates = Arc::clone(&self.rates);
        let period = self.config.rate_window;

        tokio::spawn(async move {
            let mut interval = interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                let mut rates = rates.write().await;
                rates.rotate();
                debug!("rate window rotated ({} endpoints tracked)", rates.tracked_endpoints());
            }
        });
    }

    /// Runs the receive loop. Each datagram is handled on its own task so a
    /// handler suspended on a directory lookup never blocks the socket.
    pub async fn run(mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_sender();
        self.spawn_cull_timer();
        self.spawn_rate_rotation_timer();

        info!("server started");

        let mut buf = [0u8; 2048];
        loop {
            match self.socket.recv_from(&mut buf).await {
                Ok((len, addr)) => {
                    let dispatcher = Arc::clone(&self.dispatcher);
                    let datagram = buf[..len].to_vec();
                    tokio::spawn(async move {
                        dispatcher.handle_datagram(&datagram, addr).await;
                    });
                }
                Err(e) => {
                    error!("error receiving datagram: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
    }
}
