//! SMTP server implementation

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, mpsc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, error, info, warn};

use crate::smtp::config::ServerConfig;
use crate::smtp::email::Email;
use crate::smtp::error::SmtpError;
use crate::smtp::protocol::SmtpProtocol;
use crate::smtp::store::MessageStore;
use crate::smtp::transport::SmtpTransport;

const LISTEN_BACKLOG: i32 = 128;
const WAKE_TIMEOUT: Duration = Duration::from_secs(1);
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Embedded SMTP server that keeps every received message in memory
#[derive(Debug)]
pub struct SmtpServer {
    config: ServerConfig,
    store: Arc<MessageStore>,
    running: Mutex<Option<Running>>,
}

#[derive(Debug)]
struct Running {
    local_addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    accept_thread: JoinHandle<()>,
}

impl SmtpServer {
    /// Create a new, stopped SMTP server
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            store: Arc::new(MessageStore::new()),
            running: Mutex::new(None),
        }
    }

    /// Create and start a server in one go
    pub fn start_with(config: ServerConfig) -> Result<Self, SmtpError> {
        let server = Self::new(config);
        server.start()?;
        Ok(server)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    fn lock_running(&self) -> MutexGuard<'_, Option<Running>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bind the listening socket and start accepting connections in the
    /// background.
    ///
    /// Returns once the socket is listening, with the address actually bound
    /// (useful when the configured port is 0).
    pub fn start(&self) -> Result<SocketAddr, SmtpError> {
        let mut running = self.lock_running();
        if running.is_some() {
            return Err(SmtpError::AlreadyRunning);
        }

        let listener = bind(&self.config)?;
        let local_addr = listener.local_addr()?;
        let shutdown = Arc::new(AtomicBool::new(false));

        let accept_thread = thread::Builder::new()
            .name("smtp-accept".to_owned())
            .spawn({
                let domain = self.config.domain.clone();
                let store = Arc::clone(&self.store);
                let shutdown = Arc::clone(&shutdown);
                move || accept_loop(listener.incoming(), &domain, &store, &shutdown)
            })?;

        info!(addr = %local_addr, domain = %self.config.domain, "SMTP server listening");
        *running = Some(Running {
            local_addr,
            shutdown,
            accept_thread,
        });
        Ok(local_addr)
    }

    /// Stop accepting connections.
    ///
    /// Connections already being served run until their clients leave.
    /// Calling this on a stopped server does nothing.
    pub fn stop(&self) {
        let Some(running) = self.lock_running().take() else {
            return;
        };

        running.shutdown.store(true, Ordering::SeqCst);

        // accept() blocks; a connection of our own gets it to look at the flag
        match TcpStream::connect_timeout(&wake_addr(running.local_addr), WAKE_TIMEOUT) {
            Ok(_) => {
                if running.accept_thread.join().is_err() {
                    error!("accept loop panicked");
                }
            }
            Err(e) => warn!(error = %e, "could not wake accept loop, leaving it behind"),
        }

        info!(addr = %running.local_addr, "SMTP server stopped");
    }

    pub fn is_running(&self) -> bool {
        self.lock_running().is_some()
    }

    /// Address the server is bound to, while running
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.lock_running().as_ref().map(|running| running.local_addr)
    }

    pub fn port(&self) -> Option<u16> {
        self.local_addr().map(|addr| addr.port())
    }

    pub fn received_messages_count(&self) -> usize {
        self.store.len()
    }

    /// Copy of every message received so far, in receipt order
    pub fn received_messages(&self) -> Vec<Email> {
        self.store.snapshot()
    }

    pub fn clear_received_messages(&self) {
        self.store.clear();
    }

    /// Get notified of each message as it is stored.
    ///
    /// Use `recv_timeout()` on the receiver to wait for a message without
    /// sleeping.
    pub fn subscribe(&self) -> mpsc::Receiver<Email> {
        self.store.subscribe()
    }
}

impl Drop for SmtpServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn bind(config: &ServerConfig) -> Result<TcpListener, SmtpError> {
    let addr = config.socket_addr();
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(config.reuse_address)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;
    Ok(socket.into())
}

/// Where to connect to reach a listener bound to `addr`
fn wake_addr(addr: SocketAddr) -> SocketAddr {
    let ip = match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
        IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
        ip => ip,
    };
    SocketAddr::new(ip, addr.port())
}

fn accept_loop(
    incoming: impl Iterator<Item = io::Result<TcpStream>>,
    domain: &str,
    store: &Arc<MessageStore>,
    shutdown: &AtomicBool,
) {
    for stream in incoming {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        match stream {
            Ok(stream) => {
                let domain = domain.to_owned();
                let store = Arc::clone(store);
                let spawned = thread::Builder::new()
                    .name("smtp-connection".to_owned())
                    .spawn(move || handle_client(stream, &domain, &store));
                if let Err(e) = spawned {
                    error!(error = %e, "could not start connection thread");
                }
            }
            Err(e) => {
                warn!(error = %e, "error accepting connection");
                // errors such as EMFILE repeat until a descriptor frees up
                thread::sleep(ACCEPT_BACKOFF);
            }
        }
    }

    debug!("accept loop finished");
}

/// Serve one client; whatever happens stays on this connection
fn handle_client(stream: TcpStream, domain: &str, store: &MessageStore) {
    let peer = stream.peer_addr().ok();
    debug!(peer = ?peer, "connection accepted");

    let mut transport = SmtpTransport::new(stream);
    match SmtpProtocol::new(domain, store).run(&mut transport) {
        Ok(()) => debug!(peer = ?peer, "connection closed"),
        Err(e) if e.is_disconnect() => {
            debug!(peer = ?peer, error = %e, "client disconnected");
            transport.close();
        }
        Err(e) => {
            error!(peer = ?peer, error = %e, "error handling client");
            transport.close();
        }
    }
}
