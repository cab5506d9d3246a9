//! Connection pool for the backing array database.
//!
//! The database itself is opaque: a [`Connector`] opens a [`Session`] against
//! the coordinator and a session executes text queries. The pool keeps idle
//! connections and lends them out as [`PooledConnection`] guards that return
//! the connection when dropped.

use std::collections::VecDeque;
use std::fmt;
use std::io::{self, BufRead, BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::BackendConfig;
use crate::error::{GeowsError, Result};

/// Rows returned by the backend, one text line each
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryResult {
    pub rows: Vec<String>,
}

/// An open session with the coordinator.
pub trait Session: Send {
    fn execute(&mut self, query: &str) -> Result<QueryResult>;

    fn close(&mut self);
}

/// Opens sessions against a coordinator.
pub trait Connector: Send + Sync {
    fn connect(&self, address: &str, port: u16) -> Result<Box<dyn Session>>;
}

/// A backend connection and the coordinator it belongs to.
pub struct Connection {
    id: u64,
    instance_name: String,
    coordinator_address: String,
    coordinator_port: u16,
    session: Option<Box<dyn Session>>,
}

impl Connection {
    /// Create a closed connection. An empty address or a zero port is rejected.
    pub fn new(
        id: u64,
        instance_name: impl Into<String>,
        coordinator_address: impl Into<String>,
        coordinator_port: u16,
    ) -> Result<Self> {
        let coordinator_address = coordinator_address.into();
        if coordinator_address.is_empty() {
            return Err(GeowsError::Connection {
                message: "coordinator address cannot be empty".to_string(),
            });
        }
        if coordinator_port == 0 {
            return Err(GeowsError::Connection {
                message: "coordinator port cannot be 0".to_string(),
            });
        }

        Ok(Self {
            id,
            instance_name: instance_name.into(),
            coordinator_address,
            coordinator_port,
            session: None,
        })
    }

    pub fn open(&mut self, connector: &dyn Connector) -> Result<()> {
        if self.session.is_none() {
            self.session = Some(connector.connect(&self.coordinator_address, self.coordinator_port)?);
        }
        Ok(())
    }

    pub fn close(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.close();
        }
    }

    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    pub fn execute(&mut self, query: &str) -> Result<QueryResult> {
        match self.session.as_mut() {
            Some(session) => session.execute(query),
            None => Err(GeowsError::QueryExecution {
                message: format!("connection {} is closed", self.id),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn instance_name(&self) -> &str {
        &self.instance_name
    }

    pub fn coordinator_address(&self) -> &str {
        &self.coordinator_address
    }

    pub fn coordinator_port(&self) -> u16 {
        self.coordinator_port
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("instance_name", &self.instance_name)
            .field("coordinator_address", &self.coordinator_address)
            .field("coordinator_port", &self.coordinator_port)
            .field("open", &self.is_open())
            .finish()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

/// Snapshot of the pool counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub idle: usize,
    pub in_use: usize,
    pub created: usize,
}

/// Pool of connections to a single coordinator.
pub struct ConnectionPool {
    backend: BackendConfig,
    connector: Arc<dyn Connector>,
    idle: Mutex<VecDeque<Connection>>,
    next_id: AtomicU64,
    created: AtomicUsize,
    in_use: AtomicUsize,
}

impl ConnectionPool {
    pub fn new(backend: BackendConfig, connector: Arc<dyn Connector>) -> Arc<Self> {
        info!(
            coordinator = %backend.coordinator_host,
            port = backend.coordinator_port,
            "Created connection pool"
        );
        Arc::new(Self {
            backend,
            connector,
            idle: Mutex::new(VecDeque::new()),
            next_id: AtomicU64::new(1),
            created: AtomicUsize::new(0),
            in_use: AtomicUsize::new(0),
        })
    }

    /// Borrow a connection, opening a new one when none is idle.
    ///
    /// The lock is only held for the pop; connecting happens outside it.
    pub fn get(self: &Arc<Self>) -> Result<PooledConnection> {
        let idle = self.idle.lock().pop_front();

        let connection = match idle {
            Some(connection) => {
                debug!(connection_id = connection.id(), "Reusing pooled connection");
                connection
            }
            None => self.open_connection()?,
        };

        self.in_use.fetch_add(1, Ordering::SeqCst);
        Ok(PooledConnection {
            connection: Some(connection),
            pool: Arc::clone(self),
        })
    }

    fn open_connection(&self) -> Result<Connection> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut connection = Connection::new(
            id,
            self.backend.instance_name.clone(),
            self.backend.coordinator_host.clone(),
            self.backend.coordinator_port,
        )?;
        connection.open(self.connector.as_ref())?;

        self.created.fetch_add(1, Ordering::SeqCst);
        debug!(
            connection_id = id,
            coordinator = %self.backend.coordinator_host,
            port = self.backend.coordinator_port,
            "Opened new connection"
        );
        Ok(connection)
    }

    /// Called once per borrowed connection, from the guard's drop
    fn release(&self, connection: Connection) {
        self.in_use.fetch_sub(1, Ordering::SeqCst);
        if !connection.is_open() {
            warn!(connection_id = connection.id(), "Discarding closed connection");
            return;
        }
        self.idle.lock().push_back(connection);
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            idle: self.idle.lock().len(),
            in_use: self.in_use.load(Ordering::SeqCst),
            created: self.created.load(Ordering::SeqCst),
        }
    }
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("coordinator_host", &self.backend.coordinator_host)
            .field("coordinator_port", &self.backend.coordinator_port)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Exclusive loan of a pooled connection; dropping it gives the connection back.
pub struct PooledConnection {
    connection: Option<Connection>,
    pool: Arc<ConnectionPool>,
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.connection
            .as_ref()
            .unwrap_or_else(|| unreachable!("connection is only taken in drop"))
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        self.connection
            .as_mut()
            .unwrap_or_else(|| unreachable!("connection is only taken in drop"))
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            self.pool.release(connection);
        }
    }
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PooledConnection").field(&self.connection).finish()
    }
}

/// Connector speaking newline-terminated text over TCP: one query line out,
/// one reply line back. Every socket read and write is bounded by the
/// query timeout.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    connect_timeout: Duration,
    query_timeout: Duration,
}

impl TcpConnector {
    pub fn new(connect_timeout: Duration, query_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            query_timeout,
        }
    }

    pub fn from_config(backend: &BackendConfig) -> Self {
        Self::new(
            Duration::from_millis(backend.connect_timeout_ms),
            Duration::from_millis(backend.query_timeout_ms),
        )
    }
}

impl Connector for TcpConnector {
    fn connect(&self, address: &str, port: u16) -> Result<Box<dyn Session>> {
        let addrs = (address, port).to_socket_addrs().map_err(|e| GeowsError::Connection {
            message: format!("could not resolve {}:{}: {}", address, port, e),
        })?;

        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.connect_timeout) {
                Ok(stream) => {
                    return Ok(Box::new(TcpSession::new(stream, self.query_timeout)?));
                }
                Err(e) => last_error = Some(e),
            }
        }

        Err(GeowsError::Connection {
            message: match last_error {
                Some(e) => format!("could not connect to {}:{}: {}", address, port, e),
                None => format!("{}:{} resolved to no addresses", address, port),
            },
        })
    }
}

struct TcpSession {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl TcpSession {
    fn new(stream: TcpStream, query_timeout: Duration) -> Result<Self> {
        // set_*_timeout rejects a zero duration
        let query_timeout = query_timeout.max(Duration::from_millis(1));
        stream
            .set_read_timeout(Some(query_timeout))
            .and_then(|_| stream.set_write_timeout(Some(query_timeout)))
            .map_err(|e| GeowsError::Connection {
                message: format!("could not set socket timeouts: {}", e),
            })?;

        let writer = stream.try_clone().map_err(|e| GeowsError::Connection {
            message: format!("could not clone stream: {}", e),
        })?;
        Ok(Self {
            reader: BufReader::new(stream),
            writer,
        })
    }
}

impl Session for TcpSession {
    fn execute(&mut self, query: &str) -> Result<QueryResult> {
        let to_error = |e: io::Error| GeowsError::QueryExecution {
            message: match e.kind() {
                io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => {
                    "coordinator did not answer within the query timeout".to_string()
                }
                _ => e.to_string(),
            },
        };

        self.writer.write_all(query.as_bytes()).map_err(to_error)?;
        self.writer.write_all(b"\n").map_err(to_error)?;
        self.writer.flush().map_err(to_error)?;

        let mut line = String::new();
        let read = self.reader.read_line(&mut line).map_err(to_error)?;
        if read == 0 {
            return Err(GeowsError::QueryExecution {
                message: "coordinator closed the connection".to_string(),
            });
        }

        Ok(QueryResult {
            rows: vec![line.trim_end_matches(['\r', '\n']).to_string()],
        })
    }

    fn close(&mut self) {
        let _ = self.writer.shutdown(std::net::Shutdown::Both);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::collections::HashSet;
    use std::net::TcpListener;
    use std::sync::Barrier;

    #[derive(Default)]
    struct CountingConnector {
        connects: AtomicUsize,
    }

    struct EchoSession;

    impl Session for EchoSession {
        fn execute(&mut self, query: &str) -> Result<QueryResult> {
            if query.is_empty() {
                return Err(GeowsError::QueryExecution {
                    message: "empty query".to_string(),
                });
            }
            Ok(QueryResult {
                rows: vec![query.to_string()],
            })
        }

        fn close(&mut self) {}
    }

    impl Connector for CountingConnector {
        fn connect(&self, _address: &str, _port: u16) -> Result<Box<dyn Session>> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(EchoSession))
        }
    }

    struct RefusingConnector;

    impl Connector for RefusingConnector {
        fn connect(&self, address: &str, port: u16) -> Result<Box<dyn Session>> {
            Err(GeowsError::Connection {
                message: format!("refused {}:{}", address, port),
            })
        }
    }

    fn pool() -> (Arc<ConnectionPool>, Arc<CountingConnector>) {
        let connector = Arc::new(CountingConnector::default());
        let pool = ConnectionPool::new(BackendConfig::default(), connector.clone());
        (pool, connector)
    }

    #[test]
    fn test_connection_rejects_bad_coordinator() {
        let err = Connection::new(1, "geows", "", 1239).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConnectionError);

        let err = Connection::new(1, "geows", "localhost", 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConnectionError);
    }

    #[test]
    fn test_connection_lifecycle() {
        let connector = CountingConnector::default();
        let mut connection = Connection::new(7, "geows", "localhost", 1239).unwrap();
        assert!(!connection.is_open());
        assert_eq!(
            connection.execute("list()").unwrap_err().kind(),
            ErrorKind::QueryExecutionError
        );

        connection.open(&connector).unwrap();
        connection.open(&connector).unwrap();
        assert!(connection.is_open());
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
        assert_eq!(connection.execute("list()").unwrap().rows, vec!["list()"]);

        connection.close();
        assert!(!connection.is_open());
    }

    #[test]
    fn test_concurrent_gets_create_distinct_connections() {
        let (pool, connector) = pool();
        let n = 4;
        let barrier = Barrier::new(n);

        let ids: Vec<u64> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..n)
                .map(|_| {
                    scope.spawn(|| {
                        let connection = pool.get().unwrap();
                        // hold every connection until all threads have one
                        barrier.wait();
                        connection.id()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let distinct: HashSet<_> = ids.iter().collect();
        assert_eq!(distinct.len(), n);
        assert_eq!(connector.connects.load(Ordering::SeqCst), n);
        assert_eq!(
            pool.stats(),
            PoolStats {
                idle: n,
                in_use: 0,
                created: n
            }
        );

        // all released; borrowing n again reuses them
        let again: Vec<_> = (0..n).map(|_| pool.get().unwrap()).collect();
        assert_eq!(connector.connects.load(Ordering::SeqCst), n);
        assert_eq!(pool.stats().in_use, n);
        drop(again);
        assert_eq!(pool.stats().idle, n);
    }

    #[test]
    fn test_release_on_drop_and_fifo_reuse() {
        let (pool, _) = pool();
        let first = pool.get().unwrap();
        let second = pool.get().unwrap();
        let (first_id, second_id) = (first.id(), second.id());
        assert_ne!(first_id, second_id);

        drop(first);
        drop(second);

        let reused = pool.get().unwrap();
        assert_eq!(reused.id(), first_id);
    }

    #[test]
    fn test_release_on_error_path() {
        let (pool, _) = pool();

        let run = |query: &str| -> Result<QueryResult> {
            let mut connection = pool.get()?;
            let result = connection.execute(query)?;
            Ok(result)
        };

        assert!(run("").is_err());
        assert!(run("scan(a)").is_ok());
        assert_eq!(
            pool.stats(),
            PoolStats {
                idle: 1,
                in_use: 0,
                created: 1
            }
        );
    }

    #[test]
    fn test_closed_connection_is_discarded() {
        let (pool, connector) = pool();
        let mut connection = pool.get().unwrap();
        connection.close();
        drop(connection);

        assert_eq!(pool.stats().idle, 0);
        let _fresh = pool.get().unwrap();
        assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_connect_failure_propagates() {
        let pool = ConnectionPool::new(BackendConfig::default(), Arc::new(RefusingConnector));
        let err = pool.get().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConnectionError);
        assert_eq!(pool.stats().created, 0);
        assert_eq!(pool.stats().in_use, 0);
    }

    #[test]
    fn test_tcp_connector_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut writer = stream;
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            writer
                .write_all(format!("ok {}", line).as_bytes())
                .unwrap();
        });

        let connector = TcpConnector::new(Duration::from_secs(2), Duration::from_secs(2));
        let mut session = connector.connect("127.0.0.1", port).unwrap();
        let result = session.execute("list('arrays')").unwrap();
        assert_eq!(result.rows, vec!["ok list('arrays')"]);
        session.close();
        server.join().unwrap();
    }

    #[test]
    fn test_tcp_query_times_out_on_silent_coordinator() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let (done_tx, done_rx) = std::sync::mpsc::channel::<()>();

        // reads the query and never replies
        let server = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream);
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            let _ = done_rx.recv();
        });

        let mut backend = BackendConfig::default();
        backend.connect_timeout_ms = 1000;
        backend.query_timeout_ms = 200;
        let connector = TcpConnector::from_config(&backend);
        let mut session = connector.connect("127.0.0.1", port).unwrap();

        let started = std::time::Instant::now();
        let err = session.execute("list('arrays')").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::QueryExecutionError);
        assert!(err.to_string().contains("query timeout"));
        assert!(started.elapsed() < Duration::from_secs(5));

        session.close();
        done_tx.send(()).unwrap();
        server.join().unwrap();
    }
}
