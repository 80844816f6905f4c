use super::{ScrapeError, TrackerUrlError};
use crate::consts::UDP_PACKET_LEN;
use crate::infohash::InfoHash;
use crate::util::{PacketError, TryBytes, TryFromBuf};
use bytes::{BufMut, Bytes, BytesMut};
use rand::random;
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::net::{UdpSocket, lookup_host};
use tokio::time::timeout;
use url::Url;

const PROTOCOL_ID: u64 = 0x41727101980;
const CONNECT_ACTION: u32 = 0;
const SCRAPE_ACTION: u32 = 2;
const ERROR_ACTION: u32 = 3;

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct UdpTracker(UdpUrl);

impl UdpTracker {
    pub(crate) fn url_string(&self) -> String {
        self.0.to_string()
    }

    /// Perform one connect + scrape exchange (BEP 15) for `hashes` and return
    /// the seeder count for each one, in order.  Each network operation is
    /// given `deadline` to complete; nothing is retried.
    ///
    /// The caller is responsible for keeping `hashes` small enough for the
    /// request and reply to each fit in a single datagram.
    #[tracing::instrument(name = "scrape-udp", skip_all, fields(tracker = %self.0, hashes = hashes.len()))]
    pub(crate) async fn scrape(
        &self,
        hashes: &[InfoHash],
        deadline: Duration,
    ) -> Result<Vec<u32>, ScrapeError> {
        let socket = timeout(deadline, ConnectedUdpSocket::connect(&self.0.host, self.0.port))
            .await
            .map_err(|_| ScrapeError::Timeout)??;
        let session = UdpTrackerSession::new(socket, deadline);
        let connection_id = session.connect().await?;
        session.scrape(connection_id, hashes).await
    }
}

impl fmt::Display for UdpTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Tracker {}>", self.0)
    }
}

impl TryFrom<Url> for UdpTracker {
    type Error = TrackerUrlError;

    fn try_from(url: Url) -> Result<UdpTracker, TrackerUrlError> {
        UdpUrl::try_from(url).map(UdpTracker)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct UdpUrl {
    host: String,
    port: u16,
    urldata: String,
}

impl fmt::Display for UdpUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "udp://")?;
        if self.host.contains(':') {
            write!(f, "[{}]", self.host)?;
        } else {
            write!(f, "{}", self.host)?;
        }
        write!(f, ":{}{}", self.port, self.urldata)?;
        Ok(())
    }
}

impl TryFrom<Url> for UdpUrl {
    type Error = TrackerUrlError;

    fn try_from(url: Url) -> Result<UdpUrl, TrackerUrlError> {
        let sch = url.scheme();
        if sch != "udp" {
            return Err(TrackerUrlError::UnsupportedScheme(sch.into()));
        }
        let Some(host) = url.host_str().map(ToOwned::to_owned) else {
            return Err(TrackerUrlError::NoHost);
        };
        let Some(port) = url.port() else {
            return Err(TrackerUrlError::NoUdpPort);
        };
        let mut urldata = String::from(url.path());
        if let Some(query) = url.query() {
            urldata.push('?');
            urldata.push_str(query);
        }
        Ok(UdpUrl {
            host,
            port,
            urldata,
        })
    }
}

#[derive(Debug)]
struct UdpTrackerSession {
    socket: ConnectedUdpSocket,
    deadline: Duration,
}

impl UdpTrackerSession {
    fn new(socket: ConnectedUdpSocket, deadline: Duration) -> Self {
        UdpTrackerSession { socket, deadline }
    }

    /// Obtain a connection ID from the tracker
    async fn connect(&self) -> Result<u64, ScrapeError> {
        tracing::trace!("Sending connection request");
        let transaction_id = make_transaction_id();
        let msg = Bytes::from(UdpConnectionRequest { transaction_id });
        let raw_resp = self.chat(msg).await?;
        let resp =
            Response::from_bytes(raw_resp, transaction_id, UdpConnectionResponse::try_from)?
                .ok()?;
        tracing::trace!(connection_id = resp.connection_id, "Connected");
        Ok(resp.connection_id)
    }

    async fn scrape(&self, connection_id: u64, hashes: &[InfoHash]) -> Result<Vec<u32>, ScrapeError> {
        tracing::trace!("Sending scrape request");
        let transaction_id = make_transaction_id();
        let msg = Bytes::from(UdpScrapeRequest {
            connection_id,
            transaction_id,
            hashes,
        });
        let raw_resp = self.chat(msg).await?;
        let resp = Response::from_bytes(raw_resp, transaction_id, |buf| {
            UdpScrapeResponse::from_bytes(buf, hashes.len())
        })?
        .ok()?;
        Ok(resp.seeders)
    }

    /// Send `msg` and wait up to the deadline for the reply
    async fn chat(&self, msg: Bytes) -> Result<Bytes, ScrapeError> {
        self.socket.send(&msg).await?;
        match timeout(self.deadline, self.socket.recv()).await {
            Ok(r) => Ok(r?),
            Err(_) => {
                tracing::trace!("Tracker did not reply in time");
                Err(ScrapeError::Timeout)
            }
        }
    }
}

fn make_transaction_id() -> u32 {
    random()
}

#[derive(Debug)]
struct ConnectedUdpSocket {
    inner: UdpSocket,
}

impl ConnectedUdpSocket {
    async fn connect(host: &str, port: u16) -> Result<ConnectedUdpSocket, UdpTrackerError> {
        let Some(addr) = lookup_host((host, port))
            .await
            .map_err(UdpTrackerError::Lookup)?
            .next()
        else {
            return Err(UdpTrackerError::NoResolve);
        };
        let bindaddr = match addr {
            SocketAddr::V4(_) => "0.0.0.0:0",
            SocketAddr::V6(_) => "[::]:0",
        };
        let socket = UdpSocket::bind(bindaddr)
            .await
            .map_err(UdpTrackerError::Bind)?;
        tracing::trace!(
            "Connected UDP socket to {} (IP address: {}), port {}",
            host,
            addr.ip(),
            port,
        );
        socket
            .connect(addr)
            .await
            .map_err(UdpTrackerError::Connect)?;
        Ok(ConnectedUdpSocket { inner: socket })
    }

    async fn send(&self, msg: &Bytes) -> Result<(), UdpTrackerError> {
        self.inner.send(msg).await.map_err(UdpTrackerError::Send)?;
        Ok(())
    }

    async fn recv(&self) -> Result<Bytes, UdpTrackerError> {
        let mut buf = BytesMut::with_capacity(UDP_PACKET_LEN);
        self.inner
            .recv_buf(&mut buf)
            .await
            .map_err(UdpTrackerError::Recv)?;
        Ok(buf.freeze())
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
enum Response<T> {
    Success(T),
    Failure(String),
}

impl<T> Response<T> {
    fn ok(self) -> Result<T, ScrapeError> {
        match self {
            Response::Success(res) => Ok(res),
            Response::Failure(msg) => {
                tracing::debug!(reason = %msg, "Tracker replied with error");
                Err(ScrapeError::Failure(msg))
            }
        }
    }

    /// Check the header of a reply against the transaction ID of the request
    /// it answers, then hand it off to `parser` unless it's an error reply
    fn from_bytes<F>(buf: Bytes, transaction_id: u32, parser: F) -> Result<Self, UdpTrackerError>
    where
        F: FnOnce(Bytes) -> Result<T, UdpTrackerError>,
    {
        let mut view = TryBytes::from(buf.clone());
        let action = view.try_get::<u32>()?;
        let got = view.try_get::<u32>()?;
        if got != transaction_id {
            return Err(UdpTrackerError::XactionMismatch {
                expected: transaction_id,
                got,
            });
        }
        if action == ERROR_ACTION {
            Ok(Response::Failure(view.into_string_lossy()))
        } else {
            parser(buf).map(Response::Success)
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
struct UdpConnectionRequest {
    transaction_id: u32,
}

impl From<UdpConnectionRequest> for Bytes {
    fn from(req: UdpConnectionRequest) -> Bytes {
        let mut buf = BytesMut::with_capacity(16);
        buf.put_u64(PROTOCOL_ID);
        buf.put_u32(CONNECT_ACTION);
        buf.put_u32(req.transaction_id);
        buf.freeze()
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
struct UdpConnectionResponse {
    connection_id: u64,
}

impl TryFrom<Bytes> for UdpConnectionResponse {
    type Error = UdpTrackerError;

    fn try_from(buf: Bytes) -> Result<Self, UdpTrackerError> {
        let mut buf = TryBytes::from(buf);
        let action = buf.try_get::<u32>()?;
        if action != CONNECT_ACTION {
            return Err(UdpTrackerError::BadAction {
                expected: CONNECT_ACTION,
                got: action,
            });
        }
        // The transaction ID has already been checked by `Response::from_bytes()`.
        let _transaction_id = buf.try_get::<u32>()?;
        let connection_id = buf.try_get::<u64>()?;
        // Don't require EOF here, as "Clients ... should not assume packets to
        // be of a certain size"
        Ok(UdpConnectionResponse { connection_id })
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
struct UdpScrapeRequest<'a> {
    connection_id: u64,
    transaction_id: u32,
    hashes: &'a [InfoHash],
}

impl From<UdpScrapeRequest<'_>> for Bytes {
    fn from(req: UdpScrapeRequest<'_>) -> Bytes {
        let mut buf = BytesMut::with_capacity(16 + InfoHash::LENGTH * req.hashes.len());
        buf.put_u64(req.connection_id);
        buf.put_u32(SCRAPE_ACTION);
        buf.put_u32(req.transaction_id);
        for ih in req.hashes {
            buf.put_slice(ih.as_bytes());
        }
        buf.freeze()
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
struct UdpScrapeResponse {
    seeders: Vec<u32>,
}

impl UdpScrapeResponse {
    /// Parse a scrape reply that must contain exactly `expected` entries
    fn from_bytes(buf: Bytes, expected: usize) -> Result<Self, UdpTrackerError> {
        let mut buf = TryBytes::from(buf);
        let action = buf.try_get::<u32>()?;
        if action != SCRAPE_ACTION {
            return Err(UdpTrackerError::BadAction {
                expected: SCRAPE_ACTION,
                got: action,
            });
        }
        let _transaction_id = buf.try_get::<u32>()?;
        let entries = buf.try_get_all::<ScrapeEntry>()?;
        if entries.len() != expected {
            return Err(UdpTrackerError::EntryCount {
                expected,
                got: entries.len(),
            });
        }
        Ok(UdpScrapeResponse {
            seeders: entries.into_iter().map(|e| e.complete).collect(),
        })
    }
}

// Of the "complete", "downloaded", and "incomplete" fields, only "complete"
// (the number of seeders) is kept.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
struct ScrapeEntry {
    complete: u32,
}

impl TryFromBuf for ScrapeEntry {
    fn try_from_buf(buf: &mut Bytes) -> Result<ScrapeEntry, PacketError> {
        let complete = u32::try_from_buf(buf)?;
        let _downloaded = u32::try_from_buf(buf)?;
        let _incomplete = u32::try_from_buf(buf)?;
        Ok(ScrapeEntry { complete })
    }
}

#[derive(Debug, Error)]
pub(crate) enum UdpTrackerError {
    #[error("failed to resolve remote hostname")]
    Lookup(#[source] std::io::Error),
    #[error("remote hostname did not resolve to any IP addresses")]
    NoResolve,
    #[error("failed to bind UDP socket")]
    Bind(#[source] std::io::Error),
    #[error("failed to connect UDP socket")]
    Connect(#[source] std::io::Error),
    #[error("failed to send UDP packet")]
    Send(#[source] std::io::Error),
    #[error("failed to receive UDP packet")]
    Recv(#[source] std::io::Error),
    #[error("UDP tracker sent response with invalid length")]
    PacketLen(#[from] PacketError),
    #[error(
        "UDP tracker sent response with unexpected or unsupported action; expected {expected}, got {got}"
    )]
    BadAction { expected: u32, got: u32 },
    #[error(
        "response from UDP tracker did not contain expected transaction ID; expected {expected:#x}, got {got:#x}"
    )]
    XactionMismatch { expected: u32, got: u32 },
    #[error("UDP tracker reported on {got} info hashes; expected {expected}")]
    EntryCount { expected: usize, got: usize },
}
