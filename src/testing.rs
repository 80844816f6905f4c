//! In-process fake trackers for exercising the scrape clients
use crate::infohash::InfoHash;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::task::JoinHandle;

const PROTOCOL_ID: u64 = 0x41727101980;
const CONNECTION_ID: u64 = 0x0123_4567_89AB_CDEF;

/// How a `MockUdpTracker` answers a scrape request
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum MockReply {
    /// Reply with these "complete" values (which need not match the number
    /// of hashes requested)
    Seeders(Vec<u32>),
    /// Reply as with `Seeders`, but with the wrong transaction ID
    WrongTransaction(Vec<u32>),
    /// Reply with an error action and this message
    Error(String),
    /// Don't reply to the scrape request at all
    Silent,
}

#[derive(Debug, Default)]
struct UdpLog {
    packets: usize,
    scrape_sizes: Vec<usize>,
}

/// A BEP 15 tracker on a localhost UDP port.  Connection requests are always
/// answered; scrape requests are answered according to a callback.
#[derive(Debug)]
pub(crate) struct MockUdpTracker {
    addr: SocketAddr,
    log: Arc<Mutex<UdpLog>>,
    task: JoinHandle<()>,
}

impl MockUdpTracker {
    pub(crate) async fn spawn<F>(respond: F) -> MockUdpTracker
    where
        F: Fn(&[InfoHash]) -> MockReply + Send + 'static,
    {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let log = Arc::new(Mutex::new(UdpLog::default()));
        let task_log = Arc::clone(&log);
        let task = tokio::spawn(async move {
            let mut buf = vec![0u8; 65535];
            while let Ok((n, peer)) = socket.recv_from(&mut buf).await {
                task_log.lock().unwrap().packets += 1;
                if let Some(reply) = handle_udp_packet(&buf[..n], &respond, &task_log) {
                    let _ = socket.send_to(&reply, peer).await;
                }
            }
        });
        MockUdpTracker { addr, log, task }
    }

    pub(crate) fn url(&self) -> String {
        format!("udp://{}/announce", self.addr)
    }

    pub(crate) fn packets_received(&self) -> usize {
        self.log.lock().unwrap().packets
    }

    /// The number of info hashes in each scrape request received, in order
    pub(crate) fn scrape_sizes(&self) -> Vec<usize> {
        self.log.lock().unwrap().scrape_sizes.clone()
    }
}

impl Drop for MockUdpTracker {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn handle_udp_packet<F>(packet: &[u8], respond: &F, log: &Mutex<UdpLog>) -> Option<Vec<u8>>
where
    F: Fn(&[InfoHash]) -> MockReply,
{
    if packet.len() < 16 {
        return None;
    }
    let head = u64::from_be_bytes(packet[0..8].try_into().unwrap());
    let action = u32::from_be_bytes(packet[8..12].try_into().unwrap());
    let transaction_id = u32::from_be_bytes(packet[12..16].try_into().unwrap());
    let mut reply = Vec::new();
    if head == PROTOCOL_ID && action == 0 {
        reply.extend_from_slice(&0u32.to_be_bytes());
        reply.extend_from_slice(&transaction_id.to_be_bytes());
        reply.extend_from_slice(&CONNECTION_ID.to_be_bytes());
        return Some(reply);
    }
    if head != CONNECTION_ID || action != 2 {
        reply.extend_from_slice(&3u32.to_be_bytes());
        reply.extend_from_slice(&transaction_id.to_be_bytes());
        reply.extend_from_slice(b"bad request");
        return Some(reply);
    }
    let hashes = packet[16..]
        .chunks(InfoHash::LENGTH)
        .map(|c| InfoHash::try_from(c).unwrap())
        .collect::<Vec<_>>();
    log.lock().unwrap().scrape_sizes.push(hashes.len());
    let (transaction_id, seeders) = match respond(&hashes) {
        MockReply::Seeders(s) => (transaction_id, s),
        MockReply::WrongTransaction(s) => (transaction_id.wrapping_add(1), s),
        MockReply::Error(msg) => {
            reply.extend_from_slice(&3u32.to_be_bytes());
            reply.extend_from_slice(&transaction_id.to_be_bytes());
            reply.extend_from_slice(msg.as_bytes());
            return Some(reply);
        }
        MockReply::Silent => return None,
    };
    reply.extend_from_slice(&2u32.to_be_bytes());
    reply.extend_from_slice(&transaction_id.to_be_bytes());
    for s in seeders {
        reply.extend_from_slice(&s.to_be_bytes());
        reply.extend_from_slice(&0u32.to_be_bytes());
        reply.extend_from_slice(&0u32.to_be_bytes());
    }
    Some(reply)
}

/// An HTTP tracker on a localhost TCP port that answers every request with
/// the same status and body
#[derive(Debug)]
pub(crate) struct MockHttpTracker {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<String>>>,
    task: JoinHandle<()>,
}

impl MockHttpTracker {
    pub(crate) async fn spawn(status: u16, body: &'static [u8]) -> MockHttpTracker {
        MockHttpTracker::start(Some((status, body))).await
    }

    /// Accept connections but never respond
    pub(crate) async fn spawn_silent() -> MockHttpTracker {
        MockHttpTracker::start(None).await
    }

    async fn start(response: Option<(u16, &'static [u8])>) -> MockHttpTracker {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let task_requests = Arc::clone(&requests);
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let requests = Arc::clone(&task_requests);
                tokio::spawn(serve_http(stream, requests, response));
            }
        });
        MockHttpTracker {
            addr,
            requests,
            task,
        }
    }

    pub(crate) fn announce_url(&self) -> String {
        format!("http://{}/announce", self.addr)
    }

    /// The request targets (path and query) received so far
    pub(crate) fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

impl Drop for MockHttpTracker {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve_http(
    mut stream: TcpStream,
    requests: Arc<Mutex<Vec<String>>>,
    response: Option<(u16, &'static [u8])>,
) {
    let mut received = Vec::new();
    let mut buf = [0u8; 4096];
    while !received.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => received.extend_from_slice(&buf[..n]),
        }
    }
    let head = String::from_utf8_lossy(&received).into_owned();
    if let Some(target) = head.split_whitespace().nth(1) {
        requests.lock().unwrap().push(target.to_owned());
    }
    let Some((status, body)) = response else {
        tokio::time::sleep(Duration::from_secs(60)).await;
        return;
    };
    let header = format!(
        "HTTP/1.1 {status} Mock\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    let _ = stream.write_all(header.as_bytes()).await;
    let _ = stream.write_all(body).await;
    let _ = stream.shutdown().await;
}
