use std::time::Duration;

/// Trackers queried when none are given on the command line
pub(crate) static DEFAULT_TRACKERS: &[&str] = &[
    "udp://tracker.opentrackr.org:1337/announce",
    "http://tracker.internetwarriors.net:1337/announce",
    "udp://exodus.desync.com:6969/announce",
    "udp://tracker.cyberia.is:6969/announce",
    "udp://explodie.org:6969/announce",
    "udp://opentracker.i2p.rocks:6969/announce",
    "udp://47.ip-51-68-199.eu:6969/announce",
    "http://open.acgnxtracker.com:80/announce",
    "udp://tracker.tiny-vps.com:6969/announce",
    "udp://www.torrent.eu.org:451/announce",
    "udp://tracker.torrent.eu.org:451/announce",
    "udp://tracker.ds.is:6969/announce",
    "udp://retracker.lanta-net.ru:2710/announce",
    "udp://open.stealth.si:80/announce",
    "udp://ipv4.tracker.harry.lu:80/announce",
    "udp://tracker.dler.org:6969/announce",
    "http://rt.tace.ru:80/announce",
    "udp://cdn-2.gamecoast.org:6969/announce",
    "udp://cdn-1.gamecoast.org:6969/announce",
    "udp://valakas.rollo.dnsabr.com:2710/announce",
];

/// Time allowed for each individual tracker operation (UDP connect, UDP
/// scrape, HTTP request)
pub(crate) const DEFAULT_DEADLINE: Duration = Duration::from_secs(1);

/// Number of info hashes to send in a single UDP scrape request.  BEP 15
/// gives this as the most that fits in a typical MTU.
pub(crate) const DEFAULT_UDP_CHUNK_SIZE: usize = 74;

/// Size of buffer for receiving incoming UDP packets.  Any packets longer than
/// this are truncated.
pub(crate) const UDP_PACKET_LEN: usize = 65535;

/// Largest payload that can be sent in a single UDP datagram over IPv4
/// (65535 minus the 20-byte IP header and 8-byte UDP header)
pub(crate) const MAX_UDP_PAYLOAD_LEN: usize = 65507;

/// Largest number of info hashes whose UDP scrape request (16 + 20N bytes)
/// can be sent in one datagram.  The reply (8 + 12N bytes) is always smaller.
pub(crate) const MAX_UDP_CHUNK_SIZE: usize = (MAX_UDP_PAYLOAD_LEN - 16) / 20;

pub(crate) static USER_AGENT: &str = concat!(
    env!("CARGO_PKG_NAME"),
    "/",
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("CARGO_PKG_REPOSITORY"),
    ")",
);
