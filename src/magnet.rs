use crate::infohash::InfoHash;
use crate::tracker::Tracker;
use url::form_urlencoded::byte_serialize;

/// Build a magnet link for `hash` that lists every tracker in `trackers`
pub(crate) fn magnet_link(hash: &InfoHash, trackers: &[Tracker]) -> String {
    let mut link = String::from("magnet:?xt=urn:btih:");
    link.push_str(&hash.to_string());
    for tr in trackers {
        link.push_str("&tr=");
        link.extend(byte_serialize(tr.url_string().as_bytes()));
    }
    link
}
