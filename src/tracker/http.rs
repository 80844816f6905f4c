use super::{ScrapeError, TrackerUrlError};
use crate::infohash::InfoHash;
use crate::util::{UnbencodeError, decode_bencode};
use bendy::decoding::{Error as BendyError, FromBencode, Object, ResultExt};
use reqwest::{Client, StatusCode};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct HttpTracker(Url);

impl HttpTracker {
    pub(crate) fn url_string(&self) -> String {
        self.0.to_string()
    }

    /// Derive the scrape URL for `hashes` from the announce URL by replacing
    /// "announce" in the path with "scrape" and appending one `info_hash`
    /// parameter per hash, in order
    pub(crate) fn scrape_url(&self, hashes: &[InfoHash]) -> Url {
        let mut url = self.0.clone();
        url.set_path(&url.path().replace("announce", "scrape"));
        url.set_fragment(None);
        for ih in hashes {
            ih.add_query_param(&mut url);
        }
        url
    }

    /// Perform a single scrape request for `hashes` and return the seeder
    /// count for each one, in order.  Hashes that the tracker did not report
    /// on (or reported on unintelligibly) get a count of zero.
    #[tracing::instrument(name = "scrape-http", skip_all, fields(tracker = %self.0, hashes = hashes.len()))]
    pub(crate) async fn scrape(
        &self,
        client: &Client,
        hashes: &[InfoHash],
        deadline: Duration,
    ) -> Result<Vec<u32>, ScrapeError> {
        let url = self.scrape_url(hashes);
        tracing::trace!(%url, "Sending scrape request");
        let resp = client
            .get(url)
            .timeout(deadline)
            .send()
            .await
            .map_err(|e| reqwest_error(e, HttpTrackerError::SendRequest))?;
        let status = resp.status();
        if status != StatusCode::OK {
            return Err(HttpTrackerError::HttpStatus(status).into());
        }
        let buf = resp
            .bytes()
            .await
            .map_err(|e| reqwest_error(e, HttpTrackerError::ReadBody))?;
        let files = decode_bencode::<HttpScrapeResponse>(&buf)
            .map_err(HttpTrackerError::ParseResponse)?
            .result()?;
        tracing::trace!(reported = files.len(), "Received scrape response");
        Ok(hashes
            .iter()
            .map(|ih| files.get(ih).copied().unwrap_or_default())
            .collect())
    }
}

fn reqwest_error(e: reqwest::Error, wrap: fn(reqwest::Error) -> HttpTrackerError) -> ScrapeError {
    if e.is_timeout() {
        ScrapeError::Timeout
    } else {
        ScrapeError::Http(wrap(e))
    }
}

impl fmt::Display for HttpTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Tracker {}>", self.0)
    }
}

impl TryFrom<Url> for HttpTracker {
    type Error = TrackerUrlError;

    fn try_from(url: Url) -> Result<HttpTracker, TrackerUrlError> {
        let sch = url.scheme();
        if sch != "http" && sch != "https" {
            return Err(TrackerUrlError::UnsupportedScheme(sch.into()));
        }
        if url.host().is_none() {
            return Err(TrackerUrlError::NoHost);
        }
        if !url.path().contains("announce") {
            return Err(TrackerUrlError::NoAnnounce);
        }
        Ok(HttpTracker(url))
    }
}

/// Seeder ("complete") counts keyed by info hash
type SeederMap = HashMap<InfoHash, u32>;

#[derive(Clone, Debug, Eq, PartialEq)]
enum HttpScrapeResponse {
    Success(SeederMap),
    Failure(String),
}

impl HttpScrapeResponse {
    fn result(self) -> Result<SeederMap, ScrapeError> {
        match self {
            HttpScrapeResponse::Success(files) => Ok(files),
            HttpScrapeResponse::Failure(msg) => Err(ScrapeError::Failure(msg)),
        }
    }
}

impl FromBencode for HttpScrapeResponse {
    fn decode_bencode_object(object: Object<'_, '_>) -> Result<Self, BendyError> {
        let mut files = None;
        let mut failure_reason = None;
        let mut dd = object.try_into_dictionary()?;
        while let Some(kv) = dd.next_pair()? {
            match kv {
                (b"files", val) => {
                    let mut filemap = HashMap::new();
                    let mut fdict = val.try_into_dictionary().context("files")?;
                    while let Some((k, v)) = fdict.next_pair().context("files")? {
                        // A bad entry only costs us that one hash.
                        let infohash = match InfoHash::try_from(k) {
                            Ok(ih) => ih,
                            Err(e) => {
                                tracing::trace!(error = %e, "Skipping files entry with bad key");
                                continue;
                            }
                        };
                        match decode_complete(v) {
                            Ok(Some(complete)) => {
                                filemap.insert(infohash, complete);
                            }
                            Ok(None) => {
                                tracing::trace!(%infohash, "files entry lacks \"complete\"");
                            }
                            Err(e) => {
                                tracing::trace!(%infohash, error = %e, "Skipping malformed files entry");
                            }
                        }
                    }
                    files = Some(filemap);
                }
                (b"failure reason", val) => {
                    failure_reason = Some(
                        String::from_utf8_lossy(val.try_into_bytes().context("failure reason")?)
                            .into_owned(),
                    );
                }
                _ => (),
            }
        }
        match (files, failure_reason) {
            (Some(files), None) => Ok(HttpScrapeResponse::Success(files)),
            (_, Some(fr)) => Ok(HttpScrapeResponse::Failure(fr)),
            (None, None) => Err(BendyError::missing_field("files")),
        }
    }
}

fn decode_complete(object: Object<'_, '_>) -> Result<Option<u32>, BendyError> {
    let mut complete = Ok(None);
    let mut vdict = object.try_into_dictionary().context("files.<value>")?;
    while let Some(kv) = vdict.next_pair().context("files.<value>")? {
        if let (b"complete", val) = kv {
            complete = u32::decode_bencode_object(val)
                .context("files.*.complete")
                .map(Some);
        }
    }
    complete
}

#[derive(Debug, Error)]
pub(crate) enum HttpTrackerError {
    #[error("failed to send request to HTTP tracker")]
    SendRequest(#[source] reqwest::Error),
    #[error("HTTP tracker responded with HTTP status {0}")]
    HttpStatus(StatusCode),
    #[error("failed to read HTTP tracker response")]
    ReadBody(#[source] reqwest::Error),
    #[error("failed to parse HTTP tracker response")]
    ParseResponse(#[source] UnbencodeError),
}
