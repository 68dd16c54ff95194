//! Concurrent HEAD-probe link checker.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};
use url::Url;

use pagewise_shared::{BrokenLink, Link, LinkCheckConfig, PagewiseError, Result};

use crate::resolve::{Resolution, is_private_target, resolve_href};

/// User-Agent string for probe requests.
const USER_AGENT: &str = concat!("pagewise-linkcheck/", env!("CARGO_PKG_VERSION"));

/// Result of probing a single URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The target answered with a non-error status.
    Reachable(u16),
    /// The target answered with status >= 400.
    ErrorStatus(u16),
    /// No usable response (timeout, DNS, connection, redirect loop).
    Failed(String),
}

impl ProbeOutcome {
    pub fn is_broken(&self) -> bool {
        !matches!(self, Self::Reachable(_))
    }
}

/// Finds broken links by resolving hrefs and probing them with HEAD requests.
#[derive(Debug, Clone)]
pub struct LinkChecker {
    client: Client,
    concurrency: usize,
    overall_timeout: Duration,
    /// Probe loopback/private hosts (for integration tests with mock servers).
    allow_private_hosts: bool,
}

impl LinkChecker {
    /// Create a new checker with the given configuration.
    pub fn new(config: &LinkCheckConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PagewiseError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            concurrency: config.concurrency.max(1),
            overall_timeout: Duration::from_secs(config.overall_timeout_secs),
            allow_private_hosts: config.allow_private_hosts,
        })
    }

    /// Allow probing localhost/private IPs.
    pub fn allow_private_hosts(mut self) -> Self {
        self.allow_private_hosts = true;
        self
    }

    /// Probe one URL. Never fails; errors become [`ProbeOutcome::Failed`].
    pub async fn probe(&self, url: &Url) -> ProbeOutcome {
        probe_with(&self.client, url).await
    }

    /// Return the broken links among `links`, in input order.
    ///
    /// Relative hrefs are resolved against `base_url`. Non-web hrefs and
    /// private hosts (unless allowed) are skipped. A relative href with no
    /// base is reported broken without a probe. Each distinct URL is probed
    /// once. Fails only when all probes together exceed the overall deadline.
    #[instrument(skip_all, fields(links = links.len()))]
    pub async fn find_broken(&self, links: &[Link], base_url: Option<&Url>) -> Result<Vec<BrokenLink>> {
        tokio::time::timeout(self.overall_timeout, self.find_broken_inner(links, base_url))
            .await
            .map_err(|_| {
                PagewiseError::LinkCheck(format!(
                    "link probes exceeded the {}s deadline",
                    self.overall_timeout.as_secs()
                ))
            })
    }

    async fn find_broken_inner(&self, links: &[Link], base_url: Option<&Url>) -> Vec<BrokenLink> {
        let mut broken = Vec::new();

        // (link index, resolved URL) for every link that needs a probe.
        let mut targets: Vec<(usize, Url)> = Vec::new();
        for (i, link) in links.iter().enumerate() {
            match resolve_href(&link.href, base_url) {
                Resolution::Probe(url) => {
                    if !self.allow_private_hosts && is_private_target(&url) {
                        debug!(%url, "private host, not probing");
                        continue;
                    }
                    targets.push((i, url));
                }
                Resolution::Skip(why) => debug!(href = %link.href, why, "skipping link"),
                Resolution::Unresolvable => {
                    broken.push((
                        i,
                        BrokenLink {
                            href: link.href.clone(),
                            resolved: None,
                            text: link.content.clone(),
                            status: None,
                            reason: "unresolvable URL".into(),
                        },
                    ));
                }
            }
        }

        let outcomes = self.probe_all(targets.iter().map(|(_, url)| url)).await;

        for (i, url) in targets {
            let Some(outcome) = outcomes.get(url.as_str()) else {
                continue;
            };
            let (status, reason) = match outcome {
                ProbeOutcome::Reachable(_) => continue,
                ProbeOutcome::ErrorStatus(code) => (Some(*code), format!("HTTP {code}")),
                ProbeOutcome::Failed(msg) => (None, msg.clone()),
            };
            broken.push((
                i,
                BrokenLink {
                    href: links[i].href.clone(),
                    resolved: Some(url.to_string()),
                    text: links[i].content.clone(),
                    status,
                    reason,
                },
            ));
        }

        broken.sort_by_key(|(i, _)| *i);
        let broken: Vec<BrokenLink> = broken.into_iter().map(|(_, b)| b).collect();

        info!(checked = links.len(), broken = broken.len(), "link check completed");
        broken
    }

    /// Probe each distinct URL once, at most `concurrency` at a time.
    ///
    /// Probes live in a `JoinSet`, so dropping this future (overall deadline)
    /// aborts the ones still running.
    async fn probe_all<'a>(
        &self,
        urls: impl Iterator<Item = &'a Url>,
    ) -> HashMap<String, ProbeOutcome> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut probes = JoinSet::new();
        let mut outcomes = HashMap::new();

        for url in urls {
            if outcomes.contains_key(url.as_str()) {
                continue;
            }
            // Placeholder so duplicates are not spawned twice.
            outcomes.insert(url.to_string(), ProbeOutcome::Failed("not probed".into()));

            let client = self.client.clone();
            let sem = Arc::clone(&semaphore);
            let url = url.clone();
            probes.spawn(async move {
                let outcome = match sem.acquire_owned().await {
                    Ok(_permit) => probe_with(&client, &url).await,
                    Err(_) => ProbeOutcome::Failed("probe cancelled".into()),
                };
                (url, outcome)
            });
        }

        while let Some(joined) = probes.join_next().await {
            match joined {
                Ok((url, outcome)) => {
                    outcomes.insert(url.to_string(), outcome);
                }
                Err(e) => warn!(error = %e, "probe task failed"),
            }
        }

        outcomes
    }
}

async fn probe_with(client: &Client, url: &Url) -> ProbeOutcome {
    debug!(%url, "probing");
    match client.head(url.as_str()).send().await {
        Ok(resp) => {
            let status = resp.status();
            if status.as_u16() >= 400 {
                ProbeOutcome::ErrorStatus(status.as_u16())
            } else {
                ProbeOutcome::Reachable(status.as_u16())
            }
        }
        Err(e) if e.is_timeout() => ProbeOutcome::Failed("timed out".into()),
        Err(e) if e.is_connect() => ProbeOutcome::Failed(format!("connection failed: {e}")),
        Err(e) if e.is_redirect() => ProbeOutcome::Failed("too many redirects".into()),
        Err(e) => ProbeOutcome::Failed(e.to_string()),
    }
}
