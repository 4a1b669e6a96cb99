// Latency probing: one connectivity check per attempt, retried under a paced policy.

use std::future::Future;
use std::time::Duration;

use reqwest::{Proxy, StatusCode, Url};
use shadowsocks::ProxyClientStream;
use shadowsocks::config::{ServerConfig, ServerType};
use shadowsocks::context::Context;
use shadowsocks::relay::socks5::Address;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::models::{FAILED_LATENCY, Target};
use crate::version::user_agent;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("invalid locator: {0}")]
    InvalidLocator(String),
    #[error("check url {0:?} cannot be fetched through a shadowsocks tunnel")]
    UnsupportedCheckUrl(String),
    #[error("build client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("tunnel connect failed: {0}")]
    Tunnel(#[source] std::io::Error),
    #[error("tunnel i/o failed: {0}")]
    Io(#[source] std::io::Error),
    #[error("malformed response status line {0:?}")]
    MalformedResponse(String),
    #[error("no response within {0:?}")]
    Timeout(Duration),
    #[error("returned {0} but not 204")]
    UnexpectedStatus(StatusCode),
}

/// Result of a single attempt. `rt_ms` is meaningful even on failure when the
/// request got as far as being sent; otherwise it is [`FAILED_LATENCY`].
#[derive(Debug)]
pub struct ProbeReport {
    pub rt_ms: i32,
    pub error: Option<ProbeError>,
}

impl ProbeReport {
    pub fn ok(rt_ms: i32) -> Self {
        Self { rt_ms, error: None }
    }

    pub fn failed(rt_ms: i32, error: ProbeError) -> Self {
        Self {
            rt_ms,
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// One measurement attempt against a locator. Implementations bound their own
/// connect and response time.
pub trait ProbeRunner: Send + Sync + 'static {
    fn probe(&self, locator: &str) -> impl Future<Output = ProbeReport> + Send;
}

/// Connectivity check routed through the target's proxy: GET `check_url`, expect 204.
///
/// `ss://method:password@host:port` locators go through a shadowsocks tunnel;
/// everything else (`http`, `https`, `socks5`) is handed to reqwest as a proxy.
#[derive(Debug, Clone)]
pub struct ConnectivityProbe {
    check_url: String,
    connect_timeout: Duration,
    response_timeout: Duration,
}

impl ConnectivityProbe {
    pub fn new(
        check_url: impl Into<String>,
        connect_timeout: Duration,
        response_timeout: Duration,
    ) -> Self {
        Self {
            check_url: check_url.into(),
            connect_timeout,
            response_timeout,
        }
    }

    fn client_for(&self, locator: &str) -> Result<reqwest::Client, ProbeError> {
        let proxy = Proxy::all(locator).map_err(|e| ProbeError::InvalidLocator(e.to_string()))?;
        reqwest::Client::builder()
            .proxy(proxy)
            .user_agent(user_agent())
            .connect_timeout(self.connect_timeout)
            .build()
            .map_err(ProbeError::Client)
    }

    async fn via_proxy(&self, locator: &str) -> ProbeReport {
        let client = match self.client_for(locator) {
            Ok(c) => c,
            Err(e) => return ProbeReport::failed(FAILED_LATENCY, e),
        };
        let limit = self.connect_timeout + self.response_timeout;
        let start = Instant::now();
        let response = tokio::time::timeout(limit, client.get(&self.check_url).send()).await;
        let rt_ms = elapsed_ms(start);
        match response {
            Err(_) => ProbeReport::failed(rt_ms, ProbeError::Timeout(limit)),
            Ok(Err(e)) => ProbeReport::failed(rt_ms, ProbeError::Transport(e)),
            Ok(Ok(r)) if r.status() == StatusCode::NO_CONTENT => ProbeReport::ok(rt_ms),
            Ok(Ok(r)) => ProbeReport::failed(rt_ms, ProbeError::UnexpectedStatus(r.status())),
        }
    }

    /// Dials the shadowsocks server, then times one plain HTTP/1.1 exchange
    /// through the tunnel. The timer starts after the server is connected.
    async fn via_shadowsocks(&self, locator: &str) -> ProbeReport {
        let server = match ServerConfig::from_url(locator) {
            Ok(s) => s,
            Err(e) => {
                return ProbeReport::failed(
                    FAILED_LATENCY,
                    ProbeError::InvalidLocator(format!("{e:?}")),
                );
            }
        };
        let check = match CheckRequest::parse(&self.check_url) {
            Ok(c) => c,
            Err(e) => return ProbeReport::failed(FAILED_LATENCY, e),
        };

        let context = Context::new_shared(ServerType::Local);
        let target = Address::DomainNameAddress(check.host.clone(), check.port);
        let connect = ProxyClientStream::connect(context, &server, target);
        let stream = match tokio::time::timeout(self.connect_timeout, connect).await {
            Err(_) => {
                return ProbeReport::failed(
                    FAILED_LATENCY,
                    ProbeError::Timeout(self.connect_timeout),
                );
            }
            Ok(Err(e)) => return ProbeReport::failed(FAILED_LATENCY, ProbeError::Tunnel(e)),
            Ok(Ok(s)) => s,
        };

        let start = Instant::now();
        let exchange = check.send(Box::pin(stream));
        let status = tokio::time::timeout(self.response_timeout, exchange).await;
        let rt_ms = elapsed_ms(start);
        match status {
            Err(_) => ProbeReport::failed(rt_ms, ProbeError::Timeout(self.response_timeout)),
            Ok(Err(e)) => ProbeReport::failed(rt_ms, e),
            Ok(Ok(StatusCode::NO_CONTENT)) => ProbeReport::ok(rt_ms),
            Ok(Ok(status)) => ProbeReport::failed(rt_ms, ProbeError::UnexpectedStatus(status)),
        }
    }
}

impl ProbeRunner for ConnectivityProbe {
    async fn probe(&self, locator: &str) -> ProbeReport {
        if locator.starts_with("ss://") {
            self.via_shadowsocks(locator).await
        } else {
            self.via_proxy(locator).await
        }
    }
}

/// The check URL split into what a raw HTTP/1.1 request over a tunnel needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckRequest {
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl CheckRequest {
    /// Only plain `http` URLs are accepted; the tunnel carries no TLS.
    pub fn parse(check_url: &str) -> Result<Self, ProbeError> {
        let unsupported = || ProbeError::UnsupportedCheckUrl(check_url.to_string());
        let url = Url::parse(check_url).map_err(|_| unsupported())?;
        if url.scheme() != "http" {
            return Err(unsupported());
        }
        let host = url.host_str().ok_or_else(unsupported)?.to_string();
        let port = url.port_or_known_default().unwrap_or(80);
        let path = match url.query() {
            Some(q) => format!("{}?{}", url.path(), q),
            None => url.path().to_string(),
        };
        Ok(Self { host, port, path })
    }

    pub fn to_request(&self) -> String {
        let host = if self.port == 80 {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        };
        format!(
            "GET {} HTTP/1.1\r\nHost: {}\r\nUser-Agent: {}\r\nConnection: close\r\n\r\n",
            self.path,
            host,
            user_agent()
        )
    }

    /// Writes the request and reads back the response status.
    pub async fn send<S>(&self, stream: S) -> Result<StatusCode, ProbeError>
    where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
    {
        let mut stream = BufReader::new(stream);
        stream
            .write_all(self.to_request().as_bytes())
            .await
            .map_err(ProbeError::Io)?;
        stream.flush().await.map_err(ProbeError::Io)?;
        let mut line = String::new();
        stream.read_line(&mut line).await.map_err(ProbeError::Io)?;
        parse_status_line(&line)
    }
}

/// `HTTP/1.1 204 No Content` -> 204.
pub fn parse_status_line(line: &str) -> Result<StatusCode, ProbeError> {
    let malformed = || ProbeError::MalformedResponse(line.trim_end().to_string());
    let mut parts = line.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some(version), Some(code)) if version.starts_with("HTTP/") => {
            StatusCode::from_bytes(code.as_bytes()).map_err(|_| malformed())
        }
        _ => Err(malformed()),
    }
}

fn elapsed_ms(start: Instant) -> i32 {
    i32::try_from(start.elapsed().as_millis()).unwrap_or(i32::MAX)
}

/// Bounded attempts, each paced to start no sooner than `pacing` after the previous one began.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub pacing: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            pacing: Duration::from_secs(15),
        }
    }
}

impl RetryPolicy {
    /// Whole seconds left until `pacing` has passed since the attempt began.
    /// Elapsed time is truncated to whole seconds; zero means retry immediately.
    pub fn retry_delay(&self, attempt_elapsed: Duration) -> Duration {
        let remain = self.pacing.as_secs() as i64 - attempt_elapsed.as_secs() as i64;
        Duration::from_secs(remain.max(0) as u64)
    }
}

/// Final outcome for one target in one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub rt_ms: i32,
    pub ok: bool,
    pub attempts: u32,
}

/// Probes `target` until one attempt succeeds or the policy runs out of attempts.
/// On exhaustion the last attempt's latency is returned.
pub async fn probe_with_retry<P: ProbeRunner>(
    runner: &P,
    target: &Target,
    policy: &RetryPolicy,
) -> ProbeOutcome {
    let mut rt_ms = FAILED_LATENCY;
    let max_attempts = policy.max_attempts.max(1);
    for attempt in 1..=max_attempts {
        let started = Instant::now();
        let report = runner.probe(&target.locator).await;
        rt_ms = report.rt_ms;
        let Some(error) = report.error else {
            info!(site = %target.name, attempt, rt_ms, "probe ok");
            return ProbeOutcome {
                rt_ms,
                ok: true,
                attempts: attempt,
            };
        };
        if attempt == max_attempts {
            info!(site = %target.name, attempt, rt_ms, error = %error, "probe failed; attempts exhausted");
            break;
        }
        let delay = policy.retry_delay(started.elapsed());
        info!(
            site = %target.name,
            attempt,
            rt_ms,
            error = %error,
            retry_in_secs = delay.as_secs(),
            "probe failed"
        );
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        } else {
            debug!(site = %target.name, "attempt used the whole pacing window; retrying now");
        }
    }
    ProbeOutcome {
        rt_ms,
        ok: false,
        attempts: max_attempts,
    }
}
