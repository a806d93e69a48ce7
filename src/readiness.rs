//! Polling an HTTP endpoint until it answers with an acceptable status.

use crate::cancel::CancelToken;
use crate::error::{Error, Result, TimeoutKind};
use crate::progress::{Event, ProgressSink};
use log::trace;
use std::fmt;
use std::ops::RangeInclusive;
use std::time::{Duration, Instant};

pub const BOOT_INTERVAL: Duration = Duration::from_secs(10);
pub const BOOT_TIMEOUT: Duration = Duration::from_secs(600);
pub const HEALTH_INTERVAL: Duration = Duration::from_secs(5);
pub const HEALTH_TIMEOUT: Duration = Duration::from_secs(60);

/// Shortest per-request timeout, used when the deadline is about to pass.
const MIN_REQUEST_TIMEOUT: Duration = Duration::from_millis(200);

/// Which status codes count as "ready".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusAccept {
    Range(RangeInclusive<u16>),
    Exact(u16),
}

impl StatusAccept {
    pub fn accepts(&self, status: u16) -> bool {
        match self {
            Self::Range(range) => range.contains(&status),
            Self::Exact(code) => *code == status,
        }
    }
}

impl fmt::Display for StatusAccept {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Range(range) => write!(f, "{}-{}", range.start(), range.end()),
            Self::Exact(code) => write!(f, "{code}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitOptions {
    pub interval: Duration,
    pub timeout: Duration,
    pub accept: StatusAccept,
    pub kind: TimeoutKind,
}

impl WaitOptions {
    /// Waiting for a fresh host: any answer up to 503 means the web server
    /// is up, even if the app behind it is still starting.
    pub fn boot() -> Self {
        Self {
            interval: BOOT_INTERVAL,
            timeout: BOOT_TIMEOUT,
            accept: StatusAccept::Range(200..=503),
            kind: TimeoutKind::Readiness,
        }
    }

    /// Post-deploy health check: exactly 200.
    pub fn health(timeout: Duration, interval: Duration) -> Self {
        Self {
            interval,
            timeout,
            accept: StatusAccept::Exact(200),
            kind: TimeoutKind::HealthCheck,
        }
    }

    #[must_use]
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn accept(mut self, accept: StatusAccept) -> Self {
        self.accept = accept;
        self
    }
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self::boot()
    }
}

/// What one poll saw.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Observed {
    Status(u16),
    Unreachable(String),
}

impl fmt::Display for Observed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(code) => write!(f, "HTTP {code}"),
            Self::Unreachable(reason) => f.write_str(reason),
        }
    }
}

fn fetch_status(url: &str, timeout: Duration) -> Observed {
    let agent: ureq::Agent = ureq::Agent::config_builder()
        .http_status_as_error(false)
        .timeout_global(Some(timeout))
        .build()
        .into();
    match agent.get(url).call() {
        Ok(response) => Observed::Status(response.status().as_u16()),
        Err(err) => Observed::Unreachable(err.to_string()),
    }
}

fn deadline(start: Instant, timeout: Duration) -> Result<Instant> {
    start
        .checked_add(timeout)
        .ok_or_else(|| Error::config(format!("wait timeout of {}s is too long", timeout.as_secs())))
}

/// Blocks until endpoints answer, bounded by a timeout and by cancellation.
pub struct ReadinessWaiter<'a> {
    sink: &'a dyn ProgressSink,
    cancel: CancelToken,
}

impl<'a> ReadinessWaiter<'a> {
    pub fn new(sink: &'a dyn ProgressSink, cancel: CancelToken) -> Self {
        Self { sink, cancel }
    }

    /// Poll `url` every `opts.interval` until it answers with an accepted
    /// status. Returns the time waited.
    pub fn wait_until_ready(&self, url: &str, opts: &WaitOptions) -> Result<Duration> {
        let start = Instant::now();
        self.poll(url, opts, start, deadline(start, opts.timeout)?)?;
        Ok(start.elapsed())
    }

    /// Wait for every URL in turn. All of them share one deadline, so the
    /// whole wait is bounded by `opts.timeout`.
    pub fn wait_all<S: AsRef<str>>(&self, urls: &[S], opts: &WaitOptions) -> Result<Duration> {
        let start = Instant::now();
        let deadline = deadline(start, opts.timeout)?;
        for url in urls {
            self.poll(url.as_ref(), opts, start, deadline)?;
        }
        Ok(start.elapsed())
    }

    fn poll(&self, url: &str, opts: &WaitOptions, start: Instant, deadline: Instant) -> Result<()> {
        let mut attempt = 0u32;
        loop {
            self.cancel.check()?;
            attempt += 1;

            let remaining = deadline.saturating_duration_since(Instant::now());
            let observed = fetch_status(url, remaining.max(MIN_REQUEST_TIMEOUT));
            trace!("{url} attempt {attempt}: {observed}");

            if let Observed::Status(code) = observed
                && opts.accept.accepts(code)
            {
                self.sink.emit(&Event::Ready {
                    url: url.to_string(),
                    elapsed: start.elapsed(),
                });
                return Ok(());
            }

            self.sink.emit(&Event::WaitAttempt {
                url: url.to_string(),
                attempt,
                observed: observed.to_string(),
            });

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::Timeout {
                    kind: opts.kind,
                    url: url.to_string(),
                    elapsed: start.elapsed(),
                    last_status: Some(observed.to_string()),
                });
            }
            self.cancel.sleep(opts.interval.min(remaining))?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::RecordingSink;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    /// Answer each connection with the next status; the last one repeats.
    fn serve(statuses: Vec<u16>) -> String {
        serve_after(Duration::ZERO, statuses)
    }

    /// Like `serve`, but hold every response back by `delay`.
    fn serve_after(delay: Duration, statuses: Vec<u16>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            let mut statuses = statuses.into_iter();
            let mut status = 200;
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { break };
                status = statuses.next().unwrap_or(status);
                let mut request = Vec::new();
                let mut buf = [0u8; 512];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut buf) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                thread::sleep(delay);
                let _ = write!(
                    stream,
                    "HTTP/1.1 {status} Status\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                );
            }
        });
        format!("http://{addr}/")
    }

    fn closed_port() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{addr}/")
    }

    fn fast(opts: WaitOptions) -> WaitOptions {
        opts.interval(Duration::from_millis(50))
            .timeout(Duration::from_millis(500))
    }

    #[test]
    fn test_boot_accepts_service_unavailable() {
        let url = serve(vec![503]);
        let sink = RecordingSink::default();
        let waiter = ReadinessWaiter::new(&sink, CancelToken::new());

        waiter.wait_until_ready(&url, &fast(WaitOptions::boot())).unwrap();
        assert!(matches!(sink.events().last(), Some(Event::Ready { .. })));
    }

    #[test]
    fn test_health_retries_until_ok() {
        let url = serve(vec![502, 502, 200]);
        let sink = RecordingSink::default();
        let waiter = ReadinessWaiter::new(&sink, CancelToken::new());
        let opts = WaitOptions::health(Duration::from_secs(5), Duration::from_millis(20));

        waiter.wait_until_ready(&url, &opts).unwrap();
        let attempts = sink
            .events()
            .iter()
            .filter(|e| matches!(e, Event::WaitAttempt { .. }))
            .count();
        assert_eq!(attempts, 2);
    }

    #[test]
    fn test_slow_response_within_deadline_is_accepted() {
        let url = serve_after(Duration::from_millis(300), vec![200]);
        let sink = RecordingSink::default();
        let waiter = ReadinessWaiter::new(&sink, CancelToken::new());
        let opts = WaitOptions::health(Duration::from_secs(5), Duration::from_millis(50));

        waiter.wait_until_ready(&url, &opts).unwrap();
        assert!(matches!(sink.events().last(), Some(Event::Ready { .. })));
    }

    #[test]
    fn test_overlong_timeout_is_rejected() {
        let sink = RecordingSink::default();
        let waiter = ReadinessWaiter::new(&sink, CancelToken::new());
        let opts = WaitOptions::boot().timeout(Duration::from_secs(u64::MAX));

        let err = waiter.wait_until_ready(&closed_port(), &opts).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_timeout_is_bounded() {
        let url = serve(vec![500]);
        let sink = RecordingSink::default();
        let waiter = ReadinessWaiter::new(&sink, CancelToken::new());
        let opts = WaitOptions::health(Duration::from_millis(300), Duration::from_millis(100));

        let start = Instant::now();
        let err = waiter.wait_until_ready(&url, &opts).unwrap_err();
        assert!(start.elapsed() < Duration::from_millis(300 + 100 + 500));
        match err {
            Error::Timeout {
                kind, last_status, ..
            } => {
                assert_eq!(kind, TimeoutKind::HealthCheck);
                assert_eq!(last_status.as_deref(), Some("HTTP 500"));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[test]
    fn test_unreachable_host_times_out() {
        let sink = RecordingSink::default();
        let waiter = ReadinessWaiter::new(&sink, CancelToken::new());
        let err = waiter
            .wait_until_ready(&closed_port(), &fast(WaitOptions::boot()))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Timeout {
                kind: TimeoutKind::Readiness,
                last_status: Some(_),
                ..
            }
        ));
        assert_eq!(err.exit_code(), 4);
    }

    #[test]
    fn test_cancel_stops_wait() {
        let sink = RecordingSink::default();
        let cancel = CancelToken::new();
        let waiter = ReadinessWaiter::new(&sink, cancel.clone());
        let remote = cancel.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            remote.cancel();
        });

        let opts = WaitOptions::boot().interval(Duration::from_secs(30));
        let start = Instant::now();
        let err = waiter.wait_until_ready(&closed_port(), &opts).unwrap_err();
        handle.join().unwrap();

        assert!(matches!(err, Error::Cancelled));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_wait_all_shares_deadline() {
        let ok = serve(vec![200]);
        let sink = RecordingSink::default();
        let waiter = ReadinessWaiter::new(&sink, CancelToken::new());
        let opts = WaitOptions::health(Duration::from_millis(400), Duration::from_millis(50));

        waiter.wait_all(&[ok.clone(), ok.clone()], &opts).unwrap();

        let start = Instant::now();
        let err = waiter.wait_all(&[ok, closed_port()], &opts).unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
        assert!(start.elapsed() < Duration::from_millis(400 + 50 + 500));
    }

    #[test]
    fn test_status_accept() {
        let boot = WaitOptions::boot().accept;
        assert!(boot.accepts(200));
        assert!(boot.accepts(503));
        assert!(!boot.accepts(504));
        assert!(!boot.accepts(199));
        assert!(StatusAccept::Exact(200).accepts(200));
        assert!(!StatusAccept::Exact(200).accepts(204));
        assert_eq!(boot.to_string(), "200-503");
    }
}
