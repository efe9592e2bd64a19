//! Public lifecycle object: owns the scheduler, builds requests and hands
//! them to the transport.

use crate::collectors::{HostLoadSource, LoadSource};
use crate::config::Config;
use crate::errors::{DispatchError, ReporterError};
use crate::request::{RequestBuilder, RequestDescriptor, DEREGISTER_TIMEOUT, FLUSH_TIMEOUT, POLL_TIMEOUT};
use crate::scheduler::{Phase, Scheduler, WARMUP_DELAY};
use crate::transport::{HttpTransport, Transport};
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Options for [`Reporter::stop`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StopOptions {
    /// Send a final flush before signalling completion.
    pub flush: bool,
}

impl StopOptions {
    pub fn flush() -> Self {
        Self { flush: true }
    }
}

/// Result of [`Reporter::stop`].
#[derive(Debug)]
pub struct Stopped {
    /// Whether a pending schedule was cancelled.
    pub cancelled: bool,
    /// Resolves once the optional flush settled (immediately without one).
    pub completion: Completion,
}

/// Completion signal of a flush or deregistration.
///
/// Dropping it is fine; the request still runs to its outcome.
#[derive(Debug)]
pub struct Completion {
    rx: oneshot::Receiver<Result<(), DispatchError>>,
}

impl Completion {
    fn ready(outcome: Result<(), DispatchError>) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(outcome);
        Self { rx }
    }
}

impl Future for Completion {
    type Output = Result<(), DispatchError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(DispatchError::Abandoned)))
    }
}

pub struct ReporterBuilder {
    config: Config,
    source: Option<Arc<dyn LoadSource>>,
    transport: Option<Arc<dyn Transport>>,
    warmup: Duration,
    timeouts: (Duration, Duration, Duration),
}

impl ReporterBuilder {
    /// Replace the host metrics source.
    pub fn source(mut self, source: Arc<dyn LoadSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Replace the HTTP transport.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn warmup(mut self, warmup: Duration) -> Self {
        self.warmup = warmup;
        self
    }

    pub fn timeouts(mut self, poll: Duration, flush: Duration, deregister: Duration) -> Self {
        self.timeouts = (poll, flush, deregister);
        self
    }

    /// Build the reporter and arm the warm-up timer. Nothing is sent before
    /// the warm-up elapses. Must be called within a tokio runtime.
    pub fn start(self) -> Result<Reporter, ReporterError> {
        let runtime = Handle::try_current().map_err(|_| ReporterError::NoRuntime)?;

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(&self.config)?),
        };
        let source: Arc<dyn LoadSource> = match self.source {
            Some(source) => source,
            None => Arc::new(HostLoadSource::new(self.config.memory_source())),
        };

        let (poll, flush, deregister) = self.timeouts;
        let requests = RequestBuilder::new(&self.config).with_timeouts(poll, flush, deregister);
        let scheduler = Scheduler::new(self.config.interval()).with_warmup(self.warmup);

        let inner = Arc::new(Inner {
            config: self.config,
            requests,
            source,
            transport,
            scheduler: Mutex::new(scheduler),
            gate: tokio::sync::Mutex::new(()),
            runtime,
        });

        inner
            .scheduler
            .lock()
            .start(|delay, generation| Inner::arm(&inner, delay, generation));

        info!(
            probe = inner.config.probe_id(),
            node = inner.config.node_id(),
            replica = inner.config.replica_id(),
            interval_secs = inner.config.interval_secs(),
            memory_source = %inner.config.memory_source(),
            warmup_ms = self.warmup.as_millis() as u64,
            "reporter started"
        );

        Ok(Reporter { inner })
    }
}

/// Periodically reports host load for one probe/node/replica.
///
/// Dropping the reporter halts scheduling without any network traffic; use
/// [`Reporter::stop`] or [`Reporter::destroy`] to flush or deregister.
pub struct Reporter {
    inner: Arc<Inner>,
}

struct Inner {
    config: Config,
    requests: RequestBuilder,
    source: Arc<dyn LoadSource>,
    transport: Arc<dyn Transport>,
    scheduler: Mutex<Scheduler<JoinHandle<()>>>,
    /// held for the duration of every network call
    gate: tokio::sync::Mutex<()>,
    runtime: Handle,
}

impl Reporter {
    /// Start a reporter with the host metrics source and HTTP transport.
    pub fn new(config: Config) -> Result<Self, ReporterError> {
        Self::builder(config).start()
    }

    pub fn builder(config: Config) -> ReporterBuilder {
        ReporterBuilder {
            config,
            source: None,
            transport: None,
            warmup: WARMUP_DELAY,
            timeouts: (POLL_TIMEOUT, FLUSH_TIMEOUT, DEREGISTER_TIMEOUT),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn phase(&self) -> Phase {
        self.inner.scheduler.lock().phase()
    }

    pub fn is_halted(&self) -> bool {
        self.inner.scheduler.lock().is_halted()
    }

    /// Stop reporting.
    ///
    /// `cancelled` tells whether a pending schedule existed. A poll already in
    /// flight is left to finish but nothing is scheduled after it. With
    /// `flush`, a final flush is sent and the completion resolves with its
    /// outcome; otherwise the completion is already resolved.
    pub fn stop(&self, options: StopOptions) -> Stopped {
        let cancelled = self.inner.scheduler.lock().stop();
        debug!(cancelled, flush = options.flush, "reporter stopping");

        let completion = if options.flush {
            let request = self.inner.requests.flush();
            self.inner.spawn_final(request)
        } else {
            Completion::ready(Ok(()))
        };

        Stopped {
            cancelled,
            completion,
        }
    }

    /// Halt scheduling and deregister this replica from the endpoint.
    ///
    /// The deregistration is always sent, whatever state the reporter is in.
    pub fn destroy(&self) -> Completion {
        let cancelled = self.inner.scheduler.lock().stop();
        debug!(cancelled, "reporter destroying");

        match self.inner.requests.deregister() {
            Ok(request) => self.inner.spawn_final(request),
            Err(e) => Completion::ready(Err(e)),
        }
    }
}

impl Drop for Reporter {
    fn drop(&mut self) {
        self.inner.scheduler.lock().stop();
    }
}

impl Inner {
    fn arm(this: &Arc<Self>, delay: Duration, generation: u64) -> JoinHandle<()> {
        let weak = Arc::downgrade(this);
        this.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                inner.fire(generation).await;
            }
        })
    }

    async fn fire(self: Arc<Self>, generation: u64) {
        let dispatch = self.scheduler.lock().on_timer_fire(generation);
        if !dispatch {
            debug!(generation, "stale timer ignored");
            return;
        }

        let outcome = self.poll().await;
        let failed = outcome.is_err();

        let next = self
            .scheduler
            .lock()
            .on_dispatch_outcome(failed, |delay, generation| Self::arm(&self, delay, generation));

        match (outcome, next) {
            (Ok(()), Some(delay)) => {
                debug!(delay_ms = delay.as_millis() as u64, "poll reported");
            }
            (Err(e), Some(delay)) => {
                warn!(error = %e, delay_ms = delay.as_millis() as u64, "poll failed, retrying sooner");
            }
            (Ok(()), None) => debug!("poll reported, reporter halted"),
            (Err(e), None) => warn!(error = %e, "poll failed, reporter halted"),
        }
    }

    async fn poll(&self) -> Result<(), DispatchError> {
        let load = self.source.sample().await?;
        debug!(source = self.source.name(), cpu = load.cpu, ram = load.ram, "load sampled");
        let request = self.requests.poll(load)?;
        self.dispatch(&request).await
    }

    async fn dispatch(&self, request: &RequestDescriptor) -> Result<(), DispatchError> {
        let _gate = self.gate.lock().await;
        debug!(kind = %request.kind, method = %request.method, path = %request.path, "dispatching");
        self.transport.send(request).await
    }

    /// Send a flush or deregistration in the background and signal its outcome.
    fn spawn_final(self: &Arc<Self>, request: RequestDescriptor) -> Completion {
        let (tx, rx) = oneshot::channel();
        let inner = Arc::clone(self);

        self.runtime.spawn(async move {
            let outcome = inner.dispatch(&request).await;
            match &outcome {
                Ok(()) => info!(kind = %request.kind, "final request acknowledged"),
                Err(e) => warn!(kind = %request.kind, error = %e, "final request failed"),
            }
            let _ = tx.send(outcome);
        });

        Completion { rx }
    }
}
