//! Background location sampling.
//!
//! While on shift the app reports the driver's position on a fixed
//! interval. Samples are fire-and-forget: a failed send, a missing
//! position or an invalid session drops the sample silently and the
//! next tick tries again. Nothing is queued or retried; stale
//! positions are worthless.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::ApiError;
use crate::auth::Session;
use crate::models::{LocationSample, Position};

/// Interval between location samples
const SAMPLE_INTERVAL: Duration = Duration::from_secs(20);

/// Device position provider, injectable for tests.
#[async_trait]
pub trait PositionSource: Send + Sync {
    /// The current device position, or `None` when the platform cannot
    /// produce one right now (permission revoked, no fix yet).
    async fn current_position(&self) -> Option<Position>;
}

/// Transport for outbound samples, injectable for tests.
#[async_trait]
pub trait LocationSink: Send + Sync {
    async fn send_location(&self, sample: &LocationSample) -> Result<(), ApiError>;
}

/// Owns the background sampling task. Dropping the coordinator aborts
/// the task; `stop` does the same explicitly on logout.
pub struct LocationCoordinator<S, K> {
    source: Arc<S>,
    sink: Arc<K>,
    session: Arc<Mutex<Session>>,
    handle: Option<JoinHandle<()>>,
}

impl<S, K> LocationCoordinator<S, K>
where
    S: PositionSource + 'static,
    K: LocationSink + 'static,
{
    pub fn new(source: Arc<S>, sink: Arc<K>, session: Arc<Mutex<Session>>) -> Self {
        Self {
            source,
            sink,
            session,
            handle: None,
        }
    }

    /// Start the sampling loop. Calling start while a loop is already
    /// running is a no-op; there is never more than one loop.
    pub fn start(&mut self) {
        if let Some(handle) = &self.handle {
            if !handle.is_finished() {
                debug!("Location sampling already running");
                return;
            }
        }

        info!(interval_secs = SAMPLE_INTERVAL.as_secs(), "Starting location sampling");
        let source = Arc::clone(&self.source);
        let sink = Arc::clone(&self.sink);
        let session = Arc::clone(&self.session);
        self.handle = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SAMPLE_INTERVAL);
            loop {
                ticker.tick().await;
                sample_once(source.as_ref(), sink.as_ref(), &session).await;
            }
        }));
    }

    /// Stop sampling, e.g. on logout or when the shift ends.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            info!("Stopping location sampling");
            handle.abort();
        }
    }

    /// Restart the loop if it is not running, e.g. when the app returns
    /// to the foreground and the task may have been torn down.
    pub fn ensure_active(&mut self) {
        let running = self
            .handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false);
        if !running {
            self.handle = None;
            self.start();
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }
}

impl<S, K> Drop for LocationCoordinator<S, K> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// One tick of the loop: gate on the session, read a position, send.
/// Every failure path drops the sample and returns.
async fn sample_once<S, K>(source: &S, sink: &K, session: &Mutex<Session>)
where
    S: PositionSource,
    K: LocationSink,
{
    // The lock must not be held across an await.
    let driver_id = {
        let session = match session.lock() {
            Ok(s) => s,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !session.is_valid() {
            debug!("No valid session, dropping location sample");
            return;
        }
        match session.user_id() {
            Some(id) => id,
            None => return,
        }
    };

    let Some(position) = source.current_position().await else {
        debug!("No position available, skipping sample");
        return;
    };

    let sample = LocationSample::new(driver_id, position);
    if let Err(e) = sink.send_location(&sample).await {
        warn!(driver_id, error = %e, "Failed to send location sample, dropping");
    }
}
