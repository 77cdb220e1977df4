use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use tokio::time::sleep;

use crate::chaos::random::RandomSource;
use crate::config::{FailureMode, ProxyConfig};
use crate::error::{BoxError, ShapeError};

/// Largest chunk a shaped stream hands out in one read
pub const MAX_CHUNK: usize = 32 * 1024;

/// Smallest chunk used when pacing to a bandwidth cap
const MIN_PACED_CHUNK: usize = 512;

/// Per-chunk probability (percent) of an injected body failure
const BODY_FAULT_PERCENT: u64 = 1;

/// Timing and failure parameters for one direction of a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShapingProfile {
    /// Slept once before the first chunk
    pub first_byte_delay: Duration,

    /// Throughput cap, 0 = unlimited
    pub bytes_per_sec: u64,

    /// Exclusive upper bound of the random delay added per chunk
    pub jitter: Duration,

    /// Only `hang_body` and `close_body` affect the stream itself
    pub failure_mode: FailureMode,
}

impl ShapingProfile {
    /// Profile for request bodies travelling to the upstream
    pub fn request(config: &ProxyConfig) -> Self {
        Self {
            first_byte_delay: Duration::from_millis(config.lag_to_req),
            bytes_per_sec: config.bandwidth_up.saturating_mul(1024),
            jitter: Duration::from_millis(config.jitter),
            failure_mode: FailureMode::Normal,
        }
    }

    /// Profile for response bodies travelling to the client
    pub fn response(config: &ProxyConfig) -> Self {
        let lag = match config.failure_mode {
            FailureMode::Timeout => FailureMode::TIMEOUT_DELAY_MS,
            _ => config.lag_to_resp,
        };

        Self {
            first_byte_delay: Duration::from_millis(lag),
            bytes_per_sec: config.bandwidth_down.saturating_mul(1024),
            jitter: Duration::from_millis(config.jitter),
            failure_mode: config.failure_mode,
        }
    }

    /// Whether shaping with this profile changes nothing but chunk boundaries
    pub fn is_passthrough(&self) -> bool {
        self.first_byte_delay.is_zero()
            && self.bytes_per_sec == 0
            && self.jitter.is_zero()
            && !self.failure_mode.injects_body_faults()
    }

    fn chunk_size(&self) -> usize {
        if self.bytes_per_sec == 0 {
            return MAX_CHUNK;
        }
        // ~100ms worth of data per chunk keeps pacing smooth
        let tenth = usize::try_from(self.bytes_per_sec / 10).unwrap_or(MAX_CHUNK);
        tenth.clamp(MIN_PACED_CHUNK, MAX_CHUNK)
    }

    fn pacing_delay(&self, len: usize) -> Duration {
        if self.bytes_per_sec == 0 || len == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(len as f64 / self.bytes_per_sec as f64)
    }
}

/// Wraps a body stream and replays it with network-like timing and faults.
///
/// The body is never buffered beyond the frame currently being split into
/// chunks. Every sleep (TTFB, pacing, jitter, an injected hang) is a plain
/// await point, so dropping the shaper cancels it and releases the inner
/// stream.
pub struct StreamShaper<S> {
    inner: S,
    profile: ShapingProfile,
    random: Arc<dyn RandomSource>,
    pending: Bytes,
    first_byte_delay: Option<Duration>,
    truncated: bool,
    done: bool,
}

impl<S, E> StreamShaper<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin + Send,
    E: Into<BoxError> + Send + 'static,
{
    pub fn new(inner: S, profile: ShapingProfile, random: Arc<dyn RandomSource>) -> Self {
        Self {
            inner,
            profile,
            random,
            pending: Bytes::new(),
            first_byte_delay: Some(profile.first_byte_delay),
            truncated: false,
            done: false,
        }
    }

    pub fn profile(&self) -> &ShapingProfile {
        &self.profile
    }

    /// Produce the next chunk, `None` once the stream is finished.
    pub async fn next_chunk(&mut self) -> Option<Result<Bytes, ShapeError>> {
        if self.done {
            return None;
        }

        if let Some(delay) = self.first_byte_delay.take() {
            if !delay.is_zero() {
                sleep(delay).await;
            }
        }

        if self.truncated {
            self.done = true;
            return Some(Err(ShapeError::Truncated));
        }

        while self.pending.is_empty() {
            match self.inner.next().await {
                Some(Ok(bytes)) => self.pending = bytes,
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(ShapeError::Body(e.into())));
                }
                None => {
                    self.done = true;
                    return None;
                }
            }
        }

        let take = self.pending.len().min(self.profile.chunk_size());
        let chunk = self.pending.split_to(take);

        if self.profile.failure_mode.injects_body_faults()
            && self.random.chance(BODY_FAULT_PERCENT)
        {
            match self.profile.failure_mode {
                FailureMode::HangBody => {
                    tracing::warn!(chunk_len = chunk.len(), "Injected hang_body, stalling stream");
                    futures::future::pending::<()>().await;
                }
                _ => {
                    tracing::warn!(chunk_len = chunk.len(), "Injected close_body, truncating stream");
                    self.truncated = true;
                }
            }
        }

        let delay = self.profile.pacing_delay(chunk.len()) + self.jitter();
        if !delay.is_zero() {
            sleep(delay).await;
        }

        Some(Ok(chunk))
    }

    /// Turn the shaper into a boxed stream suitable for `Body::wrap_stream`
    pub fn into_stream(self) -> BoxStream<'static, Result<Bytes, ShapeError>>
    where
        S: 'static,
    {
        stream::unfold(self, |mut shaper| async move {
            let item = shaper.next_chunk().await?;
            Some((item, shaper))
        })
        .boxed()
    }

    fn jitter(&self) -> Duration {
        if self.profile.jitter.is_zero() {
            return Duration::ZERO;
        }
        let bound = u64::try_from(self.profile.jitter.as_micros()).unwrap_or(u64::MAX);
        Duration::from_micros(self.random.below(bound))
    }
}
