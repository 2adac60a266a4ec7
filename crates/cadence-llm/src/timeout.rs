//! Timeout policy
//!
//! A fixed connect deadline plus a read deadline chosen by request size.

use std::{future::Future, time::Duration};

use futures_util::{StreamExt, stream};

use crate::{backend::RawStream, error::LlmError};

/// Connect and read deadlines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeoutConfig {
    pub connect: Duration,
    /// Read deadline for ordinary payloads
    pub read: Duration,
    /// Read deadline once the payload exceeds `large_payload_threshold`
    pub read_large: Duration,
    /// Payload size in bytes
    pub large_payload_threshold: usize,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(10),
            read: Duration::from_secs(120),
            read_large: Duration::from_secs(300),
            large_payload_threshold: 1024 * 1024,
        }
    }
}

impl TimeoutConfig {
    /// Read deadline for a payload of `payload_size` bytes
    ///
    /// A payload of exactly the threshold still gets the ordinary deadline.
    pub const fn timeout_for(&self, payload_size: usize) -> Duration {
        if payload_size > self.large_payload_threshold {
            self.read_large
        } else {
            self.read
        }
    }
}

impl TryFrom<&cadence_config::TimeoutConfig> for TimeoutConfig {
    type Error = anyhow::Error;

    fn try_from(config: &cadence_config::TimeoutConfig) -> Result<Self, Self::Error> {
        Ok(Self {
            connect: cadence_config::parse_duration("timeout.connect", &config.connect)?,
            read: cadence_config::parse_duration("timeout.read", &config.read)?,
            read_large: cadence_config::parse_duration("timeout.read_large", &config.read_large)?,
            large_payload_threshold: config.large_payload_threshold,
        })
    }
}

/// Race `operation` against `deadline`
///
/// The abandoned future is dropped, not cancelled at the transport.
pub async fn with_deadline<T, F>(deadline: Duration, operation: F) -> Result<T, LlmError>
where
    F: Future<Output = Result<T, LlmError>>,
{
    tokio::time::timeout(deadline, operation)
        .await
        .map_err(|_| LlmError::Timeout(format!("no response within {deadline:?}")))?
}

/// Bound every read of `raw` by `deadline`
///
/// An expired read yields one timeout error and ends the stream.
pub fn with_read_deadline(raw: RawStream, deadline: Duration) -> RawStream {
    let reads = stream::unfold(Some(raw), move |raw| async move {
        let mut raw = raw?;
        match tokio::time::timeout(deadline, raw.next()).await {
            Ok(Some(item)) => Some((item, Some(raw))),
            Ok(None) => None,
            Err(_) => Some((
                Err(LlmError::Timeout(format!("no stream data within {deadline:?}"))),
                None,
            )),
        }
    });

    Box::pin(reads)
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;

    use super::*;
    use crate::normalize::RawUnit;

    #[test]
    fn threshold_boundary_uses_ordinary_deadline() {
        let config = TimeoutConfig::default();

        assert_eq!(config.timeout_for(0), Duration::from_secs(120));
        assert_eq!(config.timeout_for(1024 * 1024), Duration::from_secs(120));
        assert_eq!(config.timeout_for(1024 * 1024 + 1), Duration::from_secs(300));
        assert_eq!(config.timeout_for(usize::MAX), Duration::from_secs(300));
    }

    #[test]
    fn from_config_section() {
        let config = TimeoutConfig::try_from(&cadence_config::TimeoutConfig::default()).unwrap();
        assert_eq!(config, TimeoutConfig::default());
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_expiry_is_a_timeout_error() {
        let result = with_deadline(Duration::from_secs(1), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(LlmError::Timeout(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_stream_times_out_after_delivered_units() {
        let raw: RawStream = Box::pin(
            stream::iter([Ok(RawUnit::Text("first".to_owned()))]).chain(stream::pending()),
        );

        let items: Vec<_> = with_read_deadline(raw, Duration::from_secs(2)).collect().await;

        assert_eq!(items.len(), 2);
        assert!(matches!(items[0], Ok(RawUnit::Text(ref text)) if text == "first"));
        assert!(matches!(items[1], Err(LlmError::Timeout(_))));
    }
}
