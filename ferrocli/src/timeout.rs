//! Bounded execution for channel operations.
//!
//! Every public channel operation runs through [`with_timeout`]. When the
//! bound elapses the in-flight future is dropped and the caller gets
//! [`Error::Timeout`]. Dropping abandons the pending transport read or write;
//! the transport is responsible for its own cleanup. Nothing is interrupted
//! from outside the task, so transports that run background work (the russh
//! session task) are never torn down mid-flight.

use std::future::Future;
use std::time::Duration;

use log::debug;

use crate::error::{Error, Result};

/// Run `future` with an upper bound of `duration`.
///
/// A zero duration disables the bound.
pub async fn with_timeout<T, F>(operation: &'static str, duration: Duration, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    if duration.is_zero() {
        return future.await;
    }

    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => {
            debug!("{} exceeded {:?}, abandoning", operation, duration);
            Err(Error::Timeout {
                operation,
                duration,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DriverError;

    #[tokio::test]
    async fn test_completes_within_bound() {
        let value = with_timeout("noop", Duration::from_secs(1), async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_becomes_timeout() {
        let err = with_timeout("sleepy", Duration::from_millis(50), async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        })
        .await
        .unwrap_err();

        match err {
            Error::Timeout {
                operation,
                duration,
            } => {
                assert_eq!(operation, "sleepy");
                assert_eq!(duration, Duration::from_millis(50));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_inner_error_passes_through() {
        let err = with_timeout::<(), _>("fails", Duration::from_secs(1), async {
            Err(DriverError::NotConnected.into())
        })
        .await
        .unwrap_err();
        assert!(err.is_not_opened());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_duration_is_unbounded() {
        let value = with_timeout("unbounded", Duration::ZERO, async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok("done")
        })
        .await
        .unwrap();
        assert_eq!(value, "done");
    }
}
