//! Bus power-rail control.
//!
//! Node access powers the shared rail up before an exchange and releases it
//! afterwards, whatever the exchange outcome was. The rail needs a settle
//! delay after power-up before nodes accept traffic.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{NodeBusError, Result};

/// Settle time between rail power-up and the first frame
const POWER_SETTLE: Duration = Duration::from_millis(50);

#[async_trait]
pub trait PowerControl: Send + Sync {
    /// Power the rail up and wait for it to settle.
    ///
    /// Acquisitions nest: only the first one touches the rail.
    async fn acquire(&self) -> Result<()>;

    /// Release one acquisition; powers the rail down on the last one.
    async fn release(&self) -> Result<()>;

    fn is_powered(&self) -> bool;
}

/// Rail control through a sysfs GPIO line
pub struct GpioPowerControl {
    gpio_path: String,
    refcount: Arc<Mutex<u32>>,
}

impl GpioPowerControl {
    pub fn new(gpio_path: impl Into<String>) -> Self {
        Self {
            gpio_path: gpio_path.into(),
            refcount: Arc::new(Mutex::new(0)),
        }
    }

    async fn write_line(&self, value: &str) -> Result<()> {
        tokio::fs::write(&self.gpio_path, value)
            .await
            .map_err(|e| {
                NodeBusError::Io(format!("GPIO write to {} failed: {}", self.gpio_path, e))
            })
    }
}

#[async_trait]
impl PowerControl for GpioPowerControl {
    async fn acquire(&self) -> Result<()> {
        let first = {
            let mut count = self.refcount.lock();
            *count += 1;
            *count == 1
        };
        if first {
            debug!("powering bus rail up via {}", self.gpio_path);
            self.write_line("1").await?;
            tokio::time::sleep(POWER_SETTLE).await;
        }
        Ok(())
    }

    async fn release(&self) -> Result<()> {
        let last = {
            let mut count = self.refcount.lock();
            if *count == 0 {
                warn!("rail release without matching acquire");
                return Ok(());
            }
            *count -= 1;
            *count == 0
        };
        if last {
            debug!("powering bus rail down via {}", self.gpio_path);
            self.write_line("0").await?;
        }
        Ok(())
    }

    fn is_powered(&self) -> bool {
        *self.refcount.lock() > 0
    }
}

/// Test double that records acquire/release pairing
#[derive(Default)]
pub struct MockPowerControl {
    refcount: Mutex<u32>,
    acquires: Mutex<u32>,
    releases: Mutex<u32>,
    fail_acquire: Mutex<bool>,
}

impl MockPowerControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire_count(&self) -> u32 {
        *self.acquires.lock()
    }

    pub fn release_count(&self) -> u32 {
        *self.releases.lock()
    }

    pub fn set_acquire_failure(&self, fail: bool) {
        *self.fail_acquire.lock() = fail;
    }

    /// Every acquire has been matched by a release
    pub fn is_balanced(&self) -> bool {
        *self.refcount.lock() == 0
    }
}

#[async_trait]
impl PowerControl for MockPowerControl {
    async fn acquire(&self) -> Result<()> {
        if *self.fail_acquire.lock() {
            return Err(NodeBusError::internal("simulated rail power failure"));
        }
        *self.acquires.lock() += 1;
        *self.refcount.lock() += 1;
        Ok(())
    }

    async fn release(&self) -> Result<()> {
        *self.releases.lock() += 1;
        let mut count = self.refcount.lock();
        *count = count.saturating_sub(1);
        Ok(())
    }

    fn is_powered(&self) -> bool {
        *self.refcount.lock() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_power_refcounts() {
        let power = MockPowerControl::new();
        power.acquire().await.unwrap();
        power.acquire().await.unwrap();
        assert!(power.is_powered());
        power.release().await.unwrap();
        assert!(power.is_powered());
        power.release().await.unwrap();
        assert!(!power.is_powered());
        assert!(power.is_balanced());
        assert_eq!(power.acquire_count(), 2);
        assert_eq!(power.release_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_acquire_failure() {
        let power = MockPowerControl::new();
        power.set_acquire_failure(true);
        assert!(power.acquire().await.is_err());
        assert!(!power.is_powered());
    }
}
