//! Passive-mode data port pool.
//!
//! Ports come from one fixed range shared by all sessions. A lease holds its
//! port until dropped, so an exhausted pool only affects the session asking.

use std::collections::BTreeSet;
use std::net::IpAddr;
use std::ops::RangeInclusive;
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;
use tokio::net::TcpListener;

#[derive(Debug, Error)]
pub enum PassiveError {
    #[error("No free passive port in {start}-{end}")]
    Exhausted { start: u16, end: u16 },

    #[error("Failed to bind passive port: {0}")]
    Bind(#[source] std::io::Error),
}

/// Pool of passive ports
#[derive(Debug, Clone)]
pub struct PassivePorts {
    range: RangeInclusive<u16>,
    in_use: Arc<Mutex<BTreeSet<u16>>>,
}

/// A reserved port, released on drop
#[derive(Debug)]
pub struct PortLease {
    port: u16,
    in_use: Arc<Mutex<BTreeSet<u16>>>,
}

impl PortLease {
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Drop for PortLease {
    fn drop(&mut self) {
        lock(&self.in_use).remove(&self.port);
    }
}

fn lock(set: &Mutex<BTreeSet<u16>>) -> MutexGuard<'_, BTreeSet<u16>> {
    set.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl PassivePorts {
    pub fn new(range: RangeInclusive<u16>) -> Self {
        Self {
            range,
            in_use: Arc::new(Mutex::new(BTreeSet::new())),
        }
    }

    pub fn range(&self) -> &RangeInclusive<u16> {
        &self.range
    }

    /// Number of ports currently leased
    pub fn leased(&self) -> usize {
        lock(&self.in_use).len()
    }

    /// Reserve the lowest free port, skipping `tried`
    fn lease_excluding(&self, tried: &BTreeSet<u16>) -> Option<PortLease> {
        let mut in_use = lock(&self.in_use);
        let port = self
            .range
            .clone()
            .find(|p| !in_use.contains(p) && !tried.contains(p))?;
        in_use.insert(port);

        Some(PortLease {
            port,
            in_use: self.in_use.clone(),
        })
    }

    /// Reserve the lowest free port without binding it
    pub fn lease(&self) -> Result<PortLease, PassiveError> {
        self.lease_excluding(&BTreeSet::new())
            .ok_or_else(|| self.exhausted())
    }

    /// Reserve a port and listen on it. Ports taken by other processes are
    /// skipped.
    pub async fn bind(&self, ip: IpAddr) -> Result<(TcpListener, PortLease), PassiveError> {
        let mut tried = BTreeSet::new();
        let mut last_error = None;

        while let Some(lease) = self.lease_excluding(&tried) {
            match TcpListener::bind((ip, lease.port)).await {
                Ok(listener) => return Ok((listener, lease)),
                Err(e) => {
                    tracing::debug!(port = lease.port, error = %e, "Passive port unavailable");
                    tried.insert(lease.port);
                    last_error = Some(e);
                }
            }
        }

        Err(match last_error {
            Some(e) => PassiveError::Bind(e),
            None => self.exhausted(),
        })
    }

    fn exhausted(&self) -> PassiveError {
        PassiveError::Exhausted {
            start: *self.range.start(),
            end: *self.range.end(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_exhaustion_and_release() {
        let pool = PassivePorts::new(21000..=21001);

        let first = pool.lease().unwrap();
        let second = pool.lease().unwrap();
        assert_eq!((first.port(), second.port()), (21000, 21001));
        assert!(matches!(
            pool.lease(),
            Err(PassiveError::Exhausted {
                start: 21000,
                end: 21001
            })
        ));

        drop(first);
        assert_eq!(pool.leased(), 1);
        assert_eq!(pool.lease().unwrap().port(), 21000);
    }

    #[test]
    fn test_clones_share_leases() {
        let pool = PassivePorts::new(21000..=21000);
        let other = pool.clone();

        let _lease = pool.lease().unwrap();
        assert!(other.lease().is_err());
    }

    #[tokio::test]
    async fn test_bind_within_range() {
        let pool = PassivePorts::new(47100..=47119);
        let (listener, lease) = pool.bind(IpAddr::V4(Ipv4Addr::LOCALHOST)).await.unwrap();

        let port = listener.local_addr().unwrap().port();
        assert_eq!(port, lease.port());
        assert!(pool.range().contains(&port));
    }
}
