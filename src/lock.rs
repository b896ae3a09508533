//! Single-instance process lock
//!
//! Binds a Unix datagram socket in the Linux abstract namespace. The kernel
//! drops the name when the socket closes, so a crashed process never leaves
//! a stale lock behind.

use tracing::{debug, info};

use crate::error::{Error, Result};

/// Held for the lifetime of the process; releases the lock on drop
#[derive(Debug)]
pub struct ProcessLock {
    name: String,
    #[cfg(target_os = "linux")]
    _socket: std::os::unix::net::UnixDatagram,
}

impl ProcessLock {
    /// Take the lock called `name`, or fail with [`Error::LockHeld`]
    #[cfg(target_os = "linux")]
    pub fn acquire(name: &str) -> Result<Self> {
        use std::io::ErrorKind;
        use std::os::linux::net::SocketAddrExt;
        use std::os::unix::net::{SocketAddr, UnixDatagram};

        let addr = SocketAddr::from_abstract_name(name.as_bytes())?;
        match UnixDatagram::bind_addr(&addr) {
            Ok(socket) => {
                info!("Acquired process lock {}", name);
                Ok(Self {
                    name: name.to_string(),
                    _socket: socket,
                })
            }
            Err(e) if e.kind() == ErrorKind::AddrInUse => Err(Error::LockHeld(name.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    #[cfg(not(target_os = "linux"))]
    pub fn acquire(name: &str) -> Result<Self> {
        tracing::warn!(
            "Process lock {} not supported on this platform; running unlocked",
            name
        );
        Ok(Self {
            name: name.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for ProcessLock {
    fn drop(&mut self) {
        debug!("Releasing process lock {}", self.name);
    }
}
