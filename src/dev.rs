//! Device switch: maps a major device number to the handler that serves it.

use super::*;

use std::sync::{Arc, RwLock};

use log::info;

/// Reads and writes of a device inode are forwarded here, by minor number.
pub trait DeviceHandler: Send + Sync {
    fn read(&self, minor: i16, dst: &mut [u8]) -> Result<usize>;
    fn write(&self, minor: i16, src: &[u8]) -> Result<usize>;
}

pub struct DevSwitch {
    handlers: RwLock<Vec<Option<Arc<dyn DeviceHandler>>>>,
}

impl DevSwitch {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(vec![None; NDEV]),
        }
    }

    /// Install `handler` for `major`, replacing any previous one.
    pub fn register(&self, major: i16, handler: Arc<dyn DeviceHandler>) -> Result<()> {
        let idx = Self::index(major)?;
        self.handlers.write().unwrap()[idx] = Some(handler);
        info!("devsw: registered major {}", major);
        Ok(())
    }

    fn index(major: i16) -> Result<usize> {
        match usize::try_from(major) {
            Ok(idx) if idx < NDEV => Ok(idx),
            _ => Err(FsError::NoDevice(major)),
        }
    }

    fn handler(&self, major: i16) -> Result<Arc<dyn DeviceHandler>> {
        let idx = Self::index(major)?;
        self.handlers.read().unwrap()[idx]
            .clone()
            .ok_or(FsError::NoDevice(major))
    }

    pub fn read(&self, major: i16, minor: i16, dst: &mut [u8]) -> Result<usize> {
        self.handler(major)?.read(minor, dst)
    }

    pub fn write(&self, major: i16, minor: i16, src: &[u8]) -> Result<usize> {
        self.handler(major)?.write(minor, src)
    }
}

impl Default for DevSwitch {
    fn default() -> Self {
        Self::new()
    }
}
