use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use parking_lot::{Condvar, Mutex};
use crate::Error;

/// Manual-reset signal that arms the capture engine. Once set it stays set
/// until reset.
pub trait Signal: Send + Sync {
    fn set(&self) -> Result<(), Error>;
    fn reset(&self) -> Result<(), Error>;
    fn is_set(&self) -> bool;
}

#[derive(Default)]
pub struct Event {
    state: Mutex<bool>,
    cond:  Condvar,
}

/// Marker file `<dir>/<name>` that exists while the signal is set.
#[derive(Debug)]
pub struct Named {
    path: PathBuf,
}

impl Event {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until the signal is set or `timeout` passes, returning whether
    /// it was set.
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut set  = self.state.lock();
        while !*set {
            if self.cond.wait_until(&mut set, deadline).timed_out() {
                break;
            }
        }
        *set
    }
}

impl Signal for Event {
    fn set(&self) -> Result<(), Error> {
        *self.state.lock() = true;
        self.cond.notify_all();
        Ok(())
    }

    fn reset(&self) -> Result<(), Error> {
        *self.state.lock() = false;
        Ok(())
    }

    fn is_set(&self) -> bool {
        *self.state.lock()
    }
}

impl Named {
    pub fn new<P: AsRef<Path>>(dir: P, name: &str) -> Self {
        let name = name.replace(|c| c == '/' || c == '\\', "_");
        Self {
            path: dir.as_ref().join(name),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Signal for Named {
    fn set(&self) -> Result<(), Error> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&self.path, b"")?;
        Ok(())
    }

    fn reset(&self) -> Result<(), Error> {
        match fs::remove_file(&self.path) {
            Ok(())                                   => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e)                                   => Err(e.into()),
        }
    }

    fn is_set(&self) -> bool {
        self.path.exists()
    }
}
