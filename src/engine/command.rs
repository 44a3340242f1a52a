use std::io::Write;
use std::path::PathBuf;
use std::process::{self, Child, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use log::{debug, warn};
use parking_lot::Mutex;
use crate::Error;
use super::Engine;

const GRACE: Duration = Duration::from_secs(1);
const POLL:  Duration = Duration::from_millis(20);

/// Engine driven as a child process. `<program> devices` prints one device
/// per line, `<program> capture <n>` captures until told to `stop` on stdin.
pub struct Command {
    program: PathBuf,
    args:    Vec<String>,
    child:   Mutex<Option<Child>>,
}

impl Command {
    pub fn new<P: Into<PathBuf>>(program: P, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args:    args,
            child:   Mutex::new(None),
        }
    }

    fn command(&self, verb: &str) -> process::Command {
        let mut cmd = process::Command::new(&self.program);
        cmd.args(&self.args).arg(verb);
        cmd
    }

    fn send(&self, line: &str) -> Result<(), Error> {
        let mut child = self.child.lock();
        let stdin = child.as_mut().and_then(|c| c.stdin.as_mut()).ok_or_else(|| {
            Error::engine("engine not running")
        })?;
        writeln!(stdin, "{}", line).map_err(Error::engine)?;
        stdin.flush().map_err(Error::engine)
    }

    fn reap(&self, mut child: Child) -> Result<(), Error> {
        drop(child.stdin.take());

        let deadline = Instant::now() + GRACE;
        while Instant::now() < deadline {
            if let Some(status) = child.try_wait()? {
                debug!("engine exited with {}", status);
                return Ok(());
            }
            thread::sleep(POLL);
        }

        warn!("engine {} did not exit, killing", child.id());
        child.kill()?;
        child.wait()?;
        Ok(())
    }
}

impl Engine for Command {
    fn devices(&self) -> Result<Vec<String>, Error> {
        let out = self.command("devices").stderr(Stdio::inherit()).output().map_err(Error::engine)?;

        if !out.status.success() {
            return Err(Error::engine(format!("device listing exited with {}", out.status)));
        }

        let stdout = String::from_utf8_lossy(&out.stdout);
        Ok(stdout.lines().map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect())
    }

    fn start(&self, device: usize) -> Result<(), Error> {
        let mut child = self.child.lock();

        if let Some(running) = child.as_mut() {
            if running.try_wait()?.is_none() {
                return Ok(());
            }
        }

        let spawned = self.command("capture")
            .arg(device.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| Error::engine(format!("{}: {}", self.program.display(), e)))?;

        debug!("engine {} started for device {}", spawned.id(), device);

        *child = Some(spawned);

        Ok(())
    }

    fn select(&self, device: usize) -> Result<(), Error> {
        self.send(&format!("select {}", device))
    }

    fn stop(&self) -> Result<(), Error> {
        let result = self.send("stop");
        if let Some(child) = self.child.lock().take() {
            self.reap(child)?;
        }
        result
    }

    fn close(&self) -> Result<(), Error> {
        match self.child.lock().take() {
            Some(child) => self.reap(child),
            None        => Ok(()),
        }
    }
}

impl Drop for Command {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("engine close failed: {}", e);
        }
    }
}
