//! One-shot login messages handed over through an inherited descriptor.

use nix::errno::Errno;
use nix::libc;
use std::env;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::os::fd::{FromRawFd, OwnedFd, RawFd};
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// Value returned by `get` when there is nothing to show.
pub const NO_MESSAGES: &str = "{}";

#[derive(Debug, Default)]
pub struct LoginMessages {
    messages: Mutex<Option<String>>,
}

impl LoginMessages {
    pub fn new(messages: Option<String>) -> Self {
        Self {
            messages: Mutex::new(messages),
        }
    }

    /// Consumes the descriptor named by environment variable `var`.
    ///
    /// The variable is removed so children never inherit it. Any failure
    /// simply means there are no messages.
    ///
    /// # Safety
    ///
    /// Modifies the process environment: no other thread may be reading or
    /// writing the environment concurrently. Call it before starting the
    /// async runtime.
    pub unsafe fn from_env(var: &str) -> Self {
        let Ok(fdstr) = env::var(var) else {
            debug!(var, "Login messages descriptor not set. No login messages today.");
            return Self::default();
        };
        // SAFETY: upheld by the caller, see above.
        unsafe { env::remove_var(var) };

        Self::from_descriptor(&fdstr)
    }

    /// Reads the messages from the descriptor number in `fdstr`, taking
    /// ownership of the descriptor and closing it afterwards.
    pub fn from_descriptor(fdstr: &str) -> Self {
        debug!(fd = fdstr, "Trying to read login messages");
        match read_descriptor(fdstr) {
            Ok(messages) => {
                debug!(bytes = messages.len(), "Successfully read login messages");
                Self::new(Some(messages))
            }
            Err(err) => {
                debug!(fd = fdstr, error = %err, "Reading login messages failed");
                Self::default()
            }
        }
    }

    pub fn get(&self) -> String {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .unwrap_or_else(|| NO_MESSAGES.to_string())
    }

    pub fn dismiss(&self) {
        *self.messages.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

fn read_descriptor(fdstr: &str) -> io::Result<String> {
    let fd: RawFd = fdstr
        .trim()
        .parse()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    if fd < 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "negative descriptor",
        ));
    }

    // SAFETY: F_GETFD only reads the descriptor flags and fails with EBADF
    // when fd is not open.
    Errno::result(unsafe { libc::fcntl(fd, libc::F_GETFD) })?;

    // SAFETY: the descriptor is open and was handed to this process for
    // exclusive consumption; dropping the file closes it on every path.
    let mut file = File::from(unsafe { OwnedFd::from_raw_fd(fd) });
    file.seek(SeekFrom::Start(0))?;

    let mut messages = String::new();
    file.read_to_string(&mut messages)?;
    Ok(messages)
}
