// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Non-blocking I/O over the PTY master file descriptor.

use std::io;
use std::os::fd::{AsRawFd, OwnedFd};

use nix::fcntl::{fcntl, FcntlArg, OFlag};
use tokio::io::unix::AsyncFd;

/// Newtype wrapper around the PTY master `OwnedFd` for use with `AsyncFd`.
#[derive(Debug)]
pub struct MasterFd(pub OwnedFd);

impl AsRawFd for MasterFd {
    fn as_raw_fd(&self) -> std::os::fd::RawFd {
        self.0.as_raw_fd()
    }
}

/// Async wrapper over the PTY master with readiness-driven read/write.
#[derive(Debug)]
pub struct AsyncMaster {
    afd: AsyncFd<MasterFd>,
}

impl AsyncMaster {
    /// Take ownership of the master fd, switching it to non-blocking mode.
    pub fn new(fd: OwnedFd) -> io::Result<Self> {
        set_nonblocking(&fd)?;
        let afd = AsyncFd::new(MasterFd(fd))?;
        Ok(Self { afd })
    }

    pub fn as_raw_fd(&self) -> std::os::fd::RawFd {
        self.afd.get_ref().as_raw_fd()
    }

    /// Read one chunk, waiting for readiness.
    pub async fn read_chunk(&self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let mut guard = self.afd.readable().await?;
            match guard.try_io(|inner| {
                nix::unistd::read(inner.as_raw_fd(), buf).map_err(io_err)
            }) {
                Ok(result) => return result,
                Err(_would_block) => continue,
            }
        }
    }

    /// Write the whole buffer, waiting for readiness between partial writes.
    pub async fn write_all(&self, data: &[u8]) -> io::Result<()> {
        let mut offset = 0;
        while offset < data.len() {
            let mut guard = self.afd.writable().await?;
            match guard.try_io(|inner| {
                nix::unistd::write(inner.as_raw_fd(), &data[offset..]).map_err(io_err)
            }) {
                Ok(Ok(n)) => offset += n,
                Ok(Err(e)) => return Err(e),
                Err(_would_block) => continue,
            }
        }
        Ok(())
    }
}

fn set_nonblocking(fd: &impl AsRawFd) -> io::Result<()> {
    let raw = fd.as_raw_fd();
    let flags = fcntl(raw, FcntlArg::F_GETFL).map_err(io_err)?;
    let flags = OFlag::from_bits_truncate(flags);
    fcntl(raw, FcntlArg::F_SETFL(flags | OFlag::O_NONBLOCK)).map_err(io_err)?;
    Ok(())
}

fn io_err(e: nix::errno::Errno) -> io::Error {
    io::Error::from_raw_os_error(e as i32)
}
