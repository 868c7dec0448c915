// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::ffi::CString;
use std::path::Path;

use anyhow::{bail, Context};
use bytes::Bytes;
use nix::libc;
use nix::pty::{forkpty, ForkptyResult, Winsize};
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{chdir, execvp, ForkResult, Pid};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use super::fd::AsyncMaster;
use super::PtyInput;

/// How the child ended. Both fields `None` means the PTY failed at runtime
/// and the exit was synthesized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ExitStatus {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

/// A child process attached to a fresh PTY, spawned via `forkpty`.
pub struct PtyProcess {
    master: AsyncMaster,
    child: Pid,
}

impl PtyProcess {
    /// Spawn `command` as `/bin/sh -c <command>` under a new PTY with the
    /// requested dimensions. The command is a single shell string; the
    /// engine does not parse flags.
    // forkpty requires unsafe: post-fork child is partially initialized
    #[allow(unsafe_code)]
    pub fn spawn(command: &str, cwd: &Path, cols: u16, rows: u16) -> anyhow::Result<Self> {
        let winsize = Winsize { ws_col: cols, ws_row: rows, ws_xpixel: 0, ws_ypixel: 0 };

        // Build argv before forking; only async-signal-safe work happens in
        // the child.
        let argv: Vec<CString> = ["/bin/sh", "-c", command]
            .iter()
            .map(|s| CString::new(s.as_bytes()))
            .collect::<Result<_, _>>()
            .context("command contains NUL")?;

        // SAFETY: forkpty is unsafe because the child is in a
        // partially-initialized state after fork. We immediately exec.
        let result = unsafe { forkpty(&winsize, None) }.context("forkpty failed")?;
        let ForkptyResult { master, fork_result } = result;

        match fork_result {
            ForkResult::Child => {
                // The child inherits the host environment untouched.
                let _ = chdir(cwd);
                let _ = execvp(&argv[0], &argv);
                // exec failed; nothing sane to do in the forked child.
                // SAFETY: _exit is async-signal-safe, unlike exit().
                unsafe { libc::_exit(127) }
            }
            ForkResult::Parent { child } => {
                let master = AsyncMaster::new(master).context("async master setup failed")?;
                debug!(pid = child.as_raw(), cols, rows, "pty spawned");
                Ok(Self { master, child })
            }
        }
    }

    pub fn pid(&self) -> u32 {
        self.child.as_raw() as u32
    }

    /// Apply a window-size change on the master fd (`TIOCSWINSZ`), which
    /// also delivers SIGWINCH to the child.
    // TIOCSWINSZ requires unsafe for the libc::ioctl call
    #[allow(unsafe_code)]
    pub fn apply_winsize(&self, cols: u16, rows: u16) -> anyhow::Result<()> {
        let ws = Winsize { ws_col: cols, ws_row: rows, ws_xpixel: 0, ws_ypixel: 0 };

        // SAFETY: TIOCSWINSZ is a well-defined ioctl on the PTY master fd
        // and the Winsize struct is fully initialized.
        let ret = unsafe { libc::ioctl(self.master.as_raw_fd(), libc::TIOCSWINSZ, &ws) };
        if ret < 0 {
            bail!("TIOCSWINSZ ioctl failed: {}", std::io::Error::last_os_error());
        }
        Ok(())
    }

    /// Drive the PTY until the child exits: child output goes to
    /// `output_tx`, writes and resizes arrive ordered on `input_rx`.
    ///
    /// Returns the reaped exit status. An `EIO` read error is the normal
    /// close-of-slave signal and ends the loop; other I/O errors propagate.
    pub async fn run(
        self,
        output_tx: mpsc::Sender<Bytes>,
        mut input_rx: mpsc::Receiver<PtyInput>,
    ) -> anyhow::Result<ExitStatus> {
        let pid = self.child;
        let mut buf = vec![0u8; 8192];
        let mut input_open = true;

        loop {
            if input_open {
                tokio::select! {
                    result = self.master.read_chunk(&mut buf) => {
                        match result {
                            Ok(0) => break,
                            Ok(n) => {
                                let data = Bytes::copy_from_slice(&buf[..n]);
                                if output_tx.send(data).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) if e.raw_os_error() == Some(libc::EIO) => break,
                            Err(e) => return Err(e.into()),
                        }
                    }
                    input = input_rx.recv() => {
                        match input {
                            Some(input) => self.handle_input(input).await?,
                            None => input_open = false,
                        }
                    }
                }
            } else {
                match self.master.read_chunk(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => {
                        let data = Bytes::copy_from_slice(&buf[..n]);
                        if output_tx.send(data).await.is_err() {
                            break;
                        }
                    }
                    Err(e) if e.raw_os_error() == Some(libc::EIO) => break,
                    Err(e) => return Err(e.into()),
                }
            }
        }

        // Flush writes that were queued before the child closed its end,
        // so "drained before on_exit" holds even on a racing exit.
        while let Ok(input) = input_rx.try_recv() {
            let _ = self.handle_input(input).await;
        }

        // Reap on a blocking thread to avoid stalling the runtime.
        let status = tokio::task::spawn_blocking(move || wait_for_exit(pid))
            .await
            .context("join wait thread")??;
        debug!(pid = pid.as_raw(), ?status, "child reaped");
        Ok(status)
    }

    async fn handle_input(&self, input: PtyInput) -> anyhow::Result<()> {
        match input {
            PtyInput::Write(data) => self.master.write_all(&data).await.map_err(Into::into),
            PtyInput::Resize(cols, rows) => self.apply_winsize(cols, rows),
        }
    }
}

/// Signal the whole process tree rooted at the child.
///
/// `forkpty` makes the child a session leader, so its process group id is
/// its pid and a negative-pid kill reaches every descendant.
pub fn signal_tree(pid: u32, signal: Signal) {
    if pid == 0 {
        return;
    }
    let _ = kill(Pid::from_raw(-(pid as i32)), signal);
}

/// Block until the child exits and convert to our [`ExitStatus`].
fn wait_for_exit(pid: Pid) -> anyhow::Result<ExitStatus> {
    loop {
        match waitpid(pid, None) {
            Ok(WaitStatus::Exited(_, code)) => {
                return Ok(ExitStatus { code: Some(code), signal: None });
            }
            Ok(WaitStatus::Signaled(_, sig, _)) => {
                return Ok(ExitStatus { code: None, signal: Some(sig as i32) });
            }
            Ok(_) => continue,
            Err(nix::errno::Errno::EINTR) => continue,
            Err(nix::errno::Errno::ECHILD) => {
                // Already reaped elsewhere; treat as a synthetic exit.
                return Ok(ExitStatus::default());
            }
            Err(e) => bail!("waitpid failed: {e}"),
        }
    }
}
