// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Per-segment lock discipline (spec.md §5), grounded on the byte-range
//! `fcntl` locking in `arki/reader.cc`'s `FileReader`.
//!
//! A reader takes a shared lock on byte 0 of the segment file and holds it
//! for its whole lifetime. A repacker takes an exclusive lock on the same
//! byte, which fails immediately (rather than queueing) when a reader is
//! live, giving the "a read lock is already held" fast-fail spec.md §5
//! asks for. An appender takes a *separate* byte (byte 1) so that appends
//! never contend with readers, matching "append does not block readers".

use std::fs::File;
use std::io;

/// The byte position readers/repackers contend on.
const READ_BYTE: i16 = 0;
/// The byte position appenders contend on.
const APPEND_BYTE: i16 = 1;

/// A held advisory lock on one byte of a segment file. Unlocking happens on
/// drop, matching the scope-guard style the teacher uses for its own
/// transactional resources.
#[must_use]
pub struct FileLock {
    #[cfg(unix)]
    fd: std::os::unix::io::RawFd,
    #[cfg(unix)]
    start: i16,
}

impl FileLock {
    /// Takes a blocking shared lock on the reader byte. Used by segment
    /// readers; coexists with any number of other shared locks and with a
    /// concurrent appender, but blocks (and is blocked by) an exclusive
    /// repack lock.
    pub fn lock_shared_read(file: &File) -> crate::Result<Self> {
        Self::setlkw(file, READ_BYTE, LockKind::Shared)
    }

    /// Attempts a non-blocking exclusive lock on the reader byte, used by
    /// repack. Fails fast with [`crate::Error::LockContention`] instead of
    /// queueing, so a live reader does not stall maintenance indefinitely.
    pub fn try_lock_exclusive_for_repack(file: &File) -> crate::Result<Self> {
        Self::setlk_nowait(file, READ_BYTE, LockKind::Exclusive)
            .map_err(|_| crate::Error::LockContention("a read lock is already held".into()))
    }

    /// Takes a blocking exclusive lock on the append byte. Appends retry
    /// forever (`F_SETLKW` semantics) rather than failing fast.
    pub fn lock_exclusive_append(file: &File) -> crate::Result<Self> {
        Self::setlkw(file, APPEND_BYTE, LockKind::Exclusive)
    }

    #[cfg(unix)]
    fn setlkw(file: &File, start: i16, kind: LockKind) -> crate::Result<Self> {
        use std::os::unix::io::AsRawFd;
        let fd = file.as_raw_fd();
        let mut lk = raw_flock(start, kind);
        loop {
            let res = unsafe { libc::fcntl(fd, libc::F_SETLKW, &raw mut lk) };
            if res == 0 {
                return Ok(Self { fd, start });
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(crate::Error::Io(err));
            }
        }
    }

    #[cfg(unix)]
    fn setlk_nowait(file: &File, start: i16, kind: LockKind) -> io::Result<Self> {
        use std::os::unix::io::AsRawFd;
        let fd = file.as_raw_fd();
        let mut lk = raw_flock(start, kind);
        let res = unsafe { libc::fcntl(fd, libc::F_SETLK, &raw mut lk) };
        if res == 0 {
            Ok(Self { fd, start })
        } else {
            Err(io::Error::last_os_error())
        }
    }

    #[cfg(not(unix))]
    fn setlkw(_file: &File, _start: i16, _kind: LockKind) -> crate::Result<Self> {
        Ok(Self {})
    }

    #[cfg(not(unix))]
    fn setlk_nowait(_file: &File, _start: i16, _kind: LockKind) -> io::Result<Self> {
        Ok(Self {})
    }
}

#[cfg(unix)]
enum LockKind {
    Shared,
    Exclusive,
}

#[cfg(unix)]
fn raw_flock(start: i16, kind: LockKind) -> libc::flock {
    let mut lk: libc::flock = unsafe { std::mem::zeroed() };
    lk.l_type = match kind {
        LockKind::Shared => libc::F_RDLCK as libc::c_short,
        LockKind::Exclusive => libc::F_WRLCK as libc::c_short,
    };
    lk.l_whence = libc::SEEK_SET as libc::c_short;
    lk.l_start = i64::from(start);
    lk.l_len = 1;
    lk
}

#[cfg(unix)]
impl Drop for FileLock {
    fn drop(&mut self) {
        let mut lk: libc::flock = unsafe { std::mem::zeroed() };
        lk.l_type = libc::F_UNLCK as libc::c_short;
        lk.l_whence = libc::SEEK_SET as libc::c_short;
        lk.l_start = i64::from(self.start);
        lk.l_len = 1;
        unsafe {
            libc::fcntl(self.fd, libc::F_SETLK, &raw mut lk);
        }
    }
}
