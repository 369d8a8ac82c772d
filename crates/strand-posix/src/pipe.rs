//! Non-blocking byte pipe
//!
//! A duplex byte channel over `pipe(2)` with both ends set to
//! `O_NONBLOCK` and `FD_CLOEXEC`. Reads and writes never block: a backed
//! up pipe reports would-block, a peer hangup reports closed, and a
//! short write carries the fact that more remains. The typical consumer
//! is a task entry point polling the reader between yields.

use std::io;
use std::os::fd::RawFd;

/// Outcome of a non-blocking read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Bytes were available
    Data(Vec<u8>),
    /// Nothing to read right now
    WouldBlock,
    /// The write end is closed and the pipe is drained
    Closed,
}

/// Outcome of a non-blocking write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Some bytes were accepted
    Written {
        /// Number of bytes written
        n: usize,
        /// Whether part of the buffer did not fit
        would_block_more: bool,
    },
    /// The pipe is full; nothing was written
    WouldBlock,
    /// The read end is closed
    Closed,
}

/// Read end of a non-blocking pipe
#[derive(Debug)]
pub struct PipeReader {
    fd: RawFd,
}

/// Write end of a non-blocking pipe
#[derive(Debug)]
pub struct PipeWriter {
    fd: RawFd,
}

/// Create a non-blocking pipe pair
pub fn pipe() -> io::Result<(PipeReader, PipeWriter)> {
    let mut fds = [0 as RawFd; 2];
    if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
        return Err(io::Error::last_os_error());
    }

    for &fd in &fds {
        if let Err(err) = set_flags(fd) {
            unsafe {
                libc::close(fds[0]);
                libc::close(fds[1]);
            }
            return Err(err);
        }
    }

    Ok((PipeReader { fd: fds[0] }, PipeWriter { fd: fds[1] }))
}

/// Mark a descriptor non-blocking and close-on-exec
fn set_flags(fd: RawFd) -> io::Result<()> {
    let status = unsafe { libc::fcntl(fd, libc::F_GETFL, 0) };
    if status == -1 || unsafe { libc::fcntl(fd, libc::F_SETFL, status | libc::O_NONBLOCK) } == -1 {
        return Err(io::Error::last_os_error());
    }

    let fdflags = unsafe { libc::fcntl(fd, libc::F_GETFD, 0) };
    if fdflags == -1 || unsafe { libc::fcntl(fd, libc::F_SETFD, fdflags | libc::FD_CLOEXEC) } == -1
    {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn is_retry(err: &io::Error) -> bool {
    matches!(
        err.raw_os_error(),
        Some(libc::EAGAIN) | Some(libc::EWOULDBLOCK) | Some(libc::EINTR)
    )
}

fn close_fd(fd: &mut RawFd) -> io::Result<()> {
    if *fd != -1 {
        let raw = *fd;
        *fd = -1;
        if unsafe { libc::close(raw) } == -1 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

impl PipeReader {
    /// Raw descriptor, for event-loop registration
    #[inline]
    pub fn fd(&self) -> RawFd {
        self.fd
    }

    /// Read whatever is available, up to one pipe buffer
    pub fn read(&self) -> io::Result<ReadOutcome> {
        let mut buf = [0u8; libc::PIPE_BUF];
        let n = unsafe { libc::read(self.fd, buf.as_mut_ptr().cast(), buf.len()) };
        match n {
            0 => Ok(ReadOutcome::Closed),
            -1 => {
                let err = io::Error::last_os_error();
                if is_retry(&err) {
                    Ok(ReadOutcome::WouldBlock)
                } else {
                    Err(err)
                }
            }
            n => Ok(ReadOutcome::Data(buf[..n as usize].to_vec())),
        }
    }

    /// Close the read end
    pub fn close(&mut self) -> io::Result<()> {
        close_fd(&mut self.fd)
    }
}

impl Drop for PipeReader {
    fn drop(&mut self) {
        let _ = close_fd(&mut self.fd);
    }
}

impl PipeWriter {
    /// Raw descriptor, for event-loop registration
    #[inline]
    pub fn fd(&self) -> RawFd {
        self.fd
    }

    /// Write as much of `data` as the pipe accepts
    ///
    /// Writing an empty slice is an error; a peer hangup reports
    /// [`WriteOutcome::Closed`] rather than an error.
    pub fn write(&self, data: &[u8]) -> io::Result<WriteOutcome> {
        if data.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "empty write buffer",
            ));
        }

        let n = unsafe { libc::write(self.fd, data.as_ptr().cast(), data.len()) };
        match n {
            0 => Ok(WriteOutcome::Closed),
            -1 => {
                let err = io::Error::last_os_error();
                if is_retry(&err) {
                    Ok(WriteOutcome::WouldBlock)
                } else if err.raw_os_error() == Some(libc::EPIPE) {
                    Ok(WriteOutcome::Closed)
                } else {
                    Err(err)
                }
            }
            n => {
                let n = n as usize;
                Ok(WriteOutcome::Written {
                    n,
                    would_block_more: n < data.len(),
                })
            }
        }
    }

    /// Close the write end
    pub fn close(&mut self) -> io::Result<()> {
        close_fd(&mut self.fd)
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        let _ = close_fd(&mut self.fd);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_pipe_would_block() {
        let (reader, _writer) = pipe().unwrap();
        assert_eq!(reader.read().unwrap(), ReadOutcome::WouldBlock);
    }

    #[test]
    fn test_write_then_read() {
        let (reader, writer) = pipe().unwrap();

        match writer.write(b"hello").unwrap() {
            WriteOutcome::Written { n, would_block_more } => {
                assert_eq!(n, 5);
                assert!(!would_block_more);
            }
            other => panic!("unexpected {:?}", other),
        }

        assert_eq!(reader.read().unwrap(), ReadOutcome::Data(b"hello".to_vec()));
        assert_eq!(reader.read().unwrap(), ReadOutcome::WouldBlock);
    }

    #[test]
    fn test_reader_sees_closed_after_writer_drops() {
        let (reader, writer) = pipe().unwrap();
        writer.write(b"last").unwrap();
        drop(writer);

        assert_eq!(reader.read().unwrap(), ReadOutcome::Data(b"last".to_vec()));
        assert_eq!(reader.read().unwrap(), ReadOutcome::Closed);
    }

    #[test]
    fn test_writer_sees_closed_after_reader_drops() {
        let (reader, writer) = pipe().unwrap();
        drop(reader);

        assert_eq!(writer.write(b"x").unwrap(), WriteOutcome::Closed);
    }

    #[test]
    fn test_full_pipe_would_block() {
        let (_reader, writer) = pipe().unwrap();
        let chunk = [0u8; libc::PIPE_BUF];

        // fill the kernel buffer; bounded by the default pipe capacity
        let mut saw_block = false;
        for _ in 0..4096 {
            match writer.write(&chunk).unwrap() {
                WriteOutcome::WouldBlock => {
                    saw_block = true;
                    break;
                }
                WriteOutcome::Written { .. } => {}
                other => panic!("unexpected {:?}", other),
            }
        }
        assert!(saw_block);
    }

    #[test]
    fn test_empty_write_rejected() {
        let (_reader, writer) = pipe().unwrap();
        let err = writer.write(b"").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_close_is_idempotent() {
        let (mut reader, mut writer) = pipe().unwrap();
        reader.close().unwrap();
        reader.close().unwrap();
        writer.close().unwrap();
        writer.close().unwrap();
    }
}
