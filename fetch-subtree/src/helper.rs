use std::io::{self, Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// A flag shared between a running download and whoever may want to stop it.
///
/// Clones share the same flag. Once [`cancel`](CancelToken::cancel) has been called, every
/// streaming copy stops at its next chunk boundary and the download cleans up after itself.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Safe to call from a signal handler thread.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Why a [`copy_cancellable`] stopped early.
#[derive(Debug)]
pub(crate) enum CopyError {
    Cancelled,
    Read(io::Error),
    Write(io::Error),
}

/// Stream `reader` into `writer` in fixed-size chunks, checking `cancel` before each chunk.
/// Returns the number of bytes copied.
pub(crate) fn copy_cancellable<R, W>(
    reader: &mut R,
    writer: &mut W,
    cancel: &CancelToken,
) -> Result<u64, CopyError>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    let mut copied = 0u64;
    loop {
        if cancel.is_cancelled() {
            return Err(CopyError::Cancelled);
        }
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(CopyError::Read(e)),
        };
        writer.write_all(&buf[..n]).map_err(CopyError::Write)?;
        copied += n as u64;
    }
    writer.flush().map_err(CopyError::Write)?;
    Ok(copied)
}

#[cfg(test)]
mod test_copy_cancellable {
    use super::*;

    #[test]
    fn copies_everything() {
        let data = vec![7u8; COPY_BUFFER_SIZE * 2 + 13];
        let mut out = Vec::new();
        let copied = copy_cancellable(&mut data.as_slice(), &mut out, &CancelToken::new()).unwrap();
        assert_eq!(copied, data.len() as u64);
        assert_eq!(out, data);
    }

    #[test]
    fn stops_when_cancelled() {
        let token = CancelToken::new();
        token.clone().cancel();
        let mut out = Vec::new();
        let result = copy_cancellable(&mut b"abc".as_slice(), &mut out, &token);
        assert!(matches!(result, Err(CopyError::Cancelled)));
        assert!(out.is_empty());
    }

    #[test]
    fn write_errors_are_distinguished() {
        struct Full;
        impl Write for Full {
            fn write(&mut self, _: &[u8]) -> io::Result<usize> {
                Err(io::Error::other("disk full"))
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }
        let result = copy_cancellable(&mut b"abc".as_slice(), &mut Full, &CancelToken::new());
        assert!(matches!(result, Err(CopyError::Write(_))));
    }
}
