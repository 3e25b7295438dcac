//! Atomic file writes for the local backend.
//!
//! Both the native copy and the streaming writer create a temp file in the
//! destination directory and rename it into place once the content is
//! complete, so an interrupted transfer never leaves a partial document.

use filetime::{FileTime, set_file_times};
use futures::FutureExt;
use futures::future::BoxFuture;
use std::fs::{self, File, Metadata};
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use tempfile::{NamedTempFile, TempPath};
use tokio::io::AsyncWrite;

/// Copy `src` over `dst` through a temp file in `dst`'s directory.
///
/// Replaces an existing document. Returns the number of bytes copied.
pub(super) fn copy_file(src: &Path, dst: &Path, fsync: bool, timestamps: bool) -> io::Result<u64> {
    let src_meta = fs::metadata(src)?;
    if src_meta.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::IsADirectory,
            src.display().to_string(),
        ));
    }
    if fs::metadata(dst).is_ok_and(|m| m.is_dir()) {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            dst.display().to_string(),
        ));
    }

    let src_file = File::open(src)?;
    let temp_file = NamedTempFile::new_in(parent_dir(dst))?;
    let bytes = copy_file_contents(&src_file, temp_file.as_file(), src_meta.len())?;

    if fsync {
        temp_file.as_file().sync_all()?;
    }
    temp_file.persist(dst).map_err(|e| e.error)?;

    if timestamps {
        // Timestamp errors are not fatal: the content already arrived
        let _ = preserve_timestamps(&src_meta, dst);
    }
    Ok(bytes)
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Copy file contents using the best available method.
///
/// On Linux uses `copy_file_range` so data never enters userspace; falls back
/// to `std::io::copy` elsewhere.
fn copy_file_contents(src: &File, dst: &File, len: u64) -> io::Result<u64> {
    #[cfg(target_os = "linux")]
    {
        copy_file_range_all(src, dst, len)
    }
    #[cfg(not(target_os = "linux"))]
    {
        let _ = len;
        io::copy(&mut io::BufReader::new(src), &mut &*dst)
    }
}

#[cfg(target_os = "linux")]
fn copy_file_range_all(src: &File, dst: &File, len: u64) -> io::Result<u64> {
    use std::os::unix::io::AsRawFd;

    let mut remaining = len;
    let mut copied: u64 = 0;

    while remaining > 0 {
        let chunk_size = remaining.min(128 * 1024 * 1024) as usize;

        // SAFETY: both descriptors are open for the duration of the call and
        // null offsets make the kernel use (and advance) the file positions.
        let result = unsafe {
            libc::copy_file_range(
                src.as_raw_fd(),
                std::ptr::null_mut(),
                dst.as_raw_fd(),
                std::ptr::null_mut(),
                chunk_size,
                0,
            )
        };

        if result < 0 {
            let err = io::Error::last_os_error();
            if copied == 0
                && matches!(
                    err.raw_os_error(),
                    Some(libc::EXDEV | libc::ENOSYS | libc::EINVAL | libc::EOPNOTSUPP)
                )
            {
                return io::copy(&mut io::BufReader::new(src), &mut &*dst);
            }
            return Err(err);
        }
        if result == 0 {
            // Source shrank while copying
            break;
        }

        let n = result as u64;
        copied += n;
        remaining = remaining.saturating_sub(n);
    }

    Ok(copied)
}

fn preserve_timestamps(src_meta: &Metadata, dst: &Path) -> io::Result<()> {
    let mtime = FileTime::from_last_modification_time(src_meta);
    let atime = FileTime::from_last_access_time(src_meta);
    set_file_times(dst, atime, mtime)
}

/// Write stream that replaces `dest` on shutdown.
///
/// Writes land in a temp file next to `dest`. Dropping the writer before
/// shutdown removes the temp file and leaves `dest` untouched.
pub(super) struct AtomicWriter {
    file: Option<tokio::fs::File>,
    temp: Option<TempPath>,
    dest: PathBuf,
    fsync: bool,
    commit: Option<BoxFuture<'static, io::Result<()>>>,
}

impl AtomicWriter {
    /// Create the temp file for a replacement of `dest`.
    pub(super) async fn create(dest: PathBuf, fsync: bool) -> io::Result<Self> {
        let dir = parent_dir(&dest).to_path_buf();
        let temp = tokio::task::spawn_blocking(move || NamedTempFile::new_in(dir))
            .await
            .map_err(io::Error::other)??;
        let (file, temp) = temp.into_parts();
        Ok(Self {
            file: Some(tokio::fs::File::from_std(file)),
            temp: Some(temp),
            dest,
            fsync,
            commit: None,
        })
    }
}

async fn commit(
    file: tokio::fs::File,
    temp: TempPath,
    dest: PathBuf,
    fsync: bool,
) -> io::Result<()> {
    if fsync {
        file.sync_all().await?;
    }
    drop(file);
    tokio::task::spawn_blocking(move || temp.persist(&dest).map_err(|e| e.error))
        .await
        .map_err(io::Error::other)?
}

fn closed() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "write stream already shut down")
}

impl AsyncWrite for AtomicWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.file.as_mut() {
            Some(file) => Pin::new(file).poll_write(cx, buf),
            None => Poll::Ready(Err(closed())),
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.file.as_mut() {
            Some(file) => Pin::new(file).poll_flush(cx),
            None => Poll::Ready(Ok(())),
        }
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        loop {
            if let Some(pending) = self.commit.as_mut() {
                let result = ready!(pending.poll_unpin(cx));
                self.commit = None;
                return Poll::Ready(result);
            }
            let Some(file) = self.file.as_mut() else {
                return Poll::Ready(Ok(()));
            };
            ready!(Pin::new(file).poll_flush(cx))?;
            let (Some(file), Some(temp)) = (self.file.take(), self.temp.take()) else {
                return Poll::Ready(Err(closed()));
            };
            let dest = self.dest.clone();
            let fsync = self.fsync;
            self.commit = Some(Box::pin(commit(file, temp, dest, fsync)));
        }
    }
}
