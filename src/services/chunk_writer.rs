use crate::api::error::AppError;
use std::path::Path;
use tempfile::TempPath;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Read size used when copying chunk bytes; memory stays flat regardless of
/// how large a client makes its chunks.
pub const COPY_BUFFER_SIZE: usize = 4096;

/// Where the bytes of a chunk come from.
pub enum BodySource {
    /// The `file` part of a multipart request, spooled to a scratch file.
    Multipart(TempPath),
    /// The raw request body.
    Raw(Box<dyn AsyncRead + Send + Unpin>),
}

impl BodySource {
    pub fn raw(reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        BodySource::Raw(Box::new(reader))
    }

    pub fn framing(&self) -> &'static str {
        match self {
            BodySource::Multipart(_) => "multipart",
            BodySource::Raw(_) => "raw",
        }
    }
}

impl std::fmt::Debug for BodySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BodySource::Multipart(path) => f.debug_tuple("Multipart").field(&path).finish(),
            BodySource::Raw(_) => f.write_str("Raw(..)"),
        }
    }
}

/// Writes one chunk into `target`, truncating on the first chunk and
/// appending otherwise. Returns the number of bytes written.
///
/// A half written target is left in place on failure.
pub async fn write_chunk(target: &Path, is_first: bool, source: BodySource) -> Result<u64, AppError> {
    let mut out = tokio::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(is_first)
        .append(!is_first)
        .open(target)
        .await
        .map_err(|e| AppError::output_stream(format!("{:?}: {}", target, e)))?;

    let written = match source {
        BodySource::Multipart(scratch) => {
            let mut input = tokio::fs::File::open(&scratch)
                .await
                .map_err(|e| AppError::input_stream(format!("{:?}: {}", scratch, e)))?;
            let written = copy_buffered(&mut input, &mut out).await?;
            drop(input);
            if let Err(e) = scratch.close() {
                tracing::warn!("Failed to remove multipart scratch file: {}", e);
            }
            written
        }
        BodySource::Raw(mut input) => copy_buffered(&mut input, &mut out).await?,
    };

    out.flush().await?;
    Ok(written)
}

/// Streams a multipart file part into a scratch file inside `dir`. The file
/// is removed when the returned path is dropped or closed.
pub async fn spool_to_scratch<R>(dir: &Path, suffix: &str, mut reader: R) -> Result<TempPath, AppError>
where
    R: AsyncRead + Unpin,
{
    let named = tempfile::Builder::new()
        .prefix("upload-")
        .suffix(suffix)
        .tempfile_in(dir)
        .map_err(|e| AppError::input_stream(format!("can't create scratch file in {:?}: {}", dir, e)))?;
    let (file, path) = named.into_parts();

    let mut out = tokio::fs::File::from_std(file);
    copy_buffered(&mut reader, &mut out).await?;
    out.flush().await?;
    Ok(path)
}

async fn copy_buffered<R, W>(reader: &mut R, writer: &mut W) -> Result<u64, AppError>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buffer = [0u8; COPY_BUFFER_SIZE];
    let mut total = 0u64;
    loop {
        let n = reader.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        writer.write_all(&buffer[..n]).await?;
        total += n as u64;
    }
    Ok(total)
}
