use anyhow::{bail, Context};
use std::path::Path;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::UnixStream;

use ipc::MAX_FRAME_BYTES;

pub async fn connect(socket: &Path) -> anyhow::Result<UnixStream> {
    log::debug!("connect: target={}", socket.display());
    let s = UnixStream::connect(socket)
        .await
        .with_context(|| format!("connect {}", socket.display()))?;
    log::info!("connect: ok target={}", socket.display());
    Ok(s)
}

/// Length (u32 BE) then payload.
pub async fn send_frame<W: AsyncWrite + Unpin>(writer: &mut W, buf: &[u8]) -> anyhow::Result<()> {
    log::debug!("send_frame: bytes={}", buf.len());
    if buf.len() > MAX_FRAME_BYTES {
        bail!("frame too large: {} bytes", buf.len());
    }
    writer
        .write_u32(buf.len() as u32)
        .await
        .context("write len")?;
    writer.write_all(buf).await.context("write payload")?;
    writer.flush().await.context("flush")?;
    Ok(())
}

/// `Ok(None)` when the peer closed the stream before a new frame started.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> anyhow::Result<Option<Vec<u8>>> {
    let len = match reader.read_u32().await {
        Ok(l) => l as usize,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e).context("read len"),
    };
    if len > MAX_FRAME_BYTES {
        bail!("frame too large: {len} bytes");
    }
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await.context("read payload")?;
    Ok(Some(buf))
}
