use serde::Serialize;
use tokio::io::AsyncWriteExt as _;

/// One JSON value per line, flushed.
pub async fn write_frame<W, T>(out: &mut W, v: &T) -> eyre::Result<()>
where
    W: tokio::io::AsyncWrite + Unpin + Send,
    T: Serialize + Sync,
{
    let mut line = serde_json::to_vec(v)?;
    line.push(b'\n');
    out.write_all(&line).await?;
    out.flush().await?;
    Ok(())
}
