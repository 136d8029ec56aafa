use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::info;

use crate::config::ServerConfig;
use crate::protocol::JsonRpcResponse;
use crate::session::Session;

/// Serve newline-delimited JSON-RPC 2.0 until the reader hits EOF.
///
/// Requests are handled one at a time, in arrival order.
pub async fn serve<R, W>(reader: R, mut writer: W, config: &ServerConfig) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let session = Session::new();
    let mut reader = BufReader::new(reader);
    let mut raw = Vec::new();

    info!("stdio transport ready");
    loop {
        raw.clear();
        let n = reader.read_until(b'\n', &mut raw).await?;
        if n == 0 {
            break;
        }

        if let Some(resp) = session.handle_raw(&raw, config).await {
            write_response(&mut writer, &resp).await?;
        }
    }

    info!("stdin closed, shutting down");
    Ok(())
}

async fn write_response<W>(writer: &mut W, resp: &JsonRpcResponse) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let out = serde_json::to_string(resp)?;
    writer.write_all(out.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}
