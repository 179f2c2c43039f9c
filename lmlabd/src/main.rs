//! lmlab daemon: hosts playback sessions over JSON lines.
//!
//! Each TCP connection gets its own session, so one client's autoplay timer
//! can never move another client's cursor. Requests and responses are one
//! JSON object per line, tagged by `"type"`.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info, warn};

mod config;
mod error;
mod protocol;
mod session;

use config::DaemonConfig;
use error::DaemonError;
use lmlab::PlaybackConfig;
use protocol::{Request, Response};
use session::Session;

// ═══════════════════════════════════════════════════════════════════════════
// Client Handler
// ═══════════════════════════════════════════════════════════════════════════

async fn handle_client(stream: TcpStream, playback: PlaybackConfig) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    let mut session = Session::new(playback);

    let result = async {
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let response = match serde_json::from_str::<Request>(&line) {
                Ok(request) => session.handle(request).await,
                Err(e) => {
                    warn!("Invalid request: {}", e);
                    Response::error(format!("Invalid request: {e}"))
                }
            };

            writer
                .write_all(serde_json::to_string(&response)?.as_bytes())
                .await?;
            writer.write_all(b"\n").await?;
        }
        Ok::<(), DaemonError>(())
    }
    .await;

    session.close().await;
    result
}

// ═══════════════════════════════════════════════════════════════════════════
// Main
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = DaemonConfig::from_env_and_args()?;
    info!(
        "Intervals: counting {} ms, optimization {} ms",
        config.playback.counting_interval_ms, config.playback.optimization_interval_ms
    );

    let listener = TcpListener::bind(&config.addr).await?;
    info!("lmlab daemon listening on {}", config.addr);

    loop {
        let (stream, addr) = listener.accept().await?;
        info!("Client connected: {}", addr);
        let playback = config.playback;

        tokio::spawn(async move {
            match handle_client(stream, playback).await {
                Ok(()) => info!("Client disconnected: {}", addr),
                Err(e) => error!("Client handler error ({}): {}", addr, e),
            }
        });
    }
}
