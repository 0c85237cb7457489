//! Socket transport — owns one TCP connection to the editor.
//!
//! A driver task connects, then multiplexes the outbound frame queue, the
//! inbound line reader and a shutdown signal. Everything it observes is posted
//! to the session as a [`Signal`] tagged with this transport's generation, so
//! late events from a destroyed transport can be recognised and ignored.
//! There is no retry here; reconnecting is the session's job.

use std::io;

use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::codec::{self, FrameReader, FrameWriter};
use crate::error::TransportError;
use crate::types::{Signal, TransportEvent};

/// Check that a configured port is a non-negative integer in `u16` range.
pub fn resolve_port(port: Option<&Value>) -> Result<u16, TransportError> {
    let Some(value) = port else {
        return Err(TransportError::InvalidConfiguration(
            "no port configured".to_string(),
        ));
    };
    value
        .as_u64()
        .and_then(|port| u16::try_from(port).ok())
        .ok_or_else(|| {
            TransportError::InvalidConfiguration(format!("the port specified is invalid: {value}"))
        })
}

pub(crate) struct Transport {
    generation: u64,
    outbound_tx: mpsc::UnboundedSender<String>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    #[allow(dead_code)]
    driver_handle: JoinHandle<()>,
}

impl Transport {
    /// Validate the port and start connecting in the background.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(
        host: &str,
        port: Option<&Value>,
        generation: u64,
        signals: mpsc::Sender<Signal>,
    ) -> Result<Self, TransportError> {
        let port = resolve_port(port)?;
        if host.trim().is_empty() {
            return Err(TransportError::InvalidConfiguration(
                "host must not be empty".to_string(),
            ));
        }

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let driver_handle = tokio::spawn(drive(
            host.to_string(),
            port,
            generation,
            signals,
            outbound_rx,
            shutdown_rx,
        ));

        Ok(Self {
            generation,
            outbound_tx,
            shutdown_tx: Some(shutdown_tx),
            driver_handle,
        })
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Queue one frame. Frames are written in call order; anything queued
    /// before the connection completes goes out right after it.
    pub fn send(&self, msg: &Value) -> Result<(), TransportError> {
        let frame = codec::encode_frame(msg)?;
        self.outbound_tx.send(frame).map_err(|_| {
            TransportError::Io(io::Error::new(
                io::ErrorKind::NotConnected,
                "transport driver has stopped",
            ))
        })
    }

    /// Tear the connection down once already-queued frames are written. A
    /// `Closed` event follows asynchronously. Idempotent.
    pub fn destroy(&mut self) {
        if let Some(shutdown) = self.shutdown_tx.take() {
            let _ = shutdown.send(());
        }
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.destroy();
    }
}

async fn drive(
    host: String,
    port: u16,
    generation: u64,
    signals: mpsc::Sender<Signal>,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let post = move |event: TransportEvent| {
        let signals = signals.clone();
        async move {
            // The session may already be gone; nothing left to notify then.
            let _ = signals.send(Signal::Transport { generation, event }).await;
        }
    };

    let connected = tokio::select! {
        result = TcpStream::connect((host.as_str(), port)) => result,
        _ = &mut shutdown_rx => {
            post(TransportEvent::Closed).await;
            return;
        }
    };

    let stream = match connected {
        Ok(stream) => stream,
        Err(e) => {
            tracing::debug!(generation, "connect to {host}:{port} failed: {e}");
            post(TransportEvent::Error(e.to_string())).await;
            post(TransportEvent::Closed).await;
            return;
        }
    };
    post(TransportEvent::Connected).await;

    let (read_half, write_half) = stream.into_split();
    let mut reader = FrameReader::new(read_half);
    let mut writer = FrameWriter::new(write_half);

    loop {
        tokio::select! {
            biased;
            // Frames queued before a destroy still go out.
            frame = outbound_rx.recv() => match frame {
                Some(frame) => {
                    if let Err(e) = writer.write_encoded(&frame).await {
                        post(TransportEvent::Error(e.to_string())).await;
                        break;
                    }
                }
                None => break,
            },
            _ = &mut shutdown_rx => break,
            line = reader.read_frame() => match line {
                Ok(Some(line)) => post(TransportEvent::Data(line)).await,
                Ok(None) => break,
                Err(e) => {
                    post(TransportEvent::Error(e.to_string())).await;
                    break;
                }
            },
        }
    }

    post(TransportEvent::Closed).await;
}
