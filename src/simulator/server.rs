// src/simulator/server.rs - TCP front end for the simulated controller
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::SimulatedController;
use crate::gcs::protocol::{MOTION_STATUS, STOP_ALL};

pub type SharedController = Arc<Mutex<SimulatedController>>;

/// How simulated motion advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimClock {
    /// Advance with wall time, every `tick`.
    Realtime { tick: Duration },
    /// Advance only through [`SimServer::advance`].
    Manual,
}

impl Default for SimClock {
    fn default() -> Self {
        SimClock::Realtime {
            tick: Duration::from_millis(10),
        }
    }
}

/// A simulated controller listening on TCP, like a controller's port 50000.
#[derive(Debug)]
pub struct SimServer {
    local_addr: SocketAddr,
    controller: SharedController,
    shutdown_tx: broadcast::Sender<()>,
}

impl SimServer {
    pub async fn start(
        bind: &str,
        controller: SimulatedController,
        clock: SimClock,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(bind).await?;
        let local_addr = listener.local_addr()?;
        let controller = Arc::new(Mutex::new(controller));
        let (shutdown_tx, _) = broadcast::channel(1);
        info!("Simulated GCS controller listening on {}", local_addr);

        tokio::spawn(accept_loop(listener, controller.clone(), shutdown_tx.clone()));
        if let SimClock::Realtime { tick } = clock {
            tokio::spawn(clock_loop(controller.clone(), tick, shutdown_tx.subscribe()));
        }

        Ok(Self {
            local_addr,
            controller,
            shutdown_tx,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Run `f` on the simulated controller.
    pub fn with_controller<R>(&self, f: impl FnOnce(&mut SimulatedController) -> R) -> Option<R> {
        let mut sim = self.controller.lock().ok()?;
        Some(f(&mut sim))
    }

    /// Advance simulated motion by `dt`.
    pub fn advance(&self, dt: Duration) {
        self.with_controller(|sim| sim.advance(dt));
    }

    /// Stop listening and drop every open connection.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

impl Drop for SimServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn accept_loop(
    listener: TcpListener,
    controller: SharedController,
    shutdown_tx: broadcast::Sender<()>,
) {
    let mut shutdown_rx = shutdown_tx.subscribe();
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("Simulated GCS controller shutting down");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!("Simulator connection from {}", peer);
                    tokio::spawn(serve_connection(stream, controller.clone(), shutdown_tx.subscribe()));
                }
                Err(e) => warn!("Simulator accept error: {}", e),
            }
        }
    }
}

async fn clock_loop(
    controller: SharedController,
    tick: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut last = Instant::now();
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {
                let now = Instant::now();
                let Ok(mut sim) = controller.lock() else { break };
                sim.advance(now - last);
                last = now;
            }
        }
    }
}

async fn serve_connection(
    mut stream: TcpStream,
    controller: SharedController,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut buf = [0u8; 1024];
    let mut line = Vec::new();
    loop {
        let n = tokio::select! {
            _ = shutdown_rx.recv() => break,
            read = stream.read(&mut buf) => match read {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    warn!("Simulator read error: {}", e);
                    break;
                }
            },
        };

        let mut replies = String::new();
        {
            let Ok(mut sim) = controller.lock() else { break };
            for &byte in &buf[..n] {
                match byte {
                    MOTION_STATUS => replies.push_str(&sim.motion_status()),
                    STOP_ALL => sim.stop_all(),
                    b'\n' => {
                        let text = String::from_utf8_lossy(&line).into_owned();
                        line.clear();
                        if let Some(reply) = sim.handle_line(&text) {
                            replies.push_str(&reply);
                        }
                    }
                    b'\r' => {}
                    other => line.push(other),
                }
            }
        }

        if !replies.is_empty() {
            if let Err(e) = stream.write_all(replies.as_bytes()).await {
                warn!("Simulator write error: {}", e);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, BufReader};

    #[tokio::test]
    async fn test_raw_bytes_and_lines() {
        let mut sim = SimulatedController::generic(&["A", "B"]);
        sim.set_referenced(true);
        let server = SimServer::start("127.0.0.1:0", sim, SimClock::Manual).await.unwrap();
        let stream = TcpStream::connect(server.local_addr()).await.unwrap();
        let mut stream = BufReader::new(stream);

        stream.get_mut().write_all(b"MOV A 1\n").await.unwrap();
        stream.get_mut().write_all(&[MOTION_STATUS]).await.unwrap();
        let mut reply = String::new();
        stream.read_line(&mut reply).await.unwrap();
        assert_eq!(reply, "1\n");

        stream.get_mut().write_all(&[STOP_ALL]).await.unwrap();
        stream.get_mut().write_all(b"ERR?\n").await.unwrap();
        reply.clear();
        stream.read_line(&mut reply).await.unwrap();
        assert_eq!(reply, "10\n");
        assert_eq!(server.with_controller(|s| s.any_moving()), Some(false));
    }
}
