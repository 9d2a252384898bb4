//! Async client for a UCI engine subprocess.
//!
//! The engine is spawned either locally or over a held `ssh` channel; stdio
//! is bridged through a writer task (command lines in) and a reader task
//! (parsed [`UciMessage`]s out). At most one analysis can be in flight per
//! engine: [`UciEngine::analyze`] refuses to start while the previous
//! [`AnalysisHandle`] has not been cancelled or drained.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, Mutex};

use crate::uci::{parse_uci_message, UciMessage};
use crate::{EngineError, InfoRecord};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// How to start an engine process.
#[derive(Debug, Clone)]
pub struct SpawnSpec {
    /// Executable and arguments.
    pub command: Vec<String>,
    /// When present, the command is started on the remote host instead; the
    /// ssh subprocess is opened once and held for the engine's lifetime.
    pub ssh: Option<SshSpec>,
}

#[derive(Debug, Clone)]
pub struct SshSpec {
    pub host: String,
    pub username: String,
}

/// Where info records of the current analysis are routed. Cleared by the
/// reader task when `bestmove` arrives, which also closes the handle's
/// channel.
type InfoSink = Arc<Mutex<Option<mpsc::UnboundedSender<InfoRecord>>>>;

pub struct UciEngine {
    child: Child,
    stdin_tx: mpsc::Sender<String>,
    sink: InfoSink,
    handshake_rx: mpsc::Receiver<UciMessage>,
}

impl UciEngine {
    /// Spawn the engine and run the `uci`/`isready` handshake.
    pub async fn spawn(spec: &SpawnSpec) -> Result<Self, EngineError> {
        let mut command = build_command(spec)?;
        tracing::info!(command = ?spec.command, ssh = spec.ssh.is_some(), "Spawning engine");

        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EngineError::Startup(format!("spawn failed: {e}")))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| EngineError::Startup("engine has no stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Startup("engine has no stdout".to_string()))?;

        let (stdin_tx, mut stdin_rx) = mpsc::channel::<String>(32);
        let (handshake_tx, handshake_rx) = mpsc::channel::<UciMessage>(8);
        let sink: InfoSink = Arc::new(Mutex::new(None));

        // Writer task: serializes all command lines onto stdin.
        tokio::spawn(async move {
            while let Some(line) = stdin_rx.recv().await {
                tracing::trace!("UCI >> {}", line);
                if let Err(e) = stdin.write_all(format!("{line}\n").as_bytes()).await {
                    tracing::error!("Failed to write to engine stdin: {}", e);
                    break;
                }
                if let Err(e) = stdin.flush().await {
                    tracing::error!("Failed to flush engine stdin: {}", e);
                    break;
                }
            }
            tracing::debug!("Engine stdin writer exiting");
        });

        // Reader task: parses stdout and routes info records to the active
        // analysis, if any.
        let reader_sink = sink.clone();
        tokio::spawn(async move {
            let mut reader = BufReader::new(stdout).lines();
            loop {
                match reader.next_line().await {
                    Ok(Some(line)) => {
                        tracing::trace!("UCI << {}", line);
                        match parse_uci_message(&line) {
                            UciMessage::Info(info) => {
                                if let Some(tx) = reader_sink.lock().await.as_ref() {
                                    let _ = tx.send(info);
                                }
                            }
                            UciMessage::BestMove { mv, .. } => {
                                tracing::debug!(bestmove = %mv, "Analysis finished");
                                // Dropping the sender closes the handle's stream.
                                reader_sink.lock().await.take();
                            }
                            msg @ (UciMessage::UciOk | UciMessage::ReadyOk) => {
                                // Only consumed during startup; never block the
                                // reader on it.
                                let _ = handshake_tx.try_send(msg);
                            }
                            UciMessage::Id { name, value } => {
                                tracing::debug!(%name, %value, "Engine identification");
                            }
                            UciMessage::Other => {}
                        }
                    }
                    Ok(None) => {
                        tracing::warn!("Engine stdout closed");
                        break;
                    }
                    Err(e) => {
                        tracing::error!("Error reading engine stdout: {}", e);
                        break;
                    }
                }
            }
            reader_sink.lock().await.take();
            tracing::debug!("Engine stdout reader exiting");
        });

        let mut engine = Self {
            child,
            stdin_tx,
            sink,
            handshake_rx,
        };

        engine.send("uci").await?;
        engine.wait_handshake(UciMessage::UciOk).await?;
        engine.send("isready").await?;
        engine.wait_handshake(UciMessage::ReadyOk).await?;
        tracing::info!("Engine handshake complete");

        Ok(engine)
    }

    /// Begin analyzing `fen` with the given UCI options and multi-PV width.
    ///
    /// The returned handle streams parsed info records until the analysis is
    /// cancelled (or the engine stops by itself). The previous analysis must
    /// have been cancelled first.
    pub async fn analyze(
        &mut self,
        fen: &str,
        options: &[(String, String)],
        multipv: u32,
    ) -> Result<AnalysisHandle, EngineError> {
        let rx = {
            let mut sink = self.sink.lock().await;
            if sink.is_some() {
                return Err(EngineError::AnalysisInProgress);
            }
            let (tx, rx) = mpsc::unbounded_channel();
            *sink = Some(tx);
            rx
        };

        for (name, value) in options {
            self.send(&format!("setoption name {name} value {value}")).await?;
        }
        self.send(&format!("setoption name MultiPV value {multipv}"))
            .await?;
        self.send(&format!("position fen {fen}")).await?;
        self.send("go infinite").await?;
        tracing::debug!(%fen, multipv, "Analysis started");

        Ok(AnalysisHandle {
            info_rx: rx,
            stdin_tx: self.stdin_tx.clone(),
        })
    }

    /// Terminate the engine process.
    pub async fn quit(mut self) {
        let _ = self.stdin_tx.send("quit".to_string()).await;
        let _ = tokio::time::timeout(Duration::from_secs(1), self.child.wait()).await;
        let _ = self.child.kill().await;
    }

    async fn send(&self, line: &str) -> Result<(), EngineError> {
        self.stdin_tx
            .send(line.to_string())
            .await
            .map_err(|_| EngineError::Closed)
    }

    async fn wait_handshake(&mut self, expected: UciMessage) -> Result<(), EngineError> {
        let wait = async {
            while let Some(msg) = self.handshake_rx.recv().await {
                if msg == expected {
                    return Ok(());
                }
            }
            Err(EngineError::Closed)
        };
        tokio::time::timeout(HANDSHAKE_TIMEOUT, wait)
            .await
            .map_err(|_| EngineError::Startup(format!("timed out waiting for {expected:?}")))?
    }
}

/// A running analysis: an async stream of info records plus cancellation.
pub struct AnalysisHandle {
    info_rx: mpsc::UnboundedReceiver<InfoRecord>,
    stdin_tx: mpsc::Sender<String>,
}

impl AnalysisHandle {
    /// Next info record; `None` once the engine reported `bestmove` (after a
    /// cancel, or on its own for a terminal position).
    pub async fn next(&mut self) -> Option<InfoRecord> {
        self.info_rx.recv().await
    }

    /// Stop the analysis and wait until the engine is idle again, draining
    /// any in-flight records. The engine is ready for the next `analyze`
    /// once this returns.
    pub async fn cancel(mut self) -> Result<(), EngineError> {
        self.stdin_tx
            .send("stop".to_string())
            .await
            .map_err(|_| EngineError::Closed)?;
        while self.info_rx.recv().await.is_some() {}
        Ok(())
    }
}

fn build_command(spec: &SpawnSpec) -> Result<Command, EngineError> {
    let (program, args) = spec
        .command
        .split_first()
        .ok_or_else(|| EngineError::Startup("empty engine command".to_string()))?;
    match &spec.ssh {
        Some(ssh) => {
            let mut cmd = Command::new("ssh");
            cmd.arg("-T")
                .arg(&ssh.host)
                .arg("-l")
                .arg(&ssh.username)
                .arg("--")
                .args(&spec.command);
            Ok(cmd)
        }
        None => {
            let mut cmd = Command::new(program);
            cmd.args(args);
            Ok(cmd)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // A shell stand-in that speaks just enough UCI for the client.
    const FAKE_ENGINE: &str = r#"
while read line; do
  case "$line" in
    uci) echo "id name fake"; echo "uciok";;
    isready) echo "readyok";;
    go*) echo "info depth 1 multipv 1 score cp 10 nodes 100 pv e2e4";;
    stop) echo "bestmove e2e4";;
    quit) exit 0;;
  esac
done
"#;

    fn fake_spec() -> SpawnSpec {
        SpawnSpec {
            command: vec!["sh".to_string(), "-c".to_string(), FAKE_ENGINE.to_string()],
            ssh: None,
        }
    }

    #[tokio::test]
    async fn test_handshake_and_analysis_cycle() {
        let mut engine = UciEngine::spawn(&fake_spec()).await.unwrap();

        let mut handle = engine.analyze("fen", &[], 1).await.unwrap();
        let info = handle.next().await.unwrap();
        assert_eq!(info.nodes, Some(100));
        assert_eq!(info.pv, vec!["e2e4"]);

        handle.cancel().await.unwrap();

        // The engine is idle again and accepts the next analysis.
        let handle = engine.analyze("fen", &[], 2).await.unwrap();
        handle.cancel().await.unwrap();

        engine.quit().await;
    }

    #[tokio::test]
    async fn test_second_analysis_without_cancel_is_refused() {
        let mut engine = UciEngine::spawn(&fake_spec()).await.unwrap();
        let _handle = engine.analyze("fen", &[], 1).await.unwrap();
        assert!(matches!(
            engine.analyze("fen", &[], 1).await,
            Err(EngineError::AnalysisInProgress)
        ));
        engine.quit().await;
    }

    #[tokio::test]
    async fn test_spawn_failure_is_startup_error() {
        let spec = SpawnSpec {
            command: vec!["/nonexistent/engine-binary".to_string()],
            ssh: None,
        };
        assert!(matches!(
            UciEngine::spawn(&spec).await,
            Err(EngineError::Startup(_))
        ));
    }
}
