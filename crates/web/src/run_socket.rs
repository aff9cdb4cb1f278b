//! Run WebSocket
//!
//! Bridges one WebSocket connection to one pipeline run. The client sends the
//! request as its first text frame and then receives every event as a text
//! frame. Closing the socket early aborts the run.

use axum::extract::ws::{Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use suiterun_common::{ExecutionRequest, Failure, StreamEvent};
use suiterun_engine::{EventSink, EventStream, Pipeline};
use tracing::{debug, info, warn};

/// Streams a single run over a WebSocket
pub struct RunSocket {
    pipeline: Pipeline,
}

impl RunSocket {
    pub fn new(pipeline: Pipeline) -> Self {
        Self { pipeline }
    }

    /// Serve the run requested by the client's first frame
    pub async fn bridge(self, socket: WebSocket) -> anyhow::Result<()> {
        let (mut ws_write, mut ws_read) = socket.split();

        let request = match Self::read_request(&mut ws_read).await {
            Some(Ok(request)) => request,
            Some(Err(message)) => {
                warn!("rejecting run request: {}", message);
                let event = StreamEvent::Error(Failure { message });
                ws_write
                    .send(Message::Text(serde_json::to_string(&event)?))
                    .await?;
                let _ = ws_write.close().await;
                return Ok(());
            }
            None => {
                debug!("client left before sending a request");
                return Ok(());
            }
        };

        info!(files = request.files.len(), engine = %request.target_engine, "run requested over websocket");

        let (sink, stream) = EventSink::channel();
        let pipeline = self.pipeline.clone();
        let run = tokio::spawn(async move { pipeline.execute(request, sink).await });

        let forward = Self::forward_events(stream, ws_write);
        let watch = Self::watch_client(ws_read);

        tokio::select! {
            result = forward => {
                if let Err(e) = result {
                    debug!("event forwarding ended: {}", e);
                    run.abort();
                }
            }
            _ = watch => {
                info!("client disconnected, aborting run");
                run.abort();
            }
        }

        match run.await {
            Ok(stage) => debug!(%stage, "websocket run finished"),
            Err(e) if e.is_cancelled() => debug!("websocket run aborted"),
            Err(e) => warn!("run task failed: {}", e),
        }
        Ok(())
    }

    /// Wait for the first data frame. `None` when the client goes away first.
    async fn read_request(
        ws_read: &mut SplitStream<WebSocket>,
    ) -> Option<Result<ExecutionRequest, String>> {
        while let Some(msg) = ws_read.next().await {
            let text = match msg {
                Ok(Message::Text(text)) => text,
                Ok(Message::Binary(data)) => String::from_utf8_lossy(&data).into_owned(),
                Ok(Message::Close(_)) => return None,
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
                Err(e) => {
                    debug!("websocket error before request: {}", e);
                    return None;
                }
            };
            return Some(
                ExecutionRequest::from_json(&text)
                    .map_err(|e| format!("Invalid execution request: {}", e)),
            );
        }
        None
    }

    /// Forward events until the run's stream ends, then close the socket
    async fn forward_events(
        mut stream: EventStream,
        mut ws_write: SplitSink<WebSocket, Message>,
    ) -> anyhow::Result<()> {
        while let Some(event) = stream.recv().await {
            let frame = serde_json::to_string(&event)?;
            ws_write.send(Message::Text(frame)).await?;
        }

        let _ = ws_write.close().await;
        Ok(())
    }

    /// Resolves once the client closes its side
    async fn watch_client(mut ws_read: SplitStream<WebSocket>) {
        while let Some(msg) = ws_read.next().await {
            match msg {
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    debug!("websocket read error: {}", e);
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::time::Duration;

    use futures::{SinkExt, StreamExt};
    use suiterun_common::StreamEvent;
    use suiterun_engine::EngineConfig;
    use tokio::net::TcpStream;
    use tokio_tungstenite::tungstenite::Message as ClientMessage;
    use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

    use crate::server::WebServer;

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    async fn spawn_server(config: EngineConfig) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = WebServer::new(config).router();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
        addr
    }

    async fn connect(addr: SocketAddr) -> Client {
        let (client, _) = connect_async(format!("ws://{}/ws/run", addr)).await.unwrap();
        client
    }

    /// Every event frame up to the server's close
    async fn read_events(client: &mut Client) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        let frames = async {
            while let Some(frame) = client.next().await {
                match frame.unwrap() {
                    ClientMessage::Text(text) => events.push(serde_json::from_str(&text).unwrap()),
                    ClientMessage::Close(_) => break,
                    other => panic!("unexpected frame: {:?}", other),
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(20), frames)
            .await
            .expect("server closed the socket");
        events
    }

    #[tokio::test]
    async fn test_malformed_request_gets_one_error_frame() {
        let addr = spawn_server(EngineConfig::default()).await;
        let mut client = connect(addr).await;
        client.send(ClientMessage::Text("{not json".into())).await.unwrap();

        let events = read_events(&mut client).await;
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            StreamEvent::Error(f) if f.message.starts_with("Invalid execution request")
        ));
    }

    #[tokio::test]
    async fn test_events_end_with_the_terminal_frame() {
        let work_root = tempfile::tempdir().unwrap();
        let addr = spawn_server(EngineConfig {
            work_root: Some(work_root.path().to_path_buf()),
            ..EngineConfig::default()
        })
        .await;
        let mut client = connect(addr).await;
        client
            .send(ClientMessage::Text(
                r#"{"files": [{"name": "test_x.py", "path": "../escape", "content": ""}]}"#.into(),
            ))
            .await
            .unwrap();

        let events = read_events(&mut client).await;
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
        assert!(matches!(events.last(), Some(StreamEvent::Error(f)) if f.message.contains("escape")));
        assert_eq!(std::fs::read_dir(work_root.path()).unwrap().count(), 0);
    }

    /// Alive and not a zombie
    #[cfg(target_os = "linux")]
    fn is_running(pid: i32) -> bool {
        match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
            Ok(stat) => !stat
                .rsplit(')')
                .next()
                .is_some_and(|rest| rest.trim_start().starts_with('Z')),
            Err(_) => false,
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_disconnect_kills_the_step_and_removes_the_workspace() {
        use std::os::unix::fs::PermissionsExt;

        let tools = tempfile::tempdir().unwrap();
        let work_root = tempfile::tempdir().unwrap();
        let pid_file = tools.path().join("python.pid");
        let python = tools.path().join("python");
        std::fs::write(
            &python,
            format!("#!/bin/sh\necho $$ > '{}'\nexec sleep 60\n", pid_file.display()),
        )
        .unwrap();
        std::fs::set_permissions(&python, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut config = EngineConfig {
            work_root: Some(work_root.path().to_path_buf()),
            ..EngineConfig::default()
        };
        config.python.interpreter = python.to_string_lossy().into_owned();
        let addr = spawn_server(config).await;

        let mut client = connect(addr).await;
        client
            .send(ClientMessage::Text(
                r#"[{"name": "requirements.txt", "path": "", "content": "pytest\n"},
                    {"name": "test_x.py", "path": "", "content": "def test_x(): pass\n"}]"#
                    .into(),
            ))
            .await
            .unwrap();

        let mut pid = None;
        for _ in 0..200 {
            pid = std::fs::read_to_string(&pid_file)
                .ok()
                .and_then(|s| s.trim().parse::<i32>().ok());
            if pid.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        let pid = pid.expect("environment step started");
        assert_eq!(std::fs::read_dir(work_root.path()).unwrap().count(), 1);

        client.close(None).await.unwrap();

        let mut cleaned = false;
        for _ in 0..100 {
            let leftover = std::fs::read_dir(work_root.path()).unwrap().count();
            if !is_running(pid) && leftover == 0 {
                cleaned = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(cleaned, "step {} or its workspace outlived the connection", pid);
    }
}
