//! Two independent FIFO ends presented as one duplex channel.
//!
//! Each end lives in its own task. The reader reopens itself forever on
//! failure (the peer may simply not have opened its writer yet). The writer
//! drains a frame queue and stops at the first failed write, handing the
//! frames it could not write back to the owner, which restarts the channel.
//! Neither task ever blocks the owner, so a peer that stops reading cannot
//! hold up a close.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use bytes::{Buf, Bytes, BytesMut};
use futures_util::StreamExt;
use jsonfifo_frame::{decode_message, Decoded, FrameConfig, FrameError, JsonFrameCodec};
use jsonfifo_transport::pipe::{open_reader, open_writer, PipeReader, PipeWriter};
use jsonfifo_transport::ChannelPaths;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tracing::{debug, info, warn};

use crate::control::ControlMessage;

/// Stream settings shared by both ends of a [`DuplexChannel`].
#[derive(Debug, Clone)]
pub struct StreamOptions {
    pub frame: FrameConfig,
    /// Pause between reader reopen attempts.
    pub reopen_delay: Duration,
    /// Silence after which buffered bytes of an unfinished frame are given
    /// up on.
    pub stale_frame_timeout: Duration,
}

/// What the stream tasks report.
#[derive(Debug)]
pub enum StreamEvent {
    /// A decoded JSON frame (control or data).
    Message(Value),
    /// Bytes were dropped (invalid JSON in a well-bounded frame, or an
    /// unfinished frame nobody completed); decoding continues.
    Malformed(String),
    /// The reader failed and is being reopened. Sent once per streak of
    /// consecutive failures.
    ReadFailed(String),
    /// The length prefix was unusable; the reader task has stopped.
    Corrupted(String),
    /// A write failed and the writer task has stopped. `unsent` holds the
    /// failed frame and everything queued behind it, in order.
    WriteFailed { error: String, unsent: Vec<Bytes> },
}

/// A [`StreamEvent`] tagged with the generation of the task that produced
/// it: the reader generation for read events, the writer generation for
/// [`StreamEvent::WriteFailed`].
#[derive(Debug)]
pub struct ChannelEvent {
    pub generation: u64,
    pub event: StreamEvent,
}

struct WriterHandle {
    frames: mpsc::UnboundedSender<Bytes>,
    task: JoinHandle<()>,
}

/// Reader/writer pair bound to one endpoint's in/out FIFO paths.
pub struct DuplexChannel {
    paths: ChannelPaths,
    options: StreamOptions,
    events: mpsc::UnboundedSender<ChannelEvent>,
    reader: Option<JoinHandle<()>>,
    writer: Option<WriterHandle>,
    generation: u64,
    out_generation: u64,
}

impl DuplexChannel {
    /// Create a closed channel and the receiver its tasks report to.
    pub fn new(
        paths: ChannelPaths,
        options: StreamOptions,
    ) -> (Self, mpsc::UnboundedReceiver<ChannelEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let channel = Self {
            paths,
            options,
            events: tx,
            reader: None,
            writer: None,
            generation: 0,
            out_generation: 0,
        };
        (channel, rx)
    }

    /// Start (or restart) the reader task on the in-path.
    ///
    /// Any previous reader is aborted along with its pending bytes.
    pub fn open_in(&mut self) {
        self.close_in();
        self.generation += 1;

        let task = ReadLoop {
            path: self.paths.in_path().to_path_buf(),
            generation: self.generation,
            options: self.options.clone(),
            events: self.events.clone(),
            failing: false,
        };
        self.reader = Some(tokio::spawn(task.run()));
    }

    /// Open the writer end on the out-path and start its task.
    ///
    /// Fails with a peer-absent error (see
    /// [`TransportError::is_peer_absent`](jsonfifo_transport::TransportError::is_peer_absent))
    /// while nobody reads the out-path.
    pub fn open_out(&mut self) -> jsonfifo_transport::Result<()> {
        self.close_out();
        let writer = open_writer(self.paths.out_path())?;
        info!(path = ?self.paths.out_path(), "fifo writer open");

        self.out_generation += 1;
        let (frames, queue) = mpsc::unbounded_channel();
        let task = write_loop(
            writer,
            self.paths.out_path().to_path_buf(),
            self.out_generation,
            queue,
            self.events.clone(),
        );
        self.writer = Some(WriterHandle {
            frames,
            task: tokio::spawn(task),
        });
        Ok(())
    }

    /// Queue one encoded frame for the writer task.
    ///
    /// `NotConnected` if the writer end is not open, `BrokenPipe` if its task
    /// already stopped (a [`StreamEvent::WriteFailed`] is then on its way).
    pub fn write(&self, frame: Bytes) -> io::Result<()> {
        let writer = self
            .writer
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "fifo writer not open"))?;
        writer
            .frames
            .send(frame)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "fifo writer stopped"))
    }

    /// Let the writer task drain what is queued, then close the writer end.
    ///
    /// Returns `false` if the queue was not drained within `timeout`; the
    /// remaining frames are dropped.
    pub async fn finish_out(&mut self, timeout: Duration) -> bool {
        let Some(WriterHandle { frames, mut task }) = self.writer.take() else {
            return true;
        };
        drop(frames);

        match tokio::time::timeout(timeout, &mut task).await {
            Ok(_) => {
                debug!(path = ?self.paths.out_path(), "closed fifo writer");
                true
            }
            Err(_) => {
                task.abort();
                debug!(path = ?self.paths.out_path(), "aborted stalled fifo writer");
                false
            }
        }
    }

    /// Close both ends, dropping anything still queued. Safe to call when
    /// already closed.
    pub fn close(&mut self) {
        self.close_in();
        self.close_out();
    }

    fn close_in(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
            debug!(path = ?self.paths.in_path(), "closed fifo reader");
        }
    }

    fn close_out(&mut self) {
        if let Some(writer) = self.writer.take() {
            writer.task.abort();
            debug!(path = ?self.paths.out_path(), "closed fifo writer");
        }
    }

    pub fn is_in_open(&self) -> bool {
        self.reader.is_some()
    }

    pub fn is_out_open(&self) -> bool {
        self.writer.is_some()
    }

    /// Generation of the current reader task; bumped by every `open_in`.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Generation of the current writer task; bumped by every successful
    /// `open_out`.
    pub fn out_generation(&self) -> u64 {
        self.out_generation
    }

    pub fn paths(&self) -> &ChannelPaths {
        &self.paths
    }
}

impl Drop for DuplexChannel {
    fn drop(&mut self) {
        self.close();
    }
}

async fn write_loop(
    mut writer: PipeWriter,
    path: PathBuf,
    generation: u64,
    mut queue: mpsc::UnboundedReceiver<Bytes>,
    events: mpsc::UnboundedSender<ChannelEvent>,
) {
    while let Some(frame) = queue.recv().await {
        if let Err(err) = writer.write_all(&frame).await {
            warn!(?path, error = %err, "fifo write failed");
            queue.close();
            let mut unsent = vec![frame];
            while let Ok(frame) = queue.try_recv() {
                unsent.push(frame);
            }
            let event = StreamEvent::WriteFailed {
                error: err.to_string(),
                unsent,
            };
            let _ = events.send(ChannelEvent { generation, event });
            return;
        }
    }
}

enum Flow {
    Next,
    Reopen,
    Stop,
}

struct ReadLoop {
    path: PathBuf,
    generation: u64,
    options: StreamOptions,
    events: mpsc::UnboundedSender<ChannelEvent>,
    failing: bool,
}

impl ReadLoop {
    async fn run(mut self) {
        // Start frames begin with zero bytes, which never occur inside JSON
        // text, so the marker only ever matches at a frame boundary.
        let marker = ControlMessage::Start.frame().unwrap_or_default();

        loop {
            let reader = match open_reader(&self.path) {
                Ok(reader) => reader,
                Err(err) => {
                    warn!(path = ?self.path, error = %err, "fifo reader open failed; retrying");
                    if !self.read_failed(err.to_string()) {
                        return;
                    }
                    tokio::time::sleep(self.options.reopen_delay).await;
                    continue;
                }
            };

            let codec = JsonFrameCodec::with_config(&self.options.frame);
            let mut frames = FramedRead::new(reader, codec);
            let flow = loop {
                // A frame stays pending across polls; the stale check only
                // fires after a full timeout without new bytes.
                let pending = frames.read_buffer().len();
                let timeout = self.options.stale_frame_timeout;
                let item = match tokio::time::timeout(timeout, frames.next()).await {
                    Ok(item) => item,
                    Err(_) => {
                        let buffered = frames.read_buffer().len();
                        if buffered == 0 || buffered > pending {
                            continue;
                        }
                        match self.resync(&mut frames, &marker) {
                            Flow::Next => continue,
                            flow => break flow,
                        }
                    }
                };
                let Some(item) = item else {
                    break Flow::Reopen;
                };
                match self.handle(item) {
                    Flow::Next => {}
                    flow => break flow,
                }
            };

            match flow {
                Flow::Stop => return,
                Flow::Next | Flow::Reopen => {
                    debug!(path = ?self.path, "fifo reader closed; reopening");
                    tokio::time::sleep(self.options.reopen_delay).await;
                }
            }
        }
    }

    fn handle(&mut self, item: Result<Decoded, FrameError>) -> Flow {
        let event = match item {
            Ok(Decoded::Message(value)) => {
                self.failing = false;
                StreamEvent::Message(value)
            }
            Ok(Decoded::Malformed(err)) => {
                warn!(path = ?self.path, error = %err, "dropping malformed frame");
                StreamEvent::Malformed(err.to_string())
            }
            Err(err) if err.is_stream_corrupt() => {
                warn!(path = ?self.path, error = %err, "fifo stream corrupt");
                self.report(StreamEvent::Corrupted(err.to_string()));
                return Flow::Stop;
            }
            Err(err) => {
                warn!(path = ?self.path, error = %err, "fifo read failed; reopening");
                if !self.read_failed(err.to_string()) {
                    return Flow::Stop;
                }
                return Flow::Reopen;
            }
        };
        if self.report(event) {
            Flow::Next
        } else {
            Flow::Stop
        }
    }

    /// Give up on an unfinished frame left by a writer that went away, then
    /// decode whatever complete frames follow it.
    fn resync(
        &mut self,
        frames: &mut FramedRead<PipeReader, JsonFrameCodec>,
        marker: &[u8],
    ) -> Flow {
        let dropped = discard_stale(frames.read_buffer_mut(), marker);
        warn!(path = ?self.path, dropped, "discarding incomplete frame");
        let message = format!("discarded {dropped} bytes of an incomplete frame");
        if !self.report(StreamEvent::Malformed(message)) {
            return Flow::Stop;
        }

        // The codec only runs again once new bytes arrive.
        let max_payload = frames.decoder().max_payload_size();
        loop {
            match decode_message(frames.read_buffer_mut(), max_payload) {
                Ok(None) => return Flow::Next,
                Ok(Some(decoded)) => match self.handle(Ok(decoded)) {
                    Flow::Next => {}
                    flow => return flow,
                },
                Err(err) => return self.handle(Err(err)),
            }
        }
    }

    /// Report the first failure of a streak. `false` once nobody listens.
    fn read_failed(&mut self, message: String) -> bool {
        if self.failing {
            return true;
        }
        self.failing = true;
        self.report(StreamEvent::ReadFailed(message))
    }

    fn report(&self, event: StreamEvent) -> bool {
        self.events
            .send(ChannelEvent {
                generation: self.generation,
                event,
            })
            .is_ok()
    }
}

/// Drop bytes up to the next start frame after the stale frame's header, or
/// everything if there is none. Returns the number of bytes dropped.
fn discard_stale(buffer: &mut BytesMut, marker: &[u8]) -> usize {
    let next_start = match buffer.get(1..) {
        Some(rest) if !marker.is_empty() => rest
            .windows(marker.len())
            .position(|window| window == marker)
            .map(|at| at + 1),
        _ => None,
    };
    let dropped = next_start.unwrap_or(buffer.len());
    buffer.advance(dropped);
    dropped
}

#[cfg(test)]
mod tests {
    use jsonfifo_frame::{encode_frame, encode_message, DEFAULT_MAX_PAYLOAD};
    use jsonfifo_transport::{provision, Role};
    use serde_json::json;

    use super::*;

    fn unique_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "jsonfifo-duplex-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ))
    }

    fn options() -> StreamOptions {
        StreamOptions {
            frame: FrameConfig::default(),
            reopen_delay: Duration::from_millis(10),
            stale_frame_timeout: Duration::from_millis(50),
        }
    }

    fn frame(value: &Value) -> Bytes {
        let mut buf = BytesMut::new();
        encode_message(value, DEFAULT_MAX_PAYLOAD, &mut buf).unwrap();
        buf.freeze()
    }

    fn channel_pair(
        dir: &std::path::Path,
    ) -> (
        (DuplexChannel, mpsc::UnboundedReceiver<ChannelEvent>),
        (DuplexChannel, mpsc::UnboundedReceiver<ChannelEvent>),
    ) {
        let host = ChannelPaths::new(dir, "duplex", Role::Host).unwrap();
        provision(&host).unwrap();
        let client = host.mirrored();
        (
            DuplexChannel::new(host, options()),
            DuplexChannel::new(client, options()),
        )
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<ChannelEvent>) -> ChannelEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("stream event should arrive")
            .expect("channel should stay open")
    }

    #[test]
    fn discard_stale_skips_to_next_start_frame() {
        let start = ControlMessage::Start.frame().unwrap();
        let mut buffer = BytesMut::from(&[0u8, 1, 0, 0, b'{', b'"'][..]);
        buffer.extend_from_slice(&start);
        buffer.extend_from_slice(&frame(&json!({"fromClient": "x"})));

        assert_eq!(discard_stale(&mut buffer, &start), 6);
        assert!(buffer.starts_with(&start));

        let mut lone = BytesMut::from(&[0u8, 0, 9, 9, b'['][..]);
        assert_eq!(discard_stale(&mut lone, &start), 5);
        assert!(lone.is_empty());
    }

    #[tokio::test]
    async fn writer_needs_peer_reader() {
        let dir = unique_dir("needs-reader");
        let ((mut host, _host_rx), (mut client, _client_rx)) = channel_pair(&dir);

        let err = host.open_out().unwrap_err();
        assert!(err.is_peer_absent());
        assert_eq!(host.out_generation(), 0);

        client.open_in();
        tokio::time::sleep(Duration::from_millis(50)).await;
        host.open_out().unwrap();
        assert!(host.is_out_open());
        assert_eq!(host.out_generation(), 1);

        host.close();
        client.close();
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn frames_cross_in_both_directions() {
        let dir = unique_dir("both-ways");
        let ((mut host, mut host_rx), (mut client, mut client_rx)) = channel_pair(&dir);

        host.open_in();
        client.open_in();
        tokio::time::sleep(Duration::from_millis(50)).await;
        host.open_out().unwrap();
        client.open_out().unwrap();

        host.write(frame(&json!({"fromHost": "blub"}))).unwrap();
        client.write(frame(&json!({"fromClient": "x"}))).unwrap();

        assert!(matches!(
            next_event(&mut client_rx).await.event,
            StreamEvent::Message(v) if v == json!({"fromHost": "blub"})
        ));
        assert!(matches!(
            next_event(&mut host_rx).await.event,
            StreamEvent::Message(v) if v == json!({"fromClient": "x"})
        ));

        host.close();
        client.close();
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn malformed_frame_is_reported_and_stream_continues() {
        let dir = unique_dir("malformed");
        let ((mut host, _host_rx), (mut client, mut client_rx)) = channel_pair(&dir);

        client.open_in();
        tokio::time::sleep(Duration::from_millis(50)).await;
        host.open_out().unwrap();

        let mut wire = BytesMut::new();
        encode_frame(b"{oops", &mut wire).unwrap();
        host.write(wire.freeze()).unwrap();
        host.write(frame(&json!("after"))).unwrap();

        assert!(matches!(
            next_event(&mut client_rx).await.event,
            StreamEvent::Malformed(_)
        ));
        assert!(matches!(
            next_event(&mut client_rx).await.event,
            StreamEvent::Message(v) if v == json!("after")
        ));

        host.close();
        client.close();
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn corrupt_prefix_stops_reader() {
        let dir = unique_dir("corrupt");
        let host_paths = ChannelPaths::new(&dir, "duplex", Role::Host).unwrap();
        provision(&host_paths).unwrap();
        let (mut host, _host_rx) = DuplexChannel::new(host_paths.clone(), options());
        let (mut client, mut client_rx) = DuplexChannel::new(
            host_paths.mirrored(),
            StreamOptions {
                frame: FrameConfig {
                    max_payload_size: 8,
                },
                ..options()
            },
        );

        client.open_in();
        tokio::time::sleep(Duration::from_millis(50)).await;
        host.open_out().unwrap();
        host.write(Bytes::from_static(&[0xFF, 0xFF, 0xFF, 0xFF, b'x']))
            .unwrap();

        let event = next_event(&mut client_rx).await;
        assert_eq!(event.generation, client.generation());
        assert!(matches!(event.event, StreamEvent::Corrupted(_)));

        host.close();
        client.close();
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn stale_partial_frame_is_dropped_before_next_start() {
        let dir = unique_dir("stale");
        let ((mut host, _host_rx), (mut client, mut client_rx)) = channel_pair(&dir);

        client.open_in();
        tokio::time::sleep(Duration::from_millis(50)).await;
        host.open_out().unwrap();

        // A header promising 64 KiB, then the writer goes quiet.
        host.write(Bytes::from_static(&[0, 1, 0, 0, b'{', b'"']))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        host.write(ControlMessage::Start.frame().unwrap()).unwrap();
        host.write(frame(&json!({"fromHost": "blub"}))).unwrap();

        let dropped = next_event(&mut client_rx).await;
        assert!(
            matches!(&dropped.event, StreamEvent::Malformed(m) if m.contains("6 bytes")),
            "{dropped:?}"
        );
        assert!(matches!(
            next_event(&mut client_rx).await.event,
            StreamEvent::Message(v) if v == json!({"ipc": "start"})
        ));
        assert!(matches!(
            next_event(&mut client_rx).await.event,
            StreamEvent::Message(v) if v == json!({"fromHost": "blub"})
        ));

        host.close();
        client.close();
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn reopened_reader_keeps_receiving() {
        let dir = unique_dir("reopen");
        let ((mut host, _host_rx), (mut client, mut client_rx)) = channel_pair(&dir);

        client.open_in();
        tokio::time::sleep(Duration::from_millis(50)).await;
        host.open_out().unwrap();
        host.write(frame(&json!("before"))).unwrap();
        let first = next_event(&mut client_rx).await;
        assert!(matches!(first.event, StreamEvent::Message(v) if v == json!("before")));

        let old_generation = client.generation();
        client.open_in();
        assert_eq!(client.generation(), old_generation + 1);
        tokio::time::sleep(Duration::from_millis(50)).await;

        // The host's writer never noticed the reader going away.
        host.write(frame(&json!("after"))).unwrap();
        let second = next_event(&mut client_rx).await;
        assert_eq!(second.generation, client.generation());
        assert!(matches!(second.event, StreamEvent::Message(v) if v == json!("after")));

        host.close();
        client.close();
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn failed_write_hands_back_unsent_frames() {
        let dir = unique_dir("write-failed");
        let ((mut host, mut host_rx), (mut client, _client_rx)) = channel_pair(&dir);

        client.open_in();
        tokio::time::sleep(Duration::from_millis(50)).await;
        host.open_out().unwrap();
        client.close();
        tokio::time::sleep(Duration::from_millis(50)).await;

        host.write(frame(&json!(1))).unwrap();
        let event = next_event(&mut host_rx).await;
        assert_eq!(event.generation, host.out_generation());
        match event.event {
            StreamEvent::WriteFailed { unsent, .. } => {
                assert_eq!(unsent.first(), Some(&frame(&json!(1))));
            }
            other => panic!("expected a write failure, got {other:?}"),
        }

        let err = host.write(frame(&json!(2))).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);

        host.close();
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn finish_out_gives_up_on_a_stalled_reader() {
        let dir = unique_dir("stalled");
        let ((mut host, _host_rx), _client) = channel_pair(&dir);

        // Holds the out-path open for reading and never reads.
        let _stalled = open_reader(host.paths().out_path()).unwrap();
        host.open_out().unwrap();
        let chunk = Bytes::from(vec![b' '; 256 * 1024]);
        host.write(chunk.clone()).unwrap();
        host.write(chunk).unwrap();

        let drained = tokio::time::timeout(
            Duration::from_secs(2),
            host.finish_out(Duration::from_millis(100)),
        )
        .await
        .expect("finish_out should not hang");
        assert!(!drained);
        assert!(!host.is_out_open());

        host.close();
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn write_without_writer_is_not_connected() {
        let dir = unique_dir("no-writer");
        let ((mut host, _rx), _client) = channel_pair(&dir);

        let err = host.write(Bytes::from_static(b"x")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
        assert!(host.finish_out(Duration::from_millis(10)).await);

        host.close();
        host.close();
        let _ = std::fs::remove_dir_all(&dir);
    }
}
