//! Line readers for child process output.
//!
//! Lines are split on bytes and decoded lossily so a stray non-UTF-8 byte
//! does not end the reader.

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;

use crate::events::{EventBus, PackageEvent};

/// Which event a line becomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl StreamKind {
    fn event(self, package_id: &str, line: String) -> PackageEvent {
        let package_id = package_id.to_string();
        match self {
            StreamKind::Stdout => PackageEvent::Output { package_id, line },
            StreamKind::Stderr => PackageEvent::Error { package_id, line },
        }
    }
}

/// Forward each line of `stream` to `events`, tagged with `package_id`.
pub fn spawn_stream_reader(
    stream: impl AsyncRead + Unpin + Send + 'static,
    package_id: String,
    kind: StreamKind,
    events: EventBus,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut buf: Vec<u8> = Vec::with_capacity(1024);

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    if buf.last() == Some(&b'\n') {
                        buf.pop();
                        if buf.last() == Some(&b'\r') {
                            buf.pop();
                        }
                    }
                    let line = String::from_utf8_lossy(&buf).into_owned();
                    events.emit(kind.event(&package_id, line));
                }
                Err(e) => {
                    tracing::debug!(package_id = %package_id, ?kind, error = %e, "Stream reader exiting on read error");
                    break;
                }
            }
        }

        tracing::debug!(package_id = %package_id, ?kind, "Stream reader task exiting");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lines_forwarded_with_crlf_and_invalid_utf8() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let input: &[u8] = b"first\r\nsec\xffond\nlast";

        spawn_stream_reader(input, "demo".to_string(), StreamKind::Stderr, bus)
            .await
            .unwrap();

        let mut lines = Vec::new();
        while let Ok(event) = rx.try_recv() {
            match event {
                PackageEvent::Error { line, .. } => lines.push(line),
                other => panic!("unexpected event {other:?}"),
            }
        }
        assert_eq!(lines, vec!["first", "sec\u{fffd}ond", "last"]);
    }
}
