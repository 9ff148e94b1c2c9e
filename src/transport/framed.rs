//! # Framed Transport
//!
//! Decouples "accumulate bytes" from "flush bytes" so several writes reach
//! the printer as one transmission.
//!
//! ## Settle Time
//!
//! After a flush the sender waits for the printer to work through the
//! payload before anything else is sent:
//!
//! ```text
//! settle = extra_delay + floor(payload_len / 16) ms
//! ```

use std::io::Write;
use std::time::Duration;

use tracing::trace;

use crate::error::PrinterError;
use crate::sleep::Pacer;

/// Bytes the printer processes per millisecond of settle time.
pub const BYTES_PER_MS: usize = 16;

/// Wait after flushing `payload_len` bytes.
pub fn settle_time(payload_len: usize, extra_delay: Duration) -> Duration {
    extra_delay + Duration::from_millis((payload_len / BYTES_PER_MS) as u64)
}

/// # Framed Transport
///
/// A write buffer in front of an optional output sink. The sink is attached
/// when a connection opens and detached when it closes.
#[derive(Debug)]
pub struct FramedTransport<W> {
    buffer: Vec<u8>,
    sink: Option<W>,
}

impl<W> Default for FramedTransport<W> {
    fn default() -> Self {
        Self {
            buffer: Vec::new(),
            sink: None,
        }
    }
}

impl<W: Write> FramedTransport<W> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, sink: W) {
        self.sink = Some(sink);
    }

    /// Remove the sink, handing it back so the owner can close it.
    pub fn detach(&mut self) -> Option<W> {
        self.sink.take()
    }

    pub fn is_attached(&self) -> bool {
        self.sink.is_some()
    }

    /// Queue bytes for the next [`send`](Self::send). Never touches the wire.
    pub fn write(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Bytes queued and not yet sent.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Discard queued bytes without sending them.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Flush queued bytes to the sink, then wait the settle time.
    ///
    /// Sending with nothing queued is a successful no-op.
    pub fn send(&mut self, extra_delay: Duration, pacer: &Pacer<'_>) -> Result<(), PrinterError> {
        let sink = self.sink.as_mut().ok_or(PrinterError::NotConnected)?;
        if self.buffer.is_empty() {
            return Ok(());
        }

        sink.write_all(&self.buffer)
            .and_then(|()| sink.flush())
            .map_err(PrinterError::connection_failed)?;

        let wait = settle_time(self.buffer.len(), extra_delay);
        trace!(bytes = self.buffer.len(), settle_ms = wait.as_millis() as u64, "flushed");
        self.buffer.clear();

        pacer.pause(wait)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sleep::{CancelToken, Interrupted, Sleeper};
    use pretty_assertions::assert_eq;
    use std::io;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        sleeps: Mutex<Vec<Duration>>,
    }

    impl Sleeper for Recorder {
        fn sleep(&self, duration: Duration, cancel: &CancelToken) -> Result<(), Interrupted> {
            cancel.check()?;
            self.sleeps.lock().unwrap().push(duration);
            Ok(())
        }
    }

    /// Sink that counts every I/O call.
    #[derive(Default)]
    struct CountingSink {
        data: Vec<u8>,
        writes: usize,
        flushes: usize,
        broken: bool,
    }

    impl Write for CountingSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.writes += 1;
            if self.broken {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "socket closed"));
            }
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            self.flushes += 1;
            Ok(())
        }
    }

    #[test]
    fn test_settle_time() {
        assert_eq!(settle_time(0, Duration::from_millis(500)), Duration::from_millis(500));
        assert_eq!(settle_time(15, Duration::ZERO), Duration::ZERO);
        assert_eq!(settle_time(47, Duration::from_millis(500)), Duration::from_millis(502));
    }

    #[test]
    fn test_writes_coalesce_into_one_send() {
        let recorder = Recorder::default();
        let cancel = CancelToken::new();
        let mut transport = FramedTransport::new();
        transport.attach(CountingSink::default());

        transport.write(b"[C]");
        transport.write(b"hello");
        assert_eq!(transport.pending(), 8);

        transport
            .send(Duration::from_millis(500), &Pacer::new(&recorder, &cancel))
            .unwrap();

        let sink = transport.detach().unwrap();
        assert_eq!(sink.data, b"[C]hello".to_vec());
        assert_eq!(sink.flushes, 1);
        assert_eq!(transport.pending(), 0);
        assert_eq!(*recorder.sleeps.lock().unwrap(), vec![Duration::from_millis(500)]);
    }

    #[test]
    fn test_empty_send_performs_no_io() {
        let recorder = Recorder::default();
        let cancel = CancelToken::new();
        let mut transport = FramedTransport::new();
        transport.attach(CountingSink::default());

        transport
            .send(Duration::from_millis(500), &Pacer::new(&recorder, &cancel))
            .unwrap();
        transport
            .send(Duration::ZERO, &Pacer::new(&recorder, &cancel))
            .unwrap();

        let sink = transport.detach().unwrap();
        assert_eq!((sink.writes, sink.flushes), (0, 0));
        assert!(recorder.sleeps.lock().unwrap().is_empty());
    }

    #[test]
    fn test_send_without_sink_is_not_connected() {
        let cancel = CancelToken::new();
        let mut transport: FramedTransport<CountingSink> = FramedTransport::new();
        transport.write(b"data");

        let err = transport
            .send(Duration::ZERO, &Pacer::new(&Recorder::default(), &cancel))
            .unwrap_err();
        assert!(matches!(err, PrinterError::NotConnected));
        assert_eq!(transport.pending(), 4);
    }

    #[test]
    fn test_io_failure_maps_to_connection_failed() {
        let cancel = CancelToken::new();
        let mut transport = FramedTransport::new();
        transport.attach(CountingSink {
            broken: true,
            ..Default::default()
        });
        transport.write(b"data");

        let err = transport
            .send(Duration::ZERO, &Pacer::new(&Recorder::default(), &cancel))
            .unwrap_err();
        let cause = err.cause().unwrap().downcast_ref::<io::Error>().unwrap();
        assert_eq!(cause.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn test_interrupted_settle_surfaces() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut transport = FramedTransport::new();
        transport.attach(CountingSink::default());
        transport.write(b"data");

        let err = transport
            .send(Duration::from_millis(10), &Pacer::new(&Recorder::default(), &cancel))
            .unwrap_err();
        assert!(matches!(err, PrinterError::Interrupted));
        // The bytes did reach the wire before the wait.
        assert_eq!(transport.detach().unwrap().data, b"data".to_vec());
    }
}
