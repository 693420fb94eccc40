//! Half-duplex pipe: one direction of a bridge
//!
//! A [`HalfPipe`] moves bytes one way: socket read → journal append →
//! journal read → socket write. It tracks whether the producer has hit
//! end-of-stream and whether the journal backlog has been flushed to the
//! consumer, and propagates half-closes in causal order: the consumer's
//! write half is shut down only once the producer has delivered EOF *and*
//! every journaled byte has been forwarded.

use std::io;
use std::net::Shutdown;

use bytes::BytesMut;
use socket2::SockRef;
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::journal::{Drain, Journal, CHUNK_SIZE};

/// One direction of a bridge: producer socket → journal → consumer socket.
pub struct HalfPipe {
    journal: Journal,
    /// Direction tag for diagnostics.
    label: &'static str,
    /// The producer returned EOF (clean or error-induced); no further reads
    /// will be attempted.
    eof_from_producer: bool,
    /// The journal backlog is empty and the last dispatch produced nothing.
    flushed: bool,
    /// The consumer's write half has been shut down.
    consumer_shut: bool,
    /// Total bytes journaled from the producer.
    total: u64,
}

impl HalfPipe {
    pub fn new(journal: Journal, label: &'static str) -> Self {
        Self {
            journal,
            label,
            eof_from_producer: false,
            flushed: true,
            consumer_shut: false,
            total: 0,
        }
    }

    /// Read-interest on the producer socket.
    pub fn wants_read(&self) -> bool {
        !self.eof_from_producer
    }

    /// Write-interest on the consumer socket.
    pub fn wants_write(&self) -> bool {
        !self.flushed
    }

    /// A dead pipe contributes no interest.
    pub fn is_done(&self) -> bool {
        self.eof_from_producer && self.flushed
    }

    pub fn total_bytes(&self) -> u64 {
        self.total
    }

    /// Runs the direction as far as the sockets allow right now.
    ///
    /// Errors are fatal to the whole bridge: journal failure, or an
    /// unrecoverable write failure towards the consumer. Producer read
    /// errors are not fatal; they end the stream like EOF and the bytes
    /// already journaled still get flushed.
    pub fn step(&mut self, producer: &TcpStream, consumer: &TcpStream) -> io::Result<()> {
        let produced = self.pump_producer(producer)?;

        if !self.flushed || produced > 0 {
            match self.journal.drain_into(consumer)? {
                Drain::Done => self.flushed = true,
                Drain::WouldBlock => self.flushed = false,
            }
        }

        if self.eof_from_producer && self.flushed && !self.consumer_shut {
            self.consumer_shut = true;
            // Best-effort: the peer may already be gone.
            if let Err(e) = SockRef::from(consumer).shutdown(Shutdown::Write) {
                debug!("{}: unable to shutdown consumer for writing: {}", self.label, e);
            }
        }

        Ok(())
    }

    /// Reads everything currently available from the producer into the
    /// journal. Returns the number of bytes appended in this dispatch.
    fn pump_producer(&mut self, producer: &TcpStream) -> io::Result<usize> {
        if self.eof_from_producer {
            return Ok(0);
        }

        let mut produced = 0;
        let mut buf = BytesMut::with_capacity(CHUNK_SIZE);
        buf.resize(CHUNK_SIZE, 0);

        loop {
            match producer.try_read(&mut buf) {
                Ok(0) => {
                    self.producer_eof(producer, None);
                    break;
                }
                Ok(n) => {
                    self.journal.append(&buf[..n])?;
                    produced += n;
                    self.total += n as u64;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.producer_eof(producer, Some(e));
                    break;
                }
            }
        }

        Ok(produced)
    }

    fn producer_eof(&mut self, producer: &TcpStream, error: Option<io::Error>) {
        if let Some(e) = error {
            warn!("{}: error reading from producer: {}", self.label, e);
        }
        self.eof_from_producer = true;
        if let Err(e) = SockRef::from(producer).shutdown(Shutdown::Read) {
            debug!("{}: unable to shutdown producer for reading: {}", self.label, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, Interest};
    use tokio::net::{TcpListener, TcpStream};

    async fn socket_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        (client, server)
    }

    fn pipe_in(dir: &std::path::Path) -> HalfPipe {
        HalfPipe::new(Journal::open(dir, "pipe").unwrap(), "test")
    }

    #[tokio::test]
    async fn forwards_bytes_and_propagates_half_close() {
        let dir = tempfile::tempdir().unwrap();
        let (mut producer_peer, producer) = socket_pair().await;
        let (consumer, mut consumer_peer) = socket_pair().await;
        let mut pipe = pipe_in(dir.path());

        assert!(pipe.wants_read());
        assert!(!pipe.wants_write());

        producer_peer.write_all(b"hello world").await.unwrap();
        producer_peer.shutdown().await.unwrap();

        while !pipe.is_done() {
            producer.ready(Interest::READABLE).await.unwrap();
            pipe.step(&producer, &consumer).unwrap();
        }

        // EOF reaches the consumer only after every byte did.
        let mut received = Vec::new();
        consumer_peer.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"hello world");
        assert_eq!(pipe.total_bytes(), 11);

        assert_eq!(
            std::fs::read(dir.path().join("pipe")).unwrap(),
            b"hello world"
        );
    }

    #[tokio::test]
    async fn backpressure_toggles_write_interest() {
        let dir = tempfile::tempdir().unwrap();
        let (mut producer_peer, producer) = socket_pair().await;
        let (consumer, mut consumer_peer) = socket_pair().await;
        // Clamp both socket buffers so the consumer side fills up quickly.
        socket2::SockRef::from(&consumer)
            .set_send_buffer_size(8 * 1024)
            .unwrap();
        socket2::SockRef::from(&consumer_peer)
            .set_recv_buffer_size(8 * 1024)
            .unwrap();
        let mut pipe = pipe_in(dir.path());

        let payload: Vec<u8> = (0..512 * 1024).map(|i| (i % 239) as u8).collect();
        let to_send = payload.clone();
        let writer_task = tokio::spawn(async move {
            producer_peer.write_all(&to_send).await.unwrap();
            producer_peer.shutdown().await.unwrap();
        });

        // Drive the pipe with nobody reading the consumer side until write
        // interest shows up.
        while !pipe.wants_write() && !pipe.is_done() {
            producer.ready(Interest::READABLE).await.unwrap();
            pipe.step(&producer, &consumer).unwrap();
        }
        assert!(pipe.wants_write());
        assert!(!pipe.is_done());

        let reader_task = tokio::spawn(async move {
            let mut received = Vec::new();
            consumer_peer.read_to_end(&mut received).await.unwrap();
            received
        });

        while !pipe.is_done() {
            if pipe.wants_read() {
                tokio::select! {
                    ready = producer.ready(Interest::READABLE) => {
                        ready.unwrap();
                    }
                    ready = consumer.ready(Interest::WRITABLE), if pipe.wants_write() => {
                        ready.unwrap();
                    }
                }
            } else {
                consumer.ready(Interest::WRITABLE).await.unwrap();
            }
            pipe.step(&producer, &consumer).unwrap();
        }
        writer_task.await.unwrap();

        assert_eq!(reader_task.await.unwrap(), payload);
    }
}
