//! Append-only per-direction byte journals
//!
//! Every byte a bridge forwards is first appended to a journal file, and the
//! consuming socket is fed by reading back from that file. The file is the
//! buffer: the write side only ever appends, and an independent read cursor
//! tracks how far the consumer has caught up. Bytes between the read cursor
//! and end-of-file are the outstanding backlog.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use tokio::net::TcpStream;

/// R/W chunk size in bytes.
pub const CHUNK_SIZE: usize = 8192;

/// Outcome of a [`Journal::drain_into`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Drain {
    /// The read cursor reached end-of-file: the backlog is empty. The
    /// producer may still append later, so this is "no more data right
    /// now", not end of the logical stream.
    Done,
    /// The consumer stopped accepting bytes mid-write. The read cursor
    /// reflects exactly the bytes the consumer took, so a later call
    /// resumes precisely.
    WouldBlock,
}

/// An append-only on-disk log of the bytes observed in one direction.
pub struct Journal {
    file: File,
    path: PathBuf,
    /// Offset of the next journaled-but-not-yet-forwarded byte.
    read_cursor: u64,
}

impl Journal {
    /// Opens (creating if necessary) the journal at `dir/name`.
    ///
    /// Existing content is kept: new bytes append after it, and the read
    /// cursor starts at the pre-existing end-of-file so prior content is
    /// not replayed.
    pub fn open(dir: &Path, name: &str) -> io::Result<Self> {
        let path = dir.join(name);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&path)?;
        let read_cursor = file.metadata()?.len();

        Ok(Self {
            file,
            path,
            read_cursor,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends `bytes` to the journal. Either every byte is enqueued in the
    /// file or an error is returned.
    pub fn append(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.file.write_all(bytes)
    }

    /// Writes the backlog to `consumer` in chunks, starting at the read
    /// cursor. A partial socket write advances the cursor by exactly the
    /// number of bytes the OS accepted.
    pub fn drain_into(&mut self, consumer: &TcpStream) -> io::Result<Drain> {
        let mut buf = [0u8; CHUNK_SIZE];

        loop {
            let n = self.file.read_at(&mut buf, self.read_cursor)?;
            if n == 0 {
                return Ok(Drain::Done);
            }

            let mut offset = 0;
            while offset < n {
                match consumer.try_write(&buf[offset..n]) {
                    Ok(written) => {
                        offset += written;
                        self.read_cursor += written as u64;
                    }
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                        return Ok(Drain::WouldBlock);
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::{TcpListener, TcpStream};

    async fn socket_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        (client, server)
    }

    #[tokio::test]
    async fn drains_appended_bytes_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut journal = Journal::open(dir.path(), "journal").unwrap();
        journal.append(b"hello ").unwrap();
        journal.append(b"world").unwrap();

        let (writer, mut reader) = socket_pair().await;
        writer.writable().await.unwrap();
        assert_eq!(journal.drain_into(&writer).unwrap(), Drain::Done);
        drop(writer);

        let mut received = Vec::new();
        reader.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"hello world");

        assert_eq!(
            std::fs::read(dir.path().join("journal")).unwrap(),
            b"hello world"
        );
    }

    #[tokio::test]
    async fn existing_content_is_not_replayed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("journal"), b"old bytes").unwrap();

        let mut journal = Journal::open(dir.path(), "journal").unwrap();
        journal.append(b"new").unwrap();

        let (writer, mut reader) = socket_pair().await;
        writer.writable().await.unwrap();
        assert_eq!(journal.drain_into(&writer).unwrap(), Drain::Done);
        drop(writer);

        let mut received = Vec::new();
        reader.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"new");

        // The file keeps the old content, appended after.
        assert_eq!(
            std::fs::read(dir.path().join("journal")).unwrap(),
            b"old bytesnew"
        );
    }

    #[tokio::test]
    async fn would_block_resumes_where_it_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let mut journal = Journal::open(dir.path(), "journal").unwrap();
        let payload: Vec<u8> = (0..1024 * 1024).map(|i| (i % 251) as u8).collect();
        journal.append(&payload).unwrap();

        let (writer, mut reader) = socket_pair().await;
        socket2::SockRef::from(&writer)
            .set_send_buffer_size(8 * 1024)
            .unwrap();

        // Nobody is reading yet: the socket buffers fill and the drain parks
        // with the cursor mid-file.
        writer.writable().await.unwrap();
        assert_eq!(journal.drain_into(&writer).unwrap(), Drain::WouldBlock);

        let reader_task = tokio::spawn(async move {
            let mut received = Vec::new();
            reader.read_to_end(&mut received).await.unwrap();
            received
        });

        loop {
            writer.writable().await.unwrap();
            if journal.drain_into(&writer).unwrap() == Drain::Done {
                break;
            }
        }
        drop(writer);

        assert_eq!(reader_task.await.unwrap(), payload);
    }

    #[tokio::test]
    async fn done_is_not_end_of_stream() {
        let dir = tempfile::tempdir().unwrap();
        let mut journal = Journal::open(dir.path(), "journal").unwrap();

        let (writer, mut reader) = socket_pair().await;
        writer.writable().await.unwrap();

        // Empty backlog drains to Done, then a later append is picked up by
        // the next drain from the same cursor.
        assert_eq!(journal.drain_into(&writer).unwrap(), Drain::Done);
        journal.append(b"later").unwrap();
        assert_eq!(journal.drain_into(&writer).unwrap(), Drain::Done);
        drop(writer);

        let mut received = Vec::new();
        reader.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"later");
    }
}
