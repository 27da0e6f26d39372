//! One TCP connection driving file transfers in a single role.

use crate::error::{Error, Result};
use crate::framer::{self, FileHeader};
use crate::fs_enum::OutgoingFile;
use crate::interrupt::Interrupt;
use crate::paths;
use crate::progress::{Output, ProgressReporter};
use crate::protocol::{timeouts, CHUNK_SIZE, MAX_FILE_SIZE};
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Sender,
    Receiver,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Sender => f.write_str("sender"),
            Role::Receiver => f.write_str("receiver"),
        }
    }
}

/// Outcome of one completed transfer.
#[derive(Debug, Clone, PartialEq)]
pub struct Transferred {
    pub name: String,
    pub bytes: u64,
    pub elapsed: Duration,
    /// Where the receiver stored the file
    pub path: Option<PathBuf>,
}

/// Receiver-side storage options.
#[derive(Debug, Clone)]
pub struct ReceiveOptions {
    pub save_dir: PathBuf,
    pub recursive: bool,
}

/// Destination file that is removed unless the transfer is committed.
struct PartialFile {
    path: PathBuf,
    file: Option<File>,
}

impl PartialFile {
    fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|source| {
                if source.kind() == io::ErrorKind::AlreadyExists {
                    Error::DestinationExists(path.to_path_buf())
                } else {
                    Error::Destination {
                        path: path.to_path_buf(),
                        source,
                    }
                }
            })?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Some(file),
        })
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        let path = &self.path;
        match self.file.as_mut() {
            Some(f) => f.write_all(buf).map_err(|source| Error::Destination {
                path: path.clone(),
                source,
            }),
            None => Ok(()),
        }
    }

    /// Flush and close, returning the size on disk.
    fn close(&mut self) -> Result<u64> {
        let dest_err = |source| Error::Destination {
            path: self.path.clone(),
            source,
        };
        if let Some(f) = self.file.take() {
            f.sync_all().map_err(dest_err)?;
        }
        Ok(fs::metadata(&self.path).map_err(dest_err)?.len())
    }

    fn commit(mut self) -> PathBuf {
        self.file = None;
        std::mem::take(&mut self.path)
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if self.path.as_os_str().is_empty() {
            return;
        }
        self.file = None;
        let _ = fs::remove_file(&self.path);
    }
}

/// Owns one live connection. Counts cover this connection only; run totals
/// belong to the driver.
pub struct TransferSession {
    stream: TcpStream,
    role: Role,
    peer: SocketAddr,
    output: Output,
    files: u64,
    bytes: u64,
}

impl TransferSession {
    /// Wrap a stream already tuned by `net::connect` or `Acceptor::accept`.
    pub fn new(stream: TcpStream, role: Role, output: Output) -> Result<Self> {
        let peer = stream.peer_addr()?;
        Ok(Self {
            stream,
            role,
            peer,
            output,
            files: 0,
            bytes: 0,
        })
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn files(&self) -> u64 {
        self.files
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Send one file and wait for the receiver's acknowledgement.
    pub fn send_file(&mut self, file: &OutgoingFile) -> Result<Transferred> {
        let name = file.wire_name()?;
        let source_err = |source| Error::Source {
            path: file.path.clone(),
            source,
        };
        let mut src = File::open(&file.path).map_err(source_err)?;
        let size = src.metadata().map_err(source_err)?.len();
        if size > MAX_FILE_SIZE {
            return Err(Error::TooLarge {
                path: file.path.clone(),
                size,
                max: MAX_FILE_SIZE,
            });
        }

        framer::write_header(&mut self.stream, &FileHeader::new(name.as_str(), size))?;

        let reporter = ProgressReporter::start(name.as_str(), size, self.output);
        let mut buf = [0u8; CHUNK_SIZE];
        let mut sent = 0u64;
        while sent < size {
            let want = (size - sent).min(CHUNK_SIZE as u64) as usize;
            let n = match src.read(&mut buf[..want]) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                // Header already promised `size` bytes; the stream is unusable
                Err(e) => return Err(Error::Transfer(e)),
            };
            self.stream.write_all(&buf[..n])?;
            sent += n as u64;
            reporter.state().advance(n as u64);
        }
        if sent < size {
            return Err(Error::Transfer(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("{} shrank while sending ({}/{} bytes)", file.path.display(), sent, size),
            )));
        }
        self.stream.flush()?;

        framer::read_ack(&mut self.stream)?;
        let elapsed = reporter.finish();

        self.files += 1;
        self.bytes += size;
        Ok(Transferred {
            name,
            bytes: size,
            elapsed,
            path: None,
        })
    }

    /// Block until the next header starts arriving.
    ///
    /// Returns `false` when the peer closed the connection between files.
    /// The interrupt flag is checked while idle.
    pub fn wait_for_header(&mut self, interrupt: &Interrupt) -> Result<bool> {
        let idle = Duration::from_millis(timeouts::IDLE_POLL_MS);
        self.stream.set_read_timeout(Some(idle))?;
        let mut probe = [0u8; 1];
        let ready = loop {
            if interrupt.is_set() {
                break Err(Error::Interrupted);
            }
            match self.stream.peek(&mut probe) {
                Ok(0) => break Ok(false),
                Ok(_) => break Ok(true),
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::WouldBlock
                            | io::ErrorKind::TimedOut
                            | io::ErrorKind::Interrupted
                    ) =>
                {
                    continue
                }
                Err(e) => break Err(Error::from(e)),
            }
        };
        self.stream.set_read_timeout(None)?;
        ready
    }

    /// Receive one file into `opts.save_dir`.
    ///
    /// On any failure the partially written destination is removed, so a
    /// file with a transferred name always has its declared size.
    pub fn recv_file(&mut self, opts: &ReceiveOptions) -> Result<Transferred> {
        let header = self.recv_header()?;
        self.recv_body(header, opts)
    }

    /// Read the next header without touching the filesystem.
    pub fn recv_header(&mut self) -> Result<FileHeader> {
        framer::decode_header(&mut self.stream)
    }

    /// Store the body announced by `header` and acknowledge it.
    pub fn recv_body(
        &mut self,
        header: FileHeader,
        opts: &ReceiveOptions,
    ) -> Result<Transferred> {
        let dest = paths::destination_for(&opts.save_dir, &header.name, opts.recursive)?;
        if dest.exists() {
            return Err(Error::DestinationExists(dest));
        }
        paths::ensure_parent_exists(&dest).map_err(|source| Error::Destination {
            path: dest.clone(),
            source,
        })?;

        let mut out = PartialFile::create(&dest)?;
        let reporter = ProgressReporter::start(header.name.as_str(), header.size, self.output);
        let mut buf = [0u8; CHUNK_SIZE];
        let mut written = 0u64;
        while written < header.size {
            let want = (header.size - written).min(CHUNK_SIZE as u64) as usize;
            let n = match self.stream.read(&mut buf[..want]) {
                Ok(0) => return Err(Error::ConnectionClosed),
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            out.write_all(&buf[..n])?;
            written += n as u64;
            reporter.state().advance(n as u64);
        }

        let on_disk = out.close()?;
        if on_disk != header.size {
            return Err(Error::protocol(format!(
                "{} is {} bytes on disk, header declared {}",
                dest.display(),
                on_disk,
                header.size
            )));
        }

        // Keep the file only once the sender has been told
        framer::write_ack(&mut self.stream)?;
        let path = out.commit();
        let elapsed = reporter.finish();

        self.files += 1;
        self.bytes += header.size;
        Ok(Transferred {
            name: header.name,
            bytes: header.size,
            elapsed,
            path: Some(path),
        })
    }

    /// Read and drop the body announced by `header`, then acknowledge it.
    ///
    /// Used when the peer resends a file this run already stored because
    /// the previous acknowledgement was lost with the connection.
    pub fn discard_body(&mut self, header: &FileHeader) -> Result<()> {
        let mut body = Read::by_ref(&mut self.stream).take(header.size);
        let drained = io::copy(&mut body, &mut io::sink())?;
        if drained < header.size {
            return Err(Error::ConnectionClosed);
        }
        framer::write_ack(&mut self.stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::Acceptor;
    use std::thread;
    use tempfile::TempDir;

    fn pair() -> (TransferSession, TransferSession) {
        let acceptor = Acceptor::bind("127.0.0.1:0").unwrap();
        let addr = acceptor.local_addr();
        let client = thread::spawn(move || TcpStream::connect(addr).unwrap());
        let (server, _) = acceptor.accept(&Interrupt::new()).unwrap();
        let client = client.join().unwrap();
        (
            TransferSession::new(client, Role::Sender, Output::Quiet).unwrap(),
            TransferSession::new(server, Role::Receiver, Output::Quiet).unwrap(),
        )
    }

    #[test]
    fn partial_file_is_removed_unless_committed() {
        let tmp = TempDir::new().unwrap();
        let dropped = tmp.path().join("dropped.bin");
        {
            let mut p = PartialFile::create(&dropped).unwrap();
            p.write_all(b"half").unwrap();
        }
        assert!(!dropped.exists());

        let kept = tmp.path().join("kept.bin");
        let mut p = PartialFile::create(&kept).unwrap();
        p.write_all(b"whole").unwrap();
        assert_eq!(p.close().unwrap(), 5);
        assert_eq!(p.commit(), kept);
        assert_eq!(fs::read(&kept).unwrap(), b"whole");
    }

    #[test]
    fn existing_destination_is_refused() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("taken.txt");
        fs::write(&path, b"mine").unwrap();
        assert!(matches!(
            PartialFile::create(&path),
            Err(Error::DestinationExists(_))
        ));
        assert_eq!(fs::read(&path).unwrap(), b"mine");
    }

    #[test]
    fn send_and_receive_one_file() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        let path = src.path().join("temp.txt");
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        fs::write(&path, &data).unwrap();

        let (mut sender, mut receiver) = pair();
        let opts = ReceiveOptions {
            save_dir: dst.path().to_path_buf(),
            recursive: false,
        };
        let recv = thread::spawn(move || receiver.recv_file(&opts).map(|t| (t, receiver.files())));
        let sent = sender.send_file(&OutgoingFile::new(&path)).unwrap();
        let (received, files) = recv.join().unwrap().unwrap();

        assert_eq!(sent.bytes, 10_000);
        assert_eq!(received.name, "temp.txt");
        assert_eq!(files, 1);
        assert_eq!(sender.files(), 1);
        assert_eq!(sender.bytes(), 10_000);
        assert_eq!(fs::read(dst.path().join("temp.txt")).unwrap(), data);
    }

    #[test]
    fn discarded_body_is_still_acknowledged() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        let path = src.path().join("again.txt");
        fs::write(&path, vec![7u8; 9000]).unwrap();

        let (mut sender, mut receiver) = pair();
        let recv = thread::spawn(move || {
            let header = receiver.recv_header().unwrap();
            receiver.discard_body(&header).map(|_| (header, receiver.files()))
        });
        let sent = sender.send_file(&OutgoingFile::new(&path)).unwrap();
        let (header, files) = recv.join().unwrap().unwrap();

        assert_eq!(sent.bytes, 9000);
        assert_eq!(header.name, "again.txt");
        assert_eq!(files, 0);
        assert!(!dst.path().join("again.txt").exists());
    }

    #[test]
    fn clean_close_between_files_is_not_an_error() {
        let (sender, mut receiver) = pair();
        drop(sender);
        assert!(!receiver.wait_for_header(&Interrupt::new()).unwrap());
    }

    #[test]
    fn idle_wait_honours_interrupt() {
        let (_sender, mut receiver) = pair();
        let interrupt = Interrupt::new();
        interrupt.trigger();
        assert!(matches!(
            receiver.wait_for_header(&interrupt),
            Err(Error::Interrupted)
        ));
    }

    #[test]
    fn missing_source_is_skippable() {
        let (mut sender, _receiver) = pair();
        let err = sender
            .send_file(&OutgoingFile::new("/definitely/not/here.txt"))
            .unwrap_err();
        assert!(err.is_skippable());
        assert_eq!(sender.files(), 0);
    }
}
