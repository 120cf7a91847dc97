//! Shared fakes for integration tests
#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader, ReadBuf};
use tokio::net::TcpListener;

use ftp_import::ftp::{ReadStream, SessionFactory, TransferSession};
use ftp_import::storage::{ObjectSink, SinkHandle};
use ftp_import::ImportError;

// =============================================================================
// Transfer session fake
// =============================================================================

/// What `open` does
#[derive(Clone)]
pub enum OpenBehavior {
    /// Serve these bytes
    Data(Vec<u8>),
    /// Fail as if the server answered with this reply code
    Reply(u16),
    /// Serve these bytes, then fail the read
    BrokenAfter(Vec<u8>),
}

#[derive(Debug, Default)]
pub struct SessionLog {
    pub opened: Vec<(String, String, Option<String>, Option<String>)>,
    pub finished: usize,
    pub closed: usize,
}

#[derive(Clone)]
pub struct FakeSessions {
    pub behavior: OpenBehavior,
    /// Reply code `finish` fails with
    pub finish_reply: Option<u16>,
    pub close_fails: bool,
    pub log: Arc<Mutex<SessionLog>>,
}

impl FakeSessions {
    pub fn serving(data: &[u8]) -> Self {
        Self::with(OpenBehavior::Data(data.to_vec()))
    }

    pub fn with(behavior: OpenBehavior) -> Self {
        Self {
            behavior,
            finish_reply: None,
            close_fails: false,
            log: Arc::new(Mutex::new(SessionLog::default())),
        }
    }

    pub fn opened(&self) -> usize {
        self.log.lock().unwrap().opened.len()
    }

    pub fn closed(&self) -> usize {
        self.log.lock().unwrap().closed
    }

    pub fn finished(&self) -> usize {
        self.log.lock().unwrap().finished
    }
}

pub struct FakeSession {
    sessions: FakeSessions,
}

impl SessionFactory for FakeSessions {
    type Session = FakeSession;

    fn create(&self) -> FakeSession {
        FakeSession {
            sessions: self.clone(),
        }
    }
}

/// Reader that always fails
struct BrokenReader;

impl AsyncRead for BrokenReader {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Ready(Err(io::Error::new(
            io::ErrorKind::ConnectionReset,
            "data connection reset",
        )))
    }
}

#[async_trait]
impl TransferSession for FakeSession {
    async fn open(
        &mut self,
        host: &str,
        file_name: &str,
        user: Option<&str>,
        password: Option<&str>,
    ) -> Result<ReadStream, ImportError> {
        self.sessions.log.lock().unwrap().opened.push((
            host.to_string(),
            file_name.to_string(),
            user.map(str::to_string),
            password.map(str::to_string),
        ));

        match &self.sessions.behavior {
            OpenBehavior::Data(data) => Ok(Box::new(io::Cursor::new(data.clone()))),
            OpenBehavior::Reply(code) => {
                Err(ImportError::from_remote_reply(*code, format!("reply {}", code)))
            }
            OpenBehavior::BrokenAfter(data) => {
                Ok(Box::new(io::Cursor::new(data.clone()).chain(BrokenReader)))
            }
        }
    }

    async fn finish(&mut self) -> Result<(), ImportError> {
        self.sessions.log.lock().unwrap().finished += 1;
        match self.sessions.finish_reply {
            Some(code) => Err(ImportError::from_remote_reply(code, "transfer aborted")),
            None => Ok(()),
        }
    }

    async fn close(&mut self) -> Result<(), ImportError> {
        self.sessions.log.lock().unwrap().closed += 1;
        if self.sessions.close_fails {
            return Err(ImportError::transfer("QUIT failed"));
        }
        Ok(())
    }
}

// =============================================================================
// Sink fake
// =============================================================================

#[derive(Debug, Default)]
pub struct SinkLog {
    pub opened: Vec<(String, String)>,
    pub writes: usize,
    pub committed: HashMap<(String, String), Vec<u8>>,
    pub aborted: usize,
}

#[derive(Clone, Default)]
pub struct FakeSink {
    /// Storage status `open_sink` fails with
    pub open_status: Option<u16>,
    /// Fail the nth write (1-based)
    pub fail_write: Option<usize>,
    /// Storage status `finish` fails with
    pub finish_status: Option<u16>,
    pub log: Arc<Mutex<SinkLog>>,
}

impl FakeSink {
    pub fn committed(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.log
            .lock()
            .unwrap()
            .committed
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    pub fn aborted(&self) -> usize {
        self.log.lock().unwrap().aborted
    }

    pub fn writes(&self) -> usize {
        self.log.lock().unwrap().writes
    }
}

pub struct FakeSinkHandle {
    bucket: String,
    key: String,
    buffer: Vec<u8>,
    fail_write: Option<usize>,
    finish_status: Option<u16>,
    log: Arc<Mutex<SinkLog>>,
}

#[async_trait]
impl ObjectSink for FakeSink {
    async fn open_sink(&self, bucket: &str, object: &str) -> Result<Box<dyn SinkHandle>, ImportError> {
        if let Some(status) = self.open_status {
            return Err(ImportError::Storage {
                status: Some(status),
                message: "bucket unreachable".to_string(),
            });
        }
        self.log
            .lock()
            .unwrap()
            .opened
            .push((bucket.to_string(), object.to_string()));
        Ok(Box::new(FakeSinkHandle {
            bucket: bucket.to_string(),
            key: object.to_string(),
            buffer: Vec::new(),
            fail_write: self.fail_write,
            finish_status: self.finish_status,
            log: self.log.clone(),
        }))
    }
}

#[async_trait]
impl SinkHandle for FakeSinkHandle {
    async fn write(&mut self, chunk: Bytes) -> Result<(), ImportError> {
        let writes = {
            let mut log = self.log.lock().unwrap();
            log.writes += 1;
            log.writes
        };
        if self.fail_write == Some(writes) {
            return Err(ImportError::storage("write rejected"));
        }
        self.buffer.extend_from_slice(&chunk);
        Ok(())
    }

    async fn finish(&mut self) -> Result<u64, ImportError> {
        if let Some(status) = self.finish_status {
            return Err(ImportError::Storage {
                status: Some(status),
                message: "commit rejected".to_string(),
            });
        }
        let data = std::mem::take(&mut self.buffer);
        let len = data.len() as u64;
        self.log
            .lock()
            .unwrap()
            .committed
            .insert((self.bucket.clone(), self.key.clone()), data);
        Ok(len)
    }

    async fn abort(&mut self) {
        self.buffer.clear();
        self.log.lock().unwrap().aborted += 1;
    }
}

// =============================================================================
// Scripted FTP server
// =============================================================================

#[derive(Clone)]
pub struct FtpScript {
    pub user: String,
    pub password: String,
    pub files: HashMap<String, Vec<u8>>,
    /// Answer EPSV with 502 so the client falls back to PASV
    pub epsv_supported: bool,
}

impl FtpScript {
    pub fn new() -> Self {
        Self {
            user: "alice".to_string(),
            password: "secret".to_string(),
            files: HashMap::new(),
            epsv_supported: true,
        }
    }

    pub fn file(mut self, name: &str, data: &[u8]) -> Self {
        self.files.insert(name.to_string(), data.to_vec());
        self
    }
}

/// Serve one control connection per accepted client. Returns the address and
/// the commands received, in order.
pub async fn spawn_ftp_server(script: FtpScript) -> (SocketAddr, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let commands = Arc::new(Mutex::new(Vec::new()));
    let log = commands.clone();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let script = script.clone();
            let log = log.clone();
            tokio::spawn(async move {
                let _ = serve_control(stream, script, log).await;
            });
        }
    });

    (addr, commands)
}

async fn serve_control(
    stream: tokio::net::TcpStream,
    script: FtpScript,
    log: Arc<Mutex<Vec<String>>>,
) -> io::Result<()> {
    let (read, mut write) = stream.into_split();
    let mut reader = BufReader::new(read);
    let mut data_listener: Option<TcpListener> = None;
    let mut user = String::new();

    write.write_all(b"220-Test FTP server\r\n220 Ready\r\n").await?;

    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(());
        }
        let line = line.trim_end().to_string();
        log.lock().unwrap().push(line.clone());

        let (cmd, arg) = line.split_once(' ').unwrap_or((line.as_str(), ""));
        let reply = match cmd {
            "USER" => {
                user = arg.to_string();
                "331 Password required\r\n".to_string()
            }
            "PASS" => {
                if user == script.user && arg == script.password {
                    "230 Logged in\r\n".to_string()
                } else {
                    "530 Login incorrect.\r\n".to_string()
                }
            }
            "TYPE" => "200 Type set to I\r\n".to_string(),
            "EPSV" if script.epsv_supported => {
                let listener = TcpListener::bind("127.0.0.1:0").await?;
                let port = listener.local_addr()?.port();
                data_listener = Some(listener);
                format!("229 Entering Extended Passive Mode (|||{}|)\r\n", port)
            }
            "PASV" => {
                let listener = TcpListener::bind("127.0.0.1:0").await?;
                let port = listener.local_addr()?.port();
                data_listener = Some(listener);
                format!(
                    "227 Entering Passive Mode (127,0,0,1,{},{}).\r\n",
                    port >> 8,
                    port & 0xff
                )
            }
            "RETR" => match (script.files.get(arg), data_listener.take()) {
                (Some(data), Some(listener)) => {
                    write
                        .write_all(b"150 Opening BINARY mode data connection\r\n")
                        .await?;
                    let (mut data_stream, _) = listener.accept().await?;
                    data_stream.write_all(data).await?;
                    data_stream.shutdown().await?;
                    drop(data_stream);
                    "226 Transfer complete\r\n".to_string()
                }
                (None, _) => "550 No such file or directory.\r\n".to_string(),
                (_, None) => "425 Use PASV first.\r\n".to_string(),
            },
            "QUIT" => {
                write.write_all(b"221 Goodbye\r\n").await?;
                return Ok(());
            }
            _ => "502 Command not implemented\r\n".to_string(),
        };
        write.write_all(reply.as_bytes()).await?;
    }
}

/// Read a whole stream into memory
pub async fn read_all(mut stream: impl AsyncRead + Unpin) -> Vec<u8> {
    let mut out = Vec::new();
    stream.read_to_end(&mut out).await.unwrap();
    out
}
