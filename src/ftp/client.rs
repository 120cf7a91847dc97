//! Minimal async FTP client: login, passive data connection, RETR
//!
//! Only what a single binary download needs is implemented. The data
//! connection is always passive (EPSV, falling back to PASV) so the client
//! works from behind NAT and inside serverless sandboxes.

use std::net::{IpAddr, SocketAddr};

use async_trait::async_trait;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::{debug, trace};

use super::reply::{parse_epsv, parse_pasv, read_reply, Reply};
use super::{FtpError, ReadStream, SessionFactory, TransferSession};
use crate::config::FtpConfig;
use crate::error::ImportError;

/// Default user when the request carries no credentials
pub const ANONYMOUS_USER: &str = "anonymous";

/// Split `host[:port]` (or `[v6]:port`) into host and port
pub fn split_host_port(host: &str, default_port: u16) -> Result<(String, u16), FtpError> {
    let invalid = || FtpError::InvalidHost(host.to_string());

    if let Some(rest) = host.strip_prefix('[') {
        let end = rest.find(']').ok_or_else(invalid)?;
        let addr = &rest[..end];
        let port = match &rest[end + 1..] {
            "" => default_port,
            p => p
                .strip_prefix(':')
                .and_then(|p| p.parse().ok())
                .ok_or_else(invalid)?,
        };
        return Ok((addr.to_string(), port));
    }

    match host.matches(':').count() {
        0 => Ok((host.to_string(), default_port)),
        1 => {
            let (name, port) = host.split_once(':').ok_or_else(invalid)?;
            let port = port.parse().map_err(|_| invalid())?;
            if name.is_empty() {
                return Err(invalid());
            }
            Ok((name.to_string(), port))
        }
        // Bare IPv6 literal
        _ => Ok((host.to_string(), default_port)),
    }
}

struct Control {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    peer: SocketAddr,
}

impl Control {
    async fn send(&mut self, command: &str) -> Result<Reply, FtpError> {
        if command.starts_with("PASS ") {
            trace!("> PASS ****");
        } else {
            trace!("> {}", command);
        }
        self.writer.write_all(command.as_bytes()).await?;
        self.writer.write_all(b"\r\n").await?;
        self.writer.flush().await?;
        self.receive().await
    }

    async fn receive(&mut self) -> Result<Reply, FtpError> {
        let reply = read_reply(&mut self.reader).await?;
        trace!("< {} {}", reply.code, reply.text);
        Ok(reply)
    }
}

/// One FTP session: a control connection plus at most one download
pub struct FtpSession {
    config: FtpConfig,
    control: Option<Control>,
    transfer_pending: bool,
}

impl FtpSession {
    pub fn new(config: FtpConfig) -> Self {
        Self {
            config,
            control: None,
            transfer_pending: false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.control.is_some()
    }

    fn control(&mut self) -> Result<&mut Control, FtpError> {
        self.control.as_mut().ok_or(FtpError::NotConnected)
    }

    /// Connect and log in. Returns the server greeting.
    pub async fn connect(
        &mut self,
        host: &str,
        user: Option<&str>,
        password: Option<&str>,
    ) -> Result<Reply, FtpError> {
        let (name, port) = split_host_port(host, self.config.port)?;
        let stream = TcpStream::connect((name.as_str(), port)).await?;
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?;
        let (read, writer) = stream.into_split();

        let control = self.control.insert(Control {
            reader: BufReader::new(read),
            writer,
            peer,
        });

        let greeting = control.receive().await?;
        if !greeting.is_completion() {
            return Err(greeting.into_error());
        }
        debug!(host = %name, port = port, "ftp_connected");

        let user = user.filter(|u| !u.is_empty()).unwrap_or(ANONYMOUS_USER);
        let password = password
            .unwrap_or(self.config.anonymous_password.as_str())
            .to_string();

        let reply = control.send(&format!("USER {}", user)).await?;
        let reply = if reply.is_intermediate() {
            control.send(&format!("PASS {}", password)).await?
        } else {
            reply
        };
        if !reply.is_completion() {
            return Err(reply.into_error());
        }
        debug!(user = %user, "ftp_logged_in");

        Ok(greeting)
    }

    /// Open a passive data connection, preferring EPSV
    async fn open_data_connection(&mut self) -> Result<TcpStream, FtpError> {
        let control = self.control()?;
        let peer_ip = control.peer.ip();

        let reply = control.send("EPSV").await?;
        let addr = if reply.code == 229 {
            let port = parse_epsv(&reply.text).ok_or_else(|| FtpError::Malformed(reply.text.clone()))?;
            SocketAddr::new(peer_ip, port)
        } else if reply.code >= 500 {
            let reply = control.send("PASV").await?;
            if reply.code != 227 {
                return Err(reply.into_error());
            }
            let addr = parse_pasv(&reply.text).ok_or_else(|| FtpError::Malformed(reply.text.clone()))?;
            // 0.0.0.0 means "same host as the control connection"
            let ip = if addr.ip().is_unspecified() {
                peer_ip
            } else {
                IpAddr::V4(*addr.ip())
            };
            SocketAddr::new(ip, addr.port())
        } else {
            return Err(reply.into_error());
        };

        debug!(addr = %addr, "ftp_data_connect");
        let stream = TcpStream::connect(addr).await?;
        Ok(stream)
    }

    /// Start downloading `file_name`. The returned stream yields the file bytes.
    pub async fn retrieve(&mut self, file_name: &str) -> Result<TcpStream, FtpError> {
        let reply = self.control()?.send("TYPE I").await?;
        if !reply.is_completion() {
            return Err(reply.into_error());
        }

        let data = self.open_data_connection().await?;

        let reply = self.control()?.send(&format!("RETR {}", file_name)).await?;
        if !reply.is_preliminary() {
            return Err(reply.into_error());
        }
        self.transfer_pending = true;

        Ok(data)
    }

    /// Read the completion reply of the pending download
    pub async fn finish_retrieve(&mut self) -> Result<Reply, FtpError> {
        if !self.transfer_pending {
            return Err(FtpError::NoTransfer);
        }
        self.transfer_pending = false;
        let reply = self.control()?.receive().await?;
        if !reply.is_completion() {
            return Err(reply.into_error());
        }
        Ok(reply)
    }

    /// Send QUIT and drop the control connection.
    ///
    /// A no-op when the session never connected.
    pub async fn quit(&mut self) -> Result<(), FtpError> {
        let Some(mut control) = self.control.take() else {
            return Ok(());
        };

        // A download cut short leaves its completion reply in the buffer
        if self.transfer_pending {
            self.transfer_pending = false;
            let _ = control.receive().await;
        }

        let result = control.send("QUIT").await.map(|_| ());
        let _ = control.writer.shutdown().await;
        result
    }
}

#[async_trait]
impl TransferSession for FtpSession {
    async fn open(
        &mut self,
        host: &str,
        file_name: &str,
        user: Option<&str>,
        password: Option<&str>,
    ) -> Result<ReadStream, ImportError> {
        self.connect(host, user, password).await?;
        let data = self.retrieve(file_name).await?;
        Ok(Box::new(data))
    }

    async fn finish(&mut self) -> Result<(), ImportError> {
        self.finish_retrieve().await?;
        Ok(())
    }

    /// Failures are returned unlogged
    async fn close(&mut self) -> Result<(), ImportError> {
        self.quit().await?;
        Ok(())
    }
}

/// Creates a fresh [`FtpSession`] per invocation
#[derive(Debug, Clone)]
pub struct FtpConnector {
    config: FtpConfig,
}

impl FtpConnector {
    pub fn new(config: FtpConfig) -> Self {
        Self { config }
    }
}

impl SessionFactory for FtpConnector {
    type Session = FtpSession;

    fn create(&self) -> FtpSession {
        FtpSession::new(self.config.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_host_port() {
        assert_eq!(
            split_host_port("ftp.example.com", 21).unwrap(),
            ("ftp.example.com".to_string(), 21)
        );
        assert_eq!(
            split_host_port("ftp.example.com:2121", 21).unwrap(),
            ("ftp.example.com".to_string(), 2121)
        );
        assert_eq!(split_host_port("[::1]:2121", 21).unwrap(), ("::1".to_string(), 2121));
        assert_eq!(split_host_port("[::1]", 21).unwrap(), ("::1".to_string(), 21));
        assert_eq!(split_host_port("fe80::1", 21).unwrap(), ("fe80::1".to_string(), 21));
    }

    #[test]
    fn test_split_host_port_invalid() {
        assert!(split_host_port("host:abc", 21).is_err());
        assert!(split_host_port(":21", 21).is_err());
        assert!(split_host_port("[::1", 21).is_err());
        assert!(split_host_port("[::1]x", 21).is_err());
    }

    #[tokio::test]
    async fn test_quit_without_connect_is_noop() {
        let mut session = FtpSession::new(FtpConfig::default());
        assert!(!session.is_connected());
        session.quit().await.unwrap();
        TransferSession::close(&mut session).await.unwrap();
    }

    #[tokio::test]
    async fn test_finish_without_transfer() {
        let mut session = FtpSession::new(FtpConfig::default());
        assert!(matches!(session.finish_retrieve().await, Err(FtpError::NoTransfer)));
    }
}
