//! One FTPS control connection.
//!
//! The session starts in plaintext and only accepts `AUTH TLS` (plus FEAT,
//! NOOP and QUIT) before upgrading. After login every data transfer runs over a
//! TLS passive connection from the same peer address, and every STOR ends with
//! exactly one `TransferEvent` handed to the dispatcher after the reply.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_rustls::server::TlsStream;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info, warn};

use crate::core::Dispatcher;
use crate::domain::{TransferEvent, UploadCompleted, UploadIncomplete};

use super::auth::{Authenticator, Credentials};
use super::passive::{PassiveError, PassivePorts, PortLease};
use super::vfs::HomeFs;

/// Longest accepted command line
const MAX_COMMAND_BYTES: u64 = 4096;

/// Idle limit on the control channel
const CONTROL_IDLE_TIMEOUT: Duration = Duration::from_secs(600);

const FEATURES: &[&str] = &["AUTH TLS", "PBSZ", "PROT", "PASV", "EPSV", "UTF8"];

/// State shared by every session of one server
pub struct SessionContext {
    pub acceptor: TlsAcceptor,
    pub authenticator: Authenticator,
    pub passive: PassivePorts,
    /// Address announced in PASV replies instead of the local one
    pub passive_address: Option<IpAddr>,
    pub dispatcher: Arc<Dispatcher>,
    /// Treat a data connection closed without close_notify as complete
    pub lenient_tls_eof: bool,
    /// Limit for accepting a data connection and for each idle read
    pub data_timeout: Duration,
}

/// Split a command line into upper-cased verb and argument
pub fn parse_command(line: &str) -> (String, &str) {
    let line = line.trim_end_matches(['\r', '\n']);
    match line.split_once(' ') {
        Some((verb, arg)) => (verb.to_ascii_uppercase(), arg.trim()),
        None => (line.trim().to_ascii_uppercase(), ""),
    }
}

/// `227` reply text for an IPv4 address and port
pub fn pasv_reply(ip: [u8; 4], port: u16) -> String {
    format!(
        "Entering Passive Mode ({},{},{},{},{},{})",
        ip[0],
        ip[1],
        ip[2],
        ip[3],
        port >> 8,
        port & 0xff
    )
}

/// `229` reply text for a port
pub fn epsv_reply(port: u16) -> String {
    format!("Entering Extended Passive Mode (|||{}|)", port)
}

async fn reply<W: AsyncWrite + Unpin>(out: &mut W, code: u16, text: &str) -> io::Result<()> {
    out.write_all(format!("{} {}\r\n", code, text).as_bytes())
        .await?;
    out.flush().await
}

async fn reply_features<W: AsyncWrite + Unpin>(out: &mut W) -> io::Result<()> {
    let mut text = String::from("211-Features:\r\n");
    for feature in FEATURES {
        text.push_str(&format!(" {}\r\n", feature));
    }
    text.push_str("211 End\r\n");
    out.write_all(text.as_bytes()).await?;
    out.flush().await
}

/// Read one command line. `None` on EOF or idle timeout.
async fn read_command<R: AsyncBufRead + Unpin>(input: &mut R) -> io::Result<Option<String>> {
    let mut line = String::new();
    let read = timeout(
        CONTROL_IDLE_TIMEOUT,
        (&mut *input).take(MAX_COMMAND_BYTES).read_line(&mut line),
    )
    .await;

    match read {
        Err(_) => {
            debug!("Control connection idle");
            Ok(None)
        }
        Ok(Ok(0)) => Ok(None),
        Ok(Ok(_)) => Ok(Some(line)),
        Ok(Err(e)) => Err(e),
    }
}

/// Why a data transfer stopped early
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferFailure {
    pub bytes: u64,
    pub reason: String,
}

/// Copy a data connection into `file`, returning the byte count.
///
/// Each read is bounded by `idle`. With `lenient_eof`, a connection that
/// ends without a TLS close_notify counts as a normal end of file.
pub async fn receive_file<R, W>(
    mut data: R,
    mut file: W,
    idle: Duration,
    lenient_eof: bool,
) -> Result<u64, TransferFailure>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; 64 * 1024];
    let mut total = 0u64;
    let fail = |bytes, reason: String| TransferFailure { bytes, reason };

    loop {
        let n = match timeout(idle, data.read(&mut buf)).await {
            Err(_) => return Err(fail(total, "data connection idle".to_string())),
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => n,
            Ok(Err(e)) if lenient_eof && e.kind() == io::ErrorKind::UnexpectedEof => break,
            Ok(Err(e)) => return Err(fail(total, e.to_string())),
        };

        file.write_all(&buf[..n])
            .await
            .map_err(|e| fail(total, format!("write failed: {}", e)))?;
        total += n as u64;
    }

    file.flush()
        .await
        .map_err(|e| fail(total, format!("flush failed: {}", e)))?;
    Ok(total)
}

/// Run a connection from greeting to close
pub async fn run(stream: TcpStream, peer: SocketAddr, ctx: Arc<SessionContext>) -> Result<()> {
    let local_ip = stream.local_addr()?.ip();
    let mut control = BufReader::new(stream);

    reply(&mut control, 220, "autotag FTPS ready").await?;

    // Plaintext phase: nothing but the TLS upgrade
    loop {
        let Some(line) = read_command(&mut control).await? else {
            return Ok(());
        };
        let (verb, arg) = parse_command(&line);

        match verb.as_str() {
            "AUTH" if matches!(arg.to_ascii_uppercase().as_str(), "TLS" | "TLS-C" | "SSL") => {
                reply(&mut control, 234, "AUTH TLS successful").await?;
                break;
            }
            "AUTH" => reply(&mut control, 504, "Unsupported security mechanism").await?,
            "FEAT" => reply_features(&mut control).await?,
            "NOOP" => reply(&mut control, 200, "NOOP ok").await?,
            "QUIT" => {
                reply(&mut control, 221, "Goodbye").await?;
                return Ok(());
            }
            _ => reply(&mut control, 530, "Please use AUTH TLS first").await?,
        }
    }

    let tls = ctx
        .acceptor
        .accept(control.into_inner())
        .await
        .context("TLS handshake failed on control channel")?;
    debug!("Control channel secured");

    let mut session = Session {
        control: BufReader::new(tls),
        ctx,
        peer,
        local_ip,
        pending_user: None,
        fs: None,
        protected: false,
        passive: None,
    };
    session.serve().await
}

struct Session {
    control: BufReader<TlsStream<TcpStream>>,
    ctx: Arc<SessionContext>,
    peer: SocketAddr,
    local_ip: IpAddr,
    pending_user: Option<String>,
    fs: Option<HomeFs>,
    /// PROT P accepted
    protected: bool,
    passive: Option<(TcpListener, PortLease)>,
}

/// Whether the session keeps going after a command
enum Flow {
    Continue,
    Close,
}

impl Session {
    async fn reply(&mut self, code: u16, text: &str) -> io::Result<()> {
        reply(&mut self.control, code, text).await
    }

    async fn serve(&mut self) -> Result<()> {
        while let Some(line) = read_command(&mut self.control).await? {
            let (verb, arg) = parse_command(&line);
            if verb == "PASS" {
                debug!("<- PASS ****");
            } else {
                debug!(command = %line.trim_end(), "<-");
            }

            if let Flow::Close = self.command(&verb, arg).await? {
                break;
            }
        }

        // Best-effort close_notify
        let _ = self.control.get_mut().shutdown().await;
        Ok(())
    }

    async fn command(&mut self, verb: &str, arg: &str) -> Result<Flow> {
        // Commands available before login
        match verb {
            "AUTH" => {
                self.reply(503, "Already using TLS").await?;
                return Ok(Flow::Continue);
            }
            "USER" => {
                self.pending_user = Some(arg.to_string());
                self.reply(331, "Password required").await?;
                return Ok(Flow::Continue);
            }
            "PASS" => return self.login(arg).await,
            "PBSZ" => {
                self.reply(200, "PBSZ=0").await?;
                return Ok(Flow::Continue);
            }
            "PROT" => {
                match arg.to_ascii_uppercase().as_str() {
                    "P" => {
                        self.protected = true;
                        self.reply(200, "Protection level set to Private").await?;
                    }
                    "C" => self.reply(536, "Only PROT P is supported").await?,
                    _ => self.reply(504, "Unsupported protection level").await?,
                }
                return Ok(Flow::Continue);
            }
            "FEAT" => {
                reply_features(&mut self.control).await?;
                return Ok(Flow::Continue);
            }
            "SYST" => {
                self.reply(215, "UNIX Type: L8").await?;
                return Ok(Flow::Continue);
            }
            "NOOP" => {
                self.reply(200, "NOOP ok").await?;
                return Ok(Flow::Continue);
            }
            "QUIT" => {
                self.reply(221, "Goodbye").await?;
                return Ok(Flow::Close);
            }
            _ => {}
        }

        if self.fs.is_none() {
            self.reply(530, "Please login with USER and PASS").await?;
            return Ok(Flow::Continue);
        }

        match verb {
            "TYPE" => match arg.to_ascii_uppercase().as_str() {
                "I" | "L 8" => self.reply(200, "Type set to I").await?,
                "A" | "A N" => self.reply(200, "Type set to A").await?,
                _ => self.reply(504, "Unsupported type").await?,
            },
            "MODE" => match arg.to_ascii_uppercase().as_str() {
                "S" => self.reply(200, "Mode set to S").await?,
                _ => self.reply(504, "Only stream mode is supported").await?,
            },
            "STRU" => match arg.to_ascii_uppercase().as_str() {
                "F" => self.reply(200, "Structure set to F").await?,
                _ => self.reply(504, "Only file structure is supported").await?,
            },
            "PWD" | "XPWD" => {
                let cwd = self.home_fs()?.cwd().to_string();
                self.reply(257, &format!("\"{}\" is the current directory", cwd))
                    .await?;
            }
            "CWD" | "XCWD" => self.change_dir(arg).await?,
            "CDUP" | "XCUP" => self.change_dir("..").await?,
            "MKD" | "XMKD" => self.make_dir(arg).await?,
            "PASV" => self.open_passive(false).await?,
            "EPSV" => self.open_passive(true).await?,
            "STOR" => self.store(arg).await?,
            "NLST" => self.list(arg, false).await?,
            "LIST" => self.list(arg, true).await?,
            _ => self.reply(502, "Command not implemented").await?,
        }

        Ok(Flow::Continue)
    }

    fn home_fs(&self) -> Result<&HomeFs> {
        self.fs.as_ref().context("session is not logged in")
    }

    async fn login(&mut self, password: &str) -> Result<Flow> {
        let Some(username) = self.pending_user.take() else {
            self.reply(503, "Login with USER first").await?;
            return Ok(Flow::Continue);
        };

        let credentials = Credentials {
            username,
            password: password.to_string(),
        };
        let identity = match self.ctx.authenticator.authenticate(&credentials) {
            Ok(identity) => identity,
            Err(e) => {
                warn!(peer = %self.peer, error = %e, "Login failed");
                self.reply(530, "Login incorrect").await?;
                return Ok(Flow::Continue);
            }
        };

        match self.ctx.authenticator.resolve_home(&identity).await {
            Ok(home) => {
                info!(user = %identity.username, home = %home.display(), "Logged in");
                self.fs = Some(HomeFs::new(home));
                self.reply(230, "Login successful").await?;
                Ok(Flow::Continue)
            }
            Err(e) => {
                warn!(user = %identity.username, error = %e, "Failed to prepare album");
                self.reply(421, "Service not available, closing control connection")
                    .await?;
                Ok(Flow::Close)
            }
        }
    }

    async fn change_dir(&mut self, arg: &str) -> io::Result<()> {
        let Some(fs) = self.fs.as_mut() else {
            return self.reply(530, "Not logged in").await;
        };

        let changed = fs.change_dir(arg).await.map(|cwd| cwd.to_string());
        match changed {
            Ok(cwd) => {
                self.reply(250, &format!("Directory changed to {}", cwd))
                    .await
            }
            Err(e) => self.reply(550, &e.to_string()).await,
        }
    }

    async fn make_dir(&mut self, arg: &str) -> Result<()> {
        let fs = self.home_fs()?;
        let resolved = fs
            .virtual_path(arg)
            .and_then(|virtual_path| Ok((fs.resolve(&virtual_path)?, virtual_path)));
        let (path, virtual_path) = match resolved {
            Ok(paths) => paths,
            Err(e) => {
                self.reply(550, &e.to_string()).await?;
                return Ok(());
            }
        };

        match tokio::fs::create_dir(&path).await {
            Ok(()) => {
                self.reply(257, &format!("\"{}\" created", virtual_path))
                    .await?
            }
            Err(e) => {
                debug!(path = %path.display(), error = %e, "MKD failed");
                self.reply(550, "Cannot create directory").await?
            }
        }
        Ok(())
    }

    async fn open_passive(&mut self, extended: bool) -> io::Result<()> {
        // A new PASV replaces any unused listener
        self.passive = None;

        let announced = self.ctx.passive_address.unwrap_or(self.local_ip);
        let ipv4 = match announced {
            IpAddr::V4(ip) => Some(ip.octets()),
            IpAddr::V6(ip) => ip.to_ipv4_mapped().map(|v4| v4.octets()),
        };
        if !extended && ipv4.is_none() {
            return self.reply(522, "Use EPSV on IPv6").await;
        }

        match self.ctx.passive.bind(self.local_ip).await {
            Ok((listener, lease)) => {
                let port = lease.port();
                self.passive = Some((listener, lease));
                match (extended, ipv4) {
                    (false, Some(octets)) => self.reply(227, &pasv_reply(octets, port)).await,
                    _ => self.reply(229, &epsv_reply(port)).await,
                }
            }
            Err(e @ PassiveError::Exhausted { .. }) => {
                warn!(peer = %self.peer, error = %e, "Passive ports exhausted");
                self.reply(425, "No passive ports available").await
            }
            Err(e) => {
                warn!(peer = %self.peer, error = %e, "Failed to open passive port");
                self.reply(425, "Can't open passive connection").await
            }
        }
    }

    /// Accept the data connection on the passive listener and secure it.
    /// Connections from other addresses than the control peer are refused.
    async fn accept_data(&self, listener: TcpListener) -> io::Result<TlsStream<TcpStream>> {
        let expected = self.peer.ip();
        let accept = async {
            loop {
                let (stream, addr) = listener.accept().await?;
                if addr.ip() == expected {
                    return Ok::<_, io::Error>(stream);
                }
                warn!(expected = %expected, actual = %addr, "Refused foreign data connection");
            }
        };

        let stream = timeout(self.ctx.data_timeout, accept)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "no data connection"))??;

        timeout(self.ctx.data_timeout, self.ctx.acceptor.accept(stream))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "data TLS handshake"))?
    }

    /// Checks shared by every data transfer. Returns the passive listener.
    async fn data_channel(&mut self) -> io::Result<Option<(TcpListener, PortLease)>> {
        if !self.protected {
            self.reply(521, "Data connections require PROT P").await?;
            return Ok(None);
        }
        match self.passive.take() {
            Some(passive) => Ok(Some(passive)),
            None => {
                self.reply(425, "Use PASV or EPSV first").await?;
                Ok(None)
            }
        }
    }

    async fn store(&mut self, arg: &str) -> Result<()> {
        if arg.is_empty() {
            self.reply(501, "STOR requires a file name").await?;
            return Ok(());
        }

        let path = match self.home_fs()?.resolve(arg) {
            Ok(path) => path,
            Err(e) => {
                self.reply(553, &e.to_string()).await?;
                return Ok(());
            }
        };

        let Some((listener, _lease)) = self.data_channel().await? else {
            return Ok(());
        };

        let file = match tokio::fs::File::create(&path).await {
            Ok(file) => file,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cannot create upload file");
                self.reply(553, "Cannot create file").await?;
                return Ok(());
            }
        };

        self.reply(150, "Ok to send data").await?;

        let data = match self.accept_data(listener).await {
            Ok(data) => data,
            Err(e) => {
                drop(file);
                discard_empty(&path, 0).await;
                self.reply(425, "Can't open data connection").await?;
                self.finish(TransferEvent::Incomplete(UploadIncomplete {
                    path,
                    bytes: 0,
                    reason: e.to_string(),
                }))
                .await;
                return Ok(());
            }
        };

        let received =
            receive_file(data, file, self.ctx.data_timeout, self.ctx.lenient_tls_eof).await;

        match received {
            Ok(bytes) => {
                info!(path = %path.display(), bytes, "Upload complete");
                self.reply(226, "Transfer complete").await?;
                self.finish(TransferEvent::Completed(UploadCompleted::new(path)))
                    .await;
            }
            Err(failure) => {
                warn!(
                    path = %path.display(),
                    bytes = failure.bytes,
                    reason = %failure.reason,
                    "Upload interrupted"
                );
                discard_empty(&path, failure.bytes).await;
                self.reply(426, "Connection closed; transfer aborted").await?;
                self.finish(TransferEvent::Incomplete(UploadIncomplete {
                    path,
                    bytes: failure.bytes,
                    reason: failure.reason,
                }))
                .await;
            }
        }

        Ok(())
    }

    /// Hand the end-of-transfer event to the dispatcher
    async fn finish(&self, event: TransferEvent) {
        self.ctx.dispatcher.clone().handle(event).await;
    }

    async fn list(&mut self, arg: &str, long: bool) -> Result<()> {
        // Ignore ls-style flags such as `-la`
        let target = if arg.starts_with('-') { "" } else { arg };
        let dir = match self.home_fs()?.resolve(target) {
            Ok(dir) => dir,
            Err(e) => {
                self.reply(550, &e.to_string()).await?;
                return Ok(());
            }
        };

        let listing = match render_listing(&dir, long).await {
            Ok(listing) => listing,
            Err(e) => {
                debug!(dir = %dir.display(), error = %e, "Listing failed");
                self.reply(550, "Cannot list directory").await?;
                return Ok(());
            }
        };

        let Some((listener, _lease)) = self.data_channel().await? else {
            return Ok(());
        };

        self.reply(150, "Here comes the directory listing").await?;

        let sent = async {
            let mut data = self.accept_data(listener).await?;
            data.write_all(listing.as_bytes()).await?;
            data.shutdown().await
        }
        .await;

        match sent {
            Ok(()) => self.reply(226, "Directory send OK").await?,
            Err(e) => {
                debug!(error = %e, "Listing transfer failed");
                self.reply(426, "Connection closed; transfer aborted").await?
            }
        }
        Ok(())
    }
}

/// Remove the file of a transfer that never received a byte, so it is not
/// published by the next rebuild
async fn discard_empty(path: &Path, bytes: u64) {
    if bytes > 0 {
        return;
    }
    if let Err(e) = tokio::fs::remove_file(path).await {
        debug!(path = %path.display(), error = %e, "Failed to remove empty upload");
    }
}

/// Directory listing, names only or `ls -l` style
async fn render_listing(dir: &Path, long: bool) -> io::Result<String> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut lines = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if !long {
            lines.push(name);
            continue;
        }

        let meta = entry.metadata().await?;
        let modified = meta
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        lines.push(format!(
            "{} 1 ftp ftp {:>12} {} {}",
            if meta.is_dir() { "drwxr-xr-x" } else { "-rw-r--r--" },
            meta.len(),
            modified.format("%b %d %H:%M"),
            name
        ));
    }

    lines.sort();
    Ok(lines.iter().map(|l| format!("{}\r\n", l)).collect())
}
