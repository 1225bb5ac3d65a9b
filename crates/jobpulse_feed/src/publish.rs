//! Uploads the rendered feed document to the remote file drop (spec §4.4).
//!
//! The drop is SFTP over an SSH session (`ssh2`). Publication always
//! overwrites the file at `remote_path` in place — there is no "delete then
//! recreate" step, so a failed upload never leaves the public feed absent.

use jobpulse_core::JobPulseError;
use ssh2::Session;
use std::io::Write;
use std::net::TcpStream;
use std::time::Duration;

const MAX_ATTEMPTS: u32 = 3;
const BASE_DELAY: Duration = Duration::from_millis(500);

pub struct RemoteTarget<'a> {
    pub host: &'a str,
    pub port: u16,
    pub user: &'a str,
    pub password: &'a str,
    pub path: &'a str,
}

/// Upload `bytes` to `target`, retrying the whole connect+auth+write
/// sequence up to `MAX_ATTEMPTS` times with linear backoff. Blocking
/// `ssh2` I/O is pushed onto a blocking thread so it doesn't stall the
/// async runtime.
pub async fn publish(target: RemoteTarget<'_>, bytes: Vec<u8>) -> Result<(), JobPulseError> {
    let host = target.host.to_string();
    let port = target.port;
    let user = target.user.to_string();
    let password = target.password.to_string();
    let path = target.path.to_string();

    let mut attempt = 0u32;
    loop {
        let host = host.clone();
        let user = user.clone();
        let password = password.clone();
        let path = path.clone();
        let bytes = bytes.clone();

        let result = tokio::task::spawn_blocking(move || upload_once(&host, port, &user, &password, &path, &bytes))
            .await
            .map_err(|e| JobPulseError::fatal(format!("publish task panicked: {e}")))?;

        match result {
            Ok(()) => return Ok(()),
            Err(err) if err.is_retryable() && attempt + 1 < MAX_ATTEMPTS => {
                let delay = BASE_DELAY * (attempt + 1);
                tracing::warn!(attempt, ?delay, error = %err, "retrying feed upload");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

fn upload_once(host: &str, port: u16, user: &str, password: &str, path: &str, bytes: &[u8]) -> Result<(), JobPulseError> {
    let tcp = TcpStream::connect((host, port))
        .map_err(|e| JobPulseError::transient(format!("feed drop tcp connect failed: {e}")))?;

    let mut session = Session::new().map_err(|e| JobPulseError::fatal(format!("ssh session init failed: {e}")))?;
    session.set_tcp_stream(tcp);
    session.handshake().map_err(|e| JobPulseError::transient(format!("ssh handshake failed: {e}")))?;

    session
        .userauth_password(user, password)
        .map_err(|e| JobPulseError::auth(format!("feed drop authentication failed: {e}")))?;
    if !session.authenticated() {
        return Err(JobPulseError::auth("feed drop authentication did not complete"));
    }

    let sftp = session.sftp().map_err(|e| JobPulseError::transient(format!("sftp channel open failed: {e}")))?;
    let mut remote_file = sftp
        .create(std::path::Path::new(path))
        .map_err(|e| JobPulseError::transient(format!("sftp create failed for {path}: {e}")))?;

    remote_file
        .write_all(bytes)
        .map_err(|e| JobPulseError::transient(format!("sftp write failed for {path}: {e}")))?;

    Ok(())
}
