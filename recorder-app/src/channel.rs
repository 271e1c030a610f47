//! Local channel to the controller.
//!
//! - Unix: Unix domain socket; a relative name lives in the temp directory
//! - Windows: named pipe `\\.\pipe\<name>`

use std::io;

#[cfg(unix)]
use std::path::{Path, PathBuf};

/// Connected channel.
#[cfg(unix)]
pub type Channel = tokio::net::UnixStream;

#[cfg(windows)]
pub type Channel = tokio::net::windows::named_pipe::NamedPipeClient;

/// Socket path for a controller channel name.
#[cfg(unix)]
pub fn endpoint(server: &str) -> PathBuf {
    let path = Path::new(server);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::temp_dir().join(server)
    }
}

/// Pipe path for a controller channel name.
#[cfg(windows)]
pub fn endpoint(server: &str) -> String {
    const PIPE_PREFIX: &str = r"\\.\pipe\";
    if server.starts_with(PIPE_PREFIX) {
        server.to_string()
    } else {
        format!("{PIPE_PREFIX}{server}")
    }
}

#[cfg(unix)]
pub async fn connect(server: &str) -> io::Result<Channel> {
    tokio::net::UnixStream::connect(endpoint(server)).await
}

#[cfg(windows)]
pub async fn connect(server: &str) -> io::Result<Channel> {
    use std::time::Duration;
    use tokio::net::windows::named_pipe::ClientOptions;

    const ERROR_PIPE_BUSY: i32 = 231;
    const BUSY_RETRIES: u32 = 20;

    let path = endpoint(server);
    let mut attempt = 0;
    loop {
        match ClientOptions::new().open(&path) {
            Ok(client) => return Ok(client),
            Err(e) if e.raw_os_error() == Some(ERROR_PIPE_BUSY) && attempt < BUSY_RETRIES => {
                attempt += 1;
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_relative_name_in_temp_dir() {
        assert_eq!(endpoint("rec-1"), std::env::temp_dir().join("rec-1"));
    }

    #[test]
    fn test_absolute_path_kept() {
        assert_eq!(endpoint("/run/rec.sock"), PathBuf::from("/run/rec.sock"));
    }

    #[tokio::test]
    async fn test_connect_to_listener() {
        let name = format!("recorder-test-{}.sock", std::process::id());
        let path = endpoint(&name);
        let _ = std::fs::remove_file(&path);
        let listener = tokio::net::UnixListener::bind(&path).unwrap();

        let (client, accepted) = tokio::join!(connect(&name), listener.accept());
        assert!(client.is_ok());
        assert!(accepted.is_ok());

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_connect_missing_fails() {
        assert!(connect("recorder-test-missing.sock").await.is_err());
    }
}
