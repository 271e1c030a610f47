use std::path::PathBuf;

use clap::Parser;

/// Recorder/streamer worker driven by a controller over a local channel.
#[derive(Parser, Debug)]
#[command(name = "recorder")]
#[command(version)]
#[command(about = "Screen recorder and streamer worker driven over local IPC")]
#[command(long_about = None)]
pub struct Cli {
    /// Name of the controller's local channel
    #[arg(short = 's', long, value_name = "NAME")]
    pub server: String,

    /// Configuration file (default: data/config.json next to the executable)
    #[arg(short = 'f', long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Write logs to this file instead of stderr
    #[arg(short = 'l', long, value_name = "FILE")]
    pub log: Option<PathBuf>,

    /// Crash dump directory (accepted for controller compatibility)
    #[arg(short = 'c', long, value_name = "DIR")]
    pub crash: Option<PathBuf>,

    /// User id recorded in logs
    #[arg(short = 'u', long, value_name = "ID")]
    pub user: Option<String>,

    /// Session id recorded in logs
    #[arg(short = 'i', long, value_name = "ID")]
    pub id: Option<String>,

    /// Run commands on the channel thread instead of a worker thread
    #[arg(long)]
    pub direct: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_short_flags() {
        let cli = Cli::try_parse_from([
            "recorder", "-s", "rec-42", "-l", "rec.log", "-u", "alice", "-i", "7",
        ])
        .unwrap();

        assert_eq!(cli.server, "rec-42");
        assert_eq!(cli.log, Some(PathBuf::from("rec.log")));
        assert_eq!(cli.user.as_deref(), Some("alice"));
        assert_eq!(cli.id.as_deref(), Some("7"));
        assert!(!cli.direct);
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_server_required() {
        assert!(Cli::try_parse_from(["recorder", "--direct"]).is_err());
    }

    #[test]
    fn test_crash_dir_accepted() {
        let cli = Cli::try_parse_from(["recorder", "--server", "x", "--crash", "dumps"]).unwrap();
        assert_eq!(cli.crash, Some(PathBuf::from("dumps")));
    }
}
