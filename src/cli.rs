//! Command-line surface

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::DEFAULT_SAVE_DIR;

#[derive(Debug, Parser)]
#[command(
    name = "folan",
    author,
    version,
    about = "Send files to another computer on the local network"
)]
pub struct Cli {
    /// Hide progress bars and status lines
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Write JSONL transfer events to file
    #[arg(long = "log-file", global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Wait for a sender and store what it sends
    Listen {
        /// Address to listen on (host:port), e.g. 0.0.0.0:8080
        addr: String,

        /// Directory received files are written to
        #[arg(long = "save-path", alias = "save_path", default_value = DEFAULT_SAVE_DIR)]
        save_path: PathBuf,

        /// Keep relative paths sent by the peer
        #[arg(short, long)]
        recursive: bool,

        /// Accept new senders after one finishes
        #[arg(long = "stay-alive", alias = "stayalive", action = ArgAction::SetTrue)]
        stay_alive: bool,

        /// Stop after N files, or after N bytes with a B/KB/MB/GB suffix
        #[arg(long)]
        limit: Option<String>,

        /// Unpack received .tar archives into the save path
        #[arg(long)]
        extract: bool,
    },

    /// Connect to a listener and send files
    Send {
        /// Listener address (host:port)
        addr: String,

        /// Walk directories recursively and send relative paths
        #[arg(short, long, global = true)]
        recursive: bool,

        /// Keep watching a directory for new files
        #[arg(
            long = "stay-alive",
            alias = "stayalive",
            global = true,
            action = ArgAction::SetTrue
        )]
        stay_alive: bool,

        /// Stop after N files, or after N bytes with a B/KB/MB/GB suffix
        #[arg(long, global = true)]
        limit: Option<String>,

        #[command(subcommand)]
        source: SendSource,
    },
}

#[derive(Debug, Subcommand)]
pub enum SendSource {
    /// Send the listed files
    Files {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Send every file in a directory
    Dir { path: PathBuf },
    /// Pack a directory into one tar and send it
    Archive { path: PathBuf },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn listen_accepts_underscore_aliases() {
        let cli = Cli::try_parse_from([
            "folan",
            "listen",
            "0.0.0.0:8080",
            "--save_path",
            "incoming",
            "--stayalive",
            "--limit",
            "3kb",
        ])
        .unwrap();
        match cli.command {
            Command::Listen {
                save_path,
                stay_alive,
                limit,
                ..
            } => {
                assert_eq!(save_path, PathBuf::from("incoming"));
                assert!(stay_alive);
                assert_eq!(limit.as_deref(), Some("3kb"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn listen_defaults_save_path() {
        let cli = Cli::try_parse_from(["folan", "listen", "127.0.0.1:9000"]).unwrap();
        match cli.command {
            Command::Listen { save_path, .. } => {
                assert_eq!(save_path, PathBuf::from(DEFAULT_SAVE_DIR))
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn send_files_and_dir() {
        let cli = Cli::try_parse_from([
            "folan", "-q", "send", "host:9000", "files", "a.txt", "b.txt",
        ])
        .unwrap();
        assert!(cli.quiet);
        match cli.command {
            Command::Send {
                addr,
                source: SendSource::Files { paths },
                ..
            } => {
                assert_eq!(addr, "host:9000");
                assert_eq!(paths.len(), 2);
            }
            other => panic!("unexpected {:?}", other),
        }

        let cli = Cli::try_parse_from([
            "folan", "send", "host:9000", "--recursive", "--stay-alive", "dir", "photos",
        ])
        .unwrap();
        match cli.command {
            Command::Send {
                recursive,
                stay_alive,
                source: SendSource::Dir { path },
                ..
            } => {
                assert!(recursive && stay_alive);
                assert_eq!(path, PathBuf::from("photos"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn send_files_requires_a_path() {
        assert!(Cli::try_parse_from(["folan", "send", "host:9000", "files"]).is_err());
    }
}
