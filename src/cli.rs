use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Command line arguments for the torrent metadata tool
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands for the torrent metadata tool
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Decode a bencoded file and print it as JSON
    Decode {
        /// The path to the bencoded file
        path: PathBuf,
    },
    /// Info about a torrent file
    Info {
        /// The path to the torrent file
        path: PathBuf,
        /// Also list every piece hash
        #[arg(long)]
        hashes: bool,
    },
    /// Create a torrent from a file or a directory
    Create {
        /// The file or directory to hash
        source: PathBuf,
        /// Tracker announce URL, repeat for more tiers
        #[arg(short, long)]
        announce: Vec<String>,
        /// Piece length in KiB
        #[arg(short, long, default_value_t = 256)]
        piece_length: u32,
        /// Skip files and directories whose name starts with a dot
        #[arg(long)]
        exclude_hidden: bool,
        #[arg(long)]
        comment: Option<String>,
        /// Mark the torrent private
        #[arg(long)]
        private: bool,
        /// Source tag stored in the info dictionary
        #[arg(long = "source")]
        source_tag: Option<String>,
        /// Output path, `<name>.torrent` by default
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the magnet link of a torrent file
    Magnet {
        /// The path to the torrent file
        path: PathBuf,
        /// Escape separators for embedding in HTML
        #[arg(long)]
        html: bool,
    },
    /// Ask every tracker of a torrent for swarm statistics
    Scrape {
        /// The path to the torrent file
        path: PathBuf,
        /// Deadline for all trackers, in seconds
        #[arg(long, default_value_t = 30)]
        timeout: u64,
        /// Scrape these trackers instead of the torrent's own
        #[arg(short, long)]
        tracker: Vec<String>,
    },
}

impl Args {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}
