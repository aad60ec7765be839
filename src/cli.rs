use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(version, about = "Inspect and modify xv6 file system images")]
pub struct Cli {
    /// Disk image file
    pub image: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Format the image, creating it if needed
    Mkfs {
        /// Image size in blocks
        #[arg(long, default_value_t = xv6fs::FSSIZE as u32)]
        size: u32,

        /// Number of inodes
        #[arg(long, default_value_t = xv6fs::NINODES as u32)]
        inodes: u32,
    },
    /// List a directory
    Ls {
        #[arg(default_value = "/")]
        path: String,
    },
    /// Print a file to stdout
    Cat { path: String },
    /// Copy a host file into the image
    Put { src: PathBuf, path: String },
    /// Create a directory
    Mkdir { path: String },
    /// Remove a file or an empty directory
    Rm { path: String },
    /// Show inode metadata
    Stat { path: String },
}
