mod cli;

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use xv6fs::mkfs::mkfs;
use xv6fs::{FileDisk, FileKind, Inode, MkfsParams, OpenFlags, Stat, Xv6Fs, BSIZE, ROOTDEV};

use self::cli::{Cli, Command};

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    if let Command::Mkfs { size, inodes } = cli.command {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&cli.image)
            .with_context(|| format!("creating {}", cli.image.display()))?;
        file.set_len(size as u64 * BSIZE as u64)?;
        let params = MkfsParams {
            size,
            ninodes: inodes,
            ..MkfsParams::default()
        };
        let sb = mkfs(&FileDisk::new(file), &params)
            .with_context(|| format!("formatting {} blocks, {} inodes", size, inodes))?;
        println!(
            "{}: {} blocks, {} data blocks, {} inodes",
            cli.image.display(),
            sb.size,
            sb.nblocks,
            sb.ninodes
        );
        return Ok(());
    }

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(&cli.image)
        .with_context(|| format!("opening {}", cli.image.display()))?;
    let fs = Xv6Fs::mount(ROOTDEV, Arc::new(FileDisk::new(file)));
    let root = fs.root();
    let res = run(&fs, &root, cli.command);
    let tx = fs.begin_op();
    fs.iput(&tx, root);
    res
}

fn run(fs: &Xv6Fs, root: &Inode, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Mkfs { .. } => unreachable!(),
        Command::Ls { path } => {
            let entries = fs
                .readdir(root, &path)
                .with_context(|| format!("ls {}", path))?;
            for de in entries {
                let name = String::from_utf8_lossy(de.name()).into_owned();
                let full = format!("{}/{}", path.trim_end_matches('/'), name);
                let st = fs.stat(root, &full)?;
                println!("{:<14} {}", name, describe(&st));
            }
        }
        Command::Cat { path } => {
            let fd = fs
                .open(root, &path, OpenFlags::RDONLY)
                .with_context(|| format!("cat {}", path))?;
            let mut buf = [0u8; BSIZE];
            let mut stdout = io::stdout().lock();
            let res = loop {
                match fs.read(&fd, &mut buf) {
                    Ok(0) => break Ok(()),
                    Ok(n) => stdout.write_all(&buf[..n])?,
                    Err(e) => break Err(e),
                }
            };
            fs.close(fd);
            res.with_context(|| format!("reading {}", path))?;
        }
        Command::Put { src, path } => {
            let data = fs::read(&src).with_context(|| format!("reading {}", src.display()))?;
            let flags = OpenFlags::CREATE | OpenFlags::WRONLY | OpenFlags::TRUNC;
            let fd = fs
                .open(root, &path, flags)
                .with_context(|| format!("creating {}", path))?;
            let res = fs.write(&fd, &data);
            fs.close(fd);
            let n = res.with_context(|| format!("writing {}", path))?;
            if n != data.len() {
                bail!("short write to {}: {} of {} bytes", path, n, data.len());
            }
        }
        Command::Mkdir { path } => {
            fs.mkdir(root, &path)
                .with_context(|| format!("mkdir {}", path))?;
        }
        Command::Rm { path } => {
            fs.unlink(root, &path)
                .with_context(|| format!("rm {}", path))?;
        }
        Command::Stat { path } => {
            let st = fs.stat(root, &path).with_context(|| format!("stat {}", path))?;
            println!("{}: dev {} {}", path, st.dev, describe(&st));
        }
    }
    Ok(())
}

fn describe(st: &Stat) -> String {
    let kind = match st.kind {
        FileKind::Directory => "dir",
        FileKind::File => "file",
        FileKind::Device => "dev",
    };
    format!("{:<4} ino {:<4} nlink {:<2} size {}", kind, st.ino, st.nlink, st.size)
}
