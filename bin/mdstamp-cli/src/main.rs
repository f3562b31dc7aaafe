//! mdstamp CLI - Timestamp record administration
//!
//! Inspects, bootstraps and advances the timestamp record kept in an
//! extended attribute on brick files.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use mdstamp_common::{Gfid, Iatt, MdataConfig, MdataFlag, MdataRecord, SetAttrValid, Timespec};
use mdstamp_posix::{FileRef, Inode, PosixMdata, SysXattr, XattrBackend, XattrTarget, codec};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Xattr holding a brick file's durable identity
const GFID_XATTR: &str = "trusted.gfid";

#[derive(Parser, Debug)]
#[command(name = "mdstamp-cli")]
#[command(about = "Brick timestamp record admin CLI")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/mdstamp/mdstamp.toml")]
    config: String,

    /// Log level (overrides config)
    #[arg(long)]
    log_level: Option<String>,

    /// Xattr key holding the record (overrides config)
    #[arg(long)]
    key: Option<String>,

    /// Brick root for handle resolution (overrides config)
    #[arg(long)]
    brick: Option<PathBuf>,

    /// GFID of the file (default: read trusted.gfid, else derive from dev/ino)
    #[arg(long)]
    gfid: Option<Gfid>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the persisted record
    Show {
        /// File on the brick
        path: PathBuf,
    },
    /// Create the record from the file's stat if it has none
    Init {
        /// File on the brick
        path: PathBuf,
    },
    /// Record explicitly set access/modification times
    Touch {
        /// File on the brick
        path: PathBuf,
        /// Access time as SEC[.NSEC]
        #[arg(long, value_parser = parse_time, allow_negative_numbers = true)]
        atime: Option<Timespec>,
        /// Modification time as SEC[.NSEC] (also advances ctime)
        #[arg(long, value_parser = parse_time, allow_negative_numbers = true)]
        mtime: Option<Timespec>,
    },
    /// Advance selected times to TIME where it is newer
    Merge {
        /// File on the brick
        path: PathBuf,
        /// Time as SEC[.NSEC]
        #[arg(long, value_parser = parse_time, allow_negative_numbers = true)]
        time: Timespec,
        /// Advance ctime
        #[arg(long)]
        ctime: bool,
        /// Advance mtime
        #[arg(long)]
        mtime: bool,
        /// Advance atime
        #[arg(long)]
        atime: bool,
    },
    /// Decode a hex-encoded on-disk record
    Decode {
        /// Hex string of the raw xattr value
        hex: String,
    },
}

/// Parse `[-]SEC[.NSEC]`, the fraction read as decimal seconds
///
/// Negative times are normalized so that `nsec` stays in `0..1e9`:
/// `-1.5` is `(-2, 500000000)`.
fn parse_time(s: &str) -> std::result::Result<Timespec, String> {
    let (negative, body) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let (sec, frac) = body.split_once('.').unwrap_or((body, ""));
    if sec.is_empty() || !sec.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("invalid seconds: {sec}"));
    }
    let sec: i64 = sec.parse().map_err(|_| format!("invalid seconds: {sec}"))?;
    if frac.len() > 9 || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("invalid fraction: {frac}"));
    }
    let nsec: i64 = if frac.is_empty() {
        0
    } else {
        format!("{frac:0<9}")
            .parse()
            .map_err(|_| format!("invalid fraction: {frac}"))?
    };

    if !negative {
        return Ok(Timespec::new(sec, nsec));
    }
    if nsec == 0 {
        return Ok(Timespec::new(-sec, 0));
    }
    let sec = (-sec)
        .checked_sub(1)
        .ok_or_else(|| format!("time out of range: {s}"))?;
    Ok(Timespec::new(sec, 1_000_000_000 - nsec))
}

/// GFID from the trusted.gfid xattr, else a stable one built from dev/ino
fn file_gfid(path: &Path, meta: &std::fs::Metadata) -> Gfid {
    match SysXattr::new().get(XattrTarget::Path(path), GFID_XATTR) {
        Ok(raw) if raw.len() == 16 => {
            let mut bytes = [0u8; 16];
            bytes.copy_from_slice(&raw);
            Gfid::from_bytes(bytes)
        }
        other => {
            debug!(path = %path.display(), ?other, "no usable {GFID_XATTR}, deriving from dev/ino");
            let mut bytes = [0u8; 16];
            bytes[..8].copy_from_slice(&meta.dev().to_be_bytes());
            bytes[8..].copy_from_slice(&meta.ino().to_be_bytes());
            Gfid::from_bytes(bytes)
        }
    }
}

fn print_record(path: &Path, record: &MdataRecord) {
    println!("Record: {}", path.display());
    println!("  version: {}", record.version);
    println!("  flags:   {:#x}", record.flags);
    println!("  ctime:   {}", record.ctime);
    println!("  mtime:   {}", record.mtime);
    println!("  atime:   {}", record.atime);
}

/// Everything a command needs to operate on one file
struct Target {
    path: PathBuf,
    inode: Inode,
    stat: Iatt,
}

impl Target {
    fn open(path: PathBuf, gfid: Option<Gfid>) -> Result<Self> {
        let meta = std::fs::symlink_metadata(&path)
            .with_context(|| format!("failed to stat {}", path.display()))?;
        let gfid = gfid.unwrap_or_else(|| file_gfid(&path, &meta));
        debug!(path = %path.display(), %gfid, "resolved file identity");
        Ok(Self {
            inode: Inode::new(gfid),
            stat: Iatt::from_metadata(gfid, &meta),
            path,
        })
    }

    fn file(&self) -> FileRef<'_> {
        FileRef::Path(&self.path)
    }
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Load config file, then merge CLI args (CLI takes precedence)
    let mut config = MdataConfig::load(&args.config)
        .with_context(|| format!("failed to load config {}", args.config))?;
    if let Some(key) = args.key {
        config.mdata.xattr_key = key;
    }
    if let Some(brick) = args.brick {
        config.mdata.brick_path = Some(brick);
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    config.validate()?;

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Config file: {}", args.config);
    debug!(key = %config.mdata.xattr_key, "using xattr key");
    let mdata = PosixMdata::from_config(&config.mdata);

    match args.command {
        Commands::Show { path } => {
            let target = Target::open(path, args.gfid)?;
            match mdata.store().fetch(target.inode.gfid(), target.file())? {
                Some(record) => print_record(&target.path, &record),
                None => println!("{}: no record", target.path.display()),
            }
        }
        Commands::Init { path } => {
            let target = Target::open(path, args.gfid)?;
            let mut stat = target.stat;
            let record = mdata
                .get_mdata(&target.inode, target.file(), Some(&mut stat))?
                .context("no record and nothing to bootstrap from")?;
            print_record(&target.path, &record);
        }
        Commands::Touch { path, atime, mtime } => {
            let target = Target::open(path, args.gfid)?;
            let mut stat = target.stat;
            let mut valid = SetAttrValid::empty();
            if let Some(atime) = atime {
                stat.atime = atime;
                valid = valid | SetAttrValid::ATIME;
            }
            if let Some(mtime) = mtime {
                stat.mtime = mtime;
                valid = valid | SetAttrValid::MTIME;
            }
            if valid == SetAttrValid::empty() {
                bail!("nothing to touch: pass --atime and/or --mtime");
            }
            match mdata.update_utime(&target.inode, target.file(), &stat, valid) {
                Ok(Some(record)) => print_record(&target.path, &record),
                Ok(None) => println!("{}: unchanged", target.path.display()),
                Err(e) if e.is_not_found() => {
                    bail!("{}: {e} (run `init` first)", target.path.display())
                }
                Err(e) => return Err(e.into()),
            }
        }
        Commands::Merge {
            path,
            time,
            ctime,
            mtime,
            atime,
        } => {
            let target = Target::open(path, args.gfid)?;
            let mut flag = MdataFlag::new(ctime, mtime, atime);
            if flag.is_empty() {
                flag = MdataFlag::ALL;
            }
            let mut stat = target.stat;
            let record =
                mdata.set_mdata(&target.inode, target.file(), time, Some(&mut stat), flag)?;
            print_record(&target.path, &record);
        }
        Commands::Decode { hex } => {
            let raw = hex::decode(hex.trim()).context("invalid hex")?;
            let record = codec::decode(&raw)?;
            print_record(Path::new("<hex>"), &record);
        }
    }

    Ok(())
}
