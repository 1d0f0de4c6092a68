//! Host-side shell over a FAT image file: format, inspect and manipulate
//! FAT12/16/32 images with the same driver the kernel uses.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::process::exit;
use std::sync::{Arc, Mutex};

use clap::{App, Arg, ArgMatches, SubCommand};
use rand::{Rng, RngCore};

use fatfs::{format, BlockDevice, DeviceError, FatType, FormatOptions, Volume, BLOCK_SIZE};

/// Image file exposed as a block device.
struct FileDevice {
    file: Mutex<File>,
}

impl FileDevice {
    fn open(path: &str, writable: bool) -> std::io::Result<Self> {
        let file = OpenOptions::new().read(true).write(writable).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl BlockDevice for FileDevice {
    fn read_block(&self, block_id: u32, buf: &mut [u8]) -> Result<(), DeviceError> {
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start(block_id as u64 * BLOCK_SIZE as u64))
            .map_err(|_| DeviceError::OutOfRange)?;
        file.read_exact(&mut buf[..BLOCK_SIZE])
            .map_err(|_| DeviceError::OutOfRange)
    }

    fn write_block(&self, block_id: u32, buf: &[u8]) -> Result<(), DeviceError> {
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start(block_id as u64 * BLOCK_SIZE as u64))
            .map_err(|_| DeviceError::OutOfRange)?;
        file.write_all(&buf[..BLOCK_SIZE])
            .map_err(|_| DeviceError::DeviceFault)
    }
}

struct StderrLogger;

impl log::Log for StderrLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::Level::Info
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

fn mount_image(path: &str, writable: bool) -> Volume {
    let device = FileDevice::open(path, writable).unwrap_or_else(|e| {
        eprintln!("cannot open {}: {}", path, e);
        exit(1);
    });
    Volume::mount(Arc::new(device)).unwrap_or_else(|e| {
        eprintln!("mount failed: {}", e);
        exit(1);
    })
}

fn cmd_mkfs(args: &ArgMatches) {
    let image = args.value_of("image").unwrap();
    let size_mib: u64 = args.value_of("size-mib").unwrap().parse().unwrap_or(4);
    let bps: u16 = args.value_of("bps").unwrap().parse().unwrap_or(512);
    let spc: u8 = args.value_of("spc").unwrap().parse().unwrap_or(1);
    let fat_type = match args.value_of("type").unwrap() {
        "fat12" => FatType::Fat12,
        "fat16" => FatType::Fat16,
        "fat32" => FatType::Fat32,
        other => {
            eprintln!("unknown FAT type {}", other);
            exit(1);
        }
    };

    let total_bytes = size_mib * 1024 * 1024;
    let file = File::create(image).unwrap_or_else(|e| {
        eprintln!("cannot create {}: {}", image, e);
        exit(1);
    });
    file.set_len(total_bytes).unwrap();
    drop(file);

    let mut opts = FormatOptions::new(fat_type, (total_bytes / bps as u64) as u32);
    opts.bytes_per_sector = bps;
    opts.sectors_per_cluster = spc;

    let device = Arc::new(FileDevice::open(image, true).unwrap());
    match format(device, &opts) {
        Ok(()) => println!("formatted {} as {} ({} MiB)", image, opts.fat_type, size_mib),
        Err(e) => {
            eprintln!("format failed: {}", e);
            exit(1);
        }
    }
}

fn cmd_info(args: &ArgMatches) {
    let mut vol = mount_image(args.value_of("image").unwrap(), false);
    let info = vol.info();
    println!("Type:            {}", info.fat_type);
    println!("Volume:          {}", info.label);
    println!("Bytes/Sector:    {}", info.bytes_per_sector);
    println!("Sectors/Cluster: {}", info.sectors_per_cluster);
    println!("Total Clusters:  {}", info.total_clusters);
    println!("Free Clusters:   {}", info.free_clusters);
    println!("Total Size:      {} MB", info.total_bytes / (1024 * 1024));
}

fn cmd_ls(args: &ArgMatches) {
    let mut vol = mount_image(args.value_of("image").unwrap(), false);
    let path = args.value_of("path").unwrap_or("/");
    match vol.list_dir(path) {
        Ok(items) => {
            for item in items {
                if item.name == "." || item.name == ".." {
                    continue;
                }
                if item.entry.is_dir() {
                    println!("{}/", item.name);
                } else {
                    println!("{}  {}", item.name, item.entry.file_size());
                }
            }
        }
        Err(e) => {
            eprintln!("ls: {}", e);
            exit(1);
        }
    }
}

fn cmd_cat(args: &ArgMatches) {
    let mut vol = mount_image(args.value_of("image").unwrap(), false);
    match vol.read_file(args.value_of("path").unwrap()) {
        Ok(data) => {
            std::io::stdout().write_all(&data).unwrap();
        }
        Err(e) => {
            eprintln!("cat: {}", e);
            exit(1);
        }
    }
}

fn cmd_write(args: &ArgMatches) {
    let mut vol = mount_image(args.value_of("image").unwrap(), true);
    let path = args.value_of("path").unwrap();
    let text = args.value_of("text").unwrap();
    if let Err(e) = vol.write(path, text.as_bytes()) {
        eprintln!("write: {}", e);
        exit(1);
    }
    vol.unmount().unwrap();
}

fn cmd_touch(args: &ArgMatches) {
    let mut vol = mount_image(args.value_of("image").unwrap(), true);
    if let Err(e) = vol.touch(args.value_of("path").unwrap()) {
        eprintln!("touch: {}", e);
        exit(1);
    }
    vol.unmount().unwrap();
}

fn cmd_mkdir(args: &ArgMatches) {
    let mut vol = mount_image(args.value_of("image").unwrap(), true);
    if let Err(e) = vol.mkdir(args.value_of("path").unwrap()) {
        eprintln!("mkdir: {}", e);
        exit(1);
    }
    vol.unmount().unwrap();
}

fn cmd_rm(args: &ArgMatches) {
    let mut vol = mount_image(args.value_of("image").unwrap(), true);
    if let Err(e) = vol.rm(args.value_of("path").unwrap()) {
        eprintln!("rm: {}", e);
        exit(1);
    }
    vol.unmount().unwrap();
}

/// Write random files, read them back, verify, remove them, and check that
/// no cluster leaked.
fn cmd_stress(args: &ArgMatches) {
    let mut vol = mount_image(args.value_of("image").unwrap(), true);
    let count: usize = args.value_of("count").unwrap().parse().unwrap_or(8);
    let mut rng = rand::thread_rng();

    let free_before = vol.count_free_clusters();
    let mut files = Vec::new();

    for i in 0..count {
        let size = rng.gen_range(1..16 * 1024);
        let mut data = vec![0u8; size];
        rng.fill_bytes(&mut data);
        let name = format!("/STRESS{:02}.BIN", i);
        vol.write(&name, &data).unwrap_or_else(|e| {
            eprintln!("stress write {}: {}", name, e);
            exit(1);
        });
        files.push((name, data));
    }

    for (name, data) in &files {
        let back = vol.read_file(name).unwrap();
        if &back != data {
            eprintln!("stress verify failed for {}", name);
            exit(1);
        }
    }

    for (name, _) in &files {
        vol.rm(name).unwrap();
    }

    let free_after = vol.count_free_clusters();
    vol.unmount().unwrap();
    if free_after != free_before {
        eprintln!(
            "stress leaked clusters: {} free before, {} after",
            free_before, free_after
        );
        exit(1);
    }
    println!("stress ok: {} files, no clusters leaked", count);
}

fn image_arg<'a, 'b>() -> Arg<'a, 'b> {
    Arg::with_name("image").help("image file").required(true)
}

fn path_arg<'a, 'b>() -> Arg<'a, 'b> {
    Arg::with_name("path").help("path inside the image").required(true)
}

fn main() {
    log::set_logger(&LOGGER).ok();
    log::set_max_level(log::LevelFilter::Info);

    let matches = App::new("fatfs-fuse")
        .about("inspect and manipulate FAT12/16/32 image files")
        .subcommand(
            SubCommand::with_name("mkfs")
                .about("create a blank filesystem image")
                .arg(image_arg())
                .arg(
                    Arg::with_name("size-mib")
                        .long("size-mib")
                        .takes_value(true)
                        .default_value("4"),
                )
                .arg(
                    Arg::with_name("type")
                        .long("type")
                        .takes_value(true)
                        .possible_values(&["fat12", "fat16", "fat32"])
                        .default_value("fat16"),
                )
                .arg(
                    Arg::with_name("bps")
                        .long("bytes-per-sector")
                        .takes_value(true)
                        .default_value("512"),
                )
                .arg(
                    Arg::with_name("spc")
                        .long("sectors-per-cluster")
                        .takes_value(true)
                        .default_value("1"),
                ),
        )
        .subcommand(
            SubCommand::with_name("info")
                .about("print volume information")
                .arg(image_arg()),
        )
        .subcommand(
            SubCommand::with_name("ls")
                .about("list a directory")
                .arg(image_arg())
                .arg(Arg::with_name("path").default_value("/")),
        )
        .subcommand(
            SubCommand::with_name("cat")
                .about("print file contents")
                .arg(image_arg())
                .arg(path_arg()),
        )
        .subcommand(
            SubCommand::with_name("write")
                .about("write text into a file")
                .arg(image_arg())
                .arg(path_arg())
                .arg(Arg::with_name("text").required(true)),
        )
        .subcommand(
            SubCommand::with_name("touch")
                .about("create an empty file")
                .arg(image_arg())
                .arg(path_arg()),
        )
        .subcommand(
            SubCommand::with_name("mkdir")
                .about("create a directory")
                .arg(image_arg())
                .arg(path_arg()),
        )
        .subcommand(
            SubCommand::with_name("rm")
                .about("remove a file or directory")
                .arg(image_arg())
                .arg(path_arg()),
        )
        .subcommand(
            SubCommand::with_name("stress")
                .about("random write/read/remove round trips")
                .arg(image_arg())
                .arg(
                    Arg::with_name("count")
                        .long("count")
                        .takes_value(true)
                        .default_value("8"),
                ),
        )
        .get_matches();

    match matches.subcommand() {
        ("mkfs", Some(args)) => cmd_mkfs(args),
        ("info", Some(args)) => cmd_info(args),
        ("ls", Some(args)) => cmd_ls(args),
        ("cat", Some(args)) => cmd_cat(args),
        ("write", Some(args)) => cmd_write(args),
        ("touch", Some(args)) => cmd_touch(args),
        ("mkdir", Some(args)) => cmd_mkdir(args),
        ("rm", Some(args)) => cmd_rm(args),
        ("stress", Some(args)) => cmd_stress(args),
        _ => {
            eprintln!("no command given; try --help");
            exit(1);
        }
    }
}
