// Run with: cargo run --bin dir -- FATIMAGE DIR

use std::env;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::process::exit;

use tinyfat::block::CallbackDevice;
use tinyfat::fat::stat::mode;
use tinyfat::{Block, DefaultVolume, BLOCK_SIZE};

fn blkread(block_no: u32, buf: &mut Block, file: &mut File) -> Result<(), ()> {
    file.seek(SeekFrom::Start(BLOCK_SIZE as u64 * block_no as u64))
        .map_err(|_| ())?;
    match file.read(buf) {
        Ok(n) if n == BLOCK_SIZE || n == 0 => Ok(()),
        _ => Err(()),
    }
}

fn blkwrite(block_no: u32, buf: &Block, file: &mut File) -> Result<(), ()> {
    file.seek(SeekFrom::Start(BLOCK_SIZE as u64 * block_no as u64))
        .map_err(|_| ())?;
    file.write_all(buf).map_err(|_| ())
}

/// Renders an 8.3 short name (`"HELLO   TXT"`) back into `hello.txt` form.
fn display_name(raw: &[u8; 11]) -> String {
    let base = std::str::from_utf8(&raw[0..8]).unwrap_or("").trim_end();
    let ext = std::str::from_utf8(&raw[8..11]).unwrap_or("").trim_end();
    if ext.is_empty() {
        base.to_string()
    } else {
        format!("{}.{}", base, ext)
    }
}

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() != 3 {
        eprintln!("Usage: {} FATIMAGE DIR", args[0]);
        exit(1);
    }
    let img_path = &args[1];
    let dir_name = &args[2];

    let img_file = match File::open(img_path) {
        Ok(f) => f,
        Err(_) => {
            eprintln!("*** Failed to open the FAT image");
            exit(1);
        }
    };

    let device = CallbackDevice::new(blkread, blkwrite, img_file);
    let mut vol: DefaultVolume<_> = match DefaultVolume::mount(device) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("*** Failed to mount the FAT image");
            exit(1);
        }
    };

    let result = vol.readdir(dir_name.as_bytes(), |name, st| {
        println!(
            "{}-{:02}-{:02} {:02}:{:02}:{:02}\t{}\t{}\t{}",
            st.st_mtim.year,
            st.st_mtim.month,
            st.st_mtim.day,
            st.st_mtim.hour,
            st.st_mtim.minute,
            st.st_mtim.second,
            if st.st_mode & mode::S_IFDIR != 0 { "<DIR>" } else { "" },
            st.st_size,
            display_name(name),
        );
    });
    if result.is_err() {
        eprintln!("*** Failed to open dir {}", dir_name);
    }

    let _ = vol.unmount();
}
