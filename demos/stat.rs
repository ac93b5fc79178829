// Run with: cargo run --bin stat -- FATIMAGE FILE

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

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() != 3 {
        eprintln!("Usage: {} FATIMAGE FILE", args[0]);
        exit(1);
    }
    let img_path = &args[1];
    let file_name = &args[2];

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

    match vol.stat(file_name.as_bytes()) {
        Ok(st) => {
            println!("Size:\t{} bytes", st.st_size);
            println!(
                "Date:\t{}-{:02}-{:02} {:02}:{:02}:{:02}",
                st.st_mtim.year,
                st.st_mtim.month,
                st.st_mtim.day,
                st.st_mtim.hour,
                st.st_mtim.minute,
                st.st_mtim.second,
            );
            println!("Access:\t{:o}", st.st_mode & 0o777);
            println!("Dir:\t{}", if st.st_mode & mode::S_IFDIR != 0 { "yes" } else { "no" });
        }
        Err(_) => eprintln!("*** Failed to stat {}", file_name),
    }

    let _ = vol.unmount();
}
