// Run with: cargo run --bin cat -- FATIMAGE FILE

use std::env;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::process::exit;

use tinyfat::block::CallbackDevice;
use tinyfat::fat::oflag;
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

    match vol.open(file_name.as_bytes(), oflag::RDONLY) {
        Ok(fd) => {
            let mut buf = [0u8; 100];
            loop {
                match vol.read(fd, &mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        let stdout = std::io::stdout();
                        let _ = stdout.lock().write_all(&buf[..n]);
                    }
                    Err(_) => {
                        eprintln!("*** Failed to read {}", file_name);
                        break;
                    }
                }
            }
            let _ = vol.close(fd);
        }
        Err(_) => eprintln!("*** Failed to open {}", file_name),
    }

    let _ = vol.unmount();
}
