//! Boot filesystem image builder.
//!
//! Packs a host directory into the flat image the kernel mounts as its
//! ramdisk:
//!
//! ```text
//! mkfs <input-dir> <output-image>
//! ```
//!
//! Every regular file in the input directory becomes an image file
//! under its own name (names are capped at 32 bytes). The "." directory
//! entry and the "rtc" device node are added automatically.

use std::env;
use std::fs;
use std::path::Path;
use std::process::ExitCode;

use bootfs::builder::ImageBuilder;
use bootfs::{FileType, NAME_LEN};

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();
    if args.len() != 3 {
        eprintln!("usage: mkfs <input-dir> <output-image>");
        return ExitCode::FAILURE;
    }

    match build_image(Path::new(&args[1])) {
        Ok(image) => {
            if let Err(err) = fs::write(&args[2], &image) {
                eprintln!("mkfs: cannot write {}: {}", args[2], err);
                return ExitCode::FAILURE;
            }
            println!(
                "mkfs: wrote {} ({} bytes, {} blocks)",
                args[2],
                image.len(),
                image.len() / bootfs::BLOCK_SIZE
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("mkfs: {}", err);
            ExitCode::FAILURE
        }
    }
}

fn build_image(input: &Path) -> Result<Vec<u8>, String> {
    let mut builder = ImageBuilder::new();
    builder.add_node("rtc", FileType::Rtc);

    let mut entries: Vec<_> = fs::read_dir(input)
        .map_err(|e| format!("cannot read {}: {}", input.display(), e))?
        .filter_map(|e| e.ok())
        .collect();
    // Deterministic images: directory order is filesystem-dependent.
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.len() > NAME_LEN {
            return Err(format!("file name '{}' exceeds {} bytes", name, NAME_LEN));
        }

        let data =
            fs::read(&path).map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
        builder.add_file(&name, &data);
    }

    Ok(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bootfs::Image;

    #[test]
    fn test_directory_round_trip() {
        let dir = std::env::temp_dir().join("trio-mkfs-test");
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("hello"), b"hi there").unwrap();
        fs::write(dir.join("shell"), b"\x7f\x45\x4c\x46 fake image").unwrap();

        let bytes = build_image(&dir).unwrap();
        let image = Image::parse(&bytes).unwrap();

        assert!(image.lookup(b".").is_some());
        assert!(image.lookup(b"rtc").is_some());
        let hello = image.lookup(b"hello").unwrap();
        assert_eq!(image.file_len(hello.inode).unwrap(), 8);

        let mut buf = [0u8; 16];
        let n = image.read_data(hello.inode, 0, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"hi there");

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_overlong_name_rejected() {
        let dir = std::env::temp_dir().join("trio-mkfs-longname");
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("a".repeat(NAME_LEN + 1)), b"x").unwrap();

        assert!(build_image(&dir).is_err());

        let _ = fs::remove_dir_all(&dir);
    }
}
