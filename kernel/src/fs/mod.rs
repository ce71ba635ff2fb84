//! Boot filesystem.
//!
//! A read-only image (format in the `bootfs` crate) handed over by the
//! bootloader as a ramdisk. This module owns the global image and the
//! two descriptor backends built on it: regular files and the
//! directory.

use spin::Mutex;

use bootfs::{DirEntry, Image, ImageError};

use crate::vfs::{FileOps, OpenFile, VfsError};

/// Global filesystem image.
static FS: Mutex<Option<Image<'static>>> = Mutex::new(None);

/// Parse and install the boot image.
pub fn init(image: &'static [u8]) -> Result<(), ImageError> {
    let parsed = Image::parse(image)?;
    crate::serial_println!(
        "[FS  ] Boot image: {} entries, {} inodes",
        parsed.dentry_count(),
        parsed.inode_count()
    );
    *FS.lock() = Some(parsed);
    Ok(())
}

/// Run a closure against the mounted image.
fn with_image<F, R>(f: F) -> Result<R, VfsError>
where
    F: FnOnce(&Image<'static>) -> R,
{
    let guard = FS.lock();
    match guard.as_ref() {
        Some(image) => Ok(f(image)),
        None => Err(VfsError::IoError),
    }
}

/// Resolve a file name to its directory entry.
pub fn lookup(name: &[u8]) -> Result<DirEntry, VfsError> {
    with_image(|image| image.lookup(name))?.ok_or(VfsError::NotFound)
}

/// Directory entry at `index`, if it exists.
pub fn dentry_at(index: usize) -> Result<Option<DirEntry>, VfsError> {
    with_image(|image| image.dentry(index).ok())
}

/// Length of the file behind `inode`.
pub fn file_len(inode: u32) -> Result<usize, VfsError> {
    with_image(|image| image.file_len(inode))?.map_err(|_| VfsError::IoError)
}

/// Read file bytes at `offset`; returns 0 at end-of-file.
pub fn read_at(inode: u32, offset: usize, buf: &mut [u8]) -> Result<usize, VfsError> {
    with_image(|image| image.read_data(inode, offset, buf))?.map_err(|_| VfsError::IoError)
}

/// Regular-file backend: sequential reads, no writes.
pub struct FileDevice;

/// Directory backend: each read yields one entry name.
pub struct DirectoryDevice;

/// Global instances bound into descriptors by `open`.
pub static FILE_DEVICE: FileDevice = FileDevice;
pub static DIRECTORY_DEVICE: DirectoryDevice = DirectoryDevice;

impl FileOps for FileDevice {
    fn open(&self, _file: &mut OpenFile) -> Result<(), VfsError> {
        Ok(())
    }

    fn close(&self, _file: &mut OpenFile) -> Result<(), VfsError> {
        Ok(())
    }

    fn read(&self, file: &mut OpenFile, buf: &mut [u8]) -> Result<usize, VfsError> {
        let n = read_at(file.inode, file.position, buf)?;
        file.position += n;
        Ok(n)
    }

    fn write(&self, _file: &mut OpenFile, _buf: &[u8]) -> Result<usize, VfsError> {
        Err(VfsError::ReadOnly)
    }
}

impl FileOps for DirectoryDevice {
    fn open(&self, _file: &mut OpenFile) -> Result<(), VfsError> {
        Ok(())
    }

    fn close(&self, _file: &mut OpenFile) -> Result<(), VfsError> {
        Ok(())
    }

    /// Copy the next entry's name into `buf`; 0 once the listing is
    /// exhausted.
    fn read(&self, file: &mut OpenFile, buf: &mut [u8]) -> Result<usize, VfsError> {
        let entry = match dentry_at(file.position)? {
            Some(entry) => entry,
            None => return Ok(0),
        };
        file.position += 1;

        let name = entry.name_bytes();
        let n = name.len().min(buf.len());
        buf[..n].copy_from_slice(&name[..n]);
        Ok(n)
    }

    fn write(&self, _file: &mut OpenFile, _buf: &[u8]) -> Result<usize, VfsError> {
        Err(VfsError::ReadOnly)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bootfs::builder::ImageBuilder;
    use bootfs::FileType;

    // One test exercises the whole global path: the image static is
    // process-wide and tests run in parallel.
    #[test]
    fn test_devices_over_mounted_image() {
        let mut builder = ImageBuilder::new();
        builder.add_node("rtc", FileType::Rtc);
        builder.add_file("frame0.txt", b"abcdefghij");
        let bytes: &'static [u8] = Box::leak(builder.build().into_boxed_slice());

        init(bytes).unwrap();

        // Name resolution
        let entry = lookup(b"frame0.txt").unwrap();
        assert_eq!(entry.file_type, FileType::Regular);
        assert!(matches!(lookup(b"absent"), Err(VfsError::NotFound)));

        // Sequential file reads: counts sum to the file length, then 0.
        let mut file = OpenFile::unused(2);
        file.bind(&FILE_DEVICE, entry.inode);
        let mut buf = [0u8; 4];
        assert_eq!(FILE_DEVICE.read(&mut file, &mut buf), Ok(4));
        assert_eq!(&buf, b"abcd");
        assert_eq!(FILE_DEVICE.read(&mut file, &mut buf), Ok(4));
        assert_eq!(FILE_DEVICE.read(&mut file, &mut buf), Ok(2));
        assert_eq!(&buf[..2], b"ij");
        assert_eq!(FILE_DEVICE.read(&mut file, &mut buf), Ok(0));

        // Writes are rejected on the read-only backends.
        assert_eq!(FILE_DEVICE.write(&mut file, b"x"), Err(VfsError::ReadOnly));

        // Directory listing: one name per read, then 0.
        let mut dir = OpenFile::unused(3);
        dir.bind(&DIRECTORY_DEVICE, 0);
        let mut name = [0u8; 32];
        let n = DIRECTORY_DEVICE.read(&mut dir, &mut name).unwrap();
        assert_eq!(&name[..n], b".");
        let n = DIRECTORY_DEVICE.read(&mut dir, &mut name).unwrap();
        assert_eq!(&name[..n], b"rtc");
        let n = DIRECTORY_DEVICE.read(&mut dir, &mut name).unwrap();
        assert_eq!(&name[..n], b"frame0.txt");
        assert_eq!(DIRECTORY_DEVICE.read(&mut dir, &mut name), Ok(0));
    }
}
