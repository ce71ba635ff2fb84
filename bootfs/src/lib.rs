//! Boot Filesystem Image Format
//!
//! Flat, read-only filesystem image shared by the kernel and the host-side
//! `mkfs` tool. The image is a sequence of 4KiB blocks:
//!
//! ```text
//! block 0                boot block: entry/inode/data-block counts
//!                        + up to 63 directory entries (64 bytes each)
//! blocks 1..=N           one inode block per file (length + block indices)
//! blocks N+1..           4KiB data blocks, indexed from the inode
//! ```
//!
//! Directory entries carry a fixed 32-byte name, a type tag and an inode
//! number. Only regular files own an inode; the directory and the RTC
//! device node exist purely as named entries.

#![cfg_attr(not(test), no_std)]

#[cfg(any(test, feature = "builder"))]
extern crate alloc;

use core::mem::size_of;

#[cfg(any(test, feature = "builder"))]
pub mod builder;

/// Size of every on-image block.
pub const BLOCK_SIZE: usize = 4096;

/// Maximum file-name length. Names shorter than this are zero-padded;
/// names of exactly this length carry no terminator.
pub const NAME_LEN: usize = 32;

/// Maximum number of directory entries a boot block can hold.
pub const MAX_DENTRIES: usize = 63;

/// Maximum data blocks a single inode can reference (4KiB inode block
/// minus the length word).
pub const MAX_DATA_BLOCKS: usize = 1023;

/// Byte offset of the directory-entry array inside the boot block.
const DENTRY_TABLE_OFFSET: usize = 64;

/// Size of one serialized directory entry.
const DENTRY_SIZE: usize = 64;

/// File category recorded in a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum FileType {
    /// Pollable device node (the RTC).
    Rtc = 0,
    /// The directory itself.
    Directory = 1,
    /// Regular file backed by an inode.
    Regular = 2,
}

impl TryFrom<u32> for FileType {
    type Error = ImageError;

    fn try_from(value: u32) -> Result<Self, ImageError> {
        match value {
            0 => Ok(FileType::Rtc),
            1 => Ok(FileType::Directory),
            2 => Ok(FileType::Regular),
            _ => Err(ImageError::BadFileType),
        }
    }
}

/// One directory entry, decoded from its 64-byte on-image form.
#[derive(Debug, Clone, Copy)]
pub struct DirEntry {
    /// Fixed-width, zero-padded name.
    pub name: [u8; NAME_LEN],
    /// File category.
    pub file_type: FileType,
    /// Inode index (meaningful for regular files only).
    pub inode: u32,
}

impl DirEntry {
    /// Name as a byte slice with the zero padding stripped.
    pub fn name_bytes(&self) -> &[u8] {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(NAME_LEN);
        &self.name[..end]
    }
}

/// Image decoding / access errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageError {
    /// Image is smaller than its declared block layout.
    Truncated,
    /// Boot-block counts exceed the format limits.
    BadLayout,
    /// Directory entry carries an unknown type tag.
    BadFileType,
    /// Inode index out of range.
    BadInode,
    /// Data-block index out of range.
    BadBlock,
}

/// A parsed, validated view over a filesystem image.
///
/// Holds only a borrow of the raw bytes; all reads go back to the
/// underlying slice, so the image can live in a bootloader ramdisk or a
/// host-side buffer alike.
#[derive(Clone, Copy)]
pub struct Image<'a> {
    data: &'a [u8],
    num_dentries: usize,
    num_inodes: usize,
    num_data_blocks: usize,
}

impl<'a> Image<'a> {
    /// Validate the boot block and block layout of `data`.
    pub fn parse(data: &'a [u8]) -> Result<Self, ImageError> {
        if data.len() < BLOCK_SIZE {
            return Err(ImageError::Truncated);
        }

        let num_dentries = read_u32(data, 0) as usize;
        let num_inodes = read_u32(data, 4) as usize;
        let num_data_blocks = read_u32(data, 8) as usize;

        if num_dentries > MAX_DENTRIES {
            return Err(ImageError::BadLayout);
        }

        // Boot block + inode blocks + data blocks must all be backed by
        // real bytes.
        let total_blocks = 1 + num_inodes + num_data_blocks;
        if data.len() < total_blocks * BLOCK_SIZE {
            return Err(ImageError::Truncated);
        }

        Ok(Image {
            data,
            num_dentries,
            num_inodes,
            num_data_blocks,
        })
    }

    /// Number of directory entries.
    pub fn dentry_count(&self) -> usize {
        self.num_dentries
    }

    /// Number of inode blocks.
    pub fn inode_count(&self) -> usize {
        self.num_inodes
    }

    /// Decode the directory entry at `index`.
    pub fn dentry(&self, index: usize) -> Result<DirEntry, ImageError> {
        if index >= self.num_dentries {
            return Err(ImageError::BadLayout);
        }

        let base = DENTRY_TABLE_OFFSET + index * DENTRY_SIZE;
        let mut name = [0u8; NAME_LEN];
        name.copy_from_slice(&self.data[base..base + NAME_LEN]);

        let file_type = FileType::try_from(read_u32(self.data, base + NAME_LEN))?;
        let inode = read_u32(self.data, base + NAME_LEN + 4);

        Ok(DirEntry {
            name,
            file_type,
            inode,
        })
    }

    /// Resolve a name to its directory entry.
    ///
    /// Names longer than [`NAME_LEN`] cannot exist on the image and
    /// resolve to `None`.
    pub fn lookup(&self, name: &[u8]) -> Option<DirEntry> {
        if name.len() > NAME_LEN {
            return None;
        }

        for i in 0..self.num_dentries {
            let entry = self.dentry(i).ok()?;
            if entry.name_bytes() == name {
                return Some(entry);
            }
        }
        None
    }

    /// Length in bytes of the file behind `inode`.
    pub fn file_len(&self, inode: u32) -> Result<usize, ImageError> {
        let base = self.inode_offset(inode)?;
        Ok(read_u32(self.data, base) as usize)
    }

    /// Read file bytes starting at `offset` into `buf`.
    ///
    /// Returns the number of bytes copied: the full `buf` when enough
    /// file remains, the tail of the file otherwise, and `0` once
    /// `offset` sits at or past end-of-file.
    pub fn read_data(&self, inode: u32, offset: usize, buf: &mut [u8]) -> Result<usize, ImageError> {
        let inode_base = self.inode_offset(inode)?;
        let file_len = read_u32(self.data, inode_base) as usize;

        if offset >= file_len {
            return Ok(0);
        }

        let to_read = buf.len().min(file_len - offset);
        let mut copied = 0;

        while copied < to_read {
            let pos = offset + copied;
            let block_slot = pos / BLOCK_SIZE;
            let block_offset = pos % BLOCK_SIZE;

            if block_slot >= MAX_DATA_BLOCKS {
                return Err(ImageError::BadBlock);
            }
            let block_index = read_u32(self.data, inode_base + 4 + block_slot * 4) as usize;
            if block_index >= self.num_data_blocks {
                return Err(ImageError::BadBlock);
            }

            let block_base = (1 + self.num_inodes + block_index) * BLOCK_SIZE + block_offset;
            let chunk = (to_read - copied).min(BLOCK_SIZE - block_offset);
            buf[copied..copied + chunk].copy_from_slice(&self.data[block_base..block_base + chunk]);
            copied += chunk;
        }

        Ok(copied)
    }

    fn inode_offset(&self, inode: u32) -> Result<usize, ImageError> {
        let inode = inode as usize;
        if inode >= self.num_inodes {
            return Err(ImageError::BadInode);
        }
        Ok((1 + inode) * BLOCK_SIZE)
    }
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    let mut bytes = [0u8; size_of::<u32>()];
    bytes.copy_from_slice(&data[offset..offset + 4]);
    u32::from_le_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ImageBuilder;

    #[test]
    fn test_empty_image_parses() {
        let bytes = ImageBuilder::new().build();
        let image = Image::parse(&bytes).unwrap();
        // "." is always present
        assert_eq!(image.dentry_count(), 1);
        assert!(image.lookup(b".").is_some());
    }

    #[test]
    fn test_truncated_image_rejected() {
        assert!(matches!(
            Image::parse(&[0u8; 64]),
            Err(ImageError::Truncated)
        ));
    }

    #[test]
    fn test_lookup_and_read() {
        let mut builder = ImageBuilder::new();
        builder.add_file("hello", b"hello, world");
        let bytes = builder.build();

        let image = Image::parse(&bytes).unwrap();
        let entry = image.lookup(b"hello").expect("file present");
        assert_eq!(entry.file_type, FileType::Regular);
        assert_eq!(image.file_len(entry.inode).unwrap(), 12);

        let mut buf = [0u8; 64];
        let n = image.read_data(entry.inode, 0, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello, world");
    }

    #[test]
    fn test_lookup_missing_and_overlong() {
        let bytes = ImageBuilder::new().build();
        let image = Image::parse(&bytes).unwrap();
        assert!(image.lookup(b"nosuchfile").is_none());
        assert!(image.lookup(&[b'a'; 40]).is_none());
    }

    #[test]
    fn test_sequential_reads_sum_to_length() {
        // File spanning multiple data blocks.
        let content: alloc::vec::Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let mut builder = ImageBuilder::new();
        builder.add_file("big", &content);
        let bytes = builder.build();

        let image = Image::parse(&bytes).unwrap();
        let entry = image.lookup(b"big").unwrap();

        let mut offset = 0;
        let mut reassembled = alloc::vec::Vec::new();
        loop {
            let mut buf = [0u8; 300];
            let n = image.read_data(entry.inode, offset, &mut buf).unwrap();
            if n == 0 {
                break;
            }
            reassembled.extend_from_slice(&buf[..n]);
            offset += n;
        }
        assert_eq!(offset, content.len());
        assert_eq!(reassembled, content);

        // One more read past end-of-file stays at zero.
        let mut buf = [0u8; 8];
        assert_eq!(image.read_data(entry.inode, offset, &mut buf).unwrap(), 0);
    }

    #[test]
    fn test_read_at_offset_mid_block() {
        let content: alloc::vec::Vec<u8> = (0..5000u32).map(|i| (i % 17) as u8).collect();
        let mut builder = ImageBuilder::new();
        builder.add_file("f", &content);
        let bytes = builder.build();

        let image = Image::parse(&bytes).unwrap();
        let entry = image.lookup(b"f").unwrap();

        let mut buf = [0u8; 100];
        let n = image.read_data(entry.inode, 4090, &mut buf).unwrap();
        assert_eq!(n, 100);
        assert_eq!(&buf[..], &content[4090..4190]);
    }
}
