//! In-memory image construction.
//!
//! Used by `tools/mkfs` and by tests. The builder lays files out in the
//! order they were added: boot block, one inode block per regular file,
//! then the data blocks.

use alloc::vec;
use alloc::vec::Vec;

use crate::{FileType, BLOCK_SIZE, MAX_DATA_BLOCKS, MAX_DENTRIES, NAME_LEN};

struct PendingFile {
    name: [u8; NAME_LEN],
    data: Vec<u8>,
}

/// Accumulates files and serializes them into an image.
pub struct ImageBuilder {
    files: Vec<PendingFile>,
    extra_nodes: Vec<([u8; NAME_LEN], FileType)>,
}

impl ImageBuilder {
    /// New builder with the "." directory entry and the "rtc" device
    /// node pre-registered the way the stock images carry them.
    pub fn new() -> Self {
        let mut builder = ImageBuilder {
            files: Vec::new(),
            extra_nodes: Vec::new(),
        };
        builder.add_node(".", FileType::Directory);
        builder
    }

    /// Register a non-file node (directory or device).
    ///
    /// # Panics
    ///
    /// Panics when the name exceeds [`NAME_LEN`] or the entry table is
    /// full; image construction is a build-time activity where these are
    /// hard errors.
    pub fn add_node(&mut self, name: &str, file_type: FileType) {
        assert!(file_type != FileType::Regular, "regular files carry data");
        assert!(self.entry_count() < MAX_DENTRIES, "directory table full");
        self.extra_nodes.push((encode_name(name), file_type));
    }

    /// Register a regular file with the given contents.
    pub fn add_file(&mut self, name: &str, data: &[u8]) {
        assert!(self.entry_count() < MAX_DENTRIES, "directory table full");
        assert!(
            data.len() <= MAX_DATA_BLOCKS * BLOCK_SIZE,
            "file too large for a single inode"
        );
        self.files.push(PendingFile {
            name: encode_name(name),
            data: data.to_vec(),
        });
    }

    fn entry_count(&self) -> usize {
        self.extra_nodes.len() + self.files.len()
    }

    /// Serialize the image.
    pub fn build(&self) -> Vec<u8> {
        let num_inodes = self.files.len();
        let data_blocks_per_file: Vec<usize> = self
            .files
            .iter()
            .map(|f| f.data.len().div_ceil(BLOCK_SIZE))
            .collect();
        let num_data_blocks: usize = data_blocks_per_file.iter().sum();

        let total_blocks = 1 + num_inodes + num_data_blocks;
        let mut image = vec![0u8; total_blocks * BLOCK_SIZE];

        // Boot block header
        write_u32(&mut image, 0, self.entry_count() as u32);
        write_u32(&mut image, 4, num_inodes as u32);
        write_u32(&mut image, 8, num_data_blocks as u32);

        // Directory entries: nodes first, then files (matching add order
        // within each group).
        let mut entry = 0;
        for (name, file_type) in &self.extra_nodes {
            write_dentry(&mut image, entry, name, *file_type, 0);
            entry += 1;
        }
        for (inode, file) in self.files.iter().enumerate() {
            write_dentry(&mut image, entry, &file.name, FileType::Regular, inode as u32);
            entry += 1;
        }

        // Inode blocks + data blocks
        let mut next_data_block = 0usize;
        for (inode, file) in self.files.iter().enumerate() {
            let inode_base = (1 + inode) * BLOCK_SIZE;
            write_u32(&mut image, inode_base, file.data.len() as u32);

            for (slot, chunk) in file.data.chunks(BLOCK_SIZE).enumerate() {
                write_u32(
                    &mut image,
                    inode_base + 4 + slot * 4,
                    next_data_block as u32,
                );
                let data_base = (1 + num_inodes + next_data_block) * BLOCK_SIZE;
                image[data_base..data_base + chunk.len()].copy_from_slice(chunk);
                next_data_block += 1;
            }
        }

        image
    }
}

impl Default for ImageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn encode_name(name: &str) -> [u8; NAME_LEN] {
    let bytes = name.as_bytes();
    assert!(bytes.len() <= NAME_LEN, "name longer than {NAME_LEN} bytes");
    let mut out = [0u8; NAME_LEN];
    out[..bytes.len()].copy_from_slice(bytes);
    out
}

fn write_u32(image: &mut [u8], offset: usize, value: u32) {
    image[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn write_dentry(
    image: &mut [u8],
    entry: usize,
    name: &[u8; NAME_LEN],
    file_type: FileType,
    inode: u32,
) {
    let base = 64 + entry * 64;
    image[base..base + NAME_LEN].copy_from_slice(name);
    write_u32(image, base + NAME_LEN, file_type as u32);
    write_u32(image, base + NAME_LEN + 4, inode);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Image;

    #[test]
    fn test_node_entries_precede_files() {
        let mut builder = ImageBuilder::new();
        builder.add_node("rtc", FileType::Rtc);
        builder.add_file("prog", b"\x7f\x45\x4c\x46");
        let bytes = builder.build();
        let image = Image::parse(&bytes).unwrap();

        assert_eq!(image.dentry(0).unwrap().name_bytes(), b".");
        assert_eq!(image.dentry(1).unwrap().file_type, FileType::Rtc);
        assert_eq!(image.dentry(2).unwrap().file_type, FileType::Regular);
    }

    #[test]
    fn test_block_accounting() {
        let mut builder = ImageBuilder::new();
        builder.add_file("a", &[1u8; BLOCK_SIZE + 1]);
        builder.add_file("b", &[2u8; 10]);
        let bytes = builder.build();

        // boot block + 2 inodes + 3 data blocks
        assert_eq!(bytes.len(), 6 * BLOCK_SIZE);

        let image = Image::parse(&bytes).unwrap();
        let a = image.lookup(b"a").unwrap();
        let b = image.lookup(b"b").unwrap();
        assert_eq!(image.file_len(a.inode).unwrap(), BLOCK_SIZE + 1);

        let mut buf = [0u8; 16];
        let n = image.read_data(b.inode, 0, &mut buf).unwrap();
        assert_eq!(n, 10);
        assert_eq!(&buf[..n], &[2u8; 10]);
    }
}
