/*
 * Copyright 2025 The Petrel developers
 *
 * This file is part of Petrel.
 *
 * Petrel is free software: you can redistribute it and/or modify it under the
 * terms of the GNU General Public License as published by the Free Software
 * Foundation, either version 3 of the License, or (at your option) any later
 * version.
 *
 * Petrel is distributed in the hope that it will be useful, but WITHOUT ANY
 * WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR
 * A PARTICULAR PURPOSE. See the GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License along with
 * Petrel. If not, see <https://www.gnu.org/licenses/>.
 */

//! USTAR archive extraction, used to load the initial filesystem image.
//!
//! The archive is a sequence of 512-byte records. Each file starts with a header
//! record carrying the magic `ustar`, octal-ASCII numeric fields and a type flag;
//! the content follows, padded to the next record boundary. Only regular files and
//! directories are extracted, other entries are skipped.

use crate::file::{
	path,
	vfs,
	vfs::node::VnodeType,
};
use alloc::vec::Vec;
use core::mem::{offset_of, size_of};
use utils::{errno, errno::EResult};

/// The size of a record.
const RECORD_SIZE: usize = 512;

/// Type flag: regular file.
const TYPE_REGULAR: u8 = b'0';
/// Type flag: directory.
const TYPE_DIRECTORY: u8 = b'5';

/// A USTAR header record.
#[repr(C)]
struct Header {
	name: [u8; 100],
	mode: [u8; 8],
	uid: [u8; 8],
	gid: [u8; 8],
	size: [u8; 12],
	mtime: [u8; 12],
	checksum: [u8; 8],
	typeflag: u8,
	linkname: [u8; 100],
	magic: [u8; 6],
	version: [u8; 2],
	uname: [u8; 32],
	gname: [u8; 32],
	devmajor: [u8; 8],
	devminor: [u8; 8],
	prefix: [u8; 155],
	padding: [u8; 12],
}

impl Header {
	/// Reinterprets a record as a header.
	fn from_record(record: &[u8]) -> &Self {
		debug_assert!(record.len() >= size_of::<Self>());
		unsafe { &*record.as_ptr().cast() }
	}

	/// Parses an octal-ASCII numeric field.
	fn parse_octal(field: &[u8]) -> u64 {
		let mut val = 0;
		for b in field {
			if !(b'0'..=b'7').contains(b) {
				break;
			}
			val = (val << 3) + (b - b'0') as u64;
		}
		val
	}

	/// The size of the entry's content in bytes.
	fn content_size(&self) -> usize {
		Self::parse_octal(&self.size) as usize
	}

	/// Verifies the record checksum.
	///
	/// The checksum field itself counts as spaces while summing.
	fn checksum_ok(&self, record: &[u8]) -> bool {
		let stored = Self::parse_octal(&self.checksum);
		let field = offset_of!(Header, checksum)..(offset_of!(Header, checksum) + 8);
		let sum: u64 = record[..size_of::<Self>()]
			.iter()
			.enumerate()
			.map(|(i, b)| if field.contains(&i) { b' ' } else { *b } as u64)
			.sum();
		sum == stored
	}

	/// Returns the entry's path: `prefix || name`, nul-trimmed.
	fn full_path(&self) -> Vec<u8> {
		let trim = |f: &[u8]| f.iter().position(|b| *b == 0).unwrap_or(f.len());
		let prefix = &self.prefix[..trim(&self.prefix)];
		let name = &self.name[..trim(&self.name)];
		let mut out = Vec::with_capacity(prefix.len() + name.len() + 1);
		out.extend_from_slice(prefix);
		out.extend_from_slice(name);
		out
	}
}

/// Extracts `archive` into the VFS under `dest`.
///
/// Records with a bad magic or checksum are skipped; a zeroed name record ends the
/// archive.
pub fn extract(archive: &[u8], dest: &[u8]) -> EResult<()> {
	if archive.len() < RECORD_SIZE {
		return Err(errno!(EINVAL));
	}
	let mut off = 0;
	let mut files = 0;
	while off + RECORD_SIZE <= archive.len() {
		let record = &archive[off..(off + RECORD_SIZE)];
		let hdr = Header::from_record(record);
		// A zeroed record marks the end of the archive
		if hdr.name[0] == 0 {
			break;
		}
		if &hdr.magic[..5] != b"ustar" || !hdr.checksum_ok(record) {
			off += RECORD_SIZE;
			continue;
		}
		let content_size = hdr.content_size();
		off += RECORD_SIZE;
		let entry_path = path::concat(dest, &hdr.full_path());
		match hdr.typeflag {
			TYPE_DIRECTORY => {
				// Tolerate directories listed more than once
				if vfs::lookup(&entry_path).is_err() {
					vfs::create(&entry_path, VnodeType::Directory)?;
				}
			}
			TYPE_REGULAR | 0 => {
				let end = off.checked_add(content_size).ok_or(errno!(EINVAL))?;
				if end > archive.len() {
					return Err(errno!(EINVAL));
				}
				let vn = vfs::create(&entry_path, VnodeType::Regular)?;
				vfs::write(&vn, &archive[off..end], 0)?;
				files += 1;
			}
			// Links, devices and FIFOs are not extracted
			_ => {}
		}
		// Content is padded up to the record boundary
		off += content_size.next_multiple_of(RECORD_SIZE);
	}
	log::info!("extracted {files} files from initramfs");
	Ok(())
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::test_utils;

	/// Builds a USTAR record pair (header + padded content) for a single entry.
	fn push_entry(archive: &mut Vec<u8>, name: &[u8], typeflag: u8, content: &[u8]) {
		let mut record = [0u8; RECORD_SIZE];
		record[..name.len()].copy_from_slice(name);
		// size field, octal
		let mut size = content.len();
		for i in (0..11).rev() {
			record[124 + i] = b'0' + (size & 7) as u8;
			size >>= 3;
		}
		record[156] = typeflag;
		record[257..262].copy_from_slice(b"ustar");
		// Checksum: field counts as spaces
		record[148..156].fill(b' ');
		let sum: u64 = record.iter().map(|b| *b as u64).sum();
		let mut s = sum;
		for i in (0..6).rev() {
			record[148 + i] = b'0' + (s & 7) as u8;
			s >>= 3;
		}
		record[154] = 0;
		record[155] = b' ';
		archive.extend_from_slice(&record);
		archive.extend_from_slice(content);
		let pad = content.len().next_multiple_of(RECORD_SIZE) - content.len();
		archive.extend(core::iter::repeat(0).take(pad));
	}

	#[test]
	fn extract_archive() {
		test_utils::init_kernel();
		let mut archive = Vec::new();
		push_entry(&mut archive, b"dir/", TYPE_DIRECTORY, b"");
		push_entry(&mut archive, b"dir/hello.txt", TYPE_REGULAR, b"world");
		// Two trailing zero records
		archive.extend(core::iter::repeat(0).take(RECORD_SIZE * 2));
		extract(&archive, b"/").unwrap();
		let vn = vfs::lookup(b"/dir/hello.txt").unwrap();
		assert_eq!(vn.size(), 5);
		let mut buf = [0u8; 5];
		assert_eq!(vfs::read(&vn, &mut buf, 0).unwrap(), 5);
		assert_eq!(&buf, b"world");
	}

	#[test]
	fn bad_records_are_skipped() {
		test_utils::init_kernel();
		let mut archive = Vec::new();
		// A record with a valid-looking name but no magic
		let mut bogus = [0u8; RECORD_SIZE];
		bogus[..4].copy_from_slice(b"junk");
		archive.extend_from_slice(&bogus);
		push_entry(&mut archive, b"kept.txt", TYPE_REGULAR, b"data");
		archive.extend(core::iter::repeat(0).take(RECORD_SIZE * 2));
		extract(&archive, b"/").unwrap();
		let vn = vfs::lookup(b"/kept.txt").unwrap();
		assert_eq!(vn.size(), 4);
	}
}
