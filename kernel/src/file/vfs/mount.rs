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

//! The mount-point trie.
//!
//! Path resolution first consumes the longest mounted prefix of the path, jumping to
//! the root vnode of the corresponding filesystem, then walks the remaining
//! components.

use super::node::Vnode;
use crate::{file::fs::Filesystem, file::path, sync::IntSpin};
use alloc::{sync::Arc, vec::Vec};
use utils::{errno, errno::EResult};

/// A node of the mount trie.
struct TrieNode {
	/// The path component this node matches.
	comp: Vec<u8>,
	/// The filesystem mounted exactly here, if any.
	fs: Option<Arc<dyn Filesystem>>,
	children: Vec<TrieNode>,
}

impl TrieNode {
	fn find_child(&self, comp: &[u8]) -> Option<usize> {
		self.children.iter().position(|c| c.comp == comp)
	}
}

/// The root of the mount trie. Its own `fs` is the root filesystem.
static TRIE: IntSpin<TrieNode> = IntSpin::new(TrieNode {
	comp: Vec::new(),
	fs: None,
	children: Vec::new(),
});

/// Mounts `fs` at `path`.
///
/// Mounting over an existing mount point returns [`EBUSY`].
pub fn mount(mount_path: &[u8], fs: Arc<dyn Filesystem>) -> EResult<()> {
	let mount_path = path::normalize(mount_path);
	let mut trie = TRIE.lock();
	let mut node = &mut *trie;
	for comp in path::components(&mount_path) {
		let i = match node.find_child(comp) {
			Some(i) => i,
			None => {
				node.children.push(TrieNode {
					comp: comp.into(),
					fs: None,
					children: Vec::new(),
				});
				node.children.len() - 1
			}
		};
		node = &mut node.children[i];
	}
	if node.fs.is_some() {
		return Err(errno!(EBUSY));
	}
	log::info!(
		"mounted {name} at {path}",
		name = display_bytes(fs.name()),
		path = display_bytes(&mount_path),
	);
	node.fs = Some(fs);
	Ok(())
}

/// Renders possibly non-UTF-8 bytes for logging.
fn display_bytes(bytes: &[u8]) -> alloc::string::String {
	alloc::string::String::from_utf8_lossy(bytes).into_owned()
}

/// Consumes the mounted prefix of `lookup_path`.
///
/// Returns the root vnode of the deepest mounted filesystem along the path and the
/// number of leading components it consumed.
pub(super) fn resolve(lookup_path: &[u8]) -> EResult<(Arc<Vnode>, usize)> {
	let trie = TRIE.lock();
	let mut node = &*trie;
	let mut best = (node.fs.clone(), 0);
	for (i, comp) in path::components(lookup_path).enumerate() {
		let Some(child) = node.find_child(comp) else {
			break;
		};
		node = &node.children[child];
		if node.fs.is_some() {
			best = (node.fs.clone(), i + 1);
		}
	}
	let (fs, consumed) = best;
	// No root filesystem means the VFS is not initialized
	let fs = fs.ok_or(errno!(ENOENT))?;
	Ok((fs.root(), consumed))
}
