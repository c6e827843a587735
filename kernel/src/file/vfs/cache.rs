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

//! The per-vnode page cache.
//!
//! All regular I/O goes through here: a page missing from the cache is read-filled
//! through the vnode's raw `read` operation into a fresh frame, then kept in the
//! vnode's XArray. Writes land in cached frames and flag them dirty (mark 0);
//! [`sync`] pushes dirty pages back through the raw `write` operation.

use super::node::Vnode;
use crate::memory::cache::RcFrame;
use utils::{
	collections::xarray::XA_MARK_0,
	errno::EResult,
	limits::PAGE_SIZE,
};

/// Returns the cached frame at `index`, read-filling it on a miss.
///
/// `whole` tells the caller will overwrite the entire page, making the read-fill
/// unnecessary.
pub fn get_page(vn: &Vnode, index: u64, whole: bool) -> EResult<RcFrame> {
	if let Some(frame) = vn.cache.lock().get(index) {
		return Ok(frame.clone());
	}
	// Miss: produce the frame without holding the cache lock, the raw read may block
	let frame = RcFrame::new_zeroed(0)?;
	if !whole {
		let n = vn.ops.read(vn, unsafe { frame.slice_mut() }, index * PAGE_SIZE as u64)?;
		unsafe {
			frame.slice_mut()[n..].fill(0);
		}
	}
	let mut cache = vn.cache.lock();
	// Someone may have won the race; their copy is the one everyone else sees
	if let Some(frame) = cache.get(index) {
		return Ok(frame.clone());
	}
	cache.insert(index, frame.clone());
	Ok(frame)
}

/// Reads from the vnode's content at byte offset `off` into `buf`.
///
/// Returns the number of bytes read, clamped at end of file.
pub fn read(vn: &Vnode, buf: &mut [u8], off: u64) -> EResult<usize> {
	let size = vn.size();
	if off >= size {
		return Ok(0);
	}
	let len = buf.len().min((size - off) as usize);
	let mut done = 0;
	while done < len {
		let cur = off + done as u64;
		let index = cur / PAGE_SIZE as u64;
		let page_off = (cur % PAGE_SIZE as u64) as usize;
		let chunk = (PAGE_SIZE - page_off).min(len - done);
		let frame = get_page(vn, index, false)?;
		buf[done..(done + chunk)]
			.copy_from_slice(&frame.slice()[page_off..(page_off + chunk)]);
		done += chunk;
	}
	Ok(done)
}

/// Writes `buf` to the vnode's content at byte offset `off`.
///
/// Partially covered pages are read-filled first; fully covered pages are not. The
/// node's size grows if the write ends past it.
pub fn write(vn: &Vnode, buf: &[u8], off: u64) -> EResult<usize> {
	let mut done = 0;
	while done < buf.len() {
		let cur = off + done as u64;
		let index = cur / PAGE_SIZE as u64;
		let page_off = (cur % PAGE_SIZE as u64) as usize;
		let chunk = (PAGE_SIZE - page_off).min(buf.len() - done);
		let whole = chunk == PAGE_SIZE;
		let frame = get_page(vn, index, whole)?;
		unsafe {
			frame.slice_mut()[page_off..(page_off + chunk)]
				.copy_from_slice(&buf[done..(done + chunk)]);
		}
		vn.cache.lock().set_mark(index, XA_MARK_0);
		done += chunk;
	}
	let end = off + done as u64;
	if end > vn.size() {
		vn.set_size(end);
	}
	Ok(done)
}

/// Writes every dirty page back through the vnode's raw `write` operation.
pub fn sync(vn: &Vnode) -> EResult<()> {
	let mut index = 0;
	loop {
		let frame = {
			let cache = vn.cache.lock();
			match cache.find_next_marked(index, u64::MAX, XA_MARK_0) {
				Some((i, frame)) => {
					index = i;
					frame.clone()
				}
				None => return Ok(()),
			}
		};
		// The page past EOF is partial
		let len = (vn.size().saturating_sub(index * PAGE_SIZE as u64) as usize).min(PAGE_SIZE);
		vn.ops.write(vn, &frame.slice()[..len], index * PAGE_SIZE as u64)?;
		vn.cache.lock().clear_mark(index, XA_MARK_0);
		index += 1;
	}
}

/// Drops every cached page at or after the page containing `size`, and sets the
/// node's size.
pub fn truncate(vn: &Vnode, size: u64) {
	let first_kept = size.div_ceil(PAGE_SIZE as u64);
	let mut cache = vn.cache.lock();
	cache.retain(|index, _| index < first_kept);
	// Stale bytes past the new end would resurface on a later extension
	let tail = (size % PAGE_SIZE as u64) as usize;
	if tail != 0 {
		if let Some(frame) = cache.get(size / PAGE_SIZE as u64) {
			unsafe {
				frame.slice_mut()[tail..].fill(0);
			}
		}
	}
	vn.set_size(size);
}
