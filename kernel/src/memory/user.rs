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

//! Access to userspace memory.
//!
//! The kernel never dereferences a user pointer directly: each access resolves the
//! page through the target address space (faulting it in if necessary, with the same
//! code path a hardware fault takes), then copies through the HHDM. A pointer that
//! does not resolve yields [`EFAULT`].

use super::{PhysAddr, VirtAddr, KERNEL_SPLIT};
use crate::process::mem_space::AddrSpace;
use alloc::vec::Vec;
use core::slice;
use utils::{errno, errno::EResult, limits::PAGE_SIZE};

/// Resolves the user page containing `addr`, faulting it in if needed.
///
/// Returns the physical address corresponding to `addr`.
fn resolve_page(space: &AddrSpace, addr: VirtAddr, write: bool) -> EResult<PhysAddr> {
	if addr >= KERNEL_SPLIT {
		return Err(errno!(EFAULT));
	}
	{
		let vmem = space.vmem().lock();
		if let Some(phys) = vmem.virt_to_phys(addr) {
			if !write || vmem.is_writable(addr) == Some(true) {
				return Ok(phys);
			}
		}
	}
	// Not present, or pending copy-on-write: go through the fault resolver
	if !space.page_fault(addr, write)? {
		return Err(errno!(EFAULT));
	}
	space
		.vmem()
		.lock()
		.virt_to_phys(addr)
		.ok_or(errno!(EFAULT))
}

/// Runs `f` over each chunk of `[addr, addr + len)` that lives on a single page.
fn for_each_chunk<F: FnMut(PhysAddr, usize, usize) -> EResult<()>>(
	space: &AddrSpace,
	addr: VirtAddr,
	len: usize,
	write: bool,
	mut f: F,
) -> EResult<()> {
	let mut off = 0;
	while off < len {
		let cur = addr + off;
		let in_page = PAGE_SIZE - (cur.0 % PAGE_SIZE);
		let chunk = in_page.min(len - off);
		let phys = resolve_page(space, cur, write)?;
		f(phys, off, chunk)?;
		off += chunk;
	}
	Ok(())
}

/// Copies `src` to the address `dst` of the given address space.
pub fn copy_to_user(space: &AddrSpace, dst: VirtAddr, src: &[u8]) -> EResult<()> {
	for_each_chunk(space, dst, src.len(), true, |phys, off, len| {
		let target = unsafe { slice::from_raw_parts_mut(phys.to_virtual().as_ptr(), len) };
		target.copy_from_slice(&src[off..(off + len)]);
		Ok(())
	})
}

/// Copies `len` bytes at the address `src` of the given address space into `dst`.
pub fn copy_from_user(space: &AddrSpace, src: VirtAddr, dst: &mut [u8]) -> EResult<()> {
	for_each_chunk(space, src, dst.len(), false, |phys, off, len| {
		let source = unsafe { slice::from_raw_parts(phys.to_virtual().as_ptr::<u8>(), len) };
		dst[off..(off + len)].copy_from_slice(source);
		Ok(())
	})
}

/// Reads a nul-terminated string at the address `src` of the given address space.
///
/// Strings longer than `max` yield [`ENAMETOOLONG`].
pub fn copy_string_from_user(space: &AddrSpace, src: VirtAddr, max: usize) -> EResult<Vec<u8>> {
	let mut buf = Vec::new();
	let mut addr = src;
	loop {
		let in_page = PAGE_SIZE - (addr.0 % PAGE_SIZE);
		let phys = resolve_page(space, addr, false)?;
		let chunk = unsafe { slice::from_raw_parts(phys.to_virtual().as_ptr::<u8>(), in_page) };
		match chunk.iter().position(|b| *b == 0) {
			Some(end) => {
				buf.extend_from_slice(&chunk[..end]);
				break;
			}
			None => buf.extend_from_slice(chunk),
		}
		if buf.len() > max {
			return Err(errno!(ENAMETOOLONG));
		}
		addr = addr + in_page;
	}
	if buf.len() > max {
		return Err(errno!(ENAMETOOLONG));
	}
	Ok(buf)
}
