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

//! The kernel heap, serving `alloc` on freestanding targets.
//!
//! Hosted builds use the host's allocator instead.

use super::buddy;
use linked_list_allocator::LockedHeap;
use utils::errno::AllocResult;

/// The number of heap pages, as a buddy order.
const HEAP_ORDER: buddy::FrameOrder = buddy::MAX_ORDER;

#[global_allocator]
static HEAP: LockedHeap = LockedHeap::empty();

/// Initializes the kernel heap.
///
/// Must be called exactly once, after the buddy allocator is up.
pub(super) fn init() -> AllocResult<()> {
	let frame = buddy::alloc(HEAP_ORDER)?;
	let base = frame.phys_addr().to_virtual();
	unsafe {
		HEAP.lock()
			.init(base.as_ptr(), buddy::frame_size(HEAP_ORDER));
	}
	Ok(())
}
