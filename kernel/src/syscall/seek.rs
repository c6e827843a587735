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

//! The `seek` system call.

use crate::process::Process;
use alloc::sync::Arc;
use utils::errno::EResult;

pub fn seek(proc: &Arc<Process>, fd: i32, offset: i64, whence: u32) -> EResult<usize> {
	let file = proc.fd_table.lock().get(fd)?;
	let new = file.seek(offset, whence)?;
	Ok(new as usize)
}
