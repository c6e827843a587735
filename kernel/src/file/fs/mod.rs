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

//! Filesystem implementations.

pub mod ramfs;
pub mod ustar;

use super::vfs::node::Vnode;
use alloc::sync::Arc;

/// A mounted filesystem instance.
pub trait Filesystem: Send + Sync {
	/// The name of the filesystem type.
	fn name(&self) -> &[u8];
	/// Returns the root vnode of the filesystem.
	fn root(&self) -> Arc<Vnode>;
}
