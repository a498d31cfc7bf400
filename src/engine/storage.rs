//! Raw columnar storage for component data.
//!
//! A [`Column`] is a contiguous byte buffer holding every value of one sized
//! component kind within one archetype. Rows are dense; removal uses
//! swap-remove so the buffer never holds holes.
//!
//! ## Invariants
//! - The buffer holds exactly `rows × elem_size` initialized bytes at all
//!   times.
//! - The allocation is aligned to the element alignment, so typed views are
//!   always properly aligned.
//! - `elem_size > 0`: zero-sized (tag) components never allocate a column.
//!
//! Component values are plain old data ([`bytemuck::Pod`]), so byte-level
//! moves and zero-initialization are always valid representations.

use std::alloc::{alloc, dealloc, handle_alloc_error, Layout};
use std::ptr::NonNull;

use bytemuck::Pod;

use crate::engine::error::ColumnError;


/// Dense, type-erased storage for one component kind in one archetype.
pub struct Column {
    data: NonNull<u8>,
    elem_size: usize,
    elem_align: usize,
    rows: usize,
    capacity: usize,
}

impl Column {
    /// Creates an empty column for elements of the given size and alignment.
    ///
    /// ## Panics
    /// Panics if `elem_size` is zero; tags carry no column.
    pub fn new(elem_size: usize, elem_align: usize) -> Self {
        assert!(elem_size > 0, "tag components have no column");
        assert!(elem_align.is_power_of_two());
        Self {
            data: NonNull::dangling(),
            elem_size,
            elem_align,
            rows: 0,
            capacity: 0,
        }
    }

    /// Number of rows currently stored.
    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Element width in bytes.
    #[inline]
    pub fn elem_size(&self) -> usize {
        self.elem_size
    }

    /// Element alignment in bytes.
    #[inline]
    pub fn elem_align(&self) -> usize {
        self.elem_align
    }

    fn layout_for(&self, rows: usize) -> Layout {
        Layout::from_size_align(rows * self.elem_size, self.elem_align)
            .expect("column layout overflow")
    }

    fn grow(&mut self) {
        let new_capacity = (self.capacity * 2).max(8);
        let new_layout = self.layout_for(new_capacity);

        let new_data = unsafe {
            let pointer = alloc(new_layout);
            if pointer.is_null() {
                handle_alloc_error(new_layout);
            }
            if self.capacity > 0 {
                std::ptr::copy_nonoverlapping(
                    self.data.as_ptr(),
                    pointer,
                    self.rows * self.elem_size,
                );
                dealloc(self.data.as_ptr(), self.layout_for(self.capacity));
            }
            NonNull::new_unchecked(pointer)
        };

        self.data = new_data;
        self.capacity = new_capacity;
    }

    /// Appends one zero-initialized row and returns its index.
    pub fn push_zeroed(&mut self) -> usize {
        if self.rows == self.capacity {
            self.grow();
        }
        let row = self.rows;
        unsafe {
            std::ptr::write_bytes(self.data.as_ptr().add(row * self.elem_size), 0, self.elem_size);
        }
        self.rows += 1;
        row
    }

    /// Overwrites a row with the provided value bytes.
    ///
    /// ## Errors
    /// - `SizeMismatch` when `bytes` is not exactly one element wide.
    /// - `RowOutOfBounds` when the row does not exist.
    pub fn write_row(&mut self, row: usize, bytes: &[u8]) -> Result<(), ColumnError> {
        if bytes.len() != self.elem_size {
            return Err(ColumnError::SizeMismatch { expected: self.elem_size, actual: bytes.len() });
        }
        if row >= self.rows {
            return Err(ColumnError::RowOutOfBounds { row, rows: self.rows });
        }
        unsafe {
            std::ptr::copy_nonoverlapping(
                bytes.as_ptr(),
                self.data.as_ptr().add(row * self.elem_size),
                self.elem_size,
            );
        }
        Ok(())
    }

    /// Returns the raw bytes of one row.
    pub fn row_bytes(&self, row: usize) -> Option<&[u8]> {
        if row >= self.rows {
            return None;
        }
        Some(unsafe {
            std::slice::from_raw_parts(self.data.as_ptr().add(row * self.elem_size), self.elem_size)
        })
    }

    /// Copies one cell from another column into an existing row of this one.
    ///
    /// ## Errors
    /// - `WidthMismatch` when the columns disagree on element width.
    /// - `RowOutOfBounds` when either row does not exist.
    pub fn copy_row_from(
        &mut self,
        destination_row: usize,
        source: &Column,
        source_row: usize,
    ) -> Result<(), ColumnError> {
        if self.elem_size != source.elem_size {
            return Err(ColumnError::WidthMismatch {
                destination: self.elem_size,
                source: source.elem_size,
            });
        }
        if destination_row >= self.rows {
            return Err(ColumnError::RowOutOfBounds { row: destination_row, rows: self.rows });
        }
        if source_row >= source.rows {
            return Err(ColumnError::RowOutOfBounds { row: source_row, rows: source.rows });
        }
        unsafe {
            std::ptr::copy_nonoverlapping(
                source.data.as_ptr().add(source_row * source.elem_size),
                self.data.as_ptr().add(destination_row * self.elem_size),
                self.elem_size,
            );
        }
        Ok(())
    }

    /// Removes a row by copying the last row over it and truncating.
    ///
    /// Returns `true` if a different row was moved into the hole.
    ///
    /// ## Errors
    /// `RowOutOfBounds` when the row does not exist.
    pub fn swap_remove(&mut self, row: usize) -> Result<bool, ColumnError> {
        if row >= self.rows {
            return Err(ColumnError::RowOutOfBounds { row, rows: self.rows });
        }
        let last = self.rows - 1;
        let moved = row != last;
        if moved {
            unsafe {
                std::ptr::copy_nonoverlapping(
                    self.data.as_ptr().add(last * self.elem_size),
                    self.data.as_ptr().add(row * self.elem_size),
                    self.elem_size,
                );
            }
        }
        self.rows = last;
        Ok(moved)
    }

    /// Returns a typed view of the whole column.
    ///
    /// Returns `None` when `T` does not match the element width or alignment
    /// this column was created with.
    pub fn as_slice<T: Pod>(&self) -> Option<&[T]> {
        if std::mem::size_of::<T>() != self.elem_size || std::mem::align_of::<T>() > self.elem_align
        {
            return None;
        }
        if self.rows == 0 {
            return Some(&[]);
        }
        let bytes = unsafe {
            std::slice::from_raw_parts(self.data.as_ptr(), self.rows * self.elem_size)
        };
        bytemuck::try_cast_slice(bytes).ok()
    }

    /// Returns a mutable typed view of the whole column.
    pub fn as_slice_mut<T: Pod>(&mut self) -> Option<&mut [T]> {
        if std::mem::size_of::<T>() != self.elem_size || std::mem::align_of::<T>() > self.elem_align
        {
            return None;
        }
        if self.rows == 0 {
            return Some(&mut []);
        }
        let bytes = unsafe {
            std::slice::from_raw_parts_mut(self.data.as_ptr(), self.rows * self.elem_size)
        };
        bytemuck::try_cast_slice_mut(bytes).ok()
    }
}

impl Drop for Column {
    fn drop(&mut self) {
        if self.capacity > 0 {
            unsafe {
                dealloc(self.data.as_ptr(), self.layout_for(self.capacity));
            }
        }
    }
}
