//! Pools of raw component bytes.
//!
//! A `TypedByteArena` holds every value of one component type, one row per
//! entity slot, in a single contiguous allocation. Alongside the bytes it keeps
//! a validity bit per row; a row only holds a component while its bit is set.

use std::alloc::{self, Layout};
use std::any::type_name;
use std::fmt::{self, Debug, Formatter};
use std::mem;
use std::ptr::{self, NonNull};

use bit_vec::BitVec;

use crate::component::Component;
use crate::component_data::ComponentValueRef;
use crate::error::{Error, Result};

/// The number of rows a new pool reserves, and its first growth step.
pub const DEFAULT_GROWTH: usize = 8;

/// The result of reading a row from a pool.
///
/// `value` is whatever bytes the row holds, which may be stale if the row was
/// invalidated, or zeroed if the row was never written.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RowRead<T> {
    pub value: T,
    pub is_valid: bool,
}

impl<T> RowRead<T> {
    /// Return the value only if the row is valid.
    pub fn into_option(self) -> Option<T> {
        if self.is_valid {
            Some(self.value)
        } else {
            None
        }
    }
}

/// Fixed-stride byte storage for a single component type.
///
/// The element layout (and so the stride) is fixed by the first type stored and
/// never changes. The backing allocation always holds exactly
/// `capacity() * stride()` bytes aligned for that type, and every row below
/// `capacity()` has a validity bit.
pub struct TypedByteArena {
    element: Option<Layout>,
    ptr: NonNull<u8>,
    capacity: usize,
    len: usize,
    growth: usize,
    initial_growth: usize,
    valid: BitVec,
}

unsafe impl Send for TypedByteArena {}

fn buffer_layout(element: Layout, rows: usize) -> Layout {
    element.size()
        .checked_mul(rows)
        .and_then(|size| Layout::from_size_align(size, element.align()).ok())
        .unwrap_or_else(|| panic!("pool capacity overflow ({} rows of {} bytes)", rows, element.size()))
}

fn dangling_for(element: Layout) -> NonNull<u8> {
    NonNull::new(element.align() as *mut u8).unwrap_or(NonNull::dangling())
}

impl TypedByteArena {
    /// Create a pool whose element layout is established by the first `append`.
    pub fn new() -> TypedByteArena {
        TypedByteArena::untyped(DEFAULT_GROWTH)
    }

    fn untyped(initial_growth: usize) -> TypedByteArena {
        let initial_growth = initial_growth.max(1);
        TypedByteArena {
            element: None,
            ptr: NonNull::dangling(),
            capacity: 0,
            len: 0,
            growth: initial_growth,
            initial_growth,
            valid: BitVec::new(),
        }
    }

    /// Create a pool for the component type `T`.
    pub fn for_type<T: Component>() -> TypedByteArena {
        TypedByteArena::from_layout(T::layout(), DEFAULT_GROWTH)
    }

    /// Create a pool for elements of the given layout.
    ///
    /// The pool starts with room for `initial_growth` rows and no rows defined.
    pub fn from_layout(element: Layout, initial_growth: usize) -> TypedByteArena {
        let mut arena = TypedByteArena::untyped(initial_growth);
        arena.establish(element);
        arena
    }

    fn establish(&mut self, element: Layout) {
        self.element = Some(element);
        self.ptr = dangling_for(element);
        let capacity = self.capacity.max(self.initial_growth);
        self.capacity = 0;
        self.resize(capacity);
    }

    /// Reallocate the backing storage to hold exactly `capacity` rows.
    ///
    /// New bytes are zeroed and new rows start invalid.
    fn resize(&mut self, capacity: usize) {
        if let Some(element) = self.element {
            let old = buffer_layout(element, self.capacity);
            let new = buffer_layout(element, capacity);

            if old.size() != new.size() {
                let ptr = unsafe {
                    if old.size() == 0 {
                        alloc::alloc_zeroed(new)
                    } else if new.size() == 0 {
                        alloc::dealloc(self.ptr.as_ptr(), old);
                        dangling_for(element).as_ptr()
                    } else {
                        let p = alloc::realloc(self.ptr.as_ptr(), old, new.size());
                        if !p.is_null() && new.size() > old.size() {
                            ptr::write_bytes(p.add(old.size()), 0, new.size() - old.size());
                        }
                        p
                    }
                };

                self.ptr = match NonNull::new(ptr) {
                    Some(p) => p,
                    None => alloc::handle_alloc_error(new),
                };
            }
        }

        self.capacity = capacity;
        if capacity > self.valid.len() {
            self.valid.grow(capacity - self.valid.len(), false);
        } else {
            self.valid.truncate(capacity);
        }
    }

    /// Return the element layout, if it has been established.
    pub fn element_layout(&self) -> Option<Layout> {
        self.element
    }

    /// Return the size in bytes of one element.
    pub fn stride(&self) -> usize {
        self.element.map_or(0, |e| e.size())
    }

    /// Return the number of rows defined in this pool.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if no rows have been pushed.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Return the number of rows the pool can hold before reallocating.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Return how many rows the next reallocation will add.
    pub fn growth_increment(&self) -> usize {
        self.growth
    }

    /// Return the size of the backing allocation in bytes.
    pub fn byte_len(&self) -> usize {
        self.capacity * self.stride()
    }

    /// Count the rows which currently hold a component.
    pub fn valid_count(&self) -> usize {
        self.valid.iter().take(self.len).filter(|v| *v).count()
    }

    /// Return the whole backing buffer, including unused capacity.
    pub fn as_bytes(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.byte_len()) }
    }

    /// Append a row.
    ///
    /// When the row count passes the capacity, the buffer grows by the current
    /// growth increment and the increment doubles.
    pub fn push(&mut self, valid: bool) -> Result<usize> {
        if self.element.is_none() {
            return Err(Error::UninitializedStorage);
        }

        Ok(self.push_row(valid))
    }

    pub(crate) fn push_row(&mut self, valid: bool) -> usize {
        let row = self.len;
        self.len += 1;

        if self.len > self.capacity {
            let capacity = self.capacity + self.growth;
            log::trace!("growing pool of {}-byte rows from {} to {} rows", self.stride(), self.capacity, capacity);
            self.resize(capacity);
            self.growth *= 2;
        }

        self.valid.set(row, valid);
        row
    }

    /// Append a value as a new row, establishing the element layout if this is
    /// the first value the pool has seen.
    pub fn append<T: Component>(&mut self, value: &T, valid: bool) -> Result<usize> {
        if self.element.is_none() {
            self.establish(T::layout());
        }

        let v = ComponentValueRef::from(value);
        self.check_size(v.len(), v.type_id().name())?;
        let row = self.push_row(false);
        self.write(v.as_slice(), row, valid);
        Ok(row)
    }

    fn check_size(&self, actual: usize, name: &'static str) -> Result<Layout> {
        let element = self.element.ok_or(Error::UninitializedStorage)?;

        if actual != element.size() {
            return Err(Error::TypeMismatch {
                name,
                expected: element.size(),
                actual,
            });
        }

        Ok(element)
    }

    fn check_view<T: Component>(&self) -> Result<()> {
        let element = self.check_size(mem::size_of::<T>(), type_name::<T>())?;

        if mem::align_of::<T>() > element.align() {
            return Err(Error::TypeMismatch {
                name: type_name::<T>(),
                expected: element.size(),
                actual: mem::size_of::<T>(),
            });
        }

        Ok(())
    }

    fn row_bytes(&self, row: usize) -> &[u8] {
        let stride = self.stride();
        debug_assert!(row < self.capacity);
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr().add(row * stride), stride) }
    }

    fn write(&mut self, bytes: &[u8], row: usize, valid: bool) {
        let stride = self.stride();
        debug_assert_eq!(bytes.len(), stride);
        debug_assert!(row < self.capacity);

        let dest = unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr().add(row * stride), stride) };
        dest.copy_from_slice(bytes);
        self.valid.set(row, valid);
    }

    /// Write a value into an existing row.
    pub fn assign<T: Component>(&mut self, value: &T, row: usize, valid: bool) -> Result<()> {
        self.assign_value(ComponentValueRef::from(value), row, valid)
    }

    /// Write type-erased component bytes into an existing row.
    ///
    /// Nothing is written unless the value is exactly one stride long and the
    /// row exists.
    pub fn assign_value(&mut self, value: ComponentValueRef<'_>, row: usize, valid: bool) -> Result<()> {
        self.check_size(value.len(), value.type_id().name())?;

        if row >= self.len {
            return Err(Error::RowOutOfRange {
                row,
                rows: self.len,
            });
        }

        self.write(value.as_slice(), row, valid);
        Ok(())
    }

    /// Copy a row out as `T`, along with its validity.
    ///
    /// Rows which were never pushed read as a zeroed, invalid value.
    pub fn read<T: Component>(&self, row: usize) -> Result<RowRead<T>> {
        self.check_size(mem::size_of::<T>(), type_name::<T>())?;

        if row < self.len {
            Ok(RowRead {
                value: bytemuck::pod_read_unaligned(self.row_bytes(row)),
                is_valid: self.valid[row],
            })
        } else {
            Ok(RowRead {
                value: T::zeroed(),
                is_valid: false,
            })
        }
    }

    /// Mark a row as no longer holding a component. The bytes are left alone.
    pub fn invalidate(&mut self, row: usize) {
        if row < self.len {
            self.valid.set(row, false);
        }
    }

    /// Returns true if the row exists and holds a component.
    pub fn is_valid_at(&self, row: usize) -> bool {
        row < self.len && self.valid[row]
    }

    /// View every defined row as `T`.
    ///
    /// Rows which are not valid hold stale or zeroed data, so callers should
    /// check `is_valid_at` before trusting an element.
    pub fn typed_slice<T: Component>(&self) -> Result<&[T]> {
        self.check_view::<T>()?;
        Ok(unsafe { std::slice::from_raw_parts(self.ptr.as_ptr() as *const T, self.len) })
    }

    /// Mutably view every defined row as `T`.
    pub fn typed_view<T: Component>(&mut self) -> Result<&mut [T]> {
        self.check_view::<T>()?;
        Ok(unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr() as *mut T, self.len) })
    }

    /// Mutably view the rows as `T`, only handing out rows which are valid.
    pub fn rows_mut<T: Component>(&mut self) -> Result<RowsMut<'_, T>> {
        self.check_view::<T>()?;
        let data = unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr() as *mut T, self.len) };

        Ok(RowsMut {
            data,
            valid: &self.valid,
        })
    }

    /// Drop trailing invalid rows and release any capacity beyond the rest.
    ///
    /// Only rows after the last valid row are removed. Invalid rows in between
    /// are kept so that every remaining row keeps its index, which means
    /// `len()` and `capacity()` may still exceed `valid_count()`.
    ///
    /// This reallocates, so it should not be used on a per-frame path.
    pub fn compact(&mut self) {
        let rows = (0..self.len).rev()
            .find(|row| self.valid[*row])
            .map_or(0, |row| row + 1);

        log::debug!("compacting pool of {}-byte rows: {} rows, {} -> {} capacity",
                    self.stride(), self.len, self.capacity, rows);

        self.len = rows;
        self.resize(rows);
        self.growth = self.initial_growth;
    }
}

impl Default for TypedByteArena {
    fn default() -> Self {
        TypedByteArena::new()
    }
}

impl Debug for TypedByteArena {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f,
               "TypedByteArena {{ stride: {}, len: {}, capacity: {}, valid: {} }}",
               self.stride(),
               self.len,
               self.capacity,
               self.valid_count())
    }
}

impl Drop for TypedByteArena {
    fn drop(&mut self) {
        if let Some(element) = self.element {
            let layout = buffer_layout(element, self.capacity);
            if layout.size() > 0 {
                unsafe { alloc::dealloc(self.ptr.as_ptr(), layout) };
            }
        }
    }
}

/// A mutable typed view over a pool which only yields valid rows.
pub struct RowsMut<'a, T> {
    data: &'a mut [T],
    valid: &'a BitVec,
}

impl<'a, T> RowsMut<'a, T> {
    /// Return the number of rows in the view.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the view has no rows.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns true if the row exists and holds a component.
    pub fn is_valid(&self, row: usize) -> bool {
        row < self.data.len() && self.valid[row]
    }

    /// Get the component in a row, if the row is valid.
    pub fn get_mut(&mut self, row: usize) -> Option<&mut T> {
        if self.is_valid(row) {
            self.data.get_mut(row)
        } else {
            None
        }
    }
}
