// Copyright (C) 2024 Ethan Uppal.
//
// This Source Code Form is subject to the terms of the Mozilla Public License,
// v. 2.0. If a copy of the MPL was not distributed with this file, You can
// obtain one at https://mozilla.org/MPL/2.0/.

use std::{ffi, marker::PhantomData};

struct VcdImpl {
    handle: *mut ffi::c_void,
    dump: extern "C" fn(*mut ffi::c_void, u64),
    flush: extern "C" fn(*mut ffi::c_void),
    close_and_delete: extern "C" fn(*mut ffi::c_void),
}

impl Drop for VcdImpl {
    fn drop(&mut self) {
        (self.close_and_delete)(self.handle);
    }
}

/// A VCD dump. See
/// [`crate::dynamic::DynamicVerilatedModel::open_vcd`].
pub struct Vcd<'ctx> {
    inner: Option<VcdImpl>,
    _marker: PhantomData<&'ctx ()>,
}

impl<'ctx> Vcd<'ctx> {
    pub(crate) fn new(
        handle: *mut ffi::c_void,
        dump: extern "C" fn(*mut ffi::c_void, u64),
        flush: extern "C" fn(*mut ffi::c_void),
        close_and_delete: extern "C" fn(*mut ffi::c_void),
    ) -> Self {
        Self {
            inner: Some(VcdImpl {
                handle,
                dump,
                flush,
                close_and_delete,
            }),
            _marker: PhantomData,
        }
    }

    /// Documentation taken from the Verilator header file:
    ///
    /// > Write one cycle of dump data
    /// > Call with the current context's time just after eval'ed,
    /// > e.g. `->dump(contextp->time())`.
    pub fn dump(&mut self, timestamp: u64) {
        if let Some(inner) = &self.inner {
            (inner.dump)(inner.handle, timestamp);
        }
    }

    /// Documentation taken from the Verilator header file:
    ///
    /// > Flush dump
    pub fn flush(&mut self) {
        if let Some(inner) = &self.inner {
            (inner.flush)(inner.handle);
        }
    }

    /// The VCD is automatically closed when dropped, but it may be useful to
    /// call this manually.
    pub fn close(mut self) {
        self.inner.take();
    }
}
