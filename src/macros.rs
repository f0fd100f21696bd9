//! # Internal Macros
//!
//! ## be_accessors!
//!
//! Generates getter and setter methods for zerocopy struct fields that use
//! big-endian wrapper types (U16, U32, U64). The on-disk page format is
//! big-endian throughout, so every multi-byte header field goes through
//! these wrappers.
//!
//! ### Usage
//!
//! ```ignore
//! use zerocopy::big_endian::{U16, U64};
//!
//! #[repr(C)]
//! struct PageHeader {
//!     n_recs: U16,
//!     max_trx_id: U64,
//! }
//!
//! impl PageHeader {
//!     be_accessors! {
//!         n_recs: u16,
//!         max_trx_id: u64,
//!     }
//! }
//!
//! // Generates:
//! // pub fn n_recs(&self) -> u16 { self.n_recs.get() }
//! // pub fn set_n_recs(&mut self, val: u16) { self.n_recs = U16::new(val); }
//! // pub fn max_trx_id(&self) -> u64 { self.max_trx_id.get() }
//! // pub fn set_max_trx_id(&mut self, val: u64) { self.max_trx_id = U64::new(val); }
//! ```

/// Generates getter and setter methods for zerocopy big-endian fields.
#[macro_export]
macro_rules! be_accessors {
    (@impl $field:ident, u16) => {
        ::paste::paste! {
            #[inline]
            pub fn $field(&self) -> u16 {
                self.$field.get()
            }

            #[inline]
            pub fn [<set_ $field>](&mut self, val: u16) {
                self.$field = ::zerocopy::big_endian::U16::new(val);
            }
        }
    };
    (@impl $field:ident, u32) => {
        ::paste::paste! {
            #[inline]
            pub fn $field(&self) -> u32 {
                self.$field.get()
            }

            #[inline]
            pub fn [<set_ $field>](&mut self, val: u32) {
                self.$field = ::zerocopy::big_endian::U32::new(val);
            }
        }
    };
    (@impl $field:ident, u64) => {
        ::paste::paste! {
            #[inline]
            pub fn $field(&self) -> u64 {
                self.$field.get()
            }

            #[inline]
            pub fn [<set_ $field>](&mut self, val: u64) {
                self.$field = ::zerocopy::big_endian::U64::new(val);
            }
        }
    };
    ($($field:ident : $ty:tt),* $(,)?) => {
        $(
            $crate::be_accessors!(@impl $field, $ty);
        )*
    };
}
