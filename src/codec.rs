//! Binary wire codec: the capability set `{encoded_size, encode, decode}`
//! that moves argument values from a producer thread into the queue and
//! back out again as type-erased [`Value`]s for the pattern formatter.
//!
//! Decoder dispatch is grounded on the function-pointer technique in
//! `quicklog`'s `queue/log.rs` (`ArgsKind`, `DecodeEachFn`): rather than a
//! vtable, each call site's static metadata carries a `DecodeFn` obtained
//! from `<T as Encode>::decode`, so decoding never needs a type registry.

use std::borrow::Cow;
use std::fmt;

use smallvec::SmallVec;

/// A decoded, type-erased argument, ready for the pattern and message
/// formatters. Lifetime `'a` borrows from the record's payload bytes.
#[derive(Debug, Clone, PartialEq)]
pub enum Value<'a> {
    I64(i64),
    U64(u64),
    F64(f64),
    Bool(bool),
    Str(Cow<'a, str>),
    Bytes(&'a [u8]),
    Seq(Vec<Value<'a>>),
    Map(Vec<(Value<'a>, Value<'a>)>),
}

impl fmt::Display for Value<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::I64(v) => write!(f, "{v}"),
            Value::U64(v) => write!(f, "{v}"),
            Value::F64(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Str(v) => write!(f, "{v}"),
            Value::Bytes(v) => write!(f, "{v:?}"),
            Value::Seq(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Map(pairs) => {
                f.write_str("{")?;
                for (i, (k, v)) in pairs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                f.write_str("}")
            }
        }
    }
}

/// Function pointer type stored in a call site's static metadata, able to
/// decode one argument (or, for a tuple argument list, all of them at once)
/// out of a payload slice. Returns the decoded value plus the number of
/// bytes consumed.
pub type DecodeFn = for<'a> fn(&'a [u8]) -> (Value<'a>, usize);

/// Resolves the [`DecodeFn`] for a call site's argument tuple by type
/// inference on `sample` (never actually read). The returned closure
/// captures nothing but the monomorphized type `T`, so it coerces to a
/// plain `fn` pointer and can be stored in a `'static` [`crate::record::Metadata`]
/// without a vtable or a runtime type registry.
pub fn decode_fn_for_value<T: Encode>(_sample: &T) -> DecodeFn {
    |buf: &[u8]| T::decode(buf)
}

/// Types that can be written into and read back out of a record payload.
///
/// Built-in implementations cover arithmetic scalars, UTF-8 strings, byte
/// slices, sequences, maps/pairs, and tuples (used as the argument list for
/// a whole log call). User types implement this directly for custom
/// encodings, or derive it trivially via [`Pod`] when `Copy` and free of
/// padding-sensitive invariants.
pub trait Encode {
    fn encoded_size(&self) -> usize;
    /// Writes `self` to the front of `buf`, returning the number of bytes
    /// written. `buf` is guaranteed to be at least `encoded_size()` long.
    fn encode(&self, buf: &mut [u8]) -> usize;
    /// Reads a value of this type from the front of `buf`, returning it
    /// alongside the number of bytes consumed.
    fn decode(buf: &[u8]) -> (Value<'_>, usize)
    where
        Self: Sized;
}

macro_rules! impl_encode_int {
    ($($t:ty => $variant:ident),+ $(,)?) => {
        $(
            impl Encode for $t {
                #[inline]
                fn encoded_size(&self) -> usize {
                    std::mem::size_of::<$t>()
                }

                #[inline]
                fn encode(&self, buf: &mut [u8]) -> usize {
                    let bytes = self.to_ne_bytes();
                    buf[..bytes.len()].copy_from_slice(&bytes);
                    bytes.len()
                }

                #[inline]
                fn decode(buf: &[u8]) -> (Value<'_>, usize) {
                    let n = std::mem::size_of::<$t>();
                    let mut raw = [0u8; std::mem::size_of::<$t>()];
                    raw.copy_from_slice(&buf[..n]);
                    (Value::$variant(<$t>::from_ne_bytes(raw) as _), n)
                }
            }
        )+
    };
}

impl_encode_int!(
    i8 => I64, i16 => I64, i32 => I64, i64 => I64, isize => I64,
    u8 => U64, u16 => U64, u32 => U64, u64 => U64, usize => U64,
);

impl Encode for f32 {
    #[inline]
    fn encoded_size(&self) -> usize {
        4
    }
    #[inline]
    fn encode(&self, buf: &mut [u8]) -> usize {
        buf[..4].copy_from_slice(&self.to_ne_bytes());
        4
    }
    #[inline]
    fn decode(buf: &[u8]) -> (Value<'_>, usize) {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&buf[..4]);
        (Value::F64(f32::from_ne_bytes(raw) as f64), 4)
    }
}

impl Encode for f64 {
    #[inline]
    fn encoded_size(&self) -> usize {
        8
    }
    #[inline]
    fn encode(&self, buf: &mut [u8]) -> usize {
        buf[..8].copy_from_slice(&self.to_ne_bytes());
        8
    }
    #[inline]
    fn decode(buf: &[u8]) -> (Value<'_>, usize) {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&buf[..8]);
        (Value::F64(f64::from_ne_bytes(raw)), 8)
    }
}

impl Encode for bool {
    #[inline]
    fn encoded_size(&self) -> usize {
        1
    }
    #[inline]
    fn encode(&self, buf: &mut [u8]) -> usize {
        buf[0] = *self as u8;
        1
    }
    #[inline]
    fn decode(buf: &[u8]) -> (Value<'_>, usize) {
        (Value::Bool(buf[0] != 0), 1)
    }
}

/// `u32 length || bytes`, no trailing NUL.
impl Encode for str {
    #[inline]
    fn encoded_size(&self) -> usize {
        4 + self.len()
    }
    #[inline]
    fn encode(&self, buf: &mut [u8]) -> usize {
        let len = self.len() as u32;
        buf[0..4].copy_from_slice(&len.to_ne_bytes());
        buf[4..4 + self.len()].copy_from_slice(self.as_bytes());
        4 + self.len()
    }
    #[inline]
    fn decode(buf: &[u8]) -> (Value<'_>, usize) {
        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&buf[0..4]);
        let len = u32::from_ne_bytes(len_bytes) as usize;
        let s = std::str::from_utf8(&buf[4..4 + len]).unwrap_or("<invalid utf8>");
        (Value::Str(Cow::Borrowed(s)), 4 + len)
    }
}

impl Encode for String {
    #[inline]
    fn encoded_size(&self) -> usize {
        self.as_str().encoded_size()
    }
    #[inline]
    fn encode(&self, buf: &mut [u8]) -> usize {
        self.as_str().encode(buf)
    }
    #[inline]
    fn decode(buf: &[u8]) -> (Value<'_>, usize) {
        <str as Encode>::decode(buf)
    }
}

/// A static string reference encoded as its address and length plus a
/// 1-byte discriminator, rather than copying the bytes. Decoding is
/// `unsafe` because it trusts the producer's promise that the pointee is
/// `'static` and therefore still valid whenever the backend decodes it,
/// arbitrarily long after the call site ran.
pub const BORROWED_STR_DISCRIMINATOR: u8 = 0xB5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BorrowedStr(pub &'static str);

impl Encode for BorrowedStr {
    #[inline]
    fn encoded_size(&self) -> usize {
        8 + 8 + 1
    }
    #[inline]
    fn encode(&self, buf: &mut [u8]) -> usize {
        let ptr = self.0.as_ptr() as usize as u64;
        let len = self.0.len() as u64;
        buf[0..8].copy_from_slice(&ptr.to_ne_bytes());
        buf[8..16].copy_from_slice(&len.to_ne_bytes());
        buf[16] = BORROWED_STR_DISCRIMINATOR;
        17
    }
    #[inline]
    fn decode(buf: &[u8]) -> (Value<'_>, usize) {
        debug_assert_eq!(buf[16], BORROWED_STR_DISCRIMINATOR);
        let mut ptr_bytes = [0u8; 8];
        ptr_bytes.copy_from_slice(&buf[0..8]);
        let mut len_bytes = [0u8; 8];
        len_bytes.copy_from_slice(&buf[8..16]);
        let ptr = u64::from_ne_bytes(ptr_bytes) as usize as *const u8;
        let len = u64::from_ne_bytes(len_bytes) as usize;
        // SAFETY: `BorrowedStr` is only ever constructed from a
        // `&'static str`, so the pointee remains valid and immutable for
        // the life of the process; the caller upholds this invariant by
        // never wrapping anything but a `'static` reference.
        let s = unsafe { std::str::from_utf8_unchecked(std::slice::from_raw_parts(ptr, len)) };
        (Value::Str(Cow::Borrowed(s)), 17)
    }
}

impl<T: Encode> Encode for Vec<T> {
    fn encoded_size(&self) -> usize {
        4 + self.iter().map(Encode::encoded_size).sum::<usize>()
    }

    fn encode(&self, buf: &mut [u8]) -> usize {
        let count = self.len() as u32;
        buf[0..4].copy_from_slice(&count.to_ne_bytes());
        let mut offset = 4;
        for item in self {
            offset += item.encode(&mut buf[offset..]);
        }
        offset
    }

    fn decode(buf: &[u8]) -> (Value<'_>, usize) {
        let mut count_bytes = [0u8; 4];
        count_bytes.copy_from_slice(&buf[0..4]);
        let count = u32::from_ne_bytes(count_bytes) as usize;
        let mut offset = 4;
        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            let (v, n) = T::decode(&buf[offset..]);
            items.push(v);
            offset += n;
        }
        (Value::Seq(items), offset)
    }
}

/// Marker for user-defined trivially-copyable types: encoding is a raw byte
/// copy of the value's storage, with no per-field logic. Implementors must
/// ensure the type has no padding bytes that could leak uninitialized
/// memory and is valid for any bit pattern of its size on decode, since
/// decode only ever produces the fixed-width byte count as a [`Value::Bytes`]
/// view (callers needing a typed value back read it from the payload
/// directly with [`Pod::from_raw`]).
///
/// # Safety
/// Implementing this trait asserts that `Self` is `Copy`, has no padding,
/// and every bit pattern of `size_of::<Self>()` bytes is a valid value.
pub unsafe trait Pod: Copy + 'static {}

/// Blanket [`Encode`] impl for any [`Pod`] type: straight byte copy, no
/// length prefix (the size is known at compile time by both ends).
impl<T: Pod> Encode for T {
    fn encoded_size(&self) -> usize {
        std::mem::size_of::<T>()
    }

    fn encode(&self, buf: &mut [u8]) -> usize {
        let n = std::mem::size_of::<T>();
        // SAFETY: `T: Pod` guarantees a stable, fully-initialized byte
        // representation of exactly `size_of::<T>()` bytes.
        let bytes = unsafe { std::slice::from_raw_parts(self as *const T as *const u8, n) };
        buf[..n].copy_from_slice(bytes);
        n
    }

    fn decode(buf: &[u8]) -> (Value<'_>, usize) {
        let n = std::mem::size_of::<T>();
        (Value::Bytes(&buf[..n]), n)
    }
}

/// Per-producer-thread scratch space for the codec's two-pass sizing: the
/// first pass records each argument's `encoded_size()` here so the second
/// pass (actual `encode`) never recomputes a length-dependent size. Reused
/// across records to keep the hot path allocation-free after warm-up.
#[derive(Default)]
pub struct SizeScratch {
    sizes: SmallVec<[usize; 8]>,
}

impl SizeScratch {
    pub fn new() -> Self {
        Self { sizes: SmallVec::new() }
    }

    pub fn clear(&mut self) {
        self.sizes.clear();
    }

    pub fn push(&mut self, size: usize) {
        self.sizes.push(size);
    }

    /// Clears and refills the scratch list from `values`, returning the
    /// total encoded size.
    pub fn size_all<'a, I, T>(&mut self, values: I) -> usize
    where
        I: IntoIterator<Item = &'a T>,
        T: Encode + 'a,
    {
        self.sizes.clear();
        let mut total = 0;
        for v in values {
            let sz = v.encoded_size();
            self.sizes.push(sz);
            total += sz;
        }
        total
    }

    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }
}

/// A two-pass [`Encode`] extension for call-site argument tuples: the size
/// pass fills a reusable [`SizeScratch`] with each argument's computed
/// size, and the encode pass writes using those cached sizes instead of
/// asking each argument to recompute where it lands in the buffer.
pub trait ScratchEncode: Encode {
    fn size_into_scratch(&self, scratch: &mut SizeScratch) -> usize;
    fn encode_cached(&self, buf: &mut [u8], scratch: &SizeScratch) -> usize;
}

macro_rules! impl_encode_tuple {
    ($($idx:tt $T:ident),+) => {
        impl<$($T: Encode),+> Encode for ($($T,)+) {
            fn encoded_size(&self) -> usize {
                0 $(+ self.$idx.encoded_size())+
            }

            fn encode(&self, buf: &mut [u8]) -> usize {
                let mut offset = 0;
                $(
                    offset += self.$idx.encode(&mut buf[offset..]);
                )+
                offset
            }

            fn decode(buf: &[u8]) -> (Value<'_>, usize) {
                let mut offset = 0;
                let mut items = Vec::new();
                $(
                    let (v, n) = $T::decode(&buf[offset..]);
                    items.push(v);
                    offset += n;
                )+
                (Value::Seq(items), offset)
            }
        }

        impl<$($T: Encode),+> ScratchEncode for ($($T,)+) {
            fn size_into_scratch(&self, scratch: &mut SizeScratch) -> usize {
                scratch.clear();
                let mut total = 0;
                $(
                    let sz = self.$idx.encoded_size();
                    scratch.push(sz);
                    total += sz;
                )+
                total
            }

            fn encode_cached(&self, buf: &mut [u8], scratch: &SizeScratch) -> usize {
                let sizes = scratch.sizes();
                let mut offset = 0;
                $(
                    let sz = sizes[$idx];
                    self.$idx.encode(&mut buf[offset..offset + sz]);
                    offset += sz;
                )+
                offset
            }
        }
    };
}

impl_encode_tuple!(0 A);
impl_encode_tuple!(0 A, 1 B);
impl_encode_tuple!(0 A, 1 B, 2 C);
impl_encode_tuple!(0 A, 1 B, 2 C, 3 D);
impl_encode_tuple!(0 A, 1 B, 2 C, 3 D, 4 E);
impl_encode_tuple!(0 A, 1 B, 2 C, 3 D, 4 E, 5 F);
