//! Nil-like sentinel detection for `fetch`.

/// Whether a stored value stands for "no value".
///
/// [`CastingMap::fetch`](crate::CastingMap::fetch) treats a present key
/// whose value `is_nil()` the same as an absent key: the fallback (default
/// or `KeyNotFound`) applies even though the entry exists. `Option::None`
/// is the canonical nil; plain values never are. Value types that carry
/// their own notion of absence implement this; everything else gets the
/// default `false`.
pub trait Nillable {
    fn is_nil(&self) -> bool {
        false
    }
}

impl<T> Nillable for Option<T> {
    fn is_nil(&self) -> bool {
        self.is_none()
    }
}

impl<T: Nillable> Nillable for Box<T> {
    fn is_nil(&self) -> bool {
        (**self).is_nil()
    }
}

macro_rules! never_nil {
    ($($t:ty),* $(,)?) => {
        $(impl Nillable for $t {})*
    };
}

never_nil!(
    (),
    bool,
    char,
    i8,
    i16,
    i32,
    i64,
    i128,
    isize,
    u8,
    u16,
    u32,
    u64,
    u128,
    usize,
    f32,
    f64,
    String,
    &str,
);

impl<T> Nillable for Vec<T> {}
