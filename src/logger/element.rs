//! Log payload carried through the ring buffer.

use std::fmt;

use super::AsyncLogger;

/// One scalar log payload. Copied by value into the ring, consumed once.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LogElement {
    Char(char),
    Int(i32),
    Long(i64),
    Unsigned(u32),
    UnsignedLong(u64),
    Float(f32),
    Double(f64),
}

impl Default for LogElement {
    fn default() -> Self {
        LogElement::Char('\0')
    }
}

impl fmt::Display for LogElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            LogElement::Char(c) => write!(f, "{}", c),
            LogElement::Int(v) => write!(f, "{}", v),
            LogElement::Long(v) => write!(f, "{}", v),
            LogElement::Unsigned(v) => write!(f, "{}", v),
            LogElement::UnsignedLong(v) => write!(f, "{}", v),
            LogElement::Float(v) => write!(f, "{}", v),
            LogElement::Double(v) => write!(f, "{}", v),
        }
    }
}

/// Anything that can be pushed into an [`AsyncLogger`].
///
/// Scalars become a single element; text becomes one `Char` per character.
pub trait Loggable {
    fn push_to(&self, logger: &mut AsyncLogger);
}

macro_rules! impl_loggable {
    ($($ty:ty => $variant:ident as $cast:ty),* $(,)?) => {
        $(
            impl Loggable for $ty {
                #[inline(always)]
                fn push_to(&self, logger: &mut AsyncLogger) {
                    logger.push_element(LogElement::$variant(*self as $cast));
                }
            }
        )*
    };
}

impl_loggable! {
    char => Char as char,
    i8 => Int as i32,
    i16 => Int as i32,
    i32 => Int as i32,
    i64 => Long as i64,
    isize => Long as i64,
    u8 => Unsigned as u32,
    u16 => Unsigned as u32,
    u32 => Unsigned as u32,
    u64 => UnsignedLong as u64,
    usize => UnsignedLong as u64,
    f32 => Float as f32,
    f64 => Double as f64,
}

impl Loggable for str {
    #[inline]
    fn push_to(&self, logger: &mut AsyncLogger) {
        for c in self.chars() {
            logger.push_element(LogElement::Char(c));
        }
    }
}

impl Loggable for String {
    #[inline]
    fn push_to(&self, logger: &mut AsyncLogger) {
        self.as_str().push_to(logger);
    }
}

impl<T: Loggable + ?Sized> Loggable for &T {
    #[inline(always)]
    fn push_to(&self, logger: &mut AsyncLogger) {
        (**self).push_to(logger);
    }
}
