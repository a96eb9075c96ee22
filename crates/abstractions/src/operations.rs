use core::ops::{
    Add, AddAssign, BitAnd, BitAndAssign, BitOr, BitOrAssign, BitXor, BitXorAssign, Sub, SubAssign,
};

pub trait IArithOps:
    crate::IUsizeAlias
    + Add<usize>
    + Add<Self>
    + Sub<usize>
    + Sub<Self>
    + AddAssign<usize>
    + AddAssign<Self>
    + SubAssign<usize>
    + SubAssign<Self>
{
}

pub trait IBitwiseOps:
    crate::IUsizeAlias
    + BitAnd<usize>
    + BitAnd<Self>
    + BitOr<usize>
    + BitOr<Self>
    + BitXor<usize>
    + BitXor<Self>
    + BitAndAssign<usize>
    + BitAndAssign<Self>
    + BitOrAssign<usize>
    + BitOrAssign<Self>
    + BitXorAssign<usize>
    + BitXorAssign<Self>
{
}

/// Rounds `value` up to the next multiple of `align`, which must be a power of two.
#[inline]
pub const fn align_up(value: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    let mask = align - 1;
    (value + mask) & !mask
}

/// Rounds `value` down to the previous multiple of `align`, which must be a power of two.
#[inline]
pub const fn align_down(value: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    value & !(align - 1)
}

#[inline]
pub const fn is_aligned(value: usize, align: usize) -> bool {
    value & (align - 1) == 0
}

/// Ceiling integer division, used throughout the texture layout math
/// (`ceil(W / block_width)` etc).
#[inline]
pub const fn divide_ceil(value: usize, divisor: usize) -> usize {
    (value + divisor - 1) / divisor
}

#[macro_export]
macro_rules! impl_arith_with_usize {
    ($type:ty) => {
        impl core::ops::Add<usize> for $type {
            type Output = Self;
            fn add(self, rhs: usize) -> Self::Output {
                <$type as $crate::IUsizeAlias>::from_usize(
                    <$type as $crate::IUsizeAlias>::as_usize(self) + rhs,
                )
            }
        }

        impl core::ops::Sub<usize> for $type {
            type Output = Self;
            fn sub(self, rhs: usize) -> Self::Output {
                <$type as $crate::IUsizeAlias>::from_usize(
                    <$type as $crate::IUsizeAlias>::as_usize(self) - rhs,
                )
            }
        }

        impl core::ops::AddAssign<usize> for $type {
            fn add_assign(&mut self, rhs: usize) {
                *self = *self + rhs;
            }
        }

        impl core::ops::SubAssign<usize> for $type {
            fn sub_assign(&mut self, rhs: usize) {
                *self = *self - rhs;
            }
        }
    };
}

#[macro_export]
macro_rules! impl_arith_with_self {
    ($type:ty) => {
        impl core::ops::Add for $type {
            type Output = Self;
            fn add(self, rhs: Self) -> Self::Output {
                <$type as $crate::IUsizeAlias>::from_usize(
                    <$type as $crate::IUsizeAlias>::as_usize(self)
                        + <$type as $crate::IUsizeAlias>::as_usize(rhs),
                )
            }
        }

        impl core::ops::Sub for $type {
            type Output = Self;
            fn sub(self, rhs: Self) -> Self::Output {
                <$type as $crate::IUsizeAlias>::from_usize(
                    <$type as $crate::IUsizeAlias>::as_usize(self)
                        - <$type as $crate::IUsizeAlias>::as_usize(rhs),
                )
            }
        }

        impl core::ops::AddAssign for $type {
            fn add_assign(&mut self, rhs: Self) {
                *self = *self + rhs;
            }
        }

        impl core::ops::SubAssign for $type {
            fn sub_assign(&mut self, rhs: Self) {
                *self = *self - rhs;
            }
        }
    };
}

#[macro_export]
macro_rules! impl_arith_ops {
    ($type:ty) => {
        impl $crate::IArithOps for $type {}

        $crate::impl_arith_with_usize!($type);
        $crate::impl_arith_with_self!($type);
    };
}

#[macro_export]
macro_rules! impl_usize_display {
    ($type:ty) => {
        impl core::fmt::Display for $type {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}({:#x})", stringify!($type), self.as_usize())
            }
        }
    };
}
