//! Arithmetic and logic capabilities offered to guests under the `math`
//! import module.
//!
//! Values are `i32`. Booleans come back as `1` or `0`, and any non-zero
//! operand counts as true.

use crate::{Error, Result};

/// Import module name for every function in this file.
pub const MODULE: &str = "math";

/// Binary operators, in import order.
pub const BINARY: &[(&str, fn(i32, i32) -> Result<i32>)] = &[
    ("add", add),
    ("sub", sub),
    ("mul", mul),
    ("div", div),
    ("mod", rem),
    ("eq", eq),
    ("ne", ne),
    ("lt", lt),
    ("le", le),
    ("gt", gt),
    ("ge", ge),
    ("or", or),
    ("and", and),
];

fn flag(value: bool) -> i32 {
    value as i32
}

pub fn add(a: i32, b: i32) -> Result<i32> {
    Ok(a.wrapping_add(b))
}

pub fn sub(a: i32, b: i32) -> Result<i32> {
    Ok(a.wrapping_sub(b))
}

pub fn mul(a: i32, b: i32) -> Result<i32> {
    Ok(a.wrapping_mul(b))
}

/// Truncating division. Traps on a zero divisor and on `i32::MIN / -1`.
pub fn div(a: i32, b: i32) -> Result<i32> {
    if b == 0 {
        return Err(Error::Trap("integer divide by zero"));
    }
    a.checked_div(b).ok_or(Error::Trap("integer overflow"))
}

/// Remainder with the sign of the dividend. Traps on a zero divisor.
pub fn rem(a: i32, b: i32) -> Result<i32> {
    if b == 0 {
        return Err(Error::Trap("integer divide by zero"));
    }
    // i32::MIN % -1 is 0, not an overflow.
    Ok(a.wrapping_rem(b))
}

pub fn eq(a: i32, b: i32) -> Result<i32> {
    Ok(flag(a == b))
}

pub fn ne(a: i32, b: i32) -> Result<i32> {
    Ok(flag(a != b))
}

pub fn lt(a: i32, b: i32) -> Result<i32> {
    Ok(flag(a < b))
}

pub fn le(a: i32, b: i32) -> Result<i32> {
    Ok(flag(a <= b))
}

pub fn gt(a: i32, b: i32) -> Result<i32> {
    Ok(flag(a > b))
}

pub fn ge(a: i32, b: i32) -> Result<i32> {
    Ok(flag(a >= b))
}

pub fn not(a: i32) -> Result<i32> {
    Ok(flag(a == 0))
}

pub fn or(a: i32, b: i32) -> Result<i32> {
    Ok(flag(a != 0 || b != 0))
}

pub fn and(a: i32, b: i32) -> Result<i32> {
    Ok(flag(a != 0 && b != 0))
}
