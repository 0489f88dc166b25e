//! 32-bit 序列号的回绕比较（serial number arithmetic）

/// `a` 在 `b` 之前
pub fn seq_lt(a: u32, b: u32) -> bool {
    (a.wrapping_sub(b) as i32) < 0
}

pub fn seq_le(a: u32, b: u32) -> bool {
    a == b || seq_lt(a, b)
}

pub fn seq_gt(a: u32, b: u32) -> bool {
    seq_lt(b, a)
}

pub fn seq_ge(a: u32, b: u32) -> bool {
    seq_le(b, a)
}

/// `a - b`，按有符号距离解释
pub fn seq_delta(a: u32, b: u32) -> i64 {
    a.wrapping_sub(b) as i32 as i64
}
