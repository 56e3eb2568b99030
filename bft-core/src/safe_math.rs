//! Overflow-aware arithmetic for voting power and proposer priorities
//!
//! Voting power is attacker-influenced input, so every sum or difference on
//! it goes through these helpers instead of plain `+`/`-`.

/// `a + b`, with `true` in the second slot if the result overflowed
pub fn safe_add(a: i64, b: i64) -> (i64, bool) {
    match a.checked_add(b) {
        Some(c) => (c, false),
        None => (-1, true),
    }
}

/// `a - b`, with `true` in the second slot if the result overflowed
pub fn safe_sub(a: i64, b: i64) -> (i64, bool) {
    match a.checked_sub(b) {
        Some(c) => (c, false),
        None => (-1, true),
    }
}

/// `a + b` clamped to `[i64::MIN, i64::MAX]`
pub fn safe_add_clip(a: i64, b: i64) -> i64 {
    match safe_add(a, b) {
        (_, true) if b < 0 => i64::MIN,
        (_, true) => i64::MAX,
        (c, false) => c,
    }
}

/// `a - b` clamped to `[i64::MIN, i64::MAX]`
pub fn safe_sub_clip(a: i64, b: i64) -> i64 {
    match safe_sub(a, b) {
        (_, true) if b > 0 => i64::MIN,
        (_, true) => i64::MAX,
        (c, false) => c,
    }
}
