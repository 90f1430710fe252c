//! User state flag set.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

/// Combinable account state flags.
///
/// Stored as a plain `int` column. Unknown bits are retained so that
/// `from_bits(x).bits() == x` for every wire value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct UserState(i32);

impl UserState {
    pub const NEW: UserState = UserState(1);
    pub const EMAIL_VERIFIED: UserState = UserState(2);
    pub const PHONE_VERIFIED: UserState = UserState(4);
    pub const BANNED: UserState = UserState(8);
    pub const REMOVED: UserState = UserState(16);

    const NAMED: [(UserState, &'static str); 5] = [
        (Self::NEW, "New"),
        (Self::EMAIL_VERIFIED, "EmailVerified"),
        (Self::PHONE_VERIFIED, "PhoneVerified"),
        (Self::BANNED, "Banned"),
        (Self::REMOVED, "Removed"),
    ];

    /// The empty set.
    pub const fn empty() -> Self {
        UserState(0)
    }

    /// Build from the wire integer, keeping unknown bits.
    pub const fn from_bits(bits: i32) -> Self {
        UserState(bits)
    }

    /// Wire integer form.
    pub const fn bits(self) -> i32 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True if every flag in `other` is set.
    pub const fn contains(self, other: UserState) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: UserState) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: UserState) {
        self.0 &= !other.0;
    }
}

impl BitOr for UserState {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        UserState(self.0 | rhs.0)
    }
}

impl BitOrAssign for UserState {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for UserState {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        UserState(self.0 & rhs.0)
    }
}

impl From<UserState> for i32 {
    fn from(state: UserState) -> Self {
        state.0
    }
}

impl From<i32> for UserState {
    fn from(bits: i32) -> Self {
        UserState(bits)
    }
}

impl fmt::Display for UserState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("(empty)");
        }

        let mut rest = self.0;
        let mut first = true;
        for (flag, name) in Self::NAMED {
            if self.contains(flag) {
                if !first {
                    f.write_str(" | ")?;
                }
                f.write_str(name)?;
                rest &= !flag.0;
                first = false;
            }
        }
        if rest != 0 {
            if !first {
                f.write_str(" | ")?;
            }
            write!(f, "{:#x}", rest)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_values() {
        assert_eq!(UserState::NEW.bits(), 1);
        assert_eq!(UserState::EMAIL_VERIFIED.bits(), 2);
        assert_eq!(UserState::PHONE_VERIFIED.bits(), 4);
        assert_eq!(UserState::BANNED.bits(), 8);
        assert_eq!(UserState::REMOVED.bits(), 16);
    }

    #[test]
    fn test_union_and_intersection() {
        let state = UserState::NEW | UserState::EMAIL_VERIFIED;
        assert_eq!(state.bits(), 3);
        assert!(state.contains(UserState::NEW));
        assert!(!state.contains(UserState::BANNED));
        assert_eq!(state & UserState::EMAIL_VERIFIED, UserState::EMAIL_VERIFIED);

        let mut state = state;
        state.remove(UserState::NEW);
        state |= UserState::REMOVED;
        assert_eq!(state.bits(), 18);
    }

    #[test]
    fn test_unknown_bits_are_retained() {
        let state = UserState::from_bits(0b10_0001);
        assert_eq!(state.bits(), 33);
        assert_eq!(i32::from(state), 33);
    }

    #[test]
    fn test_display() {
        assert_eq!(UserState::empty().to_string(), "(empty)");
        assert_eq!(
            (UserState::NEW | UserState::BANNED).to_string(),
            "New | Banned"
        );
        assert_eq!(UserState::from_bits(16 | 64).to_string(), "Removed | 0x40");
    }
}
