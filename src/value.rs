//! Numeric domain tagging for arithmetic-expression values.
//!
//! Every slot on the VM's operand stack is a plain `f64` paired with a
//! [`Domain`] tag carried in a parallel stack (see `vm.rs`). The tag decides
//! which C-style integer semantics (signed wraparound, unsigned wraparound, or
//! plain floating point) a binary operator uses.

/// Which integer/float domain a stack slot's bit pattern should be read as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    Signed,
    Unsigned,
    Float,
}

impl Domain {
    /// Join two operand domains the way streval.c's binary operators do:
    /// float beats everything, otherwise unsigned beats signed.
    pub fn join(self, other: Domain) -> Domain {
        use Domain::*;
        match (self, other) {
            (Float, _) | (_, Float) => Float,
            (Unsigned, _) | (_, Unsigned) => Unsigned,
            (Signed, Signed) => Signed,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, Domain::Float)
    }

    pub fn is_unsigned(self) -> bool {
        matches!(self, Domain::Unsigned)
    }

    /// Byte tag used to store a domain inline in the bytecode stream
    /// (`PUSHN`'s operand) or in the parallel type-tag stack (`vm.rs`).
    pub fn to_tag(self) -> u8 {
        match self {
            Domain::Signed => 0,
            Domain::Unsigned => 1,
            Domain::Float => 2,
        }
    }

    pub fn from_tag(tag: u8) -> Domain {
        match tag {
            1 => Domain::Unsigned,
            2 => Domain::Float,
            _ => Domain::Signed,
        }
    }
}

/// Re-tag a freshly loaded value the way `A_PUSHV` does: values too large for
/// `i64` but within `u64` range become unsigned; values that can't round-trip
/// through `i64` at all become float.
///
/// Mirrors the `LDBL_LLONG_MAX`/`LDBL_ULLONG_MAX` cascade in streval.c's
/// `arith_exec`, with `i64::MAX`/`u64::MAX` standing in for the long-double
/// bounds (see DESIGN.md for why `f64` stands in for `long double` here).
pub fn retag_loaded_value(num: f64, reported: Domain) -> Domain {
    if reported.is_float() {
        return Domain::Float;
    }
    if num > i64::MAX as f64 && num <= u64::MAX as f64 {
        return Domain::Unsigned;
    }
    if (num as i64) as f64 != num {
        return Domain::Float;
    }
    reported
}

/// Lossless-enough unsigned-to-float conversion, named after streval.c's
/// `U2F` macro (which exists there only to route around platforms lacking a
/// direct unsigned-long-long-to-long-double conversion). `f64` can represent
/// every `u64` bit pattern as a value, so this is a plain cast, but the named
/// wrapper keeps every call site it corresponds to in the original visible.
#[inline]
pub fn u2f(u: u64) -> f64 {
    u as f64
}

/// Reinterpret a domain-tagged `f64` as the unsigned 64-bit integer streval.c
/// would have operated on via `(Sfulong_t)`.
#[inline]
pub fn as_u64(num: f64) -> u64 {
    if num < 0.0 {
        (num as i64) as u64
    } else {
        num as u64
    }
}

/// Reinterpret a domain-tagged `f64` as the signed 64-bit integer streval.c
/// would have operated on via `(Sflong_t)`.
#[inline]
pub fn as_i64(num: f64) -> i64 {
    num as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_prefers_float_over_everything() {
        assert_eq!(Domain::Signed.join(Domain::Float), Domain::Float);
        assert_eq!(Domain::Unsigned.join(Domain::Float), Domain::Float);
    }

    #[test]
    fn join_prefers_unsigned_over_signed() {
        assert_eq!(Domain::Signed.join(Domain::Unsigned), Domain::Unsigned);
        assert_eq!(Domain::Unsigned.join(Domain::Signed), Domain::Unsigned);
    }

    #[test]
    fn retag_promotes_out_of_range_signed_to_unsigned() {
        let num = (i64::MAX as f64) + 1024.0;
        assert_eq!(retag_loaded_value(num, Domain::Signed), Domain::Unsigned);
    }

    #[test]
    fn retag_promotes_non_integral_to_float() {
        assert_eq!(retag_loaded_value(1.5, Domain::Signed), Domain::Float);
    }

    #[test]
    fn u2f_roundtrips_max_u64() {
        assert_eq!(as_u64(u2f(u64::MAX)), u64::MAX);
    }
}
