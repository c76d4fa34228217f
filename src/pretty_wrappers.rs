/// A byte count which prints in binary units.
///
/// `{:?}` prints the raw number, `{:#?}` and `{}` round to the largest unit
/// which keeps the value at or above one (kib, mib, gib, ...).
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub struct PrettySize(pub u64);

const UNIT_NAMES: [&str; 5] = ["b", "kib", "mib", "gib", "tib"];

impl std::fmt::Debug for PrettySize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !f.alternate() {
            return f.write_fmt(format_args!("{}", self.0));
        }
        let mut unit = 0;
        let mut whole = self.0;
        while whole >= 1024 && unit < UNIT_NAMES.len() - 1 {
            whole /= 1024;
            unit += 1;
        }
        if unit == 0 {
            return f.write_fmt(format_args!("{} b", self.0));
        }
        let scaled = self.0 as f64 / 1024_f64.powi(unit as i32);
        f.write_fmt(format_args!("{:.2} {}", scaled, UNIT_NAMES[unit]))
    }
}

impl std::fmt::Display for PrettySize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("{:#?}", self))
    }
}

/// Prints a memory type mask in binary, lowest type on the right.
#[derive(Copy, Clone, Eq, PartialEq)]
pub struct PrettyBitflag(pub u32);

impl std::fmt::Debug for PrettyBitflag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("{:#b}", self.0))
    }
}

impl std::fmt::Display for PrettyBitflag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("{:?}", self))
    }
}
