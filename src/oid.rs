//! Object identifier type.
//!
//! An [`Oid`] is an ordered list of unsigned 32-bit arcs. Ordering is
//! lexicographic arc-by-arc, which is exactly the ordering GETNEXT walks
//! require (`1.3.6.1.2` < `1.3.6.1.2.1` < `1.3.6.1.3`).

use smallvec::SmallVec;

use crate::error::{Error, OidErrorKind, Result};

/// Maximum number of arcs accepted when parsing or decoding (RFC 2578).
pub const MAX_OID_LEN: usize = 128;

/// Object identifier.
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Oid {
    arcs: SmallVec<[u32; 16]>,
}

impl Oid {
    /// Create an OID from any iterator of arcs.
    pub fn new(arcs: impl IntoIterator<Item = u32>) -> Self {
        Self {
            arcs: arcs.into_iter().collect(),
        }
    }

    /// Create an OID from a slice of arcs.
    pub fn from_slice(arcs: &[u32]) -> Self {
        Self {
            arcs: SmallVec::from_slice(arcs),
        }
    }

    /// The empty OID.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse dotted notation (`1.3.6.1` or `.1.3.6.1`).
    pub fn parse(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let body = trimmed.strip_prefix('.').unwrap_or(trimmed);
        if body.is_empty() {
            return Err(Error::invalid_oid_with_input(OidErrorKind::Empty, s));
        }

        let mut arcs = SmallVec::new();
        for part in body.split('.') {
            let arc = part
                .parse::<u32>()
                .map_err(|_| Error::invalid_oid_with_input(OidErrorKind::InvalidArc, s))?;
            arcs.push(arc);
        }

        if arcs.len() > MAX_OID_LEN {
            return Err(Error::invalid_oid_with_input(
                OidErrorKind::TooManyArcs {
                    count: arcs.len(),
                    max: MAX_OID_LEN,
                },
                s,
            ));
        }

        Ok(Self { arcs })
    }

    /// The arcs of this OID.
    pub fn arcs(&self) -> &[u32] {
        &self.arcs
    }

    /// Number of arcs.
    pub fn len(&self) -> usize {
        self.arcs.len()
    }

    /// True for the empty OID.
    pub fn is_empty(&self) -> bool {
        self.arcs.is_empty()
    }

    /// True if `prefix` is a (non-strict) prefix of this OID.
    pub fn starts_with(&self, prefix: &Oid) -> bool {
        self.arcs.starts_with(&prefix.arcs)
    }

    /// The arcs following `prefix`, if this OID lives under it.
    pub fn suffix_after(&self, prefix: &Oid) -> Option<&[u32]> {
        if self.starts_with(prefix) {
            Some(&self.arcs[prefix.len()..])
        } else {
            None
        }
    }

    /// This OID with its last arc removed.
    pub fn parent(&self) -> Option<Oid> {
        if self.arcs.is_empty() {
            return None;
        }
        Some(Self::from_slice(&self.arcs[..self.arcs.len() - 1]))
    }

    /// This OID with one more arc appended.
    pub fn child(&self, arc: u32) -> Oid {
        let mut arcs = self.arcs.clone();
        arcs.push(arc);
        Self { arcs }
    }

    /// This OID with several arcs appended.
    pub fn extend(&self, suffix: &[u32]) -> Oid {
        let mut arcs = self.arcs.clone();
        arcs.extend_from_slice(suffix);
        Self { arcs }
    }

    /// Encode the content octets of this OID (X.690 8.19).
    ///
    /// OIDs shorter than two arcs are encoded the way net-snmp does: the
    /// missing arcs are treated as zero.
    pub fn to_ber_smallvec(&self) -> SmallVec<[u8; 64]> {
        let mut out = SmallVec::new();
        let first = self.arcs.first().copied().unwrap_or(0);
        let second = self.arcs.get(1).copied().unwrap_or(0);
        push_subidentifier(&mut out, first.saturating_mul(40).saturating_add(second));
        for &arc in self.arcs.iter().skip(2) {
            push_subidentifier(&mut out, arc);
        }
        out
    }

    /// Total encoded length including tag and length octets.
    pub fn ber_encoded_len(&self) -> usize {
        let content = self.to_ber_smallvec().len();
        1 + crate::ber::length_encoded_len(content) + content
    }

    /// Decode the content octets of an OBJECT IDENTIFIER.
    pub fn from_ber(data: &[u8]) -> Result<Self> {
        if data.is_empty() {
            return Ok(Self::empty());
        }

        let mut arcs: SmallVec<[u32; 16]> = SmallVec::new();
        let mut value: u64 = 0;
        let mut first = true;

        for (i, &byte) in data.iter().enumerate() {
            value = (value << 7) | u64::from(byte & 0x7F);
            if value > u64::from(u32::MAX) + 80 {
                return Err(Error::invalid_oid(OidErrorKind::SubidentifierOverflow));
            }
            if byte & 0x80 != 0 {
                if i == data.len() - 1 {
                    return Err(Error::invalid_oid(OidErrorKind::SubidentifierOverflow));
                }
                continue;
            }

            if first {
                let (a, b) = match value {
                    v if v < 40 => (0, v),
                    v if v < 80 => (1, v - 40),
                    v => (2, v - 80),
                };
                arcs.push(a as u32);
                arcs.push(u32::try_from(b).map_err(|_| {
                    Error::invalid_oid(OidErrorKind::SubidentifierOverflow)
                })?);
                first = false;
            } else {
                arcs.push(u32::try_from(value).map_err(|_| {
                    Error::invalid_oid(OidErrorKind::SubidentifierOverflow)
                })?);
            }
            value = 0;

            if arcs.len() > MAX_OID_LEN {
                return Err(Error::invalid_oid(OidErrorKind::TooManyArcs {
                    count: arcs.len(),
                    max: MAX_OID_LEN,
                }));
            }
        }

        Ok(Self { arcs })
    }
}

fn push_subidentifier(out: &mut SmallVec<[u8; 64]>, value: u32) {
    let mut tmp = [0u8; 5];
    let mut n = 0;
    let mut v = value;
    loop {
        tmp[n] = (v & 0x7F) as u8;
        n += 1;
        v >>= 7;
        if v == 0 {
            break;
        }
    }
    for i in (0..n).rev() {
        let continuation = if i == 0 { 0 } else { 0x80 };
        out.push(tmp[i] | continuation);
    }
}

impl std::fmt::Display for Oid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for arc in &self.arcs {
            if !first {
                f.write_str(".")?;
            }
            write!(f, "{}", arc)?;
            first = false;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Oid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Oid({})", self)
    }
}

impl std::str::FromStr for Oid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl From<&[u32]> for Oid {
    fn from(arcs: &[u32]) -> Self {
        Self::from_slice(arcs)
    }
}

impl From<Vec<u32>> for Oid {
    fn from(arcs: Vec<u32>) -> Self {
        Self::new(arcs)
    }
}

/// Build an [`Oid`] from literal arcs.
///
/// ```rust
/// use snmp_gateway::oid;
///
/// let sys_descr = oid!(1, 3, 6, 1, 2, 1, 1, 1, 0);
/// assert_eq!(sys_descr.to_string(), "1.3.6.1.2.1.1.1.0");
/// ```
#[macro_export]
macro_rules! oid {
    ($($arc:expr),* $(,)?) => {
        $crate::oid::Oid::from_slice(&[$($arc as u32),*])
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let oid = Oid::parse("1.3.6.1.4.1.99.1").unwrap();
        assert_eq!(oid.arcs(), &[1, 3, 6, 1, 4, 1, 99, 1]);
        assert_eq!(oid.to_string(), "1.3.6.1.4.1.99.1");

        let leading_dot = Oid::parse(".1.3.6").unwrap();
        assert_eq!(leading_dot, oid!(1, 3, 6));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Oid::parse("").is_err());
        assert!(Oid::parse("1.3.x").is_err());
        assert!(Oid::parse("1..3").is_err());
    }

    #[test]
    fn test_ordering_is_lexicographic() {
        assert!(oid!(1, 3, 6, 1, 2) < oid!(1, 3, 6, 1, 2, 1));
        assert!(oid!(1, 3, 6, 1, 2, 1) < oid!(1, 3, 6, 1, 3));
        assert!(oid!(1, 3, 6, 1, 10) > oid!(1, 3, 6, 1, 9, 9));
    }

    #[test]
    fn test_prefix_helpers() {
        let table = oid!(1, 3, 6, 1, 4, 1, 99, 2);
        let cell = table.extend(&[3, 7]);
        assert!(cell.starts_with(&table));
        assert_eq!(cell.suffix_after(&table), Some(&[3u32, 7][..]));
        assert_eq!(cell.parent().unwrap(), table.child(3));
        assert_eq!(oid!(1, 3, 6).suffix_after(&table), None);
    }

    #[test]
    fn test_ber_content_roundtrip() {
        let oid = oid!(1, 3, 6, 1, 4, 1, 2021, 4294967295);
        let encoded = oid.to_ber_smallvec();
        assert_eq!(&encoded[..2], &[0x2B, 0x06]);
        assert_eq!(Oid::from_ber(&encoded).unwrap(), oid);
    }

    #[test]
    fn test_ber_rejects_truncated_subidentifier() {
        assert!(Oid::from_ber(&[0x2B, 0x86]).is_err());
    }
}
