// Dotted version comparison
//
// Versions are compared as four numeric components. Shorter inputs are padded
// with zeros, and non-numeric or missing components count as zero, so the
// comparison never fails.

use std::cmp::Ordering;

/// Number of components taken into account when comparing.
pub const COMPONENTS: usize = 4;

/// Compare two dot-separated version identifiers.
///
/// `compare("1.2.3", "1.2")` is the same as `compare("1.2.3", "1.2.0")`; components past
/// the fourth are ignored.
pub fn compare(a: &str, b: &str) -> Ordering {
    components(a).cmp(&components(b))
}

fn components(version: &str) -> [u64; COMPONENTS] {
    let mut parsed = [0u64; COMPONENTS];
    for (slot, part) in parsed.iter_mut().zip(version.trim().split('.')) {
        *slot = part.parse().unwrap_or(0);
    }
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLES: &[&str] = &[
        "0", "1", "1.0", "1.2", "1.2.0", "1.2.3", "1.2.10", "1.10.0", "2.0.0", "2.0.0.1",
        "1.x.3", "", "10.0.0",
    ];

    #[test]
    fn test_basic_ordering() {
        assert_eq!(compare("1.2.3", "1.2.4"), Ordering::Less);
        assert_eq!(compare("1.3.0", "1.2.9"), Ordering::Greater);
        assert_eq!(compare("2.0.0", "2.0.0"), Ordering::Equal);
        // Numeric, not lexical
        assert_eq!(compare("1.10.0", "1.9.0"), Ordering::Greater);
    }

    #[test]
    fn test_padding_equivalence() {
        assert_eq!(compare("1.2.3", "1.2"), compare("1.2.3", "1.2.0"));
        assert_eq!(compare("1.2", "1.2.0.0"), Ordering::Equal);
        assert_eq!(compare("1.2.0.1", "1.2"), Ordering::Greater);
    }

    #[test]
    fn test_non_numeric_components_are_zero() {
        assert_eq!(compare("1.x.3", "1.0.3"), Ordering::Equal);
        assert_eq!(compare("", "0.0.0.0"), Ordering::Equal);
        assert_eq!(compare("1..2", "1.0.2"), Ordering::Equal);
    }

    #[test]
    fn test_only_four_components_count() {
        assert_eq!(compare("1.2.3.4.5", "1.2.3.4.9"), Ordering::Equal);
    }

    #[test]
    fn test_antisymmetry_and_reflexivity() {
        for a in SAMPLES {
            assert_eq!(compare(a, a), Ordering::Equal, "compare({a:?}, {a:?})");
            for b in SAMPLES {
                assert_eq!(
                    compare(a, b),
                    compare(b, a).reverse(),
                    "compare({a:?}, {b:?}) is not antisymmetric"
                );
            }
        }
    }
}
