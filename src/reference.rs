//! Reference designator bookkeeping.

use std::collections::{BTreeMap, HashMap};

/// Tracks which reference designators are in use and hands out the next free number per
/// prefix. Units of one multi-unit part share a designator, so uses are counted.
#[derive(Debug, Clone, Default)]
pub struct ReferenceAllocator {
    /// prefix -> number -> use count
    numbers: HashMap<String, BTreeMap<u32, usize>>,
    /// every normalized designator -> use count
    used: HashMap<String, usize>,
}

/// Split `R12` into `("R", Some(12))`. The prefix runs up to the first digit; `#` is part of
/// it (`#PWR01`). Suffixes that are not a plain number (`R?`, `R1A`) yield `None`.
pub fn split_reference(reference: &str) -> (&str, Option<u32>) {
    let split = reference
        .find(|c: char| c.is_ascii_digit())
        .unwrap_or(reference.len());
    let (prefix, suffix) = reference.split_at(split);
    let prefix = prefix.trim_end_matches('?');
    let number = if !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()) {
        suffix.parse().ok()
    } else {
        None
    };
    (prefix, number)
}

fn normalize(reference: &str) -> String {
    reference.trim().to_uppercase()
}

impl ReferenceAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, reference: &str) {
        let reference = normalize(reference);
        if reference.is_empty() {
            return;
        }
        if let (prefix, Some(number)) = split_reference(&reference) {
            *self
                .numbers
                .entry(prefix.to_owned())
                .or_default()
                .entry(number)
                .or_default() += 1;
        }
        *self.used.entry(reference).or_default() += 1;
    }

    /// Drop one use of `reference`; the number becomes free again with its last use.
    pub fn release(&mut self, reference: &str) {
        let reference = normalize(reference);
        match self.used.get_mut(&reference) {
            Some(count) if *count > 1 => *count -= 1,
            Some(_) => {
                self.used.remove(&reference);
            }
            None => return,
        }
        if let (prefix, Some(number)) = split_reference(&reference) {
            if let Some(numbers) = self.numbers.get_mut(prefix) {
                match numbers.get_mut(&number) {
                    Some(count) if *count > 1 => *count -= 1,
                    Some(_) => {
                        numbers.remove(&number);
                    }
                    None => {}
                }
                if numbers.is_empty() {
                    self.numbers.remove(prefix);
                }
            }
        }
    }

    pub fn is_used(&self, reference: &str) -> bool {
        self.used.contains_key(&normalize(reference))
    }

    /// How many components carry `reference`.
    pub fn count(&self, reference: &str) -> usize {
        self.used.get(&normalize(reference)).copied().unwrap_or(0)
    }

    /// The designator with the smallest unused positive number for `prefix`.
    pub fn next(&self, prefix: &str) -> String {
        let prefix = normalize(prefix);
        let prefix = prefix.trim_end_matches('?');
        let mut candidate = 1;
        if let Some(numbers) = self.numbers.get(prefix) {
            // keys are sorted, so the first gap is the answer
            for &number in numbers.keys() {
                if number > candidate {
                    break;
                }
                if number == candidate {
                    candidate += 1;
                }
            }
        }
        format!("{prefix}{candidate}")
    }

    pub fn len(&self) -> usize {
        self.used.len()
    }

    pub fn is_empty(&self) -> bool {
        self.used.is_empty()
    }
}

impl<'a> FromIterator<&'a str> for ReferenceAllocator {
    fn from_iter<T: IntoIterator<Item = &'a str>>(iter: T) -> Self {
        let mut allocator = ReferenceAllocator::new();
        for reference in iter {
            allocator.insert(reference);
        }
        allocator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;

    #[rstest]
    #[case("R12", ("R", Some(12)))]
    #[case("#PWR01", ("#PWR", Some(1)))]
    #[case("R?", ("R", None))]
    #[case("R1A", ("R", None))]
    #[case("TP", ("TP", None))]
    #[case("U", ("U", None))]
    fn splits_references(#[case] reference: &str, #[case] expected: (&str, Option<u32>)) {
        assert_eq!(split_reference(reference), expected);
    }

    #[test]
    fn next_fills_the_first_gap() {
        let allocator: ReferenceAllocator = ["R1", "R2", "R4", "C1"].into_iter().collect();
        assert_eq!(allocator.next("R"), "R3");
        assert_eq!(allocator.next("C"), "C2");
        assert_eq!(allocator.next("U"), "U1");
        assert_eq!(allocator.next("r"), "R3");
    }

    #[test]
    fn non_numeric_suffixes_only_count_for_uniqueness() {
        let allocator: ReferenceAllocator = ["R1A", "R?"].into_iter().collect();
        assert!(allocator.is_used("r1a"));
        assert!(allocator.is_used("R?"));
        assert_eq!(allocator.next("R"), "R1");
    }

    #[test]
    fn shared_units_release_on_last_use() {
        let mut allocator: ReferenceAllocator = ["U1", "U1"].into_iter().collect();
        assert_eq!(allocator.count("U1"), 2);
        allocator.release("U1");
        assert!(allocator.is_used("U1"));
        assert_eq!(allocator.next("U"), "U2");
        allocator.release("U1");
        assert!(!allocator.is_used("U1"));
        assert_eq!(allocator.next("U"), "U1");
        assert!(allocator.is_empty());
    }

    #[test]
    fn next_is_always_free() {
        let mut allocator = ReferenceAllocator::new();
        for _ in 0..50 {
            let next = allocator.next("C");
            assert!(!allocator.is_used(&next));
            allocator.insert(&next);
        }
        assert_eq!(allocator.next("C"), "C51");
    }
}
