//! Three-valued truth domain with Kleene combinators.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Not;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Trilean {
    #[default]
    Undecided,
    True,
    False,
}

impl Trilean {
    pub fn and(self, other: Trilean) -> Trilean {
        match (self, other) {
            (Trilean::False, _) | (_, Trilean::False) => Trilean::False,
            (Trilean::True, Trilean::True) => Trilean::True,
            _ => Trilean::Undecided,
        }
    }

    pub fn or(self, other: Trilean) -> Trilean {
        match (self, other) {
            (Trilean::True, _) | (_, Trilean::True) => Trilean::True,
            (Trilean::False, Trilean::False) => Trilean::False,
            _ => Trilean::Undecided,
        }
    }

    /// Variadic AND. An empty sequence is TRUE.
    pub fn all<I: IntoIterator<Item = Trilean>>(values: I) -> Trilean {
        values.into_iter().fold(Trilean::True, Trilean::and)
    }

    /// Variadic OR. An empty sequence is also TRUE (vacuous truth).
    pub fn any<I: IntoIterator<Item = Trilean>>(values: I) -> Trilean {
        let mut iter = values.into_iter();
        match iter.next() {
            None => Trilean::True,
            Some(first) => iter.fold(first, Trilean::or),
        }
    }

    pub fn is_decided(self) -> bool {
        self != Trilean::Undecided
    }

    /// Collapses UNDECIDED to FALSE.
    pub fn or_false(self) -> Trilean {
        match self {
            Trilean::Undecided => Trilean::False,
            decided => decided,
        }
    }
}

impl Not for Trilean {
    type Output = Trilean;

    fn not(self) -> Trilean {
        match self {
            Trilean::Undecided => Trilean::Undecided,
            Trilean::True => Trilean::False,
            Trilean::False => Trilean::True,
        }
    }
}

impl From<bool> for Trilean {
    fn from(value: bool) -> Self {
        if value { Trilean::True } else { Trilean::False }
    }
}

impl fmt::Display for Trilean {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Trilean::Undecided => "UNDECIDED",
            Trilean::True => "TRUE",
            Trilean::False => "FALSE",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const ALL: [Trilean; 3] = [Trilean::Undecided, Trilean::True, Trilean::False];

    fn any_trilean() -> impl Strategy<Value = Trilean> {
        prop_oneof![
            Just(Trilean::Undecided),
            Just(Trilean::True),
            Just(Trilean::False),
        ]
    }

    #[test]
    fn and_truth_table() {
        use Trilean::*;
        assert_eq!(True.and(True), True);
        assert_eq!(True.and(False), False);
        assert_eq!(True.and(Undecided), Undecided);
        assert_eq!(False.and(Undecided), False);
        assert_eq!(Undecided.and(Undecided), Undecided);
    }

    #[test]
    fn or_truth_table() {
        use Trilean::*;
        assert_eq!(False.or(False), False);
        assert_eq!(True.or(False), True);
        assert_eq!(False.or(Undecided), Undecided);
        assert_eq!(True.or(Undecided), True);
        assert_eq!(Undecided.or(Undecided), Undecided);
    }

    #[test]
    fn not_values() {
        assert_eq!(!Trilean::Undecided, Trilean::Undecided);
        assert_eq!(!Trilean::True, Trilean::False);
        assert_eq!(!Trilean::False, Trilean::True);
    }

    #[test]
    fn empty_combinators_are_true() {
        assert_eq!(Trilean::all(Vec::new()), Trilean::True);
        assert_eq!(Trilean::any(Vec::new()), Trilean::True);
    }

    #[test]
    fn variadic_matches_pairwise_fold() {
        for a in ALL {
            for b in ALL {
                for c in ALL {
                    assert_eq!(Trilean::all([a, b, c]), a.and(b).and(c));
                    assert_eq!(Trilean::any([a, b, c]), a.or(b).or(c));
                }
            }
        }
    }

    #[test]
    fn or_false_collapses_only_undecided() {
        assert_eq!(Trilean::Undecided.or_false(), Trilean::False);
        assert_eq!(Trilean::True.or_false(), Trilean::True);
        assert_eq!(Trilean::False.or_false(), Trilean::False);
    }

    #[test]
    fn serializes_screaming_case() {
        let json = serde_json::to_string(&Trilean::Undecided).unwrap();
        assert_eq!(json, "\"UNDECIDED\"");
    }

    proptest! {
        #[test]
        fn and_is_commutative(a in any_trilean(), b in any_trilean()) {
            prop_assert_eq!(a.and(b), b.and(a));
        }

        #[test]
        fn or_is_commutative(a in any_trilean(), b in any_trilean()) {
            prop_assert_eq!(a.or(b), b.or(a));
        }

        #[test]
        fn double_negation(a in any_trilean()) {
            prop_assert_eq!(!!a, a);
        }

        #[test]
        fn de_morgan(a in any_trilean(), b in any_trilean()) {
            prop_assert_eq!(!(a.and(b)), (!a).or(!b));
        }
    }
}
