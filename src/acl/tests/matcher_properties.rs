//! Property tests for wildcard matching

use proptest::prelude::*;
use warden_acl::MatcherWithWildcards;

fn name() -> impl Strategy<Value = String> {
    "[a-z0-9._-]{0,12}"
}

proptest! {
    #[test]
    fn literal_matches_only_itself(pattern in name(), candidate in name()) {
        let matcher = MatcherWithWildcards::new([pattern.clone()]);
        prop_assert_eq!(matcher.matches(&candidate), candidate == pattern);
    }

    #[test]
    fn lone_star_matches_everything(candidate in "\\PC{0,16}") {
        prop_assert!(MatcherWithWildcards::new(["*"]).matches(&candidate));
    }

    #[test]
    fn prefix_pattern(prefix in name(), suffix in name(), other in name()) {
        let matcher = MatcherWithWildcards::new([format!("{}*", prefix)]);
        let candidate = format!("{}{}", prefix, suffix);
        prop_assert!(matcher.matches(&candidate));
        prop_assert_eq!(matcher.matches(&other), other.starts_with(&prefix));
    }

    #[test]
    fn infix_pattern(infix in name(), candidate in name()) {
        let matcher = MatcherWithWildcards::new([format!("*{}*", infix)]);
        prop_assert_eq!(matcher.matches(&candidate), candidate.contains(&infix));
    }

    #[test]
    fn star_replacing_a_substring_still_matches(
        candidate in name(),
        a in 0usize..=12,
        b in 0usize..=12,
    ) {
        let (start, end) = (a.min(b).min(candidate.len()), a.max(b).min(candidate.len()));
        let pattern = format!("{}*{}", &candidate[..start], &candidate[end..]);
        prop_assert!(MatcherWithWildcards::new([pattern]).matches(&candidate));
    }

    #[test]
    fn consecutive_stars_behave_like_one(prefix in name(), suffix in name(), candidate in name()) {
        let single = MatcherWithWildcards::new([format!("{}*{}", prefix, suffix)]);
        let repeated = MatcherWithWildcards::new([format!("{}***{}", prefix, suffix)]);
        prop_assert_eq!(single.matches(&candidate), repeated.matches(&candidate));
    }

    #[test]
    fn filter_keeps_exactly_the_matches(
        patterns in prop::collection::vec("[a-c*]{0,4}", 0..4),
        candidates in prop::collection::hash_set("[a-c]{0,5}", 0..8),
    ) {
        let matcher = MatcherWithWildcards::new(patterns);
        let kept = matcher.filter(candidates.iter().cloned());

        for candidate in &candidates {
            prop_assert_eq!(kept.contains(candidate), matcher.matches(candidate));
        }
    }
}
