//! Evaluation order of rules within a block
//!
//! Authentication rules run first because they attach the identity later
//! rules depend on; authorization rules come next so they never see an
//! unauthenticated caller; request inspection rules run last. Rules of the
//! same class keep their declaration order.

use std::cmp::Ordering;

use super::Rule;

/// Total order over rules by class
#[derive(Debug, Clone, Copy, Default)]
pub struct RulesOrdering;

impl RulesOrdering {
    pub fn compare(&self, a: &Rule, b: &Rule) -> Ordering {
        a.class().rank().cmp(&b.class().rank())
    }

    /// Stable in-place sort
    pub fn sort(&self, rules: &mut [Rule]) {
        rules.sort_by(|a, b| self.compare(a, b));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::testing::ScriptedRule;
    use crate::rules::{RuleClass, RuleOutcome};
    use proptest::prelude::*;

    fn rule(key: &str, class: RuleClass) -> Rule {
        Rule::sync(ScriptedRule::new(key, class, RuleOutcome::Match))
    }

    fn keys(rules: &[Rule]) -> Vec<&str> {
        rules.iter().map(Rule::key).collect()
    }

    #[test]
    fn test_authentication_then_authorization_then_inspection() {
        let mut rules = vec![
            rule("indices", RuleClass::Inspection),
            rule("ldap_authorization", RuleClass::Authorization),
            rule("methods", RuleClass::Inspection),
            rule("auth_key", RuleClass::Authentication),
        ];

        RulesOrdering.sort(&mut rules);

        assert_eq!(
            keys(&rules),
            vec!["auth_key", "ldap_authorization", "indices", "methods"]
        );
    }

    #[test]
    fn test_ties_keep_declaration_order() {
        let mut rules = vec![
            rule("b", RuleClass::Inspection),
            rule("a", RuleClass::Inspection),
            rule("c", RuleClass::Inspection),
        ];

        RulesOrdering.sort(&mut rules);

        assert_eq!(keys(&rules), vec!["b", "a", "c"]);
    }

    fn class_strategy() -> impl Strategy<Value = RuleClass> {
        prop_oneof![
            Just(RuleClass::Authentication),
            Just(RuleClass::Authorization),
            Just(RuleClass::Inspection),
        ]
    }

    proptest! {
        #[test]
        fn test_sorted_ranks_never_decrease(classes in prop::collection::vec(class_strategy(), 0..20)) {
            let mut rules: Vec<Rule> = classes
                .iter()
                .enumerate()
                .map(|(i, c)| rule(&format!("r{}", i), *c))
                .collect();

            RulesOrdering.sort(&mut rules);

            for pair in rules.windows(2) {
                prop_assert!(pair[0].class().rank() <= pair[1].class().rank());
                // stability: same class keeps original index order
                if pair[0].class() == pair[1].class() {
                    let a: usize = pair[0].key()[1..].parse().unwrap();
                    let b: usize = pair[1].key()[1..].parse().unwrap();
                    prop_assert!(a < b);
                }
            }
        }
    }
}
