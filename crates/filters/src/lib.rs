//! Include/exclude/prune rule matching for the scanner.
//!
//! Rules are evaluated in the order they were given; the last rule that
//! matches a candidate wins. A wildcard can be scoped to just the final
//! path component (`--exclude`) or to the whole relative path
//! (`--exclude-path`).

#![deny(unsafe_code)]
#![deny(missing_docs)]

use globset::{Glob, GlobMatcher};
use thiserror::Error;

/// Errors building a [`Rule`] from a wildcard pattern.
#[derive(Debug, Error)]
pub enum RuleError {
    /// The wildcard pattern was not valid glob syntax.
    #[error("invalid wildcard pattern {pattern:?}: {source}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// Underlying glob-compilation error.
        #[source]
        source: globset::Error,
    },
}

/// What part of a candidate path a rule's wildcard is matched against.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scope {
    /// Match only the last path component (the file or directory name).
    FileName,
    /// Match the full relative path from the scan root.
    FullPath,
}

/// What happens to an entry when a rule matches it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    /// Skip the entry. If it is a directory, still recurse into it but
    /// record its own size as zero, so descendants remain visible without
    /// double-counting the directory's own on-disk footprint.
    Exclude,
    /// Skip the entry entirely. If it is a directory, do not recurse.
    Prune,
    /// Emit the entry normally. Useful to carve an inclusion back out of an
    /// earlier, broader exclusion.
    Include,
}

/// A single compiled rule: a wildcard, the scope it applies to, and the
/// action to take when it matches.
pub struct Rule {
    matcher: GlobMatcher,
    scope: Scope,
    action: Action,
}

impl Rule {
    /// Compile a wildcard pattern into a rule.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::InvalidPattern`] if `pattern` is not valid glob
    /// syntax.
    pub fn new(pattern: &str, scope: Scope, action: Action) -> Result<Self, RuleError> {
        let matcher = Glob::new(pattern)
            .map_err(|source| RuleError::InvalidPattern {
                pattern: pattern.to_owned(),
                source,
            })?
            .compile_matcher();
        Ok(Self {
            matcher,
            scope,
            action,
        })
    }

    fn matches(&self, file_name: &str, full_path: &str) -> bool {
        match self.scope {
            Scope::FileName => self.matcher.is_match(file_name),
            Scope::FullPath => self.matcher.is_match(full_path),
        }
    }
}

/// An ordered list of rules, evaluated last-match-wins.
#[derive(Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    /// An empty rule set: every entry is included.
    #[must_use]
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Append a rule. Rules are evaluated in the order they were appended.
    pub fn push(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    /// Evaluate the rule set against a candidate, returning the action of
    /// the last matching rule, or [`Action::Include`] if none match.
    #[must_use]
    pub fn evaluate(&self, file_name: &str, full_path: &str) -> Action {
        let mut result = Action::Include;
        for rule in &self.rules {
            if rule.matches(file_name, full_path) {
                result = rule.action;
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_ruleset_includes_everything() {
        let rules = RuleSet::new();
        assert_eq!(rules.evaluate("anything", "a/b/anything"), Action::Include);
    }

    #[test]
    fn exclude_by_filename_scope_ignores_directory_prefix() {
        let mut rules = RuleSet::new();
        rules.push(Rule::new("*.tmp", Scope::FileName, Action::Exclude).unwrap());
        assert_eq!(rules.evaluate("x.tmp", "a/b/x.tmp"), Action::Exclude);
        assert_eq!(rules.evaluate("x.tmp.bak", "a/b/x.tmp.bak"), Action::Include);
    }

    #[test]
    fn full_path_scope_matches_across_directories() {
        let mut rules = RuleSet::new();
        rules.push(Rule::new("*/tmp/*", Scope::FullPath, Action::Exclude).unwrap());
        assert_eq!(rules.evaluate("x", "a/tmp/x"), Action::Exclude);
        assert_eq!(rules.evaluate("x", "a/b/x"), Action::Include);
    }

    #[test]
    fn later_rule_overrides_earlier_rule() {
        let mut rules = RuleSet::new();
        rules.push(Rule::new("*/tmp/*", Scope::FullPath, Action::Exclude).unwrap());
        rules.push(Rule::new("*/tmp/keep", Scope::FullPath, Action::Include).unwrap());
        assert_eq!(rules.evaluate("x", "a/tmp/x"), Action::Exclude);
        assert_eq!(rules.evaluate("keep", "a/tmp/keep"), Action::Include);
    }

    #[test]
    fn prune_is_distinct_from_exclude() {
        let mut rules = RuleSet::new();
        rules.push(Rule::new("node_modules", Scope::FileName, Action::Prune).unwrap());
        assert_eq!(rules.evaluate("node_modules", "a/node_modules"), Action::Prune);
    }

    #[test]
    fn invalid_pattern_is_an_error() {
        assert!(Rule::new("[", Scope::FileName, Action::Exclude).is_err());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn action() -> impl Strategy<Value = Action> {
        prop_oneof![
            Just(Action::Exclude),
            Just(Action::Prune),
            Just(Action::Include),
        ]
    }

    proptest! {
        /// A rule set built entirely from match-everything rules always
        /// resolves to its last rule's action, or `Include` if it is empty —
        /// the last-match-wins contract, independent of how many rules
        /// preceded the last one.
        #[test]
        fn last_match_all_rule_always_wins(actions in proptest::collection::vec(action(), 0..20)) {
            let mut rules = RuleSet::new();
            for &a in &actions {
                rules.push(Rule::new("*", Scope::FileName, a).unwrap());
            }
            let expected = actions.last().copied().unwrap_or(Action::Include);
            prop_assert_eq!(rules.evaluate("anything", "a/b/anything"), expected);
        }

        /// A `FileName`-scoped literal rule matches a candidate iff its file
        /// name equals the pattern, regardless of the directory prefix on
        /// the full path.
        #[test]
        fn filename_scope_matches_only_the_exact_literal_name(
            name in "[a-zA-Z0-9_]{1,12}",
            other in "[a-zA-Z0-9_]{1,12}",
            prefix in "[a-zA-Z0-9_/]{0,12}",
        ) {
            let mut rules = RuleSet::new();
            rules.push(Rule::new(&name, Scope::FileName, Action::Exclude).unwrap());
            let full_path = format!("{prefix}{name}");
            prop_assert_eq!(rules.evaluate(&name, &full_path), Action::Exclude);
            if other != name {
                let other_full_path = format!("{prefix}{other}");
                prop_assert_eq!(rules.evaluate(&other, &other_full_path), Action::Include);
            }
        }
    }
}
