//! Ordered substring rule tables
//!
//! Device serials and session names carry their category as free text
//! (`20USEM4...` is a split module, `41_TC_WARM_TEST_4` is a warm section).
//! Every such decision goes through a [`PatternTable`]: an ordered list of
//! `(pattern, category)` rules where the first rule whose pattern is a
//! substring of the name wins. A name matching no rule yields `None`, which
//! callers turn into a reported error or warning.

/// One rule of a [`PatternTable`]
#[derive(Debug, Clone, PartialEq)]
pub struct PatternRule<T> {
    /// Substring that must appear in the name
    pub pattern: String,
    /// Category assigned when the pattern matches
    pub category: T,
}

/// Ordered list of substring rules, first match wins
#[derive(Debug, Clone, PartialEq)]
pub struct PatternTable<T> {
    rules: Vec<PatternRule<T>>,
}

impl<T> Default for PatternTable<T> {
    fn default() -> Self {
        PatternTable { rules: Vec::new() }
    }
}

impl<T> PatternTable<T> {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule; rules are evaluated in insertion order
    pub fn rule(mut self, pattern: impl Into<String>, category: T) -> Self {
        self.rules.push(PatternRule {
            pattern: pattern.into(),
            category,
        });
        self
    }

    /// Append one rule per pattern, all mapping to the same category
    pub fn rules<I, P>(mut self, patterns: I, category: T) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
        T: Clone,
    {
        for pattern in patterns {
            self.rules.push(PatternRule {
                pattern: pattern.into(),
                category: category.clone(),
            });
        }
        self
    }

    /// First rule whose pattern occurs in `name`
    pub fn matching_rule(&self, name: &str) -> Option<&PatternRule<T>> {
        self.rules.iter().find(|r| name.contains(r.pattern.as_str()))
    }

    /// Category of the first matching rule, `None` when no rule matches
    pub fn classify(&self, name: &str) -> Option<&T> {
        self.matching_rule(name).map(|r| &r.category)
    }

    /// Whether any rule matches
    pub fn matches(&self, name: &str) -> bool {
        self.matching_rule(name).is_some()
    }

    /// Number of rules
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the table has no rules
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rules in evaluation order
    pub fn iter(&self) -> impl Iterator<Item = &PatternRule<T>> {
        self.rules.iter()
    }
}
