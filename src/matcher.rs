use indexmap::IndexMap;

use crate::error::MarkletError;

/// Where a component (or an id tag no component claimed) stands after the
/// markup walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchState {
    Unresolved,
    /// A component with the tag's id was found.
    Matched,
    /// No component had the id; the named resolver claimed the tag.
    AutoResolved { resolver: &'static str },
    Failed(MarkletError),
}

impl MatchState {
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Matched | Self::AutoResolved { .. })
    }

    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Unresolved)
    }
}

/// The outcome of matching a component tree against its markup, keyed by
/// component path (e.g. `form:group:check1`) in the order paths were met.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchReport {
    records: IndexMap<String, MatchState>,
}

impl MatchReport {
    pub fn records(&self) -> impl Iterator<Item = (&str, &MatchState)> {
        self.records.iter().map(|(path, state)| (path.as_str(), state))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn state(&self, path: &str) -> Option<&MatchState> {
        self.records.get(path)
    }

    pub fn errors(&self) -> impl Iterator<Item = &MarkletError> {
        self.records.values().filter_map(|state| match state {
            MatchState::Failed(error) => Some(error),
            MatchState::Unresolved | MatchState::Matched | MatchState::AutoResolved { .. } => None,
        })
    }

    pub fn first_error(&self) -> Option<&MarkletError> {
        self.errors().next()
    }

    pub fn is_ok(&self) -> bool {
        self.records.values().all(MatchState::is_success)
    }

    /// Moves `path` to `state`. A component that already failed stays failed.
    pub(crate) fn set(&mut self, path: &str, state: MatchState) {
        match self.records.get_mut(path) {
            Some(MatchState::Failed(_)) => {}
            Some(current) => *current = state,
            None => {
                self.records.insert(path.to_string(), state);
            }
        }
    }
}

/// Edit distance between two ids.
pub(crate) fn levenshtein(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        if let Some(first) = current.first_mut() {
            *first = i + 1;
        }
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous.get(j).copied().unwrap_or_default() + usize::from(ca != *cb);
            let deletion = previous.get(j + 1).copied().unwrap_or_default() + 1;
            let insertion = current.get(j).copied().unwrap_or_default() + 1;
            if let Some(cell) = current.get_mut(j + 1) {
                *cell = substitution.min(deletion).min(insertion);
            }
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous.last().copied().unwrap_or_default()
}

/// Candidates within edit distance 2 of `id`, in the order given.
pub(crate) fn similar_names<'a>(id: &str, candidates: impl Iterator<Item = &'a str>) -> Vec<String> {
    candidates
        .filter(|candidate| *candidate != id && levenshtein(id, candidate) < 3)
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[ntest::timeout(100)]
    fn test_levenshtein() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("label", "lable"), 2);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("same", "same"), 0);
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_similar_names() {
        let names = ["label", "table", "form", "lable"];
        assert_eq!(
            similar_names("lable", names.into_iter()),
            vec!["label".to_string(), "table".to_string()]
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_failed_state_is_sticky() {
        let mut report = MatchReport::default();
        report.set("a", MatchState::Unresolved);
        report.set("a", MatchState::Matched);
        assert_eq!(report.state("a"), Some(&MatchState::Matched));

        let error = MarkletError::ResourceNotFound {
            key: "x".to_string(),
        };
        report.set("b", MatchState::Failed(error.clone()));
        report.set("b", MatchState::Matched);
        assert_eq!(report.state("b"), Some(&MatchState::Failed(error.clone())));
        assert_eq!(report.first_error(), Some(&error));
        assert!(!report.is_ok());
        assert!(!MatchState::Unresolved.is_terminal());
    }

    #[test]
    #[ntest::timeout(1000)]
    fn test_large_report_keeps_insertion_order() {
        let mut report = MatchReport::default();
        for n in 0..20_000 {
            report.set(&format!("rows:{n}"), MatchState::Matched);
        }
        for n in 0..20_000 {
            report.set(&format!("rows:{n}"), MatchState::AutoResolved { resolver: "x" });
        }
        assert_eq!(report.len(), 20_000);
        assert_eq!(report.records().next().map(|(path, _)| path), Some("rows:0"));
        assert_eq!(report.records().last().map(|(path, _)| path), Some("rows:19999"));
        assert!(report.is_ok());
    }
}
