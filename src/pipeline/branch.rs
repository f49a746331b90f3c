//! Classification of branch names by their `/`-separated shape.

/// How the fallback for a branch is chosen when no branch-specific pipeline
/// exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchShape<'a> {
    /// `worktree/<tail>[/...]`: falls back to `default_<tail>.yaml`.
    Worktree { tail: &'a str },
    /// `<owner>/topic[/<tail>]`: redirected through a lookup document.
    Topic { tail: &'a str },
    /// Everything else: falls back to `default.yaml`.
    Plain,
}

impl<'a> BranchShape<'a> {
    /// Classify `branch`.
    ///
    /// A first segment of `worktree` takes precedence over a second segment
    /// of `topic`.  Branches with a single segment are always [`Plain`].
    ///
    /// [`Plain`]: BranchShape::Plain
    pub fn classify(branch: &'a str) -> Self {
        let mut segments = branch.splitn(3, '/');
        let first = segments.next();
        let second = segments.next();
        let rest = segments.next().unwrap_or("");

        match (first, second) {
            (Some("worktree"), Some(tail)) => BranchShape::Worktree { tail },
            (_, Some("topic")) => BranchShape::Topic { tail: rest },
            _ => BranchShape::Plain,
        }
    }
}
