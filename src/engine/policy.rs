use crate::domain::Stage;

/// Which stage changes the transition service accepts, independent of the
/// commission guard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransitionPolicy {
    /// Any stage may follow any other, including skips and regressions.
    #[default]
    Permissive,
    /// Stages may be skipped forward but never moved backwards.
    ForwardOnly,
}

impl TransitionPolicy {
    /// Name as written in `STAGE_POLICY`.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionPolicy::Permissive => "permissive",
            TransitionPolicy::ForwardOnly => "forward_only",
        }
    }

    pub fn allows(&self, from: Stage, to: Stage) -> bool {
        match self {
            TransitionPolicy::Permissive => true,
            TransitionPolicy::ForwardOnly => to >= from,
        }
    }
}
