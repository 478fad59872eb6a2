/// What the loader does with a record whose detail insert failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteDecision {
    /// A value did not fit its column. The record is skipped.
    SkipOversized,
    /// The row already exists. The record is skipped.
    SkipDuplicate,
    /// Anything else ends the run and rolls it back.
    Abort,
}

impl WriteDecision {
    pub fn is_skip(self) -> bool {
        self != WriteDecision::Abort
    }
}

/// Maps a backend's write failure onto a `WriteDecision`. Each storage
/// backend brings its own implementation for its error encoding.
pub trait FailureClassifier<F: ?Sized> {
    fn classify(&self, failure: &F) -> WriteDecision;
}

impl<F: ?Sized, T> FailureClassifier<F> for T
where
    T: Fn(&F) -> WriteDecision,
{
    fn classify(&self, failure: &F) -> WriteDecision {
        self(failure)
    }
}
