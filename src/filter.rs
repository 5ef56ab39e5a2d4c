/// A named, side-effect free predicate applied by the cleaner.
///
/// Records for which `keep` returns false are dropped.
pub trait Filter<R>: Send {
    fn name(&self) -> String;
    fn keep(&self, record: &R) -> bool;
}

/// Filter backed by a closure.
pub struct NamedFilter<F> {
    name: String,
    predicate: F,
}

impl<F> NamedFilter<F> {
    pub fn new(name: impl Into<String>, predicate: F) -> Self {
        Self {
            name: name.into(),
            predicate,
        }
    }
}

impl<R, F> Filter<R> for NamedFilter<F>
where
    F: Fn(&R) -> bool + Send,
{
    fn name(&self) -> String {
        self.name.clone()
    }

    fn keep(&self, record: &R) -> bool {
        (self.predicate)(record)
    }
}
