//! Query-side access to a view.

/// A denormalized view that can be queried without touching the event store.
pub trait ReadModel: Send + Sync {
    fn name(&self) -> &'static str;

    /// Number of rows; 0 while a writer holds the view.
    fn count(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.count() == 0
    }
}
