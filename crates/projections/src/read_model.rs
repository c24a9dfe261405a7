//! Read model trait for query-side views.

/// A queryable view built by a projection.
pub trait ReadModel: Send + Sync {
    fn name(&self) -> &'static str;

    /// Number of records. Reports 0 while a writer holds the view.
    fn count(&self) -> usize;
}
