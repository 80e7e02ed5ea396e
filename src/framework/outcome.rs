/// The result of work guarded by a [`Ticket`](super::Ticket).
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    /// The work belongs to the newest request and its value was applied.
    Current(T),
    /// A newer request was issued while the work was in flight, so its value was dropped.
    Stale,
}

impl<T> Outcome<T> {
    /// Returns `true` if a newer request superseded this one.
    pub const fn is_stale(&self) -> bool {
        matches!(self, Self::Stale)
    }
}

impl<T, E> Outcome<Result<T, E>> {
    /// Moves a failure of current work out of the [`Outcome`]. Stale work never fails.
    ///
    /// # Errors
    ///
    /// Returns the error of [`Outcome::Current`] work.
    pub fn transpose(self) -> Result<Outcome<T>, E> {
        match self {
            Self::Current(result) => result.map(Outcome::Current),
            Self::Stale => Ok(Outcome::Stale),
        }
    }
}
