/// Resolves, from out-of-order probe completions, how far into the
/// configured repository order the current page is final.
///
/// The resolved prefix is `[0, first_undone)`: every repository in it has
/// completed its probe. The walk also stops right after the `limit`-th
/// match, which makes that index the page cutoff; later matches wait for
/// the next page.
#[derive(Debug, Clone)]
pub struct OrderTracker {
    /// `None` = probe still outstanding, `Some(found)` = completed
    resolved: Vec<Option<bool>>,
    limit: usize,
    first_undone: usize,
    found: usize,
}

impl OrderTracker {
    pub fn new(len: usize, limit: usize) -> Self {
        Self {
            resolved: vec![None; len],
            limit,
            first_undone: 0,
            found: 0,
        }
    }

    /// Record a completed probe and advance the prefix.
    ///
    /// Returns the new `first_undone` and the number of matches in
    /// `[0, first_undone)`.
    pub fn record(&mut self, index: usize, found: bool) -> (usize, usize) {
        if let Some(slot) = self.resolved.get_mut(index) {
            *slot = Some(found);
        }
        self.advance()
    }

    fn advance(&mut self) -> (usize, usize) {
        while self.found < self.limit {
            match self.resolved.get(self.first_undone) {
                Some(Some(found)) => {
                    if *found {
                        self.found += 1;
                    }
                    self.first_undone += 1;
                }
                // Unresolved repository, or end of order.
                _ => break,
            }
        }
        (self.first_undone, self.found)
    }

    /// True once the page cannot change any more.
    pub fn is_settled(&self) -> bool {
        self.found >= self.limit || self.first_undone == self.resolved.len()
    }

    pub fn first_undone(&self) -> usize {
        self.first_undone
    }

    pub fn found(&self) -> usize {
        self.found
    }

    pub fn is_resolved(&self, index: usize) -> bool {
        matches!(self.resolved.get(index), Some(Some(_)))
    }
}
