//! Progress reporting for long-running module operations

/// Receives progress updates from batch operations
pub trait ProgressListener {
    /// `percent` is `None` while completion cannot be measured
    fn update(&self, percent: Option<u8>, status: &str);
}

impl<F> ProgressListener for F
where
    F: Fn(Option<u8>, &str),
{
    fn update(&self, percent: Option<u8>, status: &str) {
        self(percent, status)
    }
}

/// Listener that discards every update
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressListener for NoProgress {
    fn update(&self, _percent: Option<u8>, _status: &str) {}
}

/// Percentage of `done` out of `total`, clamped to 100
pub(crate) fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((done.min(total) * 100) / total) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn test_percent() {
        assert_eq!(percent(0, 4), 0);
        assert_eq!(percent(1, 3), 33);
        assert_eq!(percent(4, 4), 100);
        assert_eq!(percent(5, 4), 100);
        assert_eq!(percent(0, 0), 100);
    }

    #[test]
    fn test_closure_listener() {
        let seen = RefCell::new(Vec::new());
        let listener = |percent: Option<u8>, status: &str| seen.borrow_mut().push((percent, status.to_string()));

        listener.update(Some(50), "halfway");
        listener.update(None, "waiting");

        assert_eq!(
            seen.into_inner(),
            vec![(Some(50), "halfway".to_string()), (None, "waiting".to_string())]
        );
    }
}
