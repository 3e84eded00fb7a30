//! Folding per-item batch failures into one message.

use std::fmt::Write;

use crate::types::{DeleteResult, RemoteError, SaveResult};

/// Outcome of a single item in a batch response.
pub trait ItemOutcome {
    fn is_success(&self) -> bool;

    fn errors(&self) -> &[RemoteError];
}

impl ItemOutcome for SaveResult {
    fn is_success(&self) -> bool {
        self.success
    }

    fn errors(&self) -> &[RemoteError] {
        &self.errors
    }
}

impl ItemOutcome for DeleteResult {
    fn is_success(&self) -> bool {
        self.success
    }

    fn errors(&self) -> &[RemoteError] {
        &self.errors
    }
}

/// Describe every failed item in `results`, or `None` if all succeeded.
///
/// Each failure becomes one block naming its index (position in `results` offset by
/// `first_index`) followed by its messages, one per line:
///
/// ```text
/// \n\tError 3:\n\t\tfirst message\n\t\tsecond message
/// ```
pub fn aggregate_failures<'a, R, I>(results: I, first_index: usize) -> Option<String>
where
    R: ItemOutcome + 'a,
    I: IntoIterator<Item = &'a R>,
{
    aggregate_failures_at(
        results
            .into_iter()
            .enumerate()
            .map(|(index, result)| (first_index + index, result)),
    )
}

/// Like [`aggregate_failures`], but each result carries the index it is reported under.
pub fn aggregate_failures_at<'a, R, I>(results: I) -> Option<String>
where
    R: ItemOutcome + 'a,
    I: IntoIterator<Item = (usize, &'a R)>,
{
    let mut message = String::new();
    let mut failed = false;

    for (index, result) in results {
        if result.is_success() {
            continue;
        }
        failed = true;

        let _ = write!(message, "\n\tError {}:", index);
        for error in result.errors() {
            let _ = write!(message, "\n\t\t{}", error.message);
        }
    }

    failed.then_some(message)
}
