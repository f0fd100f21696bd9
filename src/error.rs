//! # Typed Page Error Kinds
//!
//! Page operations return `eyre::Result`. Failures that a caller must react
//! to programmatically carry a [`PageError`] as the report's root cause, so
//! the B-tree layer can `downcast_ref::<PageError>()` and branch:
//!
//! - `NoSpace` is expected and recoverable: the caller splits the page.
//! - `CompressOverflow` is expected and recoverable: the caller reorganizes
//!   or decompresses. This crate only operates on uncompressed frames, so
//!   the variant exists for the caller contract and is never produced here.
//! - `Corruption` is fatal for the page: the frame violates a structural
//!   invariant and must not be written back.
//! - `Precondition` is a programming error in the caller (e.g. deleting a
//!   sentinel record).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PageError {
    /// The free region between the heap top and the directory cannot hold
    /// the requested allocation.
    #[error("not enough space on page for {need} bytes")]
    NoSpace { need: usize },

    /// A bulk copy onto a compressed destination failed to recompress.
    #[error("compressed page could not absorb the copied records")]
    CompressOverflow,

    /// A structural invariant does not hold. The page is unrecoverable.
    #[error("page {page_no} corrupted: {reason}")]
    Corruption { page_no: u32, reason: String },

    /// The caller violated an operation precondition.
    #[error("page operation precondition violated: {0}")]
    Precondition(String),
}

impl PageError {
    pub fn is_recoverable(&self) -> bool {
        matches!(self, PageError::NoSpace { .. } | PageError::CompressOverflow)
    }
}

/// Builds a corruption report, logging it first so the page number and
/// reason reach the diagnostic stream even if the caller swallows the error.
pub(crate) fn corruption(page_no: u32, reason: impl Into<String>) -> eyre::Report {
    let reason = reason.into();
    tracing::error!(page_no, %reason, "page corruption detected");
    PageError::Corruption { page_no, reason }.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_space_is_recoverable() {
        assert!(PageError::NoSpace { need: 64 }.is_recoverable());
        assert!(PageError::CompressOverflow.is_recoverable());
    }

    #[test]
    fn corruption_is_not_recoverable() {
        let err = PageError::Corruption {
            page_no: 7,
            reason: "slot sum mismatch".into(),
        };
        assert!(!err.is_recoverable());
        assert!(err.to_string().contains("page 7"));
    }

    #[test]
    fn corruption_report_downcasts() {
        let report = corruption(3, "ownership cycle");
        let kind = report.downcast_ref::<PageError>().unwrap();
        assert!(matches!(kind, PageError::Corruption { page_no: 3, .. }));
    }
}
