// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Plain-language messages for failed pages.
//
// The capture UI shows these next to a page marked `error` so the user knows
// whether taking the photo again will help.

use crate::error::{ErrorKind, ScanError};

/// What the user should do about a failed page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remedy {
    /// Take the photo again.
    Retake,
    /// Free up memory (finish or discard pages) and try again.
    FreeResources,
    /// Nothing the user can do about this capture; report it.
    Report,
    /// No action; the user asked for this.
    None,
}

/// A human-readable error with a plain English message and a suggestion.
#[derive(Debug, Clone)]
pub struct HumanError {
    /// Short summary (shown as a heading).
    pub message: String,
    /// What the user should try (shown as body text).
    pub suggestion: String,
    pub remedy: Remedy,
}

/// Convert a page error into something a person holding a phone can act on.
pub fn humanize_error(err: &ScanError) -> HumanError {
    humanize_kind(err.kind(), &err.to_string())
}

/// Same as [`humanize_error`] for a page that only kept its error kind and
/// reason string.
pub fn humanize_kind(kind: ErrorKind, detail: &str) -> HumanError {
    match kind {
        ErrorKind::DecodeFailure => HumanError {
            message: "This photo couldn't be opened.".into(),
            suggestion: "The image may be damaged or in an unusual format. Please take the photo again.".into(),
            remedy: Remedy::Retake,
        },
        ErrorKind::BoundaryNotFound => HumanError {
            message: "We couldn't find the edges of the page.".into(),
            suggestion: "Place the page on a darker, plain surface and make sure all four corners are visible.".into(),
            remedy: Remedy::Retake,
        },
        ErrorKind::SingularTransform => HumanError {
            message: "The page was photographed at too steep an angle.".into(),
            suggestion: "Hold the camera more directly above the page and try again.".into(),
            remedy: Remedy::Retake,
        },
        ErrorKind::EncodeFailure => HumanError {
            message: "The finished page couldn't be saved.".into(),
            suggestion: format!("Try again. If this keeps happening, please report it. ({detail})"),
            remedy: Remedy::Report,
        },
        ErrorKind::ResourceExhausted => HumanError {
            message: "The device is running low on memory.".into(),
            suggestion: "Finish or discard some pages before capturing more.".into(),
            remedy: Remedy::FreeResources,
        },
        ErrorKind::InvalidConfig => HumanError {
            message: "The scan settings are not valid.".into(),
            suggestion: format!("Check the quality settings and try again. ({detail})"),
            remedy: Remedy::Report,
        },
        ErrorKind::Cancelled => HumanError {
            message: "Processing was cancelled.".into(),
            suggestion: "Start processing again when you are ready.".into(),
            remedy: Remedy::None,
        },
        ErrorKind::Internal => HumanError {
            message: "Something went wrong while processing this page.".into(),
            suggestion: format!("Please take the photo again. If this keeps happening, report it. ({detail})"),
            remedy: Remedy::Retake,
        },
    }
}
