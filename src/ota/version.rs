//! Version gate.
//!
//! Versions are compared as plain strings.  That is only correct while every
//! segment keeps a fixed width (`01.00.06` style); `1.10.0` sorts below
//! `1.9.0`.  Whether to accept a rollback is left to the caller.

use core::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionDecision {
    /// Already running the offered version: acknowledge, do not download.
    SameVersion,
    /// Offered version sorts below the running one.
    Rollback,
    /// Offered version sorts above the running one.
    Upgrade,
}

pub fn classify(current: &str, offered: &str) -> VersionDecision {
    match offered.cmp(current) {
        Ordering::Equal => VersionDecision::SameVersion,
        Ordering::Less => VersionDecision::Rollback,
        Ordering::Greater => VersionDecision::Upgrade,
    }
}
