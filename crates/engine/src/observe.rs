//! Lifecycle notifications around the structural operations.

use crate::diff::Diff;
use crate::options::{DiffOptions, ForkOptions};
use crate::session::Record;

/// Receiver for operation lifecycle events.
///
/// Observers run in registration order. The `pre_` hooks see the
/// options the operation is about to use and may adjust them; a later
/// observer sees the edits of an earlier one. All hooks default to
/// no-ops, implement only what you need.
pub trait Observer {
    fn pre_fork(&mut self, _reference: Record, _instance: Record, _options: &mut ForkOptions) {}
    fn post_fork(&mut self, _reference: Record, _instance: Record) {}

    fn pre_reset(&mut self, _reference: Record, _instance: Record, _options: &mut ForkOptions) {}
    fn post_reset(&mut self, _reference: Record, _instance: Record) {}

    fn pre_diff(&mut self, _reference: Record, _instance: Record, _options: &mut DiffOptions) {}
    fn post_diff(&mut self, _reference: Record, _instance: Record, _diff: &Diff) {}

    /// The commit hooks carry the record the committed instance was
    /// forked or reset from.
    fn pre_commit(&mut self, _reference: Record, _instance: Record) {}
    fn post_commit(&mut self, _reference: Record, _instance: Record) {}
}
