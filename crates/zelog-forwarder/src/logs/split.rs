//! Splitting oversized resource-log groups.

use zelog_pdata::{ResourceLogs, ScopeLogs};

/// Removes log records from `src` and returns a new `ResourceLogs` of at
/// most `size` records.
///
/// When `src` already fits within `size` the whole value is moved out and
/// `src` is left empty. Otherwise exactly `size` records move: scopes that
/// fit wholesale move with their identity intact, and the scope on the
/// boundary is drained record by record into a destination scope with a
/// copied identity.
#[must_use]
pub fn split_logs(size: usize, src: &mut ResourceLogs) -> ResourceLogs {
    if src.log_record_count() <= size {
        return std::mem::take(src);
    }

    let mut dest = ResourceLogs::new();
    dest.resource = src.resource.clone();

    let mut copied = 0;
    let mut remaining = Vec::new();
    for mut scope in src.scope_logs.drain(..) {
        if copied == size {
            remaining.push(scope);
            continue;
        }
        let scope_records = scope.log_records.len();
        if size >= scope_records + copied {
            // The whole scope fits; move it wholesale.
            copied += scope_records;
            dest.scope_logs.push(scope);
            continue;
        }
        let take = size - copied;
        let dest_scope = ScopeLogs {
            scope: scope.scope.clone(),
            log_records: scope.log_records.drain(..take).collect(),
        };
        copied = size;
        dest.scope_logs.push(dest_scope);
        remaining.push(scope);
    }
    src.scope_logs = remaining;

    dest
}
