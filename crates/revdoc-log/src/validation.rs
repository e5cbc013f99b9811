use revdoc_types::{Event, RevisionNumber};

use crate::error::LogResult;
use crate::sync_log::SyncLog;
use crate::traits::ChangeLogReader;

/// Result of log validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationReport {
    pub base_revision: RevisionNumber,
    pub current_revision: RevisionNumber,
    pub event_count: usize,
    pub placeholder_count: usize,
    pub transaction_count: usize,
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    /// Returns `true` if all checks passed.
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }
}

/// A specific integrity violation detected during validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Violation {
    pub revision: RevisionNumber,
    pub kind: ViolationKind,
    pub description: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViolationKind {
    RevisionMismatch,
    LoggedTransactionMember,
    UnflaggedTransactionMember,
    TransactionRevisionSplit,
    SyncRevisionOutOfRange,
}

/// Log integrity validator.
///
/// Violations are collected rather than raised, so a report describes every
/// problem of a log at once.
pub struct LogValidator;

impl LogValidator {
    /// Validate positions and transaction structure of any log.
    pub fn validate<R: ChangeLogReader>(reader: &R) -> LogResult<ValidationReport> {
        let base_revision = reader.base_revision();
        let mut report = ValidationReport {
            base_revision,
            current_revision: reader.current_revision(),
            event_count: 0,
            placeholder_count: 0,
            transaction_count: 0,
            violations: Vec::new(),
        };

        for (revision, entry) in reader.events_since(base_revision)? {
            let Some(event) = entry else {
                report.placeholder_count += 1;
                continue;
            };
            report.event_count += 1;

            if event.revision() != revision {
                report.violations.push(Violation {
                    revision,
                    kind: ViolationKind::RevisionMismatch,
                    description: format!("event claims revision {}", event.revision()),
                });
            }

            match event {
                Event::Atomic(atomic) if atomic.in_transaction => {
                    report.violations.push(Violation {
                        revision,
                        kind: ViolationKind::LoggedTransactionMember,
                        description: format!(
                            "transaction member on {} logged on its own",
                            atomic.changed
                        ),
                    });
                }
                Event::Atomic(_) => {}
                Event::Transaction(txn) => {
                    report.transaction_count += 1;
                    for member in txn.events() {
                        if !member.in_transaction {
                            report.violations.push(Violation {
                                revision,
                                kind: ViolationKind::UnflaggedTransactionMember,
                                description: format!(
                                    "member on {} not flagged in_transaction",
                                    member.changed
                                ),
                            });
                        }
                        if member.revision() != revision {
                            report.violations.push(Violation {
                                revision,
                                kind: ViolationKind::TransactionRevisionSplit,
                                description: format!(
                                    "member on {} claims revision {}",
                                    member.changed,
                                    member.revision()
                                ),
                            });
                        }
                    }
                }
            }
        }

        Ok(report)
    }

    /// Validate a sync log, including the position of its sync revision.
    pub fn validate_sync_log(log: &SyncLog) -> LogResult<ValidationReport> {
        let mut report = Self::validate(log)?;
        let sync_revision = log.sync_revision();
        if sync_revision < report.base_revision || sync_revision > report.current_revision {
            report.violations.push(Violation {
                revision: sync_revision,
                kind: ViolationKind::SyncRevisionOutOfRange,
                description: format!(
                    "sync revision outside [{}, {}]",
                    report.base_revision, report.current_revision
                ),
            });
        }
        Ok(report)
    }
}
