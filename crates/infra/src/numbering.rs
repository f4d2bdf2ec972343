//! System-assigned document numbers.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, NaiveDate, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentKind {
    InboundOrder,
    TransferOrder,
    CountPlan,
}

impl DocumentKind {
    pub fn prefix(self) -> &'static str {
        match self {
            DocumentKind::InboundOrder => "IN",
            DocumentKind::TransferOrder => "TR",
            DocumentKind::CountPlan => "CP",
        }
    }
}

/// Hands out `PREFIX-YYYYMMDD-NNNN` numbers, one sequence per kind and day.
///
/// Numbers are unique within the process. The sequence widens past four
/// digits instead of wrapping.
#[derive(Debug, Default)]
pub struct DocumentNumberer {
    sequences: Mutex<HashMap<(DocumentKind, NaiveDate), u32>>,
}

impl DocumentNumberer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self, kind: DocumentKind, at: DateTime<Utc>) -> String {
        let day = at.date_naive();
        let mut sequences = self.sequences.lock().unwrap_or_else(PoisonError::into_inner);
        let seq = sequences.entry((kind, day)).or_insert(0);
        *seq += 1;
        format!("{}-{}-{:04}", kind.prefix(), day.format("%Y%m%d"), seq)
    }
}
