//! Human-readable document numbers: `PREFIX-SUPPLIER-DDMMYY-SEQ`.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::value_object::ValueObject;

const DATE_FORMAT: &str = "%d%m%y";

/// Which numbering series a document belongs to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NumberPrefix {
    /// Regular purchase order.
    #[serde(rename = "PO")]
    PurchaseOrder,
    /// Purchase order spawned from the remainder of a partial receipt.
    #[serde(rename = "BO")]
    Backorder,
    /// Return request.
    #[serde(rename = "RO")]
    Return,
}

impl NumberPrefix {
    pub fn as_str(self) -> &'static str {
        match self {
            NumberPrefix::PurchaseOrder => "PO",
            NumberPrefix::Backorder => "BO",
            NumberPrefix::Return => "RO",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PO" => Some(Self::PurchaseOrder),
            "BO" => Some(Self::Backorder),
            "RO" => Some(Self::Return),
            _ => None,
        }
    }
}

impl core::fmt::Display for NumberPrefix {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A document number scoped to {prefix, supplier, day}.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentNumber {
    prefix: NumberPrefix,
    supplier_code: String,
    date: NaiveDate,
    sequence: u32,
}

impl ValueObject for DocumentNumber {}

impl DocumentNumber {
    pub fn new(
        prefix: NumberPrefix,
        supplier_code: impl Into<String>,
        date: NaiveDate,
        sequence: u32,
    ) -> DomainResult<Self> {
        let supplier_code = supplier_code.into();
        if supplier_code.trim().is_empty() {
            return Err(DomainError::validation(
                "supplier.code",
                "supplier code cannot be empty",
            ));
        }
        if supplier_code.chars().any(char::is_whitespace) {
            return Err(DomainError::validation(
                "supplier.code",
                "supplier code cannot contain whitespace",
            ));
        }
        if sequence == 0 {
            return Err(DomainError::validation(
                "sequence",
                "sequence numbers start at 1",
            ));
        }
        Ok(Self {
            prefix,
            supplier_code,
            date,
            sequence,
        })
    }

    pub fn prefix(&self) -> NumberPrefix {
        self.prefix
    }

    pub fn supplier_code(&self) -> &str {
        &self.supplier_code
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// Parse the rendered form. Supplier codes may themselves contain `-`.
    pub fn parse(s: &str) -> DomainResult<Self> {
        let bad = || DomainError::validation("number", format!("malformed document number '{s}'"));

        let (prefix, rest) = s.split_once('-').ok_or_else(bad)?;
        let prefix = NumberPrefix::parse(prefix).ok_or_else(bad)?;
        let (rest, seq) = rest.rsplit_once('-').ok_or_else(bad)?;
        let (supplier, date) = rest.rsplit_once('-').ok_or_else(bad)?;
        let sequence: u32 = seq.parse().map_err(|_| bad())?;
        let date = NaiveDate::parse_from_str(date, DATE_FORMAT).map_err(|_| bad())?;

        Self::new(prefix, supplier, date, sequence)
    }

    /// Trailing numeric suffix of a rendered number, if any.
    pub fn trailing_sequence(s: &str) -> Option<u32> {
        s.rsplit_once('-').and_then(|(_, seq)| seq.parse().ok())
    }
}

impl core::fmt::Display for DocumentNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{}-{}-{}-{}",
            self.prefix,
            self.supplier_code,
            self.date.format(DATE_FORMAT),
            self.sequence
        )
    }
}
