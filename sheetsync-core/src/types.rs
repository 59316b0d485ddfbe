//! Domain types for sheetsync.
//!
//! Identifiers are newtypes over `String`; tables carry raw JSON cell values
//! exactly as the remote spreadsheet service returns them. Every type is
//! serializable via serde (JSON on the wire, YAML in the mapping registry).

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

macro_rules! string_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

string_newtype!(
    /// Identifier of a mapping inside the registry.
    MappingId
);

string_newtype!(
    /// Identifier of a remote spreadsheet document.
    SheetId
);

string_newtype!(
    /// Name of a tab inside a spreadsheet.
    TabName
);

string_newtype!(
    /// `sheetId:tabName`: addresses one tab's fingerprint in the checksum store.
    RangeKey
);

string_newtype!(
    /// Lowercase hex SHA-256 digest over a [`Table`].
    Fingerprint
);

impl RangeKey {
    pub fn new(sheet: &SheetId, tab: &TabName) -> Self {
        Self(format!("{}:{}", sheet.0, tab.0))
    }
}

// ---------------------------------------------------------------------------
// A1 notation
// ---------------------------------------------------------------------------

/// Columns covered by a full-tab read.
pub const FULL_TAB_COLUMNS: &str = "A:Z";

/// Quote a tab name for A1 notation when it contains anything beyond
/// `[A-Za-z0-9_]`. Embedded single quotes are doubled.
pub fn quote_tab(tab: &TabName) -> String {
    let plain = !tab.0.is_empty()
        && tab
            .0
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if plain {
        tab.0.clone()
    } else {
        format!("'{}'", tab.0.replace('\'', "''"))
    }
}

/// `Tab!A:Z`: the range read for every mapping side.
pub fn full_tab_range(tab: &TabName) -> String {
    format!("{}!{}", quote_tab(tab), FULL_TAB_COLUMNS)
}

/// `Tab!<cells>`: e.g. `Tab!A1` or `Tab!B2:C4`.
pub fn tab_range(tab: &TabName, cells: &str) -> String {
    format!("{}!{}", quote_tab(tab), cells)
}

/// Split an A1 range into its (unquoted) tab name and cell part.
///
/// `'My Tab'!B2:C3` → `("My Tab", "B2:C3")`. A range without `!` is treated as
/// a bare tab name with an empty cell part.
pub fn split_range(range: &str) -> (String, String) {
    let (tab, cells) = match range.rfind('!') {
        Some(idx) => (&range[..idx], &range[idx + 1..]),
        None => (range, ""),
    };
    let tab = match tab.strip_prefix('\'').and_then(|t| t.strip_suffix('\'')) {
        Some(inner) => inner.replace("''", "'"),
        None => tab.to_string(),
    };
    (tab, cells.to_string())
}

/// Zero-based `(row, column)` of the top-left cell of an A1 cell reference.
///
/// `A1` → `(0, 0)`, `C5:D9` → `(4, 2)`, `B:B` → `(0, 1)`. Returns `None` for
/// anything that does not start with column letters, or whose column or row
/// does not fit in `usize`.
pub fn parse_anchor(cells: &str) -> Option<(usize, usize)> {
    let first = cells.split(':').next().unwrap_or_default();
    let letters: String = first.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
    if letters.is_empty() {
        return None;
    }
    let col = letters
        .chars()
        .try_fold(0usize, |acc, c| {
            acc.checked_mul(26)?
                .checked_add(c.to_ascii_uppercase() as usize - 'A' as usize + 1)
        })?
        - 1;
    let digits = &first[letters.len()..];
    let row = if digits.is_empty() {
        0
    } else {
        digits.parse::<usize>().ok()?.checked_sub(1)?
    };
    Some((row, col))
}

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

/// Rows of cells, row-major. Rows may be ragged.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Table(pub Vec<Vec<Value>>);

impl Table {
    pub fn new(rows: Vec<Vec<Value>>) -> Self {
        Self(rows)
    }

    /// Build a table from string cells.
    pub fn from_strings<R, C, S>(rows: R) -> Self
    where
        R: IntoIterator<Item = C>,
        C: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(
            rows.into_iter()
                .map(|row| row.into_iter().map(|c| Value::String(c.into())).collect())
                .collect(),
        )
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn row_count(&self) -> usize {
        self.0.len()
    }

    /// Width of the widest row.
    pub fn column_count(&self) -> usize {
        self.0.iter().map(Vec::len).max().unwrap_or(0)
    }

    /// Copy of this table padded with empty-string cells so it covers at least
    /// `rows × columns`. Writing the padded table over an older, larger grid
    /// blanks the cells the old grid had beyond this table's extent.
    pub fn padded_to(&self, rows: usize, columns: usize) -> Table {
        let rows = rows.max(self.row_count());
        let columns = columns.max(self.column_count());
        if rows == self.row_count() && self.0.iter().all(|r| r.len() == columns) {
            return self.clone();
        }
        let mut out = Vec::with_capacity(rows);
        for idx in 0..rows {
            let mut row = self.0.get(idx).cloned().unwrap_or_default();
            row.resize(columns, Value::String(String::new()));
            out.push(row);
        }
        Table(out)
    }
}

impl From<Vec<Vec<Value>>> for Table {
    fn from(rows: Vec<Vec<Value>>) -> Self {
        Self(rows)
    }
}

// ---------------------------------------------------------------------------
// Mapping
// ---------------------------------------------------------------------------

/// One directional sync unit: source tab → destination tab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mapping {
    pub id: MappingId,
    #[serde(alias = "sourceSheet")]
    pub source_sheet_id: SheetId,
    pub source_tab: TabName,
    #[serde(alias = "destSheet")]
    pub dest_sheet_id: SheetId,
    pub dest_tab: TabName,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl Mapping {
    pub fn source_key(&self) -> RangeKey {
        RangeKey::new(&self.source_sheet_id, &self.source_tab)
    }

    pub fn dest_key(&self) -> RangeKey {
        RangeKey::new(&self.dest_sheet_id, &self.dest_tab)
    }

    pub fn source_range(&self) -> String {
        full_tab_range(&self.source_tab)
    }

    pub fn dest_range(&self) -> String {
        full_tab_range(&self.dest_tab)
    }
}

/// Payload for creating a mapping; the registry assigns the id.
///
/// Every field is optional so that validation can report a precise error
/// instead of a deserialization failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMapping {
    #[serde(alias = "sourceSheet")]
    pub source_sheet_id: Option<String>,
    pub source_tab: Option<String>,
    #[serde(alias = "destSheet")]
    pub dest_sheet_id: Option<String>,
    pub dest_tab: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
}

/// Partial update for an existing mapping. `id` is never changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingPatch {
    #[serde(alias = "sourceSheet", skip_serializing_if = "Option::is_none")]
    pub source_sheet_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_tab: Option<String>,
    #[serde(alias = "destSheet", skip_serializing_if = "Option::is_none")]
    pub dest_sheet_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dest_tab: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl MappingPatch {
    pub fn apply(self, mapping: &mut Mapping) {
        if let Some(v) = self.source_sheet_id {
            mapping.source_sheet_id = SheetId(v);
        }
        if let Some(v) = self.source_tab {
            mapping.source_tab = TabName(v);
        }
        if let Some(v) = self.dest_sheet_id {
            mapping.dest_sheet_id = SheetId(v);
        }
        if let Some(v) = self.dest_tab {
            mapping.dest_tab = TabName(v);
        }
        if let Some(v) = self.name {
            mapping.name = v;
        }
        if let Some(v) = self.description {
            mapping.description = v;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
