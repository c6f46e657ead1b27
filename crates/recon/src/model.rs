use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

// ---------------------------------------------------------------------------
// Raw cells + tables
// ---------------------------------------------------------------------------

/// A single spreadsheet cell as loaded, before any schema is applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Empty,
    Number(f64),
    Text(String),
}

static EMPTY: Value = Value::Empty;

impl Value {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(s) => s.trim().is_empty(),
            Self::Number(_) => false,
        }
    }

    /// Numeric view of the cell. Text is trimmed and a decimal comma is
    /// accepted. Non-finite results are rejected.
    pub fn as_number(&self) -> Option<f64> {
        let n = match self {
            Self::Empty => return None,
            Self::Number(n) => *n,
            Self::Text(s) => {
                let t = s.trim();
                if t.is_empty() {
                    return None;
                }
                match t.parse::<f64>() {
                    Ok(n) => n,
                    Err(_) => t.replace(',', ".").parse::<f64>().ok()?,
                }
            }
        };
        n.is_finite().then_some(n)
    }

    /// Trimmed text view of the cell; `None` for blanks.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Empty => None,
            Self::Number(_) => Some(self.to_string()),
            Self::Text(s) => {
                let t = s.trim();
                (!t.is_empty()).then(|| t.to_string())
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => Ok(()),
            Self::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{n}")
                }
            }
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<Option<f64>> for Value {
    fn from(n: Option<f64>) -> Self {
        n.map_or(Self::Empty, Self::Number)
    }
}

/// Headers plus rows of cells. Rows are as wide as the header row.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { headers, rows }
    }

    /// Index of the header equal to `name` after trimming both sides.
    pub fn column(&self, name: &str) -> Option<usize> {
        let name = name.trim();
        self.headers.iter().position(|h| h.trim() == name)
    }

    pub fn cell(&self, row: usize, col: usize) -> &Value {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&EMPTY)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Catalogs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogRole {
    Primary,
    Secondary,
}

impl fmt::Display for CatalogRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::Secondary => write!(f, "secondary"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CatalogField {
    Id,
    Name,
    Producer,
    Price,
    WineType,
    Region,
    Vintage,
}

/// One catalog row with its schema-bound fields and the original cells.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogRecord {
    /// 0-based data row index in the source table.
    pub row: usize,
    pub id: Option<String>,
    pub name: Option<String>,
    pub producer: Option<String>,
    pub price: Option<f64>,
    pub wine_type: Option<String>,
    pub region: Option<String>,
    pub vintage: Option<i32>,
    pub raw: Vec<Value>,
}

#[derive(Debug, Clone)]
pub struct CatalogTable {
    pub role: CatalogRole,
    pub label: String,
    pub headers: Vec<String>,
    pub records: Vec<CatalogRecord>,
    /// Fields whose column was found in the source table.
    pub present: BTreeSet<CatalogField>,
}

impl CatalogTable {
    pub fn has(&self, field: CatalogField) -> bool {
        self.present.contains(&field)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The catalog in its input schema.
    pub fn to_raw(&self) -> RawTable {
        RawTable::new(
            self.headers.clone(),
            self.records.iter().map(|r| r.raw.clone()).collect(),
        )
    }

    /// Keep only records whose vintage is listed. Records without a vintage
    /// are dropped. An empty list keeps everything.
    pub fn filter_vintages(&self, years: &[i32]) -> CatalogTable {
        if years.is_empty() {
            return self.clone();
        }
        CatalogTable {
            records: self
                .records
                .iter()
                .filter(|r| r.vintage.is_some_and(|v| years.contains(&v)))
                .cloned()
                .collect(),
            ..self.clone()
        }
    }

    pub fn prices(&self) -> impl Iterator<Item = f64> + '_ {
        self.records.iter().filter_map(|r| r.price)
    }
}

// ---------------------------------------------------------------------------
// Matches
// ---------------------------------------------------------------------------

/// How sure the match table is that two products correspond.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchConfidence {
    /// Automated similarity score in (0, 100].
    Scored { score: f64 },
    /// Confirmed by hand. Ranks above every automated score.
    Verified,
    /// No correspondence. `candidate` keeps the best rejected score.
    Unmatched { candidate: Option<f64> },
}

impl MatchConfidence {
    pub fn is_match(&self) -> bool {
        !matches!(self, Self::Unmatched { .. })
    }

    pub fn score(&self) -> Option<f64> {
        match self {
            Self::Scored { score } => Some(*score),
            Self::Verified => None,
            Self::Unmatched { candidate } => *candidate,
        }
    }

    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MatchField {
    PrimaryId,
    PrimaryName,
    PrimaryProducer,
    PrimaryPrice,
    SecondaryId,
    SecondaryName,
    SecondaryProducer,
    SecondaryPrice,
    Score,
    Status,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchRecord {
    pub row: usize,
    pub primary_id: Option<String>,
    pub primary_name: Option<String>,
    pub primary_producer: Option<String>,
    pub primary_price: Option<f64>,
    /// Raw cell, normalized only when joining.
    pub secondary_id: Value,
    pub secondary_name: Option<String>,
    pub secondary_producer: Option<String>,
    pub secondary_price: Option<f64>,
    pub confidence: MatchConfidence,
    pub raw: Vec<Value>,
}

/// Labels used when the folded confidence is written back as a status.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusLabels {
    pub no_match: String,
    pub verified: String,
    pub scored: String,
    pub verified_score: f64,
}

#[derive(Debug, Clone)]
pub struct MatchTable {
    pub headers: Vec<String>,
    pub records: Vec<MatchRecord>,
    pub present: BTreeSet<MatchField>,
    pub score_header: String,
    pub status_header: String,
    pub labels: StatusLabels,
}

impl MatchTable {
    pub fn has(&self, field: MatchField) -> bool {
        self.present.contains(&field)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn real_matches(&self) -> impl Iterator<Item = &MatchRecord> + '_ {
        self.records.iter().filter(|r| r.confidence.is_match())
    }

    pub fn status_label(&self, confidence: &MatchConfidence) -> &str {
        match confidence {
            MatchConfidence::Scored { .. } => &self.labels.scored,
            MatchConfidence::Verified => &self.labels.verified,
            MatchConfidence::Unmatched { .. } => &self.labels.no_match,
        }
    }

    fn score_cell(&self, confidence: &MatchConfidence) -> Value {
        match confidence {
            MatchConfidence::Scored { score } => Value::Number(*score),
            MatchConfidence::Verified => Value::Number(self.labels.verified_score),
            MatchConfidence::Unmatched { candidate } => Value::from(*candidate),
        }
    }

    /// The match table in its input schema with every input cell kept as
    /// read. The folded confidence is written only into a score or status
    /// column the input lacked, appended at the end.
    pub fn to_raw(&self) -> RawTable {
        let mut headers = self.headers.clone();
        let probe = RawTable::new(headers.clone(), Vec::new());
        let score_col = match probe.column(&self.score_header) {
            Some(_) => None,
            None => {
                headers.push(self.score_header.clone());
                Some(headers.len() - 1)
            }
        };
        let status_col = match probe.column(&self.status_header) {
            Some(_) => None,
            None => {
                headers.push(self.status_header.clone());
                Some(headers.len() - 1)
            }
        };

        let rows = self
            .records
            .iter()
            .map(|rec| {
                let mut row = rec.raw.clone();
                row.resize(headers.len(), Value::Empty);
                if let Some(col) = score_col {
                    row[col] = self.score_cell(&rec.confidence);
                }
                if let Some(col) = status_col {
                    row[col] = Value::Text(self.status_label(&rec.confidence).to_string());
                }
                row
            })
            .collect();

        RawTable::new(headers, rows)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_as_number() {
        assert_eq!(Value::from(" 12.5 ").as_number(), Some(12.5));
        assert_eq!(Value::from("12,5").as_number(), Some(12.5));
        assert_eq!(Value::Number(3.0).as_number(), Some(3.0));
        assert_eq!(Value::from("abc").as_number(), None);
        assert_eq!(Value::from("inf").as_number(), None);
        assert_eq!(Value::from("NaN").as_number(), None);
        assert_eq!(Value::Empty.as_number(), None);
    }

    #[test]
    fn value_display_drops_integral_fraction() {
        assert_eq!(Value::Number(45.0).to_string(), "45");
        assert_eq!(Value::Number(45.5).to_string(), "45.5");
        assert_eq!(Value::Empty.to_string(), "");
        assert_eq!(Value::Number(45.0).as_text().as_deref(), Some("45"));
        assert_eq!(Value::from("  ").as_text(), None);
    }

    #[test]
    fn raw_table_column_lookup_trims() {
        let t = RawTable::new(vec![" Sku ".into(), "Name".into()], vec![vec![Value::from("1")]]);
        assert_eq!(t.column("Sku"), Some(0));
        assert_eq!(t.column("sku"), None);
        assert_eq!(t.cell(0, 1), &Value::Empty);
        assert_eq!(t.cell(9, 0), &Value::Empty);
    }

    fn record(row: usize, confidence: MatchConfidence) -> MatchRecord {
        MatchRecord {
            row,
            primary_id: Some(format!("u{row}")),
            primary_name: None,
            primary_producer: None,
            primary_price: None,
            secondary_id: Value::Empty,
            secondary_name: None,
            secondary_producer: None,
            secondary_price: None,
            confidence,
            raw: vec![Value::from(format!("u{row}").as_str())],
        }
    }

    #[test]
    fn match_table_writes_back_derived_status() {
        let table = MatchTable {
            headers: vec!["Coop_URL".into()],
            records: vec![
                record(0, MatchConfidence::Scored { score: 88.0 }),
                record(1, MatchConfidence::Verified),
                record(2, MatchConfidence::Unmatched { candidate: None }),
            ],
            present: BTreeSet::new(),
            score_header: "Fuzzy_Score".into(),
            status_header: "Match_Status".into(),
            labels: StatusLabels {
                no_match: "Kein Match".into(),
                verified: "Manueller Match".into(),
                scored: "Automatischer Match".into(),
                verified_score: -1.0,
            },
        };
        let raw = table.to_raw();
        assert_eq!(raw.headers, vec!["Coop_URL", "Fuzzy_Score", "Match_Status"]);
        assert_eq!(raw.rows[0][1], Value::Number(88.0));
        assert_eq!(raw.rows[0][2], Value::from("Automatischer Match"));
        assert_eq!(raw.rows[1][1], Value::Number(-1.0));
        assert_eq!(raw.rows[1][2], Value::from("Manueller Match"));
        assert_eq!(raw.rows[2][1], Value::Empty);
        assert_eq!(raw.rows[2][2], Value::from("Kein Match"));
    }

    #[test]
    fn match_table_keeps_input_score_and_status() {
        let mut manual = record(0, MatchConfidence::Verified);
        manual.raw = vec![Value::from("u0"), Value::Number(95.0), Value::from("Manueller Match")];
        let mut plain = record(1, MatchConfidence::Scored { score: 88.0 });
        plain.raw = vec![Value::from("u1"), Value::Number(88.0), Value::from("Match")];
        let mut blank = record(2, MatchConfidence::Scored { score: 70.0 });
        blank.raw = vec![Value::from("u2"), Value::Number(70.0), Value::Empty];

        let table = MatchTable {
            headers: vec!["Coop_URL".into(), "Fuzzy_Score".into(), "Match_Status".into()],
            records: vec![manual.clone(), plain.clone(), blank],
            present: BTreeSet::new(),
            score_header: "Fuzzy_Score".into(),
            status_header: "Match_Status".into(),
            labels: StatusLabels {
                no_match: "Kein Match".into(),
                verified: "Manueller Match".into(),
                scored: "Automatischer Match".into(),
                verified_score: -1.0,
            },
        };
        let raw = table.to_raw();
        assert_eq!(raw.headers.len(), 3);
        assert_eq!(raw.rows[0], manual.raw);
        assert_eq!(raw.rows[1], plain.raw);
        assert_eq!(raw.rows[2][2], Value::Empty);
    }

    #[test]
    fn vintage_filter_drops_unknown_years() {
        let rec = |row: usize, vintage: Option<i32>| CatalogRecord {
            row,
            id: Some(row.to_string()),
            name: None,
            producer: None,
            price: None,
            wine_type: None,
            region: None,
            vintage,
            raw: Vec::new(),
        };
        let table = CatalogTable {
            role: CatalogRole::Primary,
            label: "Coop".into(),
            headers: Vec::new(),
            records: vec![rec(0, Some(2019)), rec(1, Some(2020)), rec(2, None)],
            present: BTreeSet::new(),
        };
        let filtered = table.filter_vintages(&[2020]);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered.records[0].row, 1);
        assert_eq!(table.filter_vintages(&[]).len(), 3);
    }
}
