use crate::error::ObservationError;

use super::markup::{parse_markup, MarkupNode};

/// Fixed sampling interval of the ground observations.
pub const INTERVAL_MINUTES: u32 = 10;
/// Intervals in one calendar day.
pub const INTERVALS_PER_DAY: usize = (24 * 60 / INTERVAL_MINUTES) as usize;

/// Id of the observation table on the 10-minute pages.
pub const OBSERVATION_TABLE_ID: &str = "tablefix1";

/// Largest column or row span a header cell may declare. Browsers clamp
/// `colspan` to the same limit.
pub const MAX_SPAN: usize = 1000;

/// One header cell: its text, the number of columns it covers and the
/// number of header rows it covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderCell {
    pub text: String,
    pub span: usize,
    pub row_span: usize,
}

impl HeaderCell {
    pub fn new(text: impl Into<String>, span: usize) -> Self {
        Self {
            text: text.into(),
            span,
            row_span: 1,
        }
    }

    pub fn with_row_span(mut self, row_span: usize) -> Self {
        self.row_span = row_span;
        self
    }

    fn from_node(node: &MarkupNode) -> Result<Self, ObservationError> {
        Ok(Self {
            text: node.text().trim().to_string(),
            span: span_attribute(node, "colspan")?,
            row_span: span_attribute(node, "rowspan")?,
        })
    }
}

fn span_attribute(node: &MarkupNode, name: &str) -> Result<usize, ObservationError> {
    match node.attribute(name) {
        None => Ok(1),
        Some(raw) => raw
            .trim()
            .parse::<usize>()
            .ok()
            .filter(|&n| (1..=MAX_SPAN).contains(&n))
            .ok_or_else(|| ObservationError::Structural(format!("invalid {name}={raw:?}"))),
    }
}

pub type HeaderRow = Vec<HeaderCell>;
pub type DataRow = Vec<String>;

/// Interval index of `hour:minute` within a day.
pub fn interval_index(hour: u32, minute: u32) -> usize {
    ((hour * 60 + minute) / INTERVAL_MINUTES) as usize
}

/// One day of 10-minute observations for one station.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationTable {
    columns: Vec<String>,
    rows: Vec<DataRow>,
}

struct HeaderCursor<'a> {
    levels: &'a [HeaderRow],
    next: Vec<usize>,
}

impl HeaderCursor<'_> {
    /// Pulls `count` flattened names from `level`, consuming cells left to
    /// right.
    fn take(&mut self, level: usize, count: usize) -> Result<Vec<String>, ObservationError> {
        let Some(cells) = self.levels.get(level) else {
            return Err(ObservationError::Structural(format!(
                "a span needs header level {} but only {} levels exist",
                level + 1,
                self.levels.len()
            )));
        };

        let mut names = Vec::new();
        while names.len() < count {
            let Some(cell) = cells.get(self.next[level]) else {
                return Err(ObservationError::Structural(format!(
                    "header level {} ran out of cells after {} of {} columns",
                    level + 1,
                    names.len(),
                    count
                )));
            };
            self.next[level] += 1;

            if cell.span == 1 {
                names.push(cell.text.clone());
            } else {
                for sub in self.take(level + 1, cell.span)? {
                    names.push(format!("{}-{}", cell.text, sub));
                }
            }
        }

        if names.len() != count {
            return Err(ObservationError::Structural(format!(
                "header level {} spans {} columns where {} were declared",
                level + 1,
                names.len(),
                count
            )));
        }
        Ok(names)
    }
}

/// Flattens a multi-row header into one column name per data column.
pub fn flatten_header(header_rows: &[HeaderRow]) -> Result<Vec<String>, ObservationError> {
    let first = header_rows
        .first()
        .and_then(|row| row.first())
        .ok_or_else(|| ObservationError::Structural("table has no header".to_string()))?;

    if first.row_span != header_rows.len() {
        return Err(ObservationError::Structural(format!(
            "header declares {} levels but has {} rows",
            first.row_span,
            header_rows.len()
        )));
    }

    if let Some(cell) = header_rows
        .iter()
        .flatten()
        .find(|cell| cell.span == 0 || cell.span > MAX_SPAN)
    {
        return Err(ObservationError::Structural(format!(
            "header cell {:?} spans {} columns (allowed 1..={})",
            cell.text, cell.span, MAX_SPAN
        )));
    }

    let total = header_rows[0]
        .iter()
        .try_fold(0usize, |acc, cell| acc.checked_add(cell.span))
        .ok_or_else(|| ObservationError::Structural("header span overflows".to_string()))?;
    let mut cursor = HeaderCursor {
        levels: header_rows,
        next: vec![0; header_rows.len()],
    };
    let columns = cursor.take(0, total)?;

    for (level, (row, used)) in header_rows.iter().zip(&cursor.next).enumerate() {
        if *used != row.len() {
            return Err(ObservationError::Structural(format!(
                "header level {} has {} cells but only {} are covered by spans",
                level + 1,
                row.len(),
                used
            )));
        }
    }

    Ok(columns)
}

/// Builds a table from header rows and data rows.
pub fn parse(
    header_rows: &[HeaderRow],
    data_rows: Vec<DataRow>,
) -> Result<ObservationTable, ObservationError> {
    let columns = flatten_header(header_rows)?;
    if data_rows.len() > INTERVALS_PER_DAY {
        return Err(ObservationError::Structural(format!(
            "{} data rows exceed the {} intervals of a day",
            data_rows.len(),
            INTERVALS_PER_DAY
        )));
    }
    for (i, row) in data_rows.iter().enumerate() {
        if row.len() != columns.len() {
            tracing::warn!(
                "Observation row {} has {} cells for {} columns",
                i,
                row.len(),
                columns.len()
            );
        }
    }
    Ok(ObservationTable {
        columns,
        rows: data_rows,
    })
}

impl ObservationTable {
    /// Extracts the observation table from a page or fragment.
    ///
    /// Rows without a `style` attribute are header rows; styled rows carry
    /// data.
    pub fn from_markup(markup: &str) -> Result<Self, ObservationError> {
        let root = parse_markup(markup)?;
        let table = root
            .find(|n| n.name == "table" && n.attribute("id") == Some(OBSERVATION_TABLE_ID))
            .or_else(|| root.find(|n| n.name == "table"))
            .ok_or(ObservationError::TableNotFound)?;

        let mut header_rows = Vec::new();
        let mut data_rows: Vec<DataRow> = Vec::new();
        for tr in table.find_all("tr") {
            if tr.has_attribute("style") {
                data_rows.push(
                    tr.find_all("td")
                        .iter()
                        .map(|td| td.text().trim().to_string())
                        .collect(),
                );
            } else {
                header_rows.push(
                    tr.find_all("th")
                        .into_iter()
                        .map(HeaderCell::from_node)
                        .collect::<Result<HeaderRow, _>>()?,
                );
            }
        }

        parse(&header_rows, data_rows)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[DataRow] {
        &self.rows
    }

    /// Index of the first column whose name contains `needle`.
    pub fn find_column(&self, needle: &str) -> Option<usize> {
        self.columns.iter().position(|name| name.contains(needle))
    }

    pub fn row_at(&self, hour: u32, minute: u32) -> Result<&DataRow, ObservationError> {
        let index = interval_index(hour, minute);
        if index >= INTERVALS_PER_DAY || index >= self.rows.len() {
            return Err(ObservationError::IntervalOutOfRange {
                hour,
                minute,
                index,
                rows: self.rows.len(),
            });
        }
        Ok(&self.rows[index])
    }

    pub fn value_at(
        &self,
        column: usize,
        hour: u32,
        minute: u32,
    ) -> Result<&str, ObservationError> {
        let row = self.row_at(hour, minute)?;
        row.get(column)
            .map(String::as_str)
            .ok_or(ObservationError::ColumnOutOfRange {
                column,
                columns: row.len(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_level_header() {
        let header = vec![
            vec![HeaderCell::new("A", 2).with_row_span(2)],
            vec![HeaderCell::new("B", 1), HeaderCell::new("C", 1)],
        ];
        assert_eq!(flatten_header(&header).unwrap(), vec!["A-B", "A-C"]);
    }

    #[test]
    fn test_mixed_header_preserves_order() {
        let header = vec![
            vec![
                HeaderCell::new("時分", 1).with_row_span(2),
                HeaderCell::new("気圧(hPa)", 2),
                HeaderCell::new("降水量(mm)", 1).with_row_span(2),
                HeaderCell::new("気温(℃)", 1).with_row_span(2),
                HeaderCell::new("風向・風速(m/s)", 4),
            ],
            vec![
                HeaderCell::new("現地", 1),
                HeaderCell::new("海面", 1),
                HeaderCell::new("平均", 1),
                HeaderCell::new("風向", 1),
                HeaderCell::new("最大瞬間", 1),
                HeaderCell::new("風向", 1),
            ],
        ];
        assert_eq!(
            flatten_header(&header).unwrap(),
            vec![
                "時分",
                "気圧(hPa)-現地",
                "気圧(hPa)-海面",
                "降水量(mm)",
                "気温(℃)",
                "風向・風速(m/s)-平均",
                "風向・風速(m/s)-風向",
                "風向・風速(m/s)-最大瞬間",
                "風向・風速(m/s)-風向",
            ]
        );
    }

    #[test]
    fn test_three_levels() {
        let header = vec![
            vec![HeaderCell::new("t", 1).with_row_span(3), HeaderCell::new("X", 3)],
            vec![HeaderCell::new("Y", 2), HeaderCell::new("Z", 1)],
            vec![HeaderCell::new("p", 1), HeaderCell::new("q", 1)],
        ];
        assert_eq!(flatten_header(&header).unwrap(), vec!["t", "X-Y-p", "X-Y-q", "X-Z"]);
    }

    #[test]
    fn test_level_mismatch_is_structural() {
        let header = vec![
            vec![HeaderCell::new("A", 2)],
            vec![HeaderCell::new("B", 1), HeaderCell::new("C", 1)],
        ];
        assert!(matches!(
            flatten_header(&header),
            Err(ObservationError::Structural(_))
        ));
    }

    #[test]
    fn test_span_count_mismatch_is_structural() {
        let short = vec![
            vec![HeaderCell::new("A", 3).with_row_span(2)],
            vec![HeaderCell::new("B", 1), HeaderCell::new("C", 1)],
        ];
        assert!(matches!(
            flatten_header(&short),
            Err(ObservationError::Structural(_))
        ));

        let leftover = vec![
            vec![HeaderCell::new("A", 2).with_row_span(2)],
            vec![
                HeaderCell::new("B", 1),
                HeaderCell::new("C", 1),
                HeaderCell::new("D", 1),
            ],
        ];
        assert!(matches!(
            flatten_header(&leftover),
            Err(ObservationError::Structural(_))
        ));

        let overrun = vec![
            vec![HeaderCell::new("A", 2).with_row_span(3)],
            vec![HeaderCell::new("B", 1), HeaderCell::new("C", 2)],
            vec![HeaderCell::new("d", 1), HeaderCell::new("e", 1)],
        ];
        assert!(matches!(
            flatten_header(&overrun),
            Err(ObservationError::Structural(_))
        ));
    }

    #[test]
    fn test_duplicate_names_are_kept() {
        let header = vec![vec![
            HeaderCell::new("風向", 1),
            HeaderCell::new("風向", 1),
        ]];
        assert_eq!(flatten_header(&header).unwrap(), vec!["風向", "風向"]);
    }

    #[test]
    fn test_interval_index() {
        assert_eq!(interval_index(1, 23), 8);
        assert_eq!(interval_index(0, 0), 0);
        assert_eq!(interval_index(23, 59), 143);
        assert_eq!(interval_index(24, 0), 144);
    }

    fn full_day_table() -> ObservationTable {
        let header = vec![vec![
            HeaderCell::new("時分", 1),
            HeaderCell::new("気温(℃)", 1),
        ]];
        let rows = (0..INTERVALS_PER_DAY)
            .map(|i| vec![format!("{:02}:{:02}", i / 6, (i % 6) * 10), format!("{}.5", i % 40)])
            .collect();
        parse(&header, rows).unwrap()
    }

    #[test]
    fn test_row_lookup() {
        let table = full_day_table();
        let column = table.find_column("気温").unwrap();
        assert_eq!(column, 1);
        assert_eq!(table.value_at(column, 1, 23).unwrap(), "8.5");
        assert_eq!(table.value_at(0, 23, 59).unwrap(), "23:50");
        assert!(table.find_column("湿度").is_none());
    }

    #[test]
    fn test_out_of_range_interval_is_an_error() {
        let table = full_day_table();
        assert!(matches!(
            table.row_at(24, 0),
            Err(ObservationError::IntervalOutOfRange { index: 144, .. })
        ));
        assert!(matches!(
            table.value_at(5, 1, 0),
            Err(ObservationError::ColumnOutOfRange { .. })
        ));

        let short = parse(
            &[vec![HeaderCell::new("時分", 1)]],
            vec![vec!["00:10".to_string()]],
        )
        .unwrap();
        assert!(short.row_at(0, 10).is_err());
        assert!(short.row_at(0, 9).is_ok());
    }

    #[test]
    fn test_from_markup() {
        let markup = r#"
            <div id="main">
              <table id="tablefix1" class="data2_s">
                <tr class="mtx"><th rowspan="2" scope="col">時分</th><th colspan="2" scope="colgroup">気圧(hPa)</th><th rowspan="2">気温<br/>(℃)</th></tr>
                <tr class="mtx"><th>現地</th><th>海面</th></tr>
                <tr class="mtx" style="text-align:right;"><td style="white-space:nowrap">00:10</td><td class="data_0_0">1008.1</td><td class="data_0_0">1010.2</td><td class="data_0_0">27.3</td></tr>
                <tr class="mtx" style="text-align:right;"><td>00:20</td><td>1008.0</td><td>1010.1</td><td>27.1 )</td></tr>
              </table>
            </div>"#;
        let table = ObservationTable::from_markup(markup).unwrap();
        assert_eq!(
            table.columns(),
            &["時分", "気圧(hPa)-現地", "気圧(hPa)-海面", "気温(℃)"]
        );
        assert_eq!(table.rows().len(), 2);
        let column = table.find_column("気温").unwrap();
        assert_eq!(table.value_at(column, 0, 0).unwrap(), "27.3");
        assert_eq!(table.value_at(column, 0, 15).unwrap(), "27.1 )");
    }

    #[test]
    fn test_from_markup_without_table() {
        assert!(matches!(
            ObservationTable::from_markup("<div>no data</div>"),
            Err(ObservationError::TableNotFound)
        ));
    }

    #[test]
    fn test_from_markup_bad_span() {
        let markup = r#"<table><tr><th colspan="x">A</th></tr></table>"#;
        assert!(matches!(
            ObservationTable::from_markup(markup),
            Err(ObservationError::Structural(_))
        ));
    }

    #[test]
    fn test_more_rows_than_a_day_is_structural() {
        let header = vec![vec![HeaderCell::new("時分", 1)]];
        let rows = (0..=INTERVALS_PER_DAY)
            .map(|i| vec![format!("row {i}")])
            .collect::<Vec<_>>();
        assert_eq!(rows.len(), 145);
        assert!(matches!(
            parse(&header, rows),
            Err(ObservationError::Structural(_))
        ));
    }

    #[test]
    fn test_huge_colspan_is_structural() {
        let markup = r#"<table>
            <tr><th rowspan="2">t</th><th colspan="4000000000000000000">A</th></tr>
            <tr><th>a</th></tr>
        </table>"#;
        assert!(matches!(
            ObservationTable::from_markup(markup),
            Err(ObservationError::Structural(_))
        ));

        let markup = r#"<table><tr>
            <th colspan="18446744073709551615">A</th><th colspan="2">B</th>
        </tr></table>"#;
        assert!(matches!(
            ObservationTable::from_markup(markup),
            Err(ObservationError::Structural(_))
        ));
    }

    #[test]
    fn test_oversized_cell_spans_are_structural() {
        let huge = vec![
            vec![
                HeaderCell::new("t", 1).with_row_span(2),
                HeaderCell::new("A", usize::MAX / 4),
            ],
            vec![HeaderCell::new("a", 1)],
        ];
        assert!(matches!(
            flatten_header(&huge),
            Err(ObservationError::Structural(_))
        ));

        let overflowing = vec![vec![
            HeaderCell::new("A", usize::MAX),
            HeaderCell::new("B", 2),
        ]];
        assert!(matches!(
            flatten_header(&overflowing),
            Err(ObservationError::Structural(_))
        ));
    }
}
