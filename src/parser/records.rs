use tracing::debug;

use super::rows::{RowKind, MALFORMED_ROW_STRIDE};

/// Letter categories in column order.
pub const LETTERS: [&str; 10] = ["A", "B", "C", "D", "F", "I", "S", "U", "Q", "X"];

/// One section's grade counts, kept as the raw report strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradeRecord {
    pub grades: [String; 10],
    pub dept: String,
    pub course_num: String,
    pub section_num: String,
    pub instructor_name: String,
}

impl GradeRecord {
    /// Ten grade counts followed by the four identifiers.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.grades.iter().map(String::as_str).chain([
            self.dept.as_str(),
            self.course_num.as_str(),
            self.section_num.as_str(),
            self.instructor_name.as_str(),
        ])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseStyle {
    /// Reports from 2017 onward.
    #[default]
    New,
    /// Pre-2017 reports, recognised by a `COLLEGE:` header.
    Old,
}

#[derive(Debug, Clone, Copy)]
enum InstructorField {
    Last,
    At(usize),
}

/// Where each field sits inside a data row window.
#[derive(Debug, Clone, Copy)]
pub struct FieldLayout {
    grades: [usize; 10],
    instructor: InstructorField,
}

const NEW_LAYOUT: FieldLayout = FieldLayout {
    // A..F counts alternate with their percentages; I..X are contiguous.
    grades: [1, 3, 5, 7, 9, 13, 14, 15, 16, 17],
    instructor: InstructorField::Last,
};

const OLD_LAYOUT: FieldLayout = FieldLayout {
    grades: [4, 5, 6, 7, 8, 10, 11, 12, 13, 14],
    instructor: InstructorField::At(2),
};

impl ParseStyle {
    pub fn layout(self) -> &'static FieldLayout {
        match self {
            ParseStyle::New => &NEW_LAYOUT,
            ParseStyle::Old => &OLD_LAYOUT,
        }
    }
}

impl FieldLayout {
    fn grades(&self, window: &[String]) -> [String; 10] {
        self.grades.map(|pos| window.get(pos).cloned().unwrap_or_default())
    }

    fn instructor(&self, window: &[String]) -> String {
        let token = match self.instructor {
            InstructorField::Last => window.last(),
            InstructorField::At(pos) => window.get(pos),
        };
        token.cloned().unwrap_or_default()
    }
}

/// `tokens[start..start + len]`, cut short at the end of the slice.
fn bounded(tokens: &[String], start: usize, len: usize) -> &[String] {
    let start = start.min(tokens.len());
    let end = start.saturating_add(len).min(tokens.len());
    &tokens[start..end]
}

fn split_identifier(token: &str) -> Option<(&str, &str, &str)> {
    let mut parts = token.split('-');
    let dept = parts.next()?;
    let course = parts.next()?;
    let section = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    Some((dept, course, section))
}

/// Per-page cursor over a token sequence. Yields records in page order.
pub struct PageRecords<'a> {
    tokens: &'a [String],
    cursor: usize,
    style: ParseStyle,
    malformed: usize,
}

impl<'a> PageRecords<'a> {
    pub fn new(tokens: &'a [String]) -> Self {
        Self {
            tokens,
            cursor: 0,
            style: ParseStyle::default(),
            malformed: 0,
        }
    }

    pub fn style(&self) -> ParseStyle {
        self.style
    }

    #[cfg(test)]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Data candidates skipped so far because the identifier did not split.
    pub fn malformed(&self) -> usize {
        self.malformed
    }

    fn data_row(&mut self) -> Option<GradeRecord> {
        let window = bounded(self.tokens, self.cursor, RowKind::Data.stride());
        let Some((dept, course, section)) = window.first().and_then(|t| split_identifier(t))
        else {
            debug!(
                cursor = self.cursor,
                token = ?window.first(),
                "malformed data row, resyncing"
            );
            self.malformed += 1;
            self.cursor += MALFORMED_ROW_STRIDE;
            return None;
        };

        let layout = self.style.layout();
        let record = GradeRecord {
            grades: layout.grades(window),
            dept: dept.to_string(),
            course_num: course.to_string(),
            section_num: section.to_string(),
            instructor_name: layout.instructor(window),
        };
        self.cursor += RowKind::Data.stride();
        Some(record)
    }
}

impl Iterator for PageRecords<'_> {
    type Item = GradeRecord;

    fn next(&mut self) -> Option<GradeRecord> {
        while self.cursor < self.tokens.len() {
            let kind = RowKind::classify(&self.tokens[self.cursor]);
            match kind {
                RowKind::Data => {
                    if let Some(record) = self.data_row() {
                        return Some(record);
                    }
                }
                RowKind::OldHeader => {
                    self.style = ParseStyle::Old;
                    self.cursor += kind.stride();
                }
                _ => self.cursor += kind.stride(),
            }
        }
        None
    }
}

/// Extract every grade record from one page's tokens.
#[cfg(test)]
pub fn extract_records(tokens: &[String]) -> Vec<GradeRecord> {
    PageRecords::new(tokens).collect()
}
