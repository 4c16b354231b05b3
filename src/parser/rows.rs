/// Tokens spanned by a post-2017 header block (starts with `SECTION`).
pub const NEW_HEADER_STRIDE: usize = 38;
/// Tokens spanned by a pre-2017 header block (starts with `COLLEGE:`).
pub const OLD_HEADER_STRIDE: usize = 37;
/// Course, department and college totals all span the same width.
pub const TOTAL_ROW_STRIDE: usize = 19;
pub const DATA_ROW_STRIDE: usize = 20;
/// A data row whose identifier fails the dash split is one token short.
pub const MALFORMED_ROW_STRIDE: usize = DATA_ROW_STRIDE - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowKind {
    NewHeader,
    OldHeader,
    CourseTotal,
    DepartmentTotal,
    CollegeTotal,
    Data,
}

impl RowKind {
    /// Classify a row by its first token. Every string maps to exactly one kind.
    pub fn classify(token: &str) -> RowKind {
        match token {
            "SECTION" => RowKind::NewHeader,
            "COLLEGE:" => RowKind::OldHeader,
            "COURSE TOTAL:" => RowKind::CourseTotal,
            "DEPARTMENT TOTAL:" => RowKind::DepartmentTotal,
            "COLLEGE TOTAL:" => RowKind::CollegeTotal,
            _ => RowKind::Data,
        }
    }

    /// Cursor advance past a well-formed row of this kind.
    pub const fn stride(self) -> usize {
        match self {
            RowKind::NewHeader => NEW_HEADER_STRIDE,
            RowKind::OldHeader => OLD_HEADER_STRIDE,
            RowKind::CourseTotal | RowKind::DepartmentTotal | RowKind::CollegeTotal => {
                TOTAL_ROW_STRIDE
            }
            RowKind::Data => DATA_ROW_STRIDE,
        }
    }
}
