use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

static REPORT_FILE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^grd(\d{4})([123])([A-Za-z0-9]+)\.(?:pdf|csv)$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Semester {
    Spring,
    Summer,
    Fall,
}

impl Semester {
    pub const ALL: [Semester; 3] = [Semester::Spring, Semester::Summer, Semester::Fall];

    pub fn code(self) -> char {
        match self {
            Semester::Spring => '1',
            Semester::Summer => '2',
            Semester::Fall => '3',
        }
    }

    pub fn from_code(code: char) -> Option<Semester> {
        match code {
            '1' => Some(Semester::Spring),
            '2' => Some(Semester::Summer),
            '3' => Some(Semester::Fall),
            _ => None,
        }
    }
}

/// `<year><semester>`, e.g. `20171` for Spring 2017.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TermCode {
    pub year: u16,
    pub semester: Semester,
}

impl fmt::Display for TermCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.year, self.semester.code())
    }
}

/// One published report: a term plus a college (or campus) suffix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReportName {
    pub term: TermCode,
    pub college: String,
}

impl ReportName {
    pub fn new(year: u16, semester: Semester, college: &str) -> Self {
        Self {
            term: TermCode { year, semester },
            college: college.to_string(),
        }
    }

    /// Parse `grd<year><semester><college>.pdf` (or the matching `.csv`).
    pub fn parse(filename: &str) -> Option<Self> {
        let caps = REPORT_FILE_RE.captures(filename)?;
        let year = caps[1].parse().ok()?;
        let semester = Semester::from_code(caps[2].chars().next()?)?;
        Some(Self::new(year, semester, &caps[3]))
    }

    pub fn filename(&self) -> String {
        format!("grd{}{}.pdf", self.term, self.college)
    }

    pub fn url(&self, pdf_base_url: &str) -> String {
        format!(
            "{}/{}/{}",
            pdf_base_url.trim_end_matches('/'),
            self.term,
            self.filename()
        )
    }
}
