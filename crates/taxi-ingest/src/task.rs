use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Errors raised while building file tasks.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    #[error("invalid category {0:?}: use lowercase letters, digits or '_'")]
    InvalidCategory(String),

    #[error("invalid month {0}: expected 1-12")]
    InvalidMonth(u8),

    #[error("invalid year-month {0:?}: expected YYYY-MM")]
    InvalidYearMonth(String),

    #[error("empty month range: {from} is after {to}")]
    EmptyRange { from: YearMonth, to: YearMonth },

    #[error("invalid reference file name {0:?}")]
    InvalidFileName(String),

    #[error("no known format for {0:?}: expected .csv.gz, .csv or .parquet")]
    UnknownFormat(String),

    #[error("reference file {0:?} needs a table name")]
    MissingTable(String),
}

/// On-disk encoding of a trip-data file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum FileFormat {
    #[serde(rename = "csv.gz")]
    CsvGz,
    #[serde(rename = "csv")]
    Csv,
    #[serde(rename = "parquet")]
    Parquet,
}

impl FileFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::CsvGz => "csv.gz",
            Self::Csv => "csv",
            Self::Parquet => "parquet",
        }
    }

    /// Infer the format from a file name's extension.
    pub fn from_file_name(name: &str) -> Option<Self> {
        if name.ends_with(".csv.gz") {
            Some(Self::CsvGz)
        } else if name.ends_with(".csv") {
            Some(Self::Csv)
        } else if name.ends_with(".parquet") {
            Some(Self::Parquet)
        } else {
            None
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// A calendar month, e.g. `2019-03`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(try_from = "String")]
pub struct YearMonth {
    pub year: u16,
    pub month: u8,
}

impl YearMonth {
    pub fn new(year: u16, month: u8) -> Result<Self, TaskError> {
        if !(1..=12).contains(&month) {
            return Err(TaskError::InvalidMonth(month));
        }
        Ok(Self { year, month })
    }

    fn succ(self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TaskError::InvalidYearMonth(s.to_owned());
        let (year, month) = s.trim().split_once('-').ok_or_else(invalid)?;
        let year: u16 = year.parse().map_err(|_| invalid())?;
        let month: u8 = month.parse().map_err(|_| invalid())?;
        Self::new(year, month)
    }
}

impl TryFrom<String> for YearMonth {
    type Error = TaskError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// One remote trip-data file, identified by category, year and month.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileTask {
    category: String,
    period: YearMonth,
}

impl FileTask {
    pub fn new(category: impl Into<String>, year: u16, month: u8) -> Result<Self, TaskError> {
        let category = category.into();
        validate_category(&category)?;
        Ok(Self {
            category,
            period: YearMonth::new(year, month)?,
        })
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn year(&self) -> u16 {
        self.period.year
    }

    pub fn month(&self) -> u8 {
        self.period.month
    }

    pub fn period(&self) -> YearMonth {
        self.period
    }

    /// `{category}_tripdata_{year}-{month}.{ext}`
    pub fn file_name(&self, format: FileFormat) -> String {
        format!(
            "{}_tripdata_{}.{}",
            self.category,
            self.period,
            format.extension()
        )
    }

    /// Every combination of category × year × month, in that nesting order.
    /// Duplicates in the inputs collapse to a single task.
    pub fn product(
        categories: &[String],
        years: &[u16],
        months: &[u8],
    ) -> Result<Vec<FileTask>, TaskError> {
        let mut tasks = Vec::with_capacity(categories.len() * years.len() * months.len());
        for category in categories {
            for &year in years {
                for &month in months {
                    tasks.push(FileTask::new(category.clone(), year, month)?);
                }
            }
        }
        Ok(dedup(tasks))
    }

    /// Every month from `from` to `to` inclusive, for each category.
    pub fn range(
        categories: &[String],
        from: YearMonth,
        to: YearMonth,
    ) -> Result<Vec<FileTask>, TaskError> {
        if from > to {
            return Err(TaskError::EmptyRange { from, to });
        }

        let mut tasks = Vec::new();
        for category in categories {
            let mut current = from;
            while current <= to {
                tasks.push(FileTask::new(category.clone(), current.year, current.month)?);
                current = current.succ();
            }
        }
        Ok(dedup(tasks))
    }
}

impl fmt::Display for FileTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.category, self.period)
    }
}

/// A fixed-name file outside the monthly trip series, such as the zone
/// lookup, loaded whole into its own table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReferenceFile {
    name: String,
    url: String,
    table: String,
    format: FileFormat,
}

impl ReferenceFile {
    /// The format comes from `name`'s extension. The name doubles as the
    /// local file name and the object key, so it may not contain path
    /// separators or a wildcard.
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        table: impl Into<String>,
    ) -> Result<Self, TaskError> {
        let name = name.into();
        let table = table.into();
        if name.is_empty() || name.contains(['/', '\\', '*']) || name == "." || name == ".." {
            return Err(TaskError::InvalidFileName(name));
        }
        let format =
            FileFormat::from_file_name(&name).ok_or_else(|| TaskError::UnknownFormat(name.clone()))?;
        if table.trim().is_empty() {
            return Err(TaskError::MissingTable(name));
        }
        Ok(Self {
            name,
            url: url.into(),
            table,
            format,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn format(&self) -> FileFormat {
        self.format
    }
}

impl fmt::Display for ReferenceFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Category names end up in file names and wildcard patterns, so they are
/// restricted to characters that cannot collide with either.
pub fn validate_category(category: &str) -> Result<(), TaskError> {
    let valid = !category.is_empty()
        && category
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(TaskError::InvalidCategory(category.to_owned()))
    }
}

fn dedup(tasks: Vec<FileTask>) -> Vec<FileTask> {
    let mut seen = HashSet::new();
    tasks
        .into_iter()
        .filter(|task| seen.insert(task.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn categories(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn file_name_pads_month() {
        let task = FileTask::new("yellow", 2019, 1).unwrap();
        assert_eq!(
            task.file_name(FileFormat::CsvGz),
            "yellow_tripdata_2019-01.csv.gz"
        );
        assert_eq!(
            task.file_name(FileFormat::Parquet),
            "yellow_tripdata_2019-01.parquet"
        );
    }

    #[test]
    fn product_enumerates_all_combinations() {
        let tasks =
            FileTask::product(&categories(&["yellow", "green"]), &[2019, 2020], &[1, 2, 3])
                .unwrap();
        assert_eq!(tasks.len(), 12);
        assert_eq!(tasks[0], FileTask::new("yellow", 2019, 1).unwrap());
        assert_eq!(tasks[11], FileTask::new("green", 2020, 3).unwrap());
    }

    #[test]
    fn product_drops_duplicate_tasks() {
        let tasks =
            FileTask::product(&categories(&["yellow", "yellow"]), &[2019], &[1, 1]).unwrap();
        assert_eq!(tasks.len(), 1);
    }

    #[test]
    fn range_crosses_year_boundary() {
        let tasks = FileTask::range(
            &categories(&["green"]),
            "2019-11".parse().unwrap(),
            "2020-02".parse().unwrap(),
        )
        .unwrap();
        let periods: Vec<String> = tasks.iter().map(|t| t.period().to_string()).collect();
        assert_eq!(periods, vec!["2019-11", "2019-12", "2020-01", "2020-02"]);
    }

    #[test]
    fn range_rejects_inverted_bounds() {
        let result = FileTask::range(
            &categories(&["green"]),
            "2020-02".parse().unwrap(),
            "2019-11".parse().unwrap(),
        );
        assert!(matches!(result, Err(TaskError::EmptyRange { .. })));
    }

    #[test]
    fn rejects_bad_month_and_category() {
        assert_eq!(
            FileTask::new("yellow", 2019, 13),
            Err(TaskError::InvalidMonth(13))
        );
        assert!(matches!(
            FileTask::new("yel*low", 2019, 1),
            Err(TaskError::InvalidCategory(_))
        ));
        assert!(matches!(
            FileTask::new("", 2019, 1),
            Err(TaskError::InvalidCategory(_))
        ));
    }

    #[test]
    fn year_month_parses_and_displays() {
        let ym: YearMonth = "2021-07".parse().unwrap();
        assert_eq!(ym, YearMonth::new(2021, 7).unwrap());
        assert_eq!(ym.to_string(), "2021-07");
        assert!("2021/07".parse::<YearMonth>().is_err());
        assert!("2021-00".parse::<YearMonth>().is_err());
    }

    #[test]
    fn reference_file_takes_format_from_its_name() {
        let zones = ReferenceFile::new(
            "taxi_zone_lookup.csv",
            "https://trips.test/misc/taxi_zone_lookup.csv",
            "taxi_zone_lookup",
        )
        .unwrap();
        assert_eq!(zones.format(), FileFormat::Csv);
        assert_eq!(zones.table(), "taxi_zone_lookup");
        assert_eq!(zones.to_string(), "taxi_zone_lookup.csv");
    }

    #[test]
    fn reference_file_rejects_unusable_names() {
        let bad = |name: &str| ReferenceFile::new(name, "https://x", "t").unwrap_err();
        assert!(matches!(bad("misc/zones.csv"), TaskError::InvalidFileName(_)));
        assert!(matches!(bad("zones_*.csv"), TaskError::InvalidFileName(_)));
        assert!(matches!(bad("zones.json"), TaskError::UnknownFormat(_)));
        assert_eq!(
            ReferenceFile::new("zones.csv", "https://x", " "),
            Err(TaskError::MissingTable("zones.csv".into()))
        );
    }

    #[test]
    fn format_from_file_name() {
        assert_eq!(
            FileFormat::from_file_name("a_tripdata_2019-01.csv.gz"),
            Some(FileFormat::CsvGz)
        );
        assert_eq!(FileFormat::from_file_name("zones.csv"), Some(FileFormat::Csv));
        assert_eq!(
            FileFormat::from_file_name("x.parquet"),
            Some(FileFormat::Parquet)
        );
        assert_eq!(FileFormat::from_file_name("x.json"), None);
    }
}
