/// A progress or diagnostic message produced by a pipeline stage.
///
/// Stages collect these into their reports instead of printing, and mirror
/// each one to the `log` facade as it is recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Feedback {
    Info(String),
    /// The stage continued, but one unit of work did not succeed.
    Warning(String),
    Error(String),
}

impl Feedback {
    pub fn info(msg: impl Into<String>) -> Self {
        Self::Info(msg.into())
    }

    pub fn warning(msg: impl Into<String>) -> Self {
        Self::Warning(msg.into())
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self::Error(msg.into())
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    pub fn is_warning(&self) -> bool {
        matches!(self, Self::Warning(_))
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Info(msg) | Self::Warning(msg) | Self::Error(msg) => msg,
        }
    }

    fn level(&self) -> log::Level {
        match self {
            Self::Info(_) => log::Level::Info,
            Self::Warning(_) => log::Level::Warn,
            Self::Error(_) => log::Level::Error,
        }
    }
}

impl std::fmt::Display for Feedback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info(msg) => write!(f, "{msg}"),
            Self::Warning(msg) => write!(f, "warning: {msg}"),
            Self::Error(msg) => write!(f, "error: {msg}"),
        }
    }
}

/// An append-only list of feedback that logs as it grows.
#[derive(Debug, Clone, Default)]
pub struct FeedbackLog {
    items: Vec<Feedback>,
}

impl FeedbackLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: Feedback) {
        log::log!(item.level(), "{}", item.message());
        self.items.push(item);
    }

    pub fn extend(&mut self, other: FeedbackLog) {
        self.items.extend(other.items);
    }

    pub fn items(&self) -> &[Feedback] {
        &self.items
    }

    pub fn warnings(&self) -> usize {
        self.items.iter().filter(|f| f.is_warning()).count()
    }

    pub fn errors(&self) -> usize {
        self.items.iter().filter(|f| f.is_error()).count()
    }

    pub fn into_vec(self) -> Vec<Feedback> {
        self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_severity() {
        assert_eq!(Feedback::info("msg").to_string(), "msg");
        assert_eq!(Feedback::warning("msg").to_string(), "warning: msg");
        assert_eq!(Feedback::error("msg").to_string(), "error: msg");
    }

    #[test]
    fn log_counts_by_severity() {
        let mut log = FeedbackLog::new();
        log.push(Feedback::info("downloading"));
        log.push(Feedback::warning("failed a.csv.gz"));
        log.push(Feedback::warning("failed b.csv.gz"));
        log.push(Feedback::error("load failed"));

        assert_eq!(log.items().len(), 4);
        assert_eq!(log.warnings(), 2);
        assert_eq!(log.errors(), 1);
        assert_eq!(log.items()[1].message(), "failed a.csv.gz");
    }

    #[test]
    fn extend_keeps_order() {
        let mut first = FeedbackLog::new();
        first.push(Feedback::info("one"));
        let mut second = FeedbackLog::new();
        second.push(Feedback::info("two"));

        first.extend(second);
        let messages: Vec<&str> = first.items().iter().map(|f| f.message()).collect();
        assert_eq!(messages, vec!["one", "two"]);
    }
}
