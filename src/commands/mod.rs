pub mod convert;
pub mod status;
pub mod versions;

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct CommandReport {
    pub command: String,
    pub ok: bool,
    pub details: Vec<String>,
    pub issues: Vec<String>,
}

impl CommandReport {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ok: true,
            details: Vec::new(),
            issues: Vec::new(),
        }
    }

    pub fn detail(&mut self, text: impl Into<String>) {
        self.details.push(text.into());
    }

    pub fn issue(&mut self, text: impl Into<String>) {
        self.ok = false;
        self.issues.push(text.into());
    }
}

#[cfg(test)]
mod tests {
    use super::CommandReport;

    #[test]
    fn issue_marks_report_failed() {
        let mut report = CommandReport::new("convert");
        report.detail("projects=0");
        assert!(report.ok);
        report.issue("project /tmp/p failed");
        assert!(!report.ok);
        assert_eq!(report.details, vec!["projects=0".to_string()]);
    }
}
