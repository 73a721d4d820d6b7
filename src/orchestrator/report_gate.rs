//! Report visibility, kept apart from run activity so hiding never discards the report.

use crate::model::Report;

#[derive(Debug, Default)]
pub(crate) struct ReportGate {
    report: Option<Report>,
    visible: bool,
    revealed_once: bool,
}

impl ReportGate {
    /// Store the report delivered by a poll. Only the first delivery of a run reveals the
    /// panel; later deliveries leave the user's hide/show choice alone.
    pub fn deliver(&mut self, report: Report) {
        self.report = Some(report);
        if !self.revealed_once {
            self.visible = true;
            self.revealed_once = true;
        }
    }

    /// Flip visibility. No-op until a report exists.
    pub fn toggle(&mut self) {
        if self.report.is_some() {
            self.visible = !self.visible;
        }
    }

    pub fn hide(&mut self) {
        self.visible = false;
    }

    pub fn reveal(&mut self) {
        self.visible = self.report.is_some();
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn report(&self) -> Option<&Report> {
        self.report.as_ref()
    }

    pub fn is_visible(&self) -> bool {
        self.visible && self.report.is_some()
    }
}
