use time::macros::format_description;
use time::OffsetDateTime;

/// Run log shown in the cloning and summary views.
///
/// Appending always snaps the view back to the newest line; manual scrolling
/// only holds until the next append.
#[derive(Debug, Clone, Default)]
pub struct LogBuffer {
    lines: Vec<String>,
    scroll_back: usize,
}

impl LogBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, at: OffsetDateTime, line: &str) {
        self.lines.push(format!("[{}] {line}", clock(at)));
        self.scroll_back = 0;
    }

    pub fn extend<'a>(&mut self, at: OffsetDateTime, lines: impl IntoIterator<Item = &'a str>) {
        for line in lines {
            self.push(at, line);
        }
    }

    #[cfg(test)]
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn scroll_up(&mut self, amount: usize) {
        self.scroll_back = (self.scroll_back + amount).min(self.lines.len());
    }

    pub fn scroll_down(&mut self, amount: usize) {
        self.scroll_back = self.scroll_back.saturating_sub(amount);
    }

    pub fn is_following(&self) -> bool {
        self.scroll_back == 0
    }

    /// First visible line for a viewport `height` rows tall.
    pub fn offset(&self, height: usize) -> usize {
        let bottom = self.lines.len().saturating_sub(height);
        bottom.saturating_sub(self.scroll_back)
    }

    pub fn visible(&self, height: usize) -> &[String] {
        let start = self.offset(height);
        let end = (start + height).min(self.lines.len());
        &self.lines[start..end]
    }
}

fn clock(at: OffsetDateTime) -> String {
    at.format(format_description!("[hour]:[minute]:[second]"))
        .unwrap_or_else(|_| "--:--:--".to_string())
}
