use std::collections::VecDeque;

/// Default number of free-form commands kept for recall.
pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

/// Bounded list of previously sent free-form commands, most recent last.
///
/// A command equal to the one just before it is not recorded again. The
/// cursor supports up/down style navigation and is reset by every push.
#[derive(Debug, Clone)]
pub struct CommandHistory {
    entries: VecDeque<String>,
    capacity: usize,
    cursor: Option<usize>,
}

impl Default for CommandHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl CommandHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            cursor: None,
        }
    }

    pub fn push(&mut self, command: &str) {
        self.cursor = None;
        let command = command.trim();
        if command.is_empty() || self.capacity == 0 {
            return;
        }
        if self.entries.back().map(String::as_str) == Some(command) {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(command.to_string());
    }

    /// Steps back towards older commands. Stays on the oldest once reached.
    pub fn older(&mut self) -> Option<&str> {
        if self.entries.is_empty() {
            return None;
        }
        let index = match self.cursor {
            None => self.entries.len() - 1,
            Some(i) => i.saturating_sub(1),
        };
        self.cursor = Some(index);
        self.entries.get(index).map(String::as_str)
    }

    /// Steps forward towards newer commands. Returns `None` once past the
    /// newest, which callers treat as an empty input line.
    pub fn newer(&mut self) -> Option<&str> {
        let index = self.cursor? + 1;
        if index >= self.entries.len() {
            self.cursor = None;
            return None;
        }
        self.cursor = Some(index);
        self.entries.get(index).map(String::as_str)
    }

    /// Resolves `!!` (last command) and `!-n` (n-th most recent).
    pub fn recall(&self, pattern: &str) -> Option<&str> {
        let back = match pattern.trim() {
            "!!" => 1,
            other => other.strip_prefix("!-")?.parse::<usize>().ok()?,
        };
        if back == 0 || back > self.entries.len() {
            return None;
        }
        self.entries
            .get(self.entries.len() - back)
            .map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skips_immediate_duplicates() {
        let mut history = CommandHistory::default();
        history.push("HOME X");
        history.push("HOME X");
        history.push("HOME Y");
        history.push("HOME X");
        assert_eq!(history.iter().collect::<Vec<_>>(), ["HOME X", "HOME Y", "HOME X"]);
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let mut history = CommandHistory::new(3);
        for cmd in ["a", "b", "c", "d"] {
            history.push(cmd);
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.iter().next(), Some("b"));
    }

    #[test]
    fn test_default_capacity_is_fifty() {
        let mut history = CommandHistory::default();
        for i in 0..60 {
            history.push(&format!("MOVE X {}", i));
        }
        assert_eq!(history.len(), 50);
        assert_eq!(history.iter().next(), Some("MOVE X 10"));
    }

    #[test]
    fn test_navigation() {
        let mut history = CommandHistory::default();
        history.push("one");
        history.push("two");

        assert_eq!(history.older(), Some("two"));
        assert_eq!(history.older(), Some("one"));
        assert_eq!(history.older(), Some("one"));
        assert_eq!(history.newer(), Some("two"));
        assert_eq!(history.newer(), None);
        assert_eq!(history.newer(), None);
    }

    #[test]
    fn test_recall_patterns() {
        let mut history = CommandHistory::default();
        history.push("one");
        history.push("two");
        history.push("three");

        assert_eq!(history.recall("!!"), Some("three"));
        assert_eq!(history.recall("!-1"), Some("three"));
        assert_eq!(history.recall("!-3"), Some("one"));
        assert_eq!(history.recall("!-4"), None);
        assert_eq!(history.recall("!-0"), None);
        assert_eq!(history.recall("three"), None);
    }

    #[test]
    fn test_blank_commands_ignored() {
        let mut history = CommandHistory::default();
        history.push("   ");
        assert!(history.is_empty());
    }
}
