/// Tracks how much of a growing answer has been shown.
///
/// Only whole paragraphs (text up to the last blank line) are handed out
/// while the answer streams, so a token never gets split between two renders.
#[derive(Debug, Default)]
pub struct ParagraphCursor {
    shown: usize,
}

impl ParagraphCursor {
    /// Complete paragraphs that arrived since the last call
    pub fn take_settled<'a>(&mut self, buffer: &'a str) -> Option<&'a str> {
        let pending = buffer.get(self.shown..)?;
        let end = pending.rfind("\n\n")? + 2;
        self.shown += end;
        Some(&pending[..end])
    }

    /// Everything not yet shown, once the answer is final
    pub fn take_rest<'a>(&mut self, buffer: &'a str) -> Option<&'a str> {
        let rest = buffer.get(self.shown..)?;
        self.shown = buffer.len();
        Some(rest).filter(|rest| !rest.trim().is_empty())
    }
}
