use crate::config::CannedRule;

/// Keyword lookup answering some questions locally instead of calling the backend.
#[derive(Debug, Clone, Default)]
pub struct CannedResponder {
    rules: Vec<(Vec<String>, String)>,
}

impl CannedResponder {
    pub fn new(rules: &[CannedRule], origin: &str) -> Self {
        let rules = rules
            .iter()
            .map(|rule| {
                let keywords = rule.keywords
                    .iter()
                    .map(|k| k.to_lowercase())
                    .filter(|k| !k.trim().is_empty())
                    .collect();
                (keywords, rule.reply.replace("{origin}", origin))
            })
            .collect();
        Self { rules }
    }

    /// First rule with a keyword contained in `message`, case-insensitively.
    pub fn respond(&self, message: &str) -> Option<&str> {
        if self.rules.is_empty() {
            return None;
        }
        let lowered = message.to_lowercase();
        self.rules
            .iter()
            .find(|(keywords, _)| keywords.iter().any(|k| lowered.contains(k.as_str())))
            .map(|(_, reply)| reply.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
