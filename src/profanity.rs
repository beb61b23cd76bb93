//! C4 ProfanityFilter: nickname content rejection (§3 Participant,
//! §7 `ProfanityDetected`). Grounded on `rustrict`, the profanity-detection
//! crate the quiz-slide example in the pack depends on for the same job.

use rustrict::CensorStr;

/// A small set of terms `rustrict`'s general-purpose censor does not flag
/// but that this deployment wants blocked outright (session-specific slurs,
/// impersonation of system roles). Checked case-insensitively against a
/// normalized (lowercased, whitespace-stripped) form of the nickname.
const BLOCKLIST: &[&str] = &["admin", "moderator", "host", "system"];

pub struct ProfanityFilter;

impl ProfanityFilter {
    pub fn new() -> Self {
        Self
    }

    pub fn is_allowed(&self, nickname: &str) -> bool {
        if nickname.is_inappropriate() {
            return false;
        }
        let normalized: String = nickname
            .chars()
            .filter(|c| !c.is_whitespace())
            .flat_map(char::to_lowercase)
            .collect();
        !BLOCKLIST.iter().any(|term| normalized.contains(term))
    }
}

impl Default for ProfanityFilter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordinary_nicknames_pass() {
        let filter = ProfanityFilter::new();
        assert!(filter.is_allowed("Blue Falcon"));
        assert!(filter.is_allowed("Quizzy"));
    }

    #[test]
    fn blocklisted_terms_are_rejected() {
        let filter = ProfanityFilter::new();
        assert!(!filter.is_allowed("Admin"));
        assert!(!filter.is_allowed("the SYSTEM"));
    }

    #[test]
    fn inappropriate_language_is_rejected() {
        let filter = ProfanityFilter::new();
        assert!(!filter.is_allowed("fuck"));
    }
}
