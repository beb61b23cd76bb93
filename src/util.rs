//! Small helpers shared across modules: nickname shape validation and join
//! code generation (§3 Session, §3 Participant).

use crate::constants::{JOIN_CODE_ALPHABET, JOIN_CODE_LEN, NICKNAME_MAX_LEN, NICKNAME_MIN_LEN};
use rand::Rng;

/// Checks nickname length only. Content filtering (profanity, blocklist) is
/// a separate concern, see `profanity::ProfanityFilter`.
pub fn nickname_length_valid(nickname: &str) -> bool {
    let len = nickname.chars().count();
    (NICKNAME_MIN_LEN..=NICKNAME_MAX_LEN).contains(&len)
}

/// Generates a fresh join code: `JOIN_CODE_LEN` characters drawn from
/// `JOIN_CODE_ALPHABET`. Collision checking against in-flight sessions is the
/// caller's responsibility (the registry retries on collision).
pub fn generate_join_code() -> String {
    let mut rng = rand::thread_rng();
    (0..JOIN_CODE_LEN)
        .map(|_| {
            let idx = rng.gen_range(0..JOIN_CODE_ALPHABET.len());
            JOIN_CODE_ALPHABET[idx] as char
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nickname_length_bounds() {
        assert!(!nickname_length_valid("ab"));
        assert!(nickname_length_valid("abc"));
        assert!(nickname_length_valid(&"a".repeat(NICKNAME_MAX_LEN)));
        assert!(!nickname_length_valid(&"a".repeat(NICKNAME_MAX_LEN + 1)));
    }

    #[test]
    fn join_code_has_expected_shape() {
        let code = generate_join_code();
        assert_eq!(code.len(), JOIN_CODE_LEN);
        assert!(code.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }
}
