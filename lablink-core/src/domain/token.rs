//! Session token generation
//!
//! Tokens are typed in by hand on the lab web page, so the alphabet leaves
//! out characters that are easily confused (`0`/`O`, `1`/`I`).

use rand::Rng;

/// Characters a token may contain
pub const TOKEN_ALPHABET: &[u8] = b"23456789ABCDEFGHJKLMNPQRSTUVWXYZ";

/// Number of characters in a token
pub const TOKEN_LENGTH: usize = 8;

/// Generates a fresh random token
pub fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    (0..TOKEN_LENGTH)
        .map(|_| TOKEN_ALPHABET[rng.gen_range(0..TOKEN_ALPHABET.len())] as char)
        .collect()
}

/// Generates a token guaranteed to differ from `previous`
///
/// Used after a token collision, where re-sending the same code would
/// collide again.
pub fn regenerate_token(previous: &str) -> String {
    loop {
        let token = generate_token();
        if token != previous {
            return token;
        }
    }
}

/// Checks whether `token` is well formed
pub fn is_valid_token(token: &str) -> bool {
    token.len() == TOKEN_LENGTH && token.bytes().all(|b| TOKEN_ALPHABET.contains(&b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_tokens_are_valid() {
        for _ in 0..500 {
            let token = generate_token();
            assert!(is_valid_token(&token), "invalid token {}", token);
            assert!(!token.contains(['0', '1', 'I', 'O']));
        }
    }

    #[test]
    fn test_regenerate_differs() {
        let token = generate_token();
        for _ in 0..100 {
            assert_ne!(regenerate_token(&token), token);
        }
    }

    #[test]
    fn test_is_valid_token_rejects_ambiguous() {
        assert!(is_valid_token("ABCD2345"));
        assert!(!is_valid_token("ABCD0345"));
        assert!(!is_valid_token("ABCDI345"));
        assert!(!is_valid_token("abcd2345"));
        assert!(!is_valid_token("ABC2345"));
    }
}
