//! Validation helpers for DTOs.

use validator::ValidationError;

/// Alphabet game codes are minted from.
///
/// 32 symbols; the visually ambiguous 0/O and 1/I pairs are excluded so codes
/// survive being read out loud or scribbled on a whiteboard.
pub const GAME_CODE_ALPHABET: &str = "23456789ABCDEFGHJKLMNPQRSTUVWXYZ";

/// Number of characters in a game code.
pub const GAME_CODE_LENGTH: usize = 6;

/// Longest accepted player display name.
pub const PLAYER_NAME_MAX_LENGTH: usize = 64;

/// Longest accepted join token.
pub const JOIN_TOKEN_MAX_LENGTH: usize = 128;

/// Validates that a game code is exactly six characters from the code alphabet.
///
/// # Examples
///
/// ```ignore
/// validate_game_code("7XKQ2M") // Ok
/// validate_game_code("7xkq2m") // Err - lowercase
/// validate_game_code("7XKQ2")  // Err - too short
/// ```
pub fn validate_game_code(code: &str) -> Result<(), ValidationError> {
    if code.chars().count() != GAME_CODE_LENGTH {
        let mut err = ValidationError::new("game_code_length");
        err.message = Some(
            format!(
                "Game code must be exactly {GAME_CODE_LENGTH} characters (got {})",
                code.chars().count()
            )
            .into(),
        );
        return Err(err);
    }

    if !code.chars().all(|c| GAME_CODE_ALPHABET.contains(c)) {
        let mut err = ValidationError::new("game_code_format");
        err.message = Some("Game code must contain only characters from the code alphabet".into());
        return Err(err);
    }

    Ok(())
}

/// Validates that a player display name is non-blank and reasonably short.
pub fn validate_player_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        let mut err = ValidationError::new("player_name_blank");
        err.message = Some("Player name must not be blank".into());
        return Err(err);
    }

    if name.chars().count() > PLAYER_NAME_MAX_LENGTH {
        let mut err = ValidationError::new("player_name_length");
        err.message =
            Some(format!("Player name must be at most {PLAYER_NAME_MAX_LENGTH} characters").into());
        return Err(err);
    }

    Ok(())
}

/// Validates that a join token is non-empty and reasonably short.
pub fn validate_join_token(token: &str) -> Result<(), ValidationError> {
    if token.is_empty() {
        let mut err = ValidationError::new("join_token_empty");
        err.message = Some("Join token must not be empty".into());
        return Err(err);
    }

    if token.chars().count() > JOIN_TOKEN_MAX_LENGTH {
        let mut err = ValidationError::new("join_token_length");
        err.message =
            Some(format!("Join token must be at most {JOIN_TOKEN_MAX_LENGTH} characters").into());
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_game_code_valid() {
        assert!(validate_game_code("7XKQ2M").is_ok());
        assert!(validate_game_code("222222").is_ok());
        assert!(validate_game_code("ZYXWVU").is_ok());
    }

    #[test]
    fn test_validate_game_code_invalid_length() {
        assert!(validate_game_code("7XKQ2").is_err()); // too short
        assert!(validate_game_code("7XKQ2MM").is_err()); // too long
        assert!(validate_game_code("").is_err()); // empty
    }

    #[test]
    fn test_validate_game_code_invalid_format() {
        assert!(validate_game_code("7xkq2m").is_err()); // lowercase
        assert!(validate_game_code("7XKQ0M").is_err()); // ambiguous zero
        assert!(validate_game_code("7XKQIM").is_err()); // ambiguous I
        assert!(validate_game_code("7XK Q2").is_err()); // space
    }

    #[test]
    fn test_validate_player_name() {
        assert!(validate_player_name("Ada").is_ok());
        assert!(validate_player_name("   ").is_err()); // blank
        assert!(validate_player_name(&"x".repeat(65)).is_err()); // too long
    }

    #[test]
    fn test_validate_join_token() {
        assert!(validate_join_token("f3a9c1").is_ok());
        assert!(validate_join_token("").is_err()); // empty
        assert!(validate_join_token(&"t".repeat(129)).is_err()); // too long
    }
}
