use secrecy::SecretString;

/// Server-held secrets resolved at startup and shared with the API layer.
#[derive(Clone)]
pub struct GlobalArgs {
    pub jwt_secret: SecretString,
    pub code_key: SecretString,
}

impl GlobalArgs {
    #[must_use]
    pub fn new(jwt_secret: SecretString, code_key: SecretString) -> Self {
        Self {
            jwt_secret,
            code_key,
        }
    }
}

impl std::fmt::Debug for GlobalArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalArgs")
            .field("jwt_secret", &"***")
            .field("code_key", &"***")
            .finish()
    }
}
