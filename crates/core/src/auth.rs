use std::fmt;

/// Credentials for the signed-in user, supplied by the session layer.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub token: String,
    pub user_id: String,
}

impl AuthContext {
    pub fn new(token: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            user_id: user_id.into(),
        }
    }

    pub fn same_user(&self, other: &AuthContext) -> bool {
        self.user_id == other.user_id
    }
}

impl fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthContext")
            .field("token", &"<redacted>")
            .field("user_id", &self.user_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_hides_token() {
        let auth = AuthContext::new("s3cret", "42");
        let rendered = format!("{auth:?}");
        assert!(!rendered.contains("s3cret"));
        assert!(rendered.contains("42"));
    }
}
