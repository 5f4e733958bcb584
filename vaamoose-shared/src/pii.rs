use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Wraps customer PII (emails, phone numbers) so `{:?}` and `{}` in log macros never print it.
///
/// Serialization still emits the real value: event consumers and API clients need it.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Masked<T>(pub T);

impl<T> Masked<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    pub fn expose(&self) -> &T {
        &self.0
    }

    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Debug for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl<T> fmt::Display for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl<T: Serialize> Serialize for Masked<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

/// Log-friendly form of an email: keeps the first character and the domain.
pub fn redact_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() => {
            let first: String = local.chars().take(1).collect();
            format!("{}***@{}", first, domain)
        }
        _ => "***".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masked_hides_value_in_debug_but_serializes_it() {
        let email = Masked::new("ada@uni.edu.ng".to_string());
        assert_eq!(format!("{:?}", email), "********");
        assert_eq!(serde_json::to_string(&email).unwrap(), "\"ada@uni.edu.ng\"");
    }

    #[test]
    fn test_redact_email() {
        assert_eq!(redact_email("ada@uni.edu.ng"), "a***@uni.edu.ng");
        assert_eq!(redact_email("not-an-email"), "***");
    }
}
